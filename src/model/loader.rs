//! Bulk CSV import of comparables and precedents
//!
//! Comparables CSV columns:
//! `company_name,ev_revenue_multiple,ev_ebitda_multiple,pe_ratio,weight,is_outlier`
//!
//! Precedents CSV columns:
//! `target_company,acquirer_company,ev_ebitda_multiple,weight,announcement_date,close_date`
//!
//! Empty cells load as missing values; weight defaults to 1.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::{NewComparable, NewPrecedent};
use crate::error::{Result, ValuationError};

fn import_error(row: usize, message: impl std::fmt::Display) -> ValuationError {
    ValuationError::ImportError(format!("row {row}: {message}"))
}

/// Missing weights default to 1; present ones must be positive
fn row_weight(row: usize, weight: Option<Decimal>) -> Result<Decimal> {
    match weight {
        None => Ok(Decimal::ONE),
        Some(w) if w > Decimal::ZERO => Ok(w),
        Some(w) => Err(import_error(row, format!("weight must be positive, got {w}"))),
    }
}

#[derive(Debug, Deserialize)]
struct ComparableRecord {
    company_name: String,
    ev_revenue_multiple: Option<Decimal>,
    ev_ebitda_multiple: Option<Decimal>,
    pe_ratio: Option<Decimal>,
    weight: Option<Decimal>,
    is_outlier: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PrecedentRecord {
    target_company: String,
    acquirer_company: String,
    ev_ebitda_multiple: Option<Decimal>,
    weight: Option<Decimal>,
    announcement_date: Option<NaiveDate>,
    close_date: Option<NaiveDate>,
}

/// Load comparables from any CSV reader, stamping them with the tenant
pub fn load_comparables_from_reader<R: Read>(reader: R, organization_id: &str) -> Result<Vec<NewComparable>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for (line, record) in rdr.deserialize::<ComparableRecord>().enumerate() {
        let record = record?;
        let row = line + 1;
        if record.company_name.is_empty() {
            return Err(import_error(row, "company_name is empty"));
        }
        let weight = row_weight(row, record.weight)?;
        rows.push(NewComparable {
            organization_id: organization_id.to_string(),
            company_name: record.company_name,
            ev_revenue_multiple: record.ev_revenue_multiple,
            ev_ebitda_multiple: record.ev_ebitda_multiple,
            pe_ratio: record.pe_ratio,
            weight,
            is_outlier: record.is_outlier.unwrap_or(false),
        });
    }
    log::debug!("loaded {} comparables", rows.len());
    Ok(rows)
}

pub fn load_comparables(path: &Path, organization_id: &str) -> Result<Vec<NewComparable>> {
    let file = File::open(path)
        .map_err(|e| ValuationError::ImportError(format!("{}: {e}", path.display())))?;
    load_comparables_from_reader(file, organization_id)
}

/// Load precedent transactions from any CSV reader
pub fn load_precedents_from_reader<R: Read>(reader: R, organization_id: &str) -> Result<Vec<NewPrecedent>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for (line, record) in rdr.deserialize::<PrecedentRecord>().enumerate() {
        let record = record?;
        let row = line + 1;
        if record.target_company.is_empty() {
            return Err(import_error(row, "target_company is empty"));
        }
        let weight = row_weight(row, record.weight)?;
        rows.push(NewPrecedent {
            organization_id: organization_id.to_string(),
            target_company: record.target_company,
            acquirer_company: record.acquirer_company,
            ev_ebitda_multiple: record.ev_ebitda_multiple,
            weight,
            announcement_date: record.announcement_date,
            close_date: record.close_date,
        });
    }
    log::debug!("loaded {} precedents", rows.len());
    Ok(rows)
}

pub fn load_precedents(path: &Path, organization_id: &str) -> Result<Vec<NewPrecedent>> {
    let file = File::open(path)
        .map_err(|e| ValuationError::ImportError(format!("{}: {e}", path.display())))?;
    load_precedents_from_reader(file, organization_id)
}
