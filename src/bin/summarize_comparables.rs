//! Summarize a comparables CSV against subject-company figures
//!
//! Prints the per-multiple statistics and implied values; `--json` dumps the
//! full summary instead.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

use valuation_engine::kernel::to_decimal;
use valuation_engine::model::{load_comparables, ComparableCompany};
use valuation_engine::multiples::{summarize_comparables, ImpliedValues, MultipleStats};
use valuation_engine::{EngineConfig, SubjectMetrics};

#[derive(Parser, Debug)]
#[command(about = "Trading comparables summary from a CSV file")]
struct Args {
    /// company_name,ev_revenue_multiple,ev_ebitda_multiple,pe_ratio,weight,is_outlier
    input: PathBuf,

    #[arg(long)]
    subject_revenue: Option<f64>,

    #[arg(long)]
    subject_ebitda: Option<f64>,

    #[arg(long)]
    subject_net_income: Option<f64>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn edge(value: Option<f64>) -> Result<Option<rust_decimal::Decimal>> {
    Ok(value.map(to_decimal).transpose()?)
}

fn fmt(value: Option<rust_decimal::Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v.round_dp(4)))
}

fn print_row(label: &str, stats: &MultipleStats, implied: &ImpliedValues) {
    println!(
        "{:<10} {:>5} {:>12} {:>12} {:>12} {:>12}   implied median {:>18}",
        label,
        stats.count,
        fmt(stats.min),
        fmt(stats.median),
        fmt(stats.max),
        fmt(stats.weighted_average),
        fmt(implied.median),
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    let rows = load_comparables(&args.input, "local")
        .with_context(|| format!("loading {}", args.input.display()))?;
    let comparables: Vec<ComparableCompany> = rows
        .into_iter()
        .map(|row| ComparableCompany::from_new(Uuid::nil(), row))
        .collect();

    let subject = SubjectMetrics {
        subject_revenue: edge(args.subject_revenue)?,
        subject_ebitda: edge(args.subject_ebitda)?,
        subject_net_income: edge(args.subject_net_income)?,
    };
    let summary = summarize_comparables(&comparables, &subject, &config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let inert = comparables.iter().filter(|c| c.is_inert()).count();
    println!(
        "Loaded {} comparables ({} outliers excluded, {} without multiples)",
        comparables.len(),
        summary.excluded_outliers,
        inert
    );
    println!(
        "{:<10} {:>5} {:>12} {:>12} {:>12} {:>12}",
        "Multiple", "N", "Min", "Median", "Max", "WAvg"
    );
    print_row("EV/Rev", &summary.ev_revenue, &summary.implied_ev_from_revenue);
    print_row("EV/EBITDA", &summary.ev_ebitda, &summary.implied_ev_from_ebitda);
    print_row("P/E", &summary.pe_ratio, &summary.implied_equity_from_pe);
    Ok(())
}
