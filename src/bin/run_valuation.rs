//! Value a single deal from a JSON input file
//!
//! Prints the DCF result, writes the WACC x growth sensitivity grid as CSV
//! and runs a seeded Monte Carlo over the forecast cash flows.

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use valuation_engine::kernel::SensitivityMatrix;
use valuation_engine::model::{Actor, NewValuation};
use valuation_engine::{EngineConfig, InMemoryStore, ScenarioCoordinator, ValuationService};

#[derive(Parser, Debug)]
#[command(about = "Run a DCF valuation, sensitivity grid and Monte Carlo")]
struct Args {
    /// Valuation input (JSON)
    input: PathBuf,

    /// Engine configuration (JSON); VALUATION_* env vars override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the sensitivity grid
    #[arg(long, default_value = "sensitivity_grid.csv")]
    output: PathBuf,

    #[arg(long, default_value_t = 1000)]
    iterations: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Valuation inputs plus optional grid axes
#[derive(Debug, Deserialize)]
struct RunInput {
    #[serde(flatten)]
    valuation: NewValuation,
    #[serde(default)]
    wacc_values: Vec<Decimal>,
    #[serde(default)]
    growth_values: Vec<Decimal>,
}

/// Five points centred on `base`
fn axis(base: Decimal, step: Decimal) -> Vec<Decimal> {
    (-2..=2).map(|k| base + step * Decimal::from(k)).collect()
}

fn write_grid(path: &Path, matrix: &SensitivityMatrix) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec!["wacc".to_string()];
    header.extend(matrix.growth_values.iter().map(|g| format!("g={g}")));
    writer.write_record(&header)?;

    for (wacc, row) in matrix.wacc_values.iter().zip(&matrix.cells) {
        let mut record = vec![wacc.to_string()];
        record.extend(
            row.iter()
                .map(|cell| cell.map(|v| v.round_dp(2).to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let config = EngineConfig::load(args.config.as_deref())?;
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let input: RunInput = serde_json::from_str(&raw).context("parsing valuation input")?;

    let store = Arc::new(InMemoryStore::new());
    let service = ValuationService::new(store.clone(), config.clone());
    let coordinator = ScenarioCoordinator::new(store, config);

    let valuation = service.create(&Actor::new("local", "cli"), input.valuation)?;
    let inputs = &valuation.inputs;
    let metrics = &valuation.metrics;

    println!("Valuation {} (deal {})", valuation.id, valuation.deal_id);
    println!("  Method:            {:?}", inputs.terminal_method);
    println!("  Discount rate:     {}", inputs.discount_rate);
    println!("  Enterprise value:  {:.2}", metrics.enterprise_value);
    println!("  Equity value:      {:.2}", metrics.equity_value);
    match metrics.implied_share_price {
        Some(price) => println!("  Share price:       {price:.4}"),
        None => println!("  Share price:       n/a"),
    }

    let wacc_values = if input.wacc_values.is_empty() {
        axis(inputs.discount_rate, dec!(0.01))
    } else {
        input.wacc_values
    };
    let growth_values = if input.growth_values.is_empty() {
        axis(inputs.terminal_growth_rate.unwrap_or(Decimal::ZERO), dec!(0.005))
    } else {
        input.growth_values
    };
    let matrix = coordinator.sensitivity_for_valuation(valuation.id, "local", &wacc_values, &growth_values)?;
    write_grid(&args.output, &matrix)?;
    println!("Sensitivity grid written to {}", args.output.display());

    let mc = coordinator.monte_carlo_for_valuation(valuation.id, "local", args.iterations, args.seed)?;
    println!("\nMonte Carlo ({} trials, seed {}):", mc.iterations, mc.seed);
    println!("  Mean: {:.2}", mc.mean);
    println!("  P10:  {:.2}", mc.p10);
    println!("  P50:  {:.2}", mc.p50);
    println!("  P90:  {:.2}", mc.p90);
    println!("  Range: {:.2} .. {:.2}", mc.min, mc.max);

    println!("\nTotal time: {:?}", start.elapsed());
    Ok(())
}
