use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::RunConfig;
use crate::significance::Baseline;

mod config;
mod data_handling;
mod error;
mod helper_functions;
mod labels;
mod maps;
mod models;
mod mutability_model;
mod output;
mod pipeline;
mod profiles;
mod pwm;
mod significance;

/// Mutability-adjusted proportion of singletons (MAPS) for splice-region and
/// branchpoint positions, with chi-squared tests against synonymous variants.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "JSON run configuration; built-in defaults when omitted"
    )]
    config: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        value_name = "PATH",
        help = "Output directory, overrides the configuration"
    )]
    outdir: Option<PathBuf>,

    #[arg(
        long = "baseline-singletons",
        value_name = "N",
        requires = "baseline_alleles",
        help = "Synonymous singleton count used as the test baseline"
    )]
    baseline_singletons: Option<u64>,

    #[arg(
        long = "baseline-alleles",
        value_name = "N",
        requires = "baseline_singletons",
        help = "Synonymous allele count used as the test baseline"
    )]
    baseline_alleles: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting the MAPS pipeline");

    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(outdir) = args.outdir {
        config.output_dir = outdir;
    }
    if let (Some(n_singletons), Some(n_alleles)) = (args.baseline_singletons, args.baseline_alleles) {
        config.baseline = Some(Baseline::new(n_singletons, n_alleles)?);
    }
    let config = config.resolved();

    let summary = match pipeline::run(&config) {
        Ok(summary) => summary,
        Err(e) => {
            error!("MAPS run failed: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Model ps = {:.4} + {:.4e} * mu over {} groups; baseline {}/{}",
        summary.model.intercept,
        summary.model.slope,
        summary.model.n_groups,
        summary.baseline.n_singletons,
        summary.baseline.n_alleles
    );
    info!(
        "{} MAPS rows, {} significance tests",
        summary.table.len(),
        summary.significance.len()
    );
    Ok(())
}
