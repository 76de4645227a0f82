//! rulecast - Simulate rule activation across inheritable quality profiles

use eyre::{Result, WrapErr};
use facet_args as args;
use owo_colors::OwoColorize;
use rulecast::config::{Config, DEFAULT_CONFIG_PATH};
use rulecast::output::{OutputFormat, render_report};
use rulecast::{logging, simulate};
use std::path::PathBuf;

/// CLI arguments
#[derive(Debug, facet::Facet)]
struct Args {
    /// Path to config file (default: rulecast.yaml)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<PathBuf>,

    /// Output format: text, json
    #[facet(args::named, args::short = 'f', default)]
    format: Option<String>,

    /// Show every change and the final rules of each profile
    #[facet(args::named, args::short = 'v', default)]
    verbose: bool,

    /// Exit with status 1 if any operation is rejected
    #[facet(args::named, default)]
    check: bool,
}

fn main() -> Result<()> {
    let args: Args =
        facet_args::from_std_args().wrap_err("Failed to parse command line arguments")?;

    logging::init(args.verbose);

    let format = match args.format.as_deref() {
        Some(f) => OutputFormat::from_str(f)
            .ok_or_else(|| eyre::eyre!("Unknown output format '{f}', expected text or json"))?,
        None => OutputFormat::default(),
    };

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)?;

    eprintln!(
        "{} Simulating {} operations from {}...",
        "->".blue().bold(),
        config.operations.len(),
        config_path.display()
    );

    let report = simulate::run(&config)?;
    print!("{}", render_report(&report, format, args.verbose));

    if args.check && report.rejected() > 0 {
        std::process::exit(1);
    }

    Ok(())
}
