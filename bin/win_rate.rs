use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use codeclash::ratings::WinRates;
use tracing_subscriber::EnvFilter;

/// Per game win rates from tournament logs.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "win-rate")]
struct Cli {
    /// Directory scanned for tournament records
    #[arg(short = 'd', long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let (rates, skipped) = WinRates::from_dir(&cli.log_dir)
        .with_context(|| format!("scanning {}", cli.log_dir.display()))?;
    if skipped > 0 {
        println!("Skipped {skipped} unreadable records");
    }
    print!("{}", rates.format_report());
    Ok(())
}
