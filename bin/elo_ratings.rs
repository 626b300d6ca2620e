use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use codeclash::ratings::EloTracker;
use tracing_subscriber::EnvFilter;

/// Sequential Elo ratings per game from tournament logs.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "elo-ratings")]
struct Cli {
    /// Directory scanned for tournament records
    #[arg(short = 'd', long, default_value = "logs")]
    log_dir: PathBuf,

    /// K-factor of every update
    #[arg(short = 'k', long, default_value_t = 32.0)]
    k_factor: f64,

    /// Rating every model starts at
    #[arg(short = 's', long, default_value_t = 1200.0)]
    starting_elo: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let mut tracker = EloTracker::default()
        .k_factor(cli.k_factor)
        .starting_elo(cli.starting_elo);
    let skipped = tracker
        .process_dir(&cli.log_dir)
        .with_context(|| format!("scanning {}", cli.log_dir.display()))?;
    if skipped > 0 {
        println!("Skipped {skipped} unreadable records");
    }
    print!("{}", tracker.format_report());
    Ok(())
}
