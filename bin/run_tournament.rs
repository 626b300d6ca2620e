use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use codeclash::tournament::{PvpTournamentBuilder, TournamentConfig};
use tracing_subscriber::EnvFilter;

/// Run a tournament from a configuration file.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "run-tournament")]
struct Cli {
    /// Path of the tournament configuration (JSON)
    config: PathBuf,

    /// Directory the tournament logs are written under
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let config = TournamentConfig::from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let mut builder = PvpTournamentBuilder::default().config(config);
    if let Some(output_dir) = cli.output_dir {
        builder = builder.output_dir(output_dir);
    }
    let mut tournament = builder.build().context("setting up the tournament")?;
    let output_dir = tournament.output_dir().to_path_buf();

    let metadata = tournament.run().context("running the tournament")?;
    println!("Tournament {} finished", metadata.tournament_id);
    for entry in &metadata.scoreboard {
        println!("  Round {}: {}", entry.round, entry.winner);
    }
    println!("Logs written to {}", output_dir.display());
    Ok(())
}
