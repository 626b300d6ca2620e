use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use codeclash::ratings::{
    print_results, write_elo_table, write_validation_profiles, AllNormalization,
    BradleyTerryFitter, RoundScoreType, WinMatrixBuilder,
};
use tracing_subscriber::EnvFilter;

/// Fit Bradley-Terry strengths per game from tournament logs.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "fit-ratings")]
struct Cli {
    /// Directory scanned for tournament records
    #[arg(short = 'd', long, default_value = "logs")]
    log_dir: PathBuf,

    /// How a round turns into a pairwise score
    #[arg(long, value_enum, default_value_t = RoundScoreType::Tertiary)]
    round_score_type: RoundScoreType,

    /// Normalization of the ALL pool
    #[arg(long = "ars", value_enum, default_value_t = AllNormalization::None)]
    all_normalization: AllNormalization,

    /// L2 regularization strength
    #[arg(short = 'l', long, default_value_t = 0.01)]
    lambda: f64,

    /// Print the win matrix before fitting
    #[arg(long)]
    print_matrix: bool,

    /// Write likelihood profiles around the optimum
    #[arg(long)]
    validation_plots: bool,

    #[arg(long, default_value = "elo2_validation_plots")]
    validation_dir: PathBuf,

    /// Write the per game Elo table
    #[arg(long)]
    elo_plot: bool,

    #[arg(long, default_value = "elo2_plots")]
    elo_plot_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let report = WinMatrixBuilder::default()
        .round_score_type(cli.round_score_type)
        .all_normalization(cli.all_normalization)
        .build(&cli.log_dir)
        .with_context(|| format!("scanning {}", cli.log_dir.display()))?;
    println!(
        "Scanned {} records, skipped {}",
        report.scanned, report.skipped
    );
    if cli.print_matrix {
        report.matrix.print_matrix();
    }

    let fitter = BradleyTerryFitter::default().regularization(cli.lambda);
    let results = fitter.fit_all(&report.matrix);
    print_results(&results, fitter.get_regularization(), cli.all_normalization);

    if cli.validation_plots {
        let written = write_validation_profiles(&fitter, &results, &report.matrix, &cli.validation_dir)
            .context("writing likelihood profiles")?;
        println!("Wrote {} likelihood profiles to {}", written.len(), cli.validation_dir.display());
    }
    if cli.elo_plot {
        if let Some(path) = write_elo_table(&results, &cli.elo_plot_dir).context("writing Elo table")? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
