use std::path::PathBuf;

use thiserror::Error;

/// A round that cannot be turned into a pairwise score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Expected winner to be one of {first}, {second} or a tie, got {winner}")]
    InvalidWinner {
        winner: String,
        first: String,
        second: String,
    },
    #[error("No score recorded for {0}")]
    MissingScore(String),
}

/// A persisted tournament record that cannot be used. Records like this
/// are skipped by batch jobs.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Unable to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unable to score round {round} of {path}: {source}")]
    Score {
        path: PathBuf,
        round: String,
        #[source]
        source: ScoreError,
    },
}

#[derive(Error, Debug)]
pub enum RatingsError {
    #[error("Unable to read log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error while writing report: {0}")]
    IOError(#[from] std::io::Error),
}
