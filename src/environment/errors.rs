use std::time::Duration;

use thiserror::Error;

/// Failures of the execution backend itself.
///
/// A command that runs and exits non-zero is not an error of
/// [`super::Environment::execute`]; callers that need success go through
/// [`super::assert_zero_exit_code`] which produces `NonZeroExit`.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },
    #[error("Command failed with exit code {returncode}: {command}\n{output}")]
    NonZeroExit {
        command: String,
        returncode: i32,
        output: String,
    },
    #[error("Execution backend unreachable: {0}")]
    Unreachable(String),
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl EnvironmentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EnvironmentError::Timeout { .. })
    }
}
