//! The execution boundary between the tournament engine and whatever
//! sandbox actually runs code.
//!
//! Everything the arenas and the round driver need from a sandbox is a single
//! operation: run a shell command, optionally in a working directory and
//! under a timeout, and get back the exit code and the captured output.
//! [`Environment`] is that operation. [`LocalEnvironment`] implements it with
//! plain child processes; containers or remote sandboxes implement the same
//! trait elsewhere.
mod errors;
mod guard;
mod local;

use std::{path::Path, time::Duration};

pub use errors::EnvironmentError;
pub use guard::BackgroundGuard;
pub use local::LocalEnvironment;

/// What came back from running one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    /// Exit code of the command. Processes killed by a signal report `-1`.
    pub returncode: i32,
    /// Captured stdout followed by captured stderr.
    pub output: String,
}

impl ExecOutput {
    pub fn new(returncode: i32, output: impl Into<String>) -> Self {
        ExecOutput {
            returncode,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.returncode == 0
    }
}

/// An isolated place to run commands.
///
/// Implementations must be shareable across threads: multi-simulation arenas
/// run several trials against the same environment from a worker pool.
pub trait Environment: Send + Sync {
    /// Execute `command` through a shell.
    ///
    /// # Arguments
    /// - `command` - The shell command line to run.
    /// - `cwd` - Working directory, relative paths resolve against the
    ///   environment's root. `None` runs in the root.
    /// - `timeout` - Upper bound on wall clock time. On expiry the command is
    ///   killed and [`EnvironmentError::Timeout`] is returned.
    ///
    /// # Returns
    /// - `Ok(ExecOutput)` whenever the command ran, whatever its exit code.
    /// - `Err(EnvironmentError)` only when the command could not be run or
    ///   did not finish in time.
    fn execute(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, EnvironmentError>;
}

/// Turn a non-zero exit code into an [`EnvironmentError::NonZeroExit`].
pub fn assert_zero_exit_code(
    output: ExecOutput,
    command: &str,
) -> Result<ExecOutput, EnvironmentError> {
    if output.success() {
        Ok(output)
    } else {
        tracing::event!(
            tracing::Level::ERROR,
            returncode = output.returncode,
            "Command failed: {command}\n{}",
            output.output
        );
        Err(EnvironmentError::NonZeroExit {
            command: command.to_string(),
            returncode: output.returncode,
            output: output.output,
        })
    }
}

/// Write `content` to `dest_path` inside the environment.
///
/// Only [`Environment::execute`] is available, so the content travels as a
/// quoted heredoc. The delimiter is chosen so that it never appears in the
/// content. Content without a trailing newline gets one.
pub fn write_file(
    environment: &dyn Environment,
    dest_path: &Path,
    content: &str,
) -> Result<(), EnvironmentError> {
    let mut delimiter = String::from("CODECLASH_EOF");
    let mut counter = 0usize;
    while content.contains(&delimiter) {
        counter += 1;
        delimiter = format!("CODECLASH_EOF_{counter}");
    }

    let dest = shell_quote(&dest_path.to_string_lossy());
    let mut command = String::new();
    if let Some(parent) = dest_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        command.push_str(&format!(
            "mkdir -p {} && ",
            shell_quote(&parent.to_string_lossy())
        ));
    }
    command.push_str(&format!("cat > {dest} <<'{delimiter}'\n{content}"));
    if !content.ends_with('\n') {
        command.push('\n');
    }
    command.push_str(&delimiter);
    command.push('\n');

    let output = environment.execute(&command, None, None)?;
    assert_zero_exit_code(output, &format!("write {}", dest_path.display()))?;
    Ok(())
}

/// Quote a single shell word with single quotes.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}
