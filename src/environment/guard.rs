use std::{path::Path, time::Duration};

use tracing::{event, Level};

use super::{Environment, EnvironmentError, ExecOutput};

/// Upper bound for a single cleanup command.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns background processes started inside an [`Environment`] and tears
/// them down when dropped.
///
/// Arenas that need long running helpers (game servers, one client per
/// agent) start them through the guard and register the matching cleanup
/// command. Whatever happens to the round afterwards, including an early
/// return through `?`, the cleanup commands run in reverse order when the
/// guard goes out of scope.
pub struct BackgroundGuard<'a> {
    environment: &'a dyn Environment,
    cleanup: Vec<String>,
}

impl<'a> BackgroundGuard<'a> {
    pub fn new(environment: &'a dyn Environment) -> Self {
        BackgroundGuard {
            environment,
            cleanup: vec![],
        }
    }

    /// Start `command` in the background and remember `cleanup` for drop.
    pub fn spawn(
        &mut self,
        command: &str,
        cwd: Option<&Path>,
        cleanup: impl Into<String>,
    ) -> Result<ExecOutput, EnvironmentError> {
        // Register first so a half started process still gets cleaned up.
        self.defer(cleanup);
        self.environment
            .execute(&format!("{command} &"), cwd, Some(CLEANUP_TIMEOUT))
    }

    /// Register a cleanup command without starting anything. A command
    /// that is already registered is not added again.
    pub fn defer(&mut self, cleanup: impl Into<String>) {
        let cleanup = cleanup.into();
        if !self.cleanup.contains(&cleanup) {
            self.cleanup.push(cleanup);
        }
    }

    pub fn environment(&self) -> &'a dyn Environment {
        self.environment
    }
}

impl Drop for BackgroundGuard<'_> {
    fn drop(&mut self) {
        while let Some(command) = self.cleanup.pop() {
            match self
                .environment
                .execute(&command, None, Some(CLEANUP_TIMEOUT))
            {
                Ok(_) => event!(Level::DEBUG, "Cleanup ran: {command}"),
                Err(e) => event!(Level::WARN, "Cleanup failed: {command}: {e}"),
            }
        }
    }
}
