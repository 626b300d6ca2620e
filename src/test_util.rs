//! Helpers for testing arenas and tournaments without a real sandbox.
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use crate::environment::{Environment, EnvironmentError, ExecOutput};

/// A canned reply of a [`ScriptedEnvironment`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Output(ExecOutput),
    Timeout,
    Unreachable(String),
}

impl Scripted {
    pub fn ok(output: impl Into<String>) -> Self {
        Scripted::Output(ExecOutput::new(0, output))
    }

    pub fn exit(returncode: i32, output: impl Into<String>) -> Self {
        Scripted::Output(ExecOutput::new(returncode, output))
    }
}

struct Rule {
    pattern: String,
    remaining: Option<usize>,
    reply: Scripted,
}

/// An in memory [`Environment`] that answers commands from a script.
///
/// Rules are matched in the order they were added; the first rule whose
/// pattern is a substring of the command answers. Rules added with
/// [`ScriptedEnvironment::on_times`] stop matching once used up. Commands
/// that match nothing succeed with empty output. Every command is recorded.
#[derive(Default)]
pub struct ScriptedEnvironment {
    rules: Mutex<Vec<Rule>>,
    commands: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `pattern` with `reply`.
    pub fn on(self, pattern: impl Into<String>, reply: Scripted) -> Self {
        lock(&self.rules).push(Rule {
            pattern: pattern.into(),
            remaining: None,
            reply,
        });
        self
    }

    /// Answer the next `times` commands containing `pattern` with `reply`.
    pub fn on_times(self, pattern: impl Into<String>, times: usize, reply: Scripted) -> Self {
        lock(&self.rules).push(Rule {
            pattern: pattern.into(),
            remaining: Some(times),
            reply,
        });
        self
    }

    /// Every command executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Commands containing `pattern`.
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }
}

impl Environment for ScriptedEnvironment {
    fn execute(
        &self,
        command: &str,
        _cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, EnvironmentError> {
        lock(&self.commands).push(command.to_string());

        let reply = {
            let mut rules = lock(&self.rules);
            rules
                .iter_mut()
                .find(|r| r.remaining != Some(0) && command.contains(&r.pattern))
                .map(|r| {
                    if let Some(n) = r.remaining.as_mut() {
                        *n -= 1;
                    }
                    r.reply.clone()
                })
        };

        match reply {
            None => Ok(ExecOutput::new(0, "")),
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::Timeout) => Err(EnvironmentError::Timeout {
                command: command.to_string(),
                timeout: timeout.unwrap_or_default(),
            }),
            Some(Scripted::Unreachable(msg)) => Err(EnvironmentError::Unreachable(msg)),
        }
    }
}

/// An environment whose backend is always gone.
pub struct FailingEnvironment;

impl Environment for FailingEnvironment {
    fn execute(
        &self,
        _command: &str,
        _cwd: Option<&Path>,
        _timeout: Option<Duration>,
    ) -> Result<ExecOutput, EnvironmentError> {
        Err(EnvironmentError::Unreachable(
            "failing environment".to_string(),
        ))
    }
}

/// Every pairwise score handed out by a resolver must split exactly one
/// point between the two participants.
pub fn assert_valid_pairwise_score(score: (f64, f64)) {
    approx::assert_relative_eq!(score.0 + score.1, 1.0, epsilon = 1e-12);
    assert!((0.0..=1.0).contains(&score.0));
    assert!((0.0..=1.0).contains(&score.1));
}
