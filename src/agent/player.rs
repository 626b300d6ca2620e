use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{event, Level};

use super::{Agent, AgentError, GameContext};
use crate::environment::{assert_zero_exit_code, Environment};

/// A participant of a tournament.
pub struct Player {
    name: String,
    model_name: Option<String>,
    codebase: PathBuf,
    environment: Arc<dyn Environment>,
    context: GameContext,
    agent: Box<dyn Agent>,
    snapshot: bool,
}

impl Player {
    /// Creates a new player.
    ///
    /// # Arguments
    /// - `name` - Unique within the tournament.
    /// - `codebase` - Where the player's code lives, as seen by the game's
    ///   environment.
    /// - `environment` - The player's own workspace. Commands run here start
    ///   in the codebase.
    pub fn new(
        name: impl Into<String>,
        codebase: impl Into<PathBuf>,
        environment: Arc<dyn Environment>,
        context: GameContext,
        agent: Box<dyn Agent>,
    ) -> Self {
        Player {
            name: name.into(),
            model_name: None,
            codebase: codebase.into(),
            environment,
            context,
            agent,
            snapshot: true,
        }
    }

    pub fn with_model_name(mut self, model_name: Option<String>) -> Self {
        self.model_name = model_name;
        self
    }

    /// Disable the per round commit of the codebase.
    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn codebase(&self) -> &Path {
        &self.codebase
    }

    /// Path of `file` inside the codebase, as seen by the game.
    pub fn codebase_file(&self, file: &str) -> String {
        self.codebase.join(file).display().to_string()
    }

    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    pub fn context(&self) -> &GameContext {
        &self.context
    }

    /// Move to `round` and refresh the templated context.
    pub fn pre_run_hook(&mut self, round: usize) {
        self.context.set_round(round);
    }

    /// Let the agent take its turn.
    pub fn run(&mut self) -> Result<(), AgentError> {
        event!(
            Level::INFO,
            player = %self.name,
            round = self.context.round,
            "Agent turn"
        );
        self.agent.act(&self.context, self.environment.as_ref())
    }

    /// Make the codebase a git repository if it is not one already.
    pub fn init_snapshots(&self) -> Result<(), AgentError> {
        if !self.snapshot {
            return Ok(());
        }
        let command = "git rev-parse --is-inside-work-tree > /dev/null 2>&1 || \
            (git init -q && git config user.name codeclash && git config user.email codeclash@localhost)";
        self.environment
            .execute(command, None, None)
            .and_then(|out| assert_zero_exit_code(out, command))
            .map_err(|source| AgentError::Environment {
                player: self.name.clone(),
                source,
            })?;
        Ok(())
    }

    /// Snapshot the codebase so every round can be recovered and diffed.
    pub fn post_run_hook(&mut self, round: usize) -> Result<(), AgentError> {
        if !self.snapshot {
            return Ok(());
        }
        let rounds = self.context.rounds;
        for command in [
            "git add -A".to_string(),
            format!("git commit --allow-empty -m 'Round {round}/{rounds} Update'"),
        ] {
            let out = self
                .environment
                .execute(&command, None, None)
                .and_then(|out| assert_zero_exit_code(out, &command))
                .map_err(|source| AgentError::Environment {
                    player: self.name.clone(),
                    source,
                })?;
            event!(Level::TRACE, player = %self.name, "{}", out.output);
        }
        event!(
            Level::INFO,
            player = %self.name,
            "Committed changes for round {round}/{rounds}"
        );
        Ok(())
    }

    pub fn get_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "model_name": self.model_name,
            "codebase": self.codebase,
            "agent": self.agent.get_metadata(),
        })
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("name", &self.name)
            .field("model_name", &self.model_name)
            .field("codebase", &self.codebase)
            .field("round", &self.context.round)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        agent::DummyAgent,
        test_util::{Scripted, ScriptedEnvironment},
    };

    fn player(env: Arc<ScriptedEnvironment>) -> Player {
        let context = GameContext::new("t", "Dummy", "alice", 3, BTreeMap::new(), "/alice");
        Player::new("alice", "/alice", env, context, Box::new(DummyAgent))
    }

    #[test]
    fn test_hooks_commit_each_round() {
        let env = Arc::new(ScriptedEnvironment::new());
        let mut p = player(env.clone());

        p.pre_run_hook(2);
        assert_eq!(p.context().round, 2);
        p.run().unwrap();
        p.post_run_hook(2).unwrap();

        assert_eq!(
            env.commands(),
            vec![
                "git add -A".to_string(),
                "git commit --allow-empty -m 'Round 2/3 Update'".to_string(),
            ]
        );
    }

    #[test]
    fn test_snapshot_can_be_disabled() {
        let env = Arc::new(ScriptedEnvironment::new());
        let mut p = player(env.clone()).with_snapshot(false);
        p.post_run_hook(1).unwrap();
        assert!(env.commands().is_empty());
    }

    #[test]
    fn test_failed_commit_is_an_error() {
        let env = Arc::new(ScriptedEnvironment::new().on("git commit", Scripted::exit(128, "fatal")));
        let mut p = player(env);
        assert!(p.post_run_hook(1).is_err());
    }

    #[test]
    fn test_init_snapshots() {
        let env = Arc::new(ScriptedEnvironment::new());
        player(env.clone()).init_snapshots().unwrap();
        assert_eq!(env.commands_matching("git init").len(), 1);

        let env = Arc::new(ScriptedEnvironment::new());
        player(env.clone()).with_snapshot(false).init_snapshots().unwrap();
        assert!(env.commands().is_empty());
    }

    #[test]
    fn test_codebase_file() {
        let p = player(Arc::new(ScriptedEnvironment::new()));
        assert_eq!(p.codebase_file("main.py"), "/alice/main.py");
    }
}
