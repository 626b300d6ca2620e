//! Participants of a tournament.
//!
//! A [`Player`] couples a name and a codebase with an [`Agent`], the logic
//! that improves the codebase between rounds. The tournament only ever sees
//! players; what an agent does during its turn is opaque to it.
mod config;
mod context;
mod errors;
mod player;

use std::time::Duration;

use tracing::{event, Level};

use crate::environment::Environment;

pub use config::{AgentSettings, ModelConfig, PlayerConfig};
pub use context::GameContext;
pub use errors::AgentError;
pub use player::Player;

/// The part of a participant that acts between rounds.
pub trait Agent: Send {
    /// Take a turn: read the round logs in `environment` and update the
    /// codebase.
    fn act(&mut self, context: &GameContext, environment: &dyn Environment)
    -> Result<(), AgentError>;

    /// Extra information for the persisted tournament record.
    fn get_metadata(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// An agent that never changes its codebase.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyAgent;

impl Agent for DummyAgent {
    fn act(
        &mut self,
        _context: &GameContext,
        _environment: &dyn Environment,
    ) -> Result<(), AgentError> {
        Ok(())
    }
}

/// An agent that runs a shell command in the player's workspace.
///
/// Placeholders like `{{round}}` in the command are filled in from the game
/// context. A failing command costs the player their turn; it is logged and
/// the tournament carries on.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: String,
    timeout: Option<Duration>,
    turns: usize,
}

impl CommandAgent {
    pub fn new(command: impl Into<String>, timeout: Option<Duration>) -> Self {
        CommandAgent {
            command: command.into(),
            timeout,
            turns: 0,
        }
    }
}

impl Agent for CommandAgent {
    fn act(
        &mut self,
        context: &GameContext,
        environment: &dyn Environment,
    ) -> Result<(), AgentError> {
        let command = context.render(&self.command);
        self.turns += 1;
        match environment.execute(&command, None, self.timeout) {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => {
                event!(
                    Level::WARN,
                    player = %context.player_id,
                    returncode = out.returncode,
                    "Agent command failed:\n{}",
                    out.output
                );
                Ok(())
            }
            Err(e) if e.is_timeout() => {
                event!(
                    Level::WARN,
                    player = %context.player_id,
                    "Agent command timed out"
                );
                Ok(())
            }
            Err(source) => Err(AgentError::Environment {
                player: context.player_id.clone(),
                source,
            }),
        }
    }

    fn get_metadata(&self) -> serde_json::Value {
        serde_json::json!({ "command": self.command, "turns": self.turns })
    }
}

/// Build the agent named in a player configuration.
pub fn create_agent(config: &PlayerConfig) -> Result<Box<dyn Agent>, AgentError> {
    match config.agent.as_str() {
        "dummy" => Ok(Box::new(DummyAgent)),
        "command" => {
            let command =
                config
                    .config
                    .command
                    .clone()
                    .ok_or_else(|| AgentError::MissingSetting {
                        agent: config.name.clone(),
                        setting: "command".to_string(),
                    })?;
            let timeout = config.config.timeout_secs.map(Duration::from_secs);
            Ok(Box::new(CommandAgent::new(command, timeout)))
        }
        other => Err(AgentError::UnknownAgent(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::test_util::{FailingEnvironment, Scripted, ScriptedEnvironment};

    fn context() -> GameContext {
        GameContext::new("t", "Dummy", "alice", 5, BTreeMap::new(), "/alice")
    }

    #[test]
    fn test_command_agent_renders_placeholders() {
        let env = ScriptedEnvironment::new();
        let mut agent = CommandAgent::new("./improve.sh --round {{round}}", None);
        let mut ctx = context();
        ctx.set_round(3);
        agent.act(&ctx, &env).unwrap();
        assert_eq!(env.commands(), vec!["./improve.sh --round 3".to_string()]);
    }

    #[test_log::test]
    fn test_command_agent_failure_is_not_fatal() {
        let env = ScriptedEnvironment::new().on("improve", Scripted::exit(2, "boom"));
        let mut agent = CommandAgent::new("./improve.sh", None);
        assert!(agent.act(&context(), &env).is_ok());

        let env = ScriptedEnvironment::new().on("improve", Scripted::Timeout);
        assert!(agent.act(&context(), &env).is_ok());
    }

    #[test]
    fn test_command_agent_unreachable_is_fatal() {
        let mut agent = CommandAgent::new("./improve.sh", None);
        let err = agent.act(&context(), &FailingEnvironment).unwrap_err();
        assert!(matches!(err, AgentError::Environment { .. }));
    }

    #[test]
    fn test_create_agent() {
        assert!(create_agent(&PlayerConfig::new("a")).is_ok());

        let mut config = PlayerConfig::new("b");
        config.agent = "command".to_string();
        assert!(matches!(
            create_agent(&config),
            Err(AgentError::MissingSetting { .. })
        ));

        config.agent = "llm".to_string();
        assert!(matches!(
            create_agent(&config),
            Err(AgentError::UnknownAgent(_))
        ));
    }
}
