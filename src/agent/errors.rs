use thiserror::Error;

use crate::environment::EnvironmentError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown agent type: {0}")]
    UnknownAgent(String),
    #[error("Agent {agent} is missing required setting `{setting}`")]
    MissingSetting { agent: String, setting: String },
    #[error("Command failed in {player}'s workspace")]
    Environment {
        player: String,
        #[source]
        source: EnvironmentError,
    },
}
