use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_agent() -> String {
    "dummy".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub model_name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Agent specific settings of a player.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    /// Command line run by the `command` agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One entry of the `players` list of a tournament configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub name: String,
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default)]
    pub config: AgentSettings,
    /// Commit the player's codebase after every turn.
    #[serde(default = "default_true")]
    pub snapshot: bool,
}

impl PlayerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        PlayerConfig {
            name: name.into(),
            agent: default_agent(),
            config: AgentSettings::default(),
            snapshot: true,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.config
            .model
            .as_ref()
            .map(|m| m.model_name.as_str())
            .filter(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_config_from_json() {
        let json = r#"{
            "name": "p1",
            "agent": "command",
            "config": {
                "model": {"model_name": "@anthropic/claude-sonnet", "temperature": 0.2},
                "command": "./improve.sh",
                "cost_limit": 3
            }
        }"#;
        let config: PlayerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent, "command");
        assert_eq!(config.model_name(), Some("@anthropic/claude-sonnet"));
        assert_eq!(config.config.command.as_deref(), Some("./improve.sh"));
        assert!(config.snapshot);
        assert_eq!(config.config.extra["cost_limit"], serde_json::json!(3));

        // Unknown settings survive a round trip into the persisted config.
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["config"]["model"]["temperature"], serde_json::json!(0.2));
    }

    #[test]
    fn test_minimal_player_config() {
        let config: PlayerConfig = serde_json::from_str(r#"{"name": "p2"}"#).unwrap();
        assert_eq!(config, PlayerConfig::new("p2"));
        assert_eq!(config.model_name(), None);
    }
}
