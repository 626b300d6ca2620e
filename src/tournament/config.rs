use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::TournamentError;
use crate::{agent::PlayerConfig, arena::GameConfig};

fn default_rounds() -> usize {
    1
}

/// How long a tournament runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentSettings {
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    /// Play an extra round 0 on the starting code, before any agent turn.
    #[serde(default)]
    pub warmup_round: bool,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        TournamentSettings {
            rounds: default_rounds(),
            warmup_round: false,
        }
    }
}

/// The configuration document of one tournament.
///
/// It is snapshotted as is into the persisted record, so everything needed
/// to interpret the results later lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub game: GameConfig,
    pub players: Vec<PlayerConfig>,
    #[serde(default)]
    pub tournament: TournamentSettings,
    /// Prompt templates handed to every agent.
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
    /// Where the game and the player codebases live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
    /// Where tournament records are written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl TournamentConfig {
    pub fn new(game: GameConfig, players: Vec<PlayerConfig>) -> Self {
        TournamentConfig {
            game,
            players,
            tournament: TournamentSettings::default(),
            prompts: BTreeMap::new(),
            workspace_root: None,
            output_dir: None,
        }
    }

    pub fn rounds(mut self, rounds: usize) -> Self {
        self.tournament.rounds = rounds;
        self
    }

    pub fn warmup_round(mut self, warmup_round: bool) -> Self {
        self.tournament.warmup_round = warmup_round;
        self
    }

    pub fn prompt(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.prompts.insert(key.into(), template.into());
        self
    }

    /// Load a configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, TournamentError> {
        let text = fs::read_to_string(path).map_err(|source| TournamentError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TournamentConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check what serde cannot: at least two uniquely named players and at
    /// least one round.
    pub fn validate(&self) -> Result<(), TournamentError> {
        if self.players.len() < 2 {
            return Err(TournamentError::InvalidConfig(format!(
                "a tournament needs at least two players, got {}",
                self.players.len()
            )));
        }
        let mut names: Vec<&str> = self.players.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(TournamentError::InvalidConfig(format!(
                "player name {} is used more than once",
                pair[0]
            )));
        }
        if self.tournament.rounds == 0 {
            return Err(TournamentError::InvalidConfig(
                "rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let json = r#"{
            "game": {"name": "Dummy", "sims_per_round": 5},
            "players": [
                {"name": "p1", "config": {"model": {"model_name": "openai/gpt-5"}}},
                {"name": "p2"}
            ],
            "tournament": {"rounds": 3},
            "prompts": {"game_description": "Round {{round}} of {{rounds}}"}
        }"#;
        let config: TournamentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.game.name, "Dummy");
        assert_eq!(config.game.sims_per_round, 5);
        assert_eq!(config.tournament.rounds, 3);
        assert!(!config.tournament.warmup_round);
        assert_eq!(config.players[0].model_name(), Some("openai/gpt-5"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let game = GameConfig::new("Dummy");
        let config = TournamentConfig::new(game.clone(), vec![PlayerConfig::new("a")]);
        assert!(matches!(config.validate(), Err(TournamentError::InvalidConfig(_))));

        let config = TournamentConfig::new(
            game.clone(),
            vec![PlayerConfig::new("a"), PlayerConfig::new("a")],
        );
        assert!(config.validate().is_err());

        let config = TournamentConfig::new(game, vec![PlayerConfig::new("a"), PlayerConfig::new("b")])
            .rounds(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = TournamentConfig::new(
            GameConfig::new("CoreWar"),
            vec![PlayerConfig::new("a"), PlayerConfig::new("b")],
        )
        .rounds(2);
        fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(TournamentConfig::from_path(&path).unwrap(), config);

        assert!(matches!(
            TournamentConfig::from_path(&dir.path().join("missing.json")),
            Err(TournamentError::ConfigRead { .. })
        ));
    }
}
