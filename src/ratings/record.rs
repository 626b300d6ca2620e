use std::{
    fs,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use serde::Deserialize;
use tracing::{event, Level};

use super::{RatingsError, RecordError};
use crate::{agent::PlayerConfig, tournament::RoundStatsMap};

/// File name of a persisted tournament record.
pub const RECORD_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Deserialize)]
pub struct RecordGame {
    pub name: String,
    #[serde(default)]
    pub sims_per_round: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    pub game: RecordGame,
    pub players: Vec<PlayerConfig>,
}

/// The parts of a persisted tournament record the rating jobs read.
///
/// Anything else in the document is ignored, so records written by older
/// versions load as long as these fields are there.
#[derive(Debug, Clone, Deserialize)]
pub struct TournamentRecord {
    #[serde(default)]
    pub tournament_id: Option<String>,
    pub config: RecordConfig,
    #[serde(default)]
    pub round_stats: RoundStatsMap,
    #[serde(default)]
    pub game: serde_json::Value,
}

impl TournamentRecord {
    pub fn from_path(path: &Path) -> Result<Self, RecordError> {
        let text = fs::read_to_string(path).map_err(|source| RecordError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RecordError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn game_name(&self) -> &str {
        &self.config.game.name
    }

    pub fn player_names(&self) -> Vec<&str> {
        self.config.players.iter().map(|p| p.name.as_str()).collect()
    }

    /// Simulations played per round, from the configuration or the game
    /// metadata. Defaults to one.
    pub fn sims_per_round(&self) -> usize {
        self.config
            .game
            .sims_per_round
            .or_else(|| {
                self.game["config"]["sims_per_round"]
                    .as_u64()
                    .map(|s| s as usize)
            })
            .filter(|s| *s > 0)
            .unwrap_or(1)
    }
}

/// The name a player is rated under: the model name without provider
/// prefix or `@` markers, or the player name when there is no model.
pub fn participant_key(player: &PlayerConfig) -> String {
    match player.model_name() {
        Some(model) => {
            let model = model.trim_matches('@');
            model.rsplit('/').next().unwrap_or(model).to_string()
        }
        None => player.name.clone(),
    }
}

/// Every record under `log_dir`, in path order.
pub fn find_records(log_dir: &Path) -> Result<Vec<PathBuf>, RatingsError> {
    let mut found = Vec::new();
    let mut pending = vec![log_dir.to_path_buf()];
    let mut root = true;
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if root => {
                return Err(RatingsError::LogDir { path: dir, source });
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    path = %dir.display(),
                    "Skipping unreadable directory: {err}"
                );
                continue;
            }
        };
        root = false;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            // Linked directories are not followed.
            if file_type.is_symlink() && path.is_dir() {
                event!(Level::DEBUG, path = %path.display(), "Not following linked directory");
            } else if file_type.is_dir() {
                pending.push(path);
            } else if path.file_name().is_some_and(|name| name == RECORD_FILE) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Every readable record under `log_dir`, in path order, and the number of
/// records that had to be skipped.
pub fn load_records(log_dir: &Path) -> Result<(Vec<TournamentRecord>, usize), RatingsError> {
    let loaded: Vec<Result<TournamentRecord, RecordError>> = find_records(log_dir)?
        .par_iter()
        .map(|path| TournamentRecord::from_path(path))
        .collect();
    let mut records = Vec::with_capacity(loaded.len());
    let mut skipped = 0;
    for record in loaded {
        match record {
            Ok(record) => records.push(record),
            Err(err) => {
                event!(Level::ERROR, "Skipping record: {err}");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ModelConfig;

    fn player(name: &str, model: Option<&str>) -> PlayerConfig {
        let mut config = PlayerConfig::new(name);
        config.config.model = model.map(|m| ModelConfig {
            model_name: m.to_string(),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_participant_key() {
        assert_eq!(participant_key(&player("p1", Some("@anthropic/claude-sonnet-4"))), "claude-sonnet-4");
        assert_eq!(participant_key(&player("p1", Some("gpt-5"))), "gpt-5");
        assert_eq!(participant_key(&player("p1", None)), "p1");
    }

    #[test]
    fn test_reads_legacy_record() {
        let json = r#"{
            "config": {
                "game": {"name": "CoreWar"},
                "players": [{"name": "a", "config": {"model": {"model_name": "x/m1"}}}, {"name": "b"}],
                "tournament": {"rounds": 3}
            },
            "game": {"config": {"sims_per_round": 50}},
            "round_stats": {"1": {"winner": "a", "scores": {"a": 30, "b": 20}}}
        }"#;
        let record: TournamentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.game_name(), "CoreWar");
        assert_eq!(record.player_names(), vec!["a", "b"]);
        assert_eq!(record.sims_per_round(), 50);
        assert_eq!(record.round_stats.len(), 1);
    }

    #[test]
    fn test_find_records() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["b/t1", "a/t2", "a/t2/nested"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join(RECORD_FILE), "{}").unwrap();
        }
        fs::write(dir.path().join("a/notes.txt"), "").unwrap();

        let found = find_records(dir.path()).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0] < w[1]));

        assert!(matches!(
            find_records(&dir.path().join("missing")),
            Err(RatingsError::LogDir { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_linked_directories_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let tournament = dir.path().join("PvpTournament.CoreWar.1");
        fs::create_dir_all(&tournament).unwrap();
        fs::write(tournament.join(RECORD_FILE), "{}").unwrap();
        std::os::unix::fs::symlink(&tournament, dir.path().join("latest")).unwrap();
        std::os::unix::fs::symlink(dir.path(), tournament.join("loop")).unwrap();

        let found = find_records(dir.path()).unwrap();
        assert_eq!(found, vec![tournament.join(RECORD_FILE)]);
    }
}
