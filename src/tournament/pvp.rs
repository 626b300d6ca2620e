use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use chrono::Local;
use tracing::{event, info_span, Level};

use super::{
    LocalWorkspace, TournamentConfig, TournamentError, TournamentMetadata, Workspace,
};
use crate::{
    agent::{create_agent, GameContext, Player},
    arena::{Arena, ArenaRegistry, RoundArtifact, RoundStats, Validation, Winner},
    environment::write_file,
};

const DEFAULT_OUTPUT_DIR: &str = "logs";
const DEFAULT_WORKSPACE: &str = "workspace";

/// Builds a [`PvpTournament`].
///
/// Only the configuration is required. Without a workspace the players and
/// the game get local directories under the configured `workspace_root`.
#[derive(Default)]
pub struct PvpTournamentBuilder {
    config: Option<TournamentConfig>,
    workspace: Option<Box<dyn Workspace>>,
    output_dir: Option<PathBuf>,
    arena: Option<Box<dyn Arena>>,
}

impl PvpTournamentBuilder {
    pub fn config(mut self, config: TournamentConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn workspace(mut self, workspace: impl Workspace + 'static) -> Self {
        self.workspace = Some(Box::new(workspace));
        self
    }

    /// Root directory for tournament records. Overrides the configuration.
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Use this arena instead of looking the game up in the registry.
    pub fn arena(mut self, arena: Box<dyn Arena>) -> Self {
        self.arena = Some(arena);
        self
    }

    pub fn build(self) -> Result<PvpTournament, TournamentError> {
        let config = self.config.ok_or_else(|| {
            TournamentError::InvalidConfig("a tournament configuration is required".to_string())
        })?;
        config.validate()?;

        let workspace = self.workspace.unwrap_or_else(|| {
            Box::new(LocalWorkspace::new(
                config
                    .workspace_root
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE)),
            ))
        });
        let tournament_id = format!(
            "PvpTournament.{}.{}",
            config.game.name,
            Local::now().format("%y%m%d%H%M%S")
        );
        let output_dir = self
            .output_dir
            .or_else(|| config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
            .join(&tournament_id);

        let arena = match self.arena {
            Some(arena) => arena,
            None => ArenaRegistry::create(&config.game, workspace.game_environment())?,
        };

        let mut players = Vec::with_capacity(config.players.len());
        for player_config in &config.players {
            let agent = create_agent(player_config)?;
            let (codebase, environment) = workspace.player_workspace(&player_config.name);
            let context = GameContext::new(
                tournament_id.as_str(),
                config.game.name.as_str(),
                player_config.name.as_str(),
                config.tournament.rounds,
                config.prompts.clone(),
                codebase.clone(),
            );
            let player = Player::new(
                player_config.name.as_str(),
                codebase,
                environment,
                context,
                agent,
            )
            .with_model_name(player_config.model_name().map(str::to_string))
            .with_snapshot(player_config.snapshot);
            player.init_snapshots()?;
            players.push(player);
        }

        let metadata = TournamentMetadata::new(tournament_id.as_str(), config.clone());
        Ok(PvpTournament {
            config,
            arena,
            players,
            output_dir,
            metadata,
            persisted: false,
        })
    }
}

/// A tournament where every player competes against all others in every
/// round, and improves their code between rounds.
pub struct PvpTournament {
    config: TournamentConfig,
    arena: Box<dyn Arena>,
    players: Vec<Player>,
    output_dir: PathBuf,
    metadata: TournamentMetadata,
    persisted: bool,
}

impl PvpTournament {
    pub fn tournament_id(&self) -> &str {
        &self.metadata.tournament_id
    }

    /// Where this tournament's record and round logs are written.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn metadata(&self) -> &TournamentMetadata {
        &self.metadata
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Play every round, then persist the tournament record.
    ///
    /// A round is recorded once every agent has taken its turn after it.
    /// The record is written even when a round fails, with every round that
    /// was recorded before the failure.
    pub fn run(&mut self) -> Result<&TournamentMetadata, TournamentError> {
        let span = info_span!("PvpTournament::run", id = %self.metadata.tournament_id);
        let _enter = span.enter();

        let outcome = self.run_rounds();
        let persisted = self.end();
        match (outcome, persisted) {
            (Err(err), Err(persist_err)) => {
                event!(
                    Level::ERROR,
                    "Unable to write the record of a failed tournament: {persist_err}"
                );
                Err(err)
            }
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(&self.metadata),
        }
    }

    fn run_rounds(&mut self) -> Result<(), TournamentError> {
        fs::create_dir_all(self.output_dir.join("rounds"))?;
        if self.config.tournament.warmup_round {
            let stats = self.play_round(0)?;
            self.metadata.record_round(stats);
        }
        for round in 1..=self.config.tournament.rounds {
            let stats = self.play_round(round)?;
            self.agent_turns(round)?;
            self.metadata.record_round(stats);
            event!(Level::INFO, round, "Round committed");
        }
        Ok(())
    }

    /// Validate, execute, score and broadcast one round.
    fn play_round(&mut self, round: usize) -> Result<RoundStats, TournamentError> {
        event!(
            Level::INFO,
            round,
            "Starting round {round}/{}",
            self.config.tournament.rounds
        );
        let fail = |source| TournamentError::Round { round, source };

        let mut validations: Vec<Validation> = Vec::with_capacity(self.players.len());
        for player in &self.players {
            let validation = self.arena.validate_code(player).map_err(fail)?;
            if !validation.ok {
                event!(
                    Level::WARN,
                    round,
                    player = %player.name(),
                    "Invalid submission: {}",
                    validation.reason.as_deref().unwrap_or("unknown reason")
                );
            }
            validations.push(validation);
        }
        let names: Vec<String> = self.players.iter().map(|p| p.name().to_string()).collect();
        let valid: Vec<&Player> = self
            .players
            .iter()
            .zip(&validations)
            .filter(|(_, v)| v.ok)
            .map(|(p, _)| p)
            .collect();
        let requires_valid = self.arena.requires_valid_submission();
        // Broken code that still plays loses to the only working submission.
        let lone_valid = match valid.as_slice() {
            [only] if !requires_valid => Some(only.name().to_string()),
            _ => None,
        };

        let (mut stats, artifact) = if requires_valid && valid.len() < 2 {
            self.forfeit(round, &names, &valid)
        } else {
            let participants: Vec<&Player> = if requires_valid {
                valid.clone()
            } else {
                self.players.iter().collect()
            };
            let artifact = self
                .arena
                .execute_round(&participants, round)
                .map_err(fail)?;
            let mut stats = self
                .arena
                .get_results(&participants, round, &artifact)
                .map_err(fail)?;
            stats.round_num = round;
            (stats, artifact)
        };

        for name in &names {
            stats.scores.entry(name.clone()).or_insert(0.0);
        }
        if let Some(winner) = lone_valid {
            stats.set_winner(Winner::Player(winner));
        }
        for (name, validation) in names.iter().zip(validations) {
            stats.mark_submission(name, validation.ok, validation.reason);
        }
        stats.sync_player_scores();

        self.write_round_logs(round, &artifact)?;
        self.broadcast(round, &artifact.log_output);

        event!(Level::INFO, round, winner = %stats.winner, "Round scored");
        Ok(stats)
    }

    /// The result of a round that cannot be played for lack of valid code.
    fn forfeit(
        &self,
        round: usize,
        names: &[String],
        valid: &[&Player],
    ) -> (RoundStats, RoundArtifact) {
        let mut stats = RoundStats::new(round, names);
        let message = match valid {
            [winner] => {
                stats.set_score(winner.name(), self.config.game.sims_per_round as f64);
                stats.set_winner(Winner::player(winner.name()));
                format!(
                    "Round {round} was not played: only {} submitted valid code and wins by default.\n",
                    winner.name()
                )
            }
            _ => format!("Round {round} was not played: no player submitted valid code.\n"),
        };
        event!(Level::WARN, round, "{}", message.trim_end());
        (stats, RoundArtifact::from_output(message))
    }

    fn write_round_logs(&self, round: usize, artifact: &RoundArtifact) -> Result<(), TournamentError> {
        let rounds_dir = self.output_dir.join("rounds");
        fs::create_dir_all(&rounds_dir)?;
        fs::write(
            rounds_dir.join(format!("round_{round}.log")),
            &artifact.log_output,
        )?;
        if artifact.sim_logs.iter().any(Option::is_some) {
            let sim_dir = rounds_dir.join(format!("round_{round}"));
            fs::create_dir_all(&sim_dir)?;
            for (idx, log) in artifact.sim_logs.iter().enumerate() {
                if let Some(log) = log {
                    fs::write(sim_dir.join(format!("sim_{idx}.log")), log)?;
                }
            }
        }
        Ok(())
    }

    /// Copy the round log into every player's workspace.
    fn broadcast(&self, round: usize, log: &str) {
        let path = PathBuf::from(format!("logs/round_{round}.log"));
        for player in &self.players {
            if let Err(err) = write_file(player.environment(), &path, log) {
                event!(
                    Level::WARN,
                    round,
                    player = %player.name(),
                    "Unable to copy the round log: {err}"
                );
            }
        }
    }

    /// Every player takes their turn, one after the other.
    fn agent_turns(&mut self, round: usize) -> Result<(), TournamentError> {
        for player in self.players.iter_mut() {
            player.pre_run_hook(round);
            player
                .run()
                .and_then(|()| player.post_run_hook(round))
                .map_err(|source| TournamentError::AgentTurn {
                    round,
                    player: player.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Write `metadata.json`. Later calls do nothing.
    fn end(&mut self) -> Result<(), TournamentError> {
        if self.persisted {
            return Ok(());
        }
        self.metadata.game = self.arena.get_metadata();
        self.metadata.agents = self.players.iter().map(Player::get_metadata).collect();

        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join("metadata.json");
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.metadata)?;
        self.persisted = true;
        event!(
            Level::INFO,
            path = %path.display(),
            rounds = self.metadata.round_stats.len(),
            "Tournament record written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        agent::PlayerConfig,
        arena::GameConfig,
        test_util::{Scripted, ScriptedEnvironment},
        tournament::SharedWorkspace,
    };

    const OUTPUT: &str = "FINAL_RESULTS\nBot_1_main: 3 rounds won\nBot_2_main: 2 rounds won\n";

    fn config(rounds: usize) -> TournamentConfig {
        TournamentConfig::new(
            GameConfig::new("Dummy").sims_per_round(5),
            vec![PlayerConfig::new("alice"), PlayerConfig::new("bob")],
        )
        .rounds(rounds)
    }

    fn valid_code(env: ScriptedEnvironment) -> ScriptedEnvironment {
        env.on("test -f", Scripted::ok("exists"))
            .on("cat main.py", Scripted::ok("print('hello')"))
    }

    fn read_metadata(dir: &Path) -> TournamentMetadata {
        let text = fs::read_to_string(dir.join("metadata.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test_log::test]
    fn test_rounds_are_recorded_and_persisted() {
        let out = tempfile::tempdir().unwrap();
        let env = Arc::new(valid_code(ScriptedEnvironment::new()).on("engine.py", Scripted::ok(OUTPUT)));
        let mut tournament = PvpTournamentBuilder::default()
            .config(config(2).warmup_round(true))
            .workspace(SharedWorkspace::new(env.clone()))
            .output_dir(out.path())
            .build()
            .unwrap();
        assert!(tournament.tournament_id().starts_with("PvpTournament.Dummy."));

        let metadata = tournament.run().unwrap().clone();
        let keys: Vec<&str> = metadata.round_stats.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["0", "1", "2"]);
        assert_eq!(metadata.scoreboard.len(), 3);
        let round = metadata.round_stats.get(1).unwrap();
        assert_eq!(round.winner, Winner::player("alice"));
        assert_eq!(round.player_stats["bob"].valid_submit, Some(true));

        // Broadcast to both players every round, commits after rounds 1 and 2.
        assert_eq!(env.commands_matching("cat > logs/round_1.log").len(), 2);
        assert_eq!(env.commands_matching("git commit").len(), 4);
        assert!(env.commands_matching("Round 0/2").is_empty());

        let dir = tournament.output_dir();
        assert!(dir.join("rounds/round_0.log").exists());
        assert!(dir.join("rounds/round_2.log").exists());
        let persisted = read_metadata(dir);
        assert_eq!(persisted.round_stats, metadata.round_stats);
        assert_eq!(persisted.config, metadata.config);
        assert_eq!(persisted.agents.len(), 2);
        assert_eq!(persisted.game["name"], "Dummy");
    }

    #[test_log::test]
    fn test_failed_round_persists_earlier_rounds() {
        let out = tempfile::tempdir().unwrap();
        let env = Arc::new(
            valid_code(ScriptedEnvironment::new())
                .on_times("engine.py", 2, Scripted::ok(OUTPUT))
                .on("engine.py", Scripted::exit(1, "Traceback")),
        );
        let mut tournament = PvpTournamentBuilder::default()
            .config(config(5))
            .workspace(SharedWorkspace::new(env))
            .output_dir(out.path())
            .build()
            .unwrap();

        let err = tournament.run().unwrap_err();
        assert!(matches!(err, TournamentError::Round { round: 3, .. }));

        let persisted = read_metadata(tournament.output_dir());
        assert!(persisted.round_stats.contains_round(1));
        assert!(persisted.round_stats.contains_round(2));
        assert!(!persisted.round_stats.contains_round(3));
        assert_eq!(persisted.round_stats.len(), 2);
    }

    #[test_log::test]
    fn test_round_is_recorded_after_agent_turns() {
        let out = tempfile::tempdir().unwrap();
        let env = Arc::new(
            valid_code(ScriptedEnvironment::new())
                .on("engine.py", Scripted::ok(OUTPUT))
                .on_times("git commit", 2, Scripted::ok(""))
                .on("git commit", Scripted::exit(128, "fatal: unable to write")),
        );
        let mut tournament = PvpTournamentBuilder::default()
            .config(config(3))
            .workspace(SharedWorkspace::new(env))
            .output_dir(out.path())
            .build()
            .unwrap();

        let err = tournament.run().unwrap_err();
        assert!(matches!(err, TournamentError::AgentTurn { round: 2, .. }));

        // Round 2 was played but never committed.
        let dir = tournament.output_dir();
        assert!(dir.join("rounds/round_2.log").exists());
        let persisted = read_metadata(dir);
        let rounds: Vec<&str> = persisted.round_stats.iter().map(|(k, _)| k).collect();
        assert_eq!(rounds, vec!["1"]);
        assert_eq!(persisted.scoreboard.len(), 1);
    }

    #[test]
    fn test_only_valid_submission_wins_without_playing() {
        let out = tempfile::tempdir().unwrap();
        // alice is checked first and finds her file, bob does not.
        let env = Arc::new(
            ScriptedEnvironment::new()
                .on_times("test -f", 1, Scripted::ok("exists"))
                .on("test -f", Scripted::ok(""))
                .on("cat main.py", Scripted::ok("print('hello')")),
        );
        let mut tournament = PvpTournamentBuilder::default()
            .config(config(1))
            .workspace(SharedWorkspace::new(env.clone()))
            .output_dir(out.path())
            .build()
            .unwrap();

        let metadata = tournament.run().unwrap();
        let round = metadata.round_stats.get(1).unwrap();
        assert_eq!(round.winner, Winner::player("alice"));
        assert_eq!(round.scores["alice"], 5.0);
        assert_eq!(round.scores["bob"], 0.0);
        assert_eq!(round.player_stats["bob"].valid_submit, Some(false));
        assert!(round.player_stats["bob"].invalid_reason.is_some());
        assert!(env.commands_matching("engine.py").is_empty());
    }

    #[test]
    fn test_failed_broadcast_is_not_fatal() {
        let out = tempfile::tempdir().unwrap();
        let env = Arc::new(
            valid_code(ScriptedEnvironment::new())
                .on("engine.py", Scripted::ok(OUTPUT))
                .on("cat > logs/", Scripted::exit(1, "No space left on device")),
        );
        let mut tournament = PvpTournamentBuilder::default()
            .config(config(1))
            .workspace(SharedWorkspace::new(env))
            .output_dir(out.path())
            .build()
            .unwrap();
        assert_eq!(tournament.run().unwrap().round_stats.len(), 1);
    }

    #[test]
    fn test_unknown_game_fails_to_build() {
        let mut config = config(1);
        config.game = GameConfig::new("Chess");
        let result = PvpTournamentBuilder::default()
            .config(config)
            .workspace(SharedWorkspace::new(Arc::new(ScriptedEnvironment::new())))
            .build();
        assert!(matches!(result, Err(TournamentError::Setup(_))));
    }
}
