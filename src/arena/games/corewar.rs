use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{event, Level};

use super::check_submission_file;
use crate::{
    agent::Player,
    arena::{
        player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig, RoundArtifact,
        RoundStats, Validation,
    },
    environment::{assert_zero_exit_code, Environment},
};

const SUBMISSION: &str = "warriors/warrior.red";

static SCORES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\sscores\s+(-?\d+)").ok());

/// Redcode warriors fought out by `pmars`. Warriors are listed in player
/// order, so the n-th `scores` line belongs to the n-th player.
pub struct CoreWarArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
}

impl CoreWarArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Self {
        CoreWarArena {
            config,
            environment,
        }
    }
}

impl Arena for CoreWarArena {
    fn name(&self) -> &str {
        "CoreWar"
    }

    fn config(&self) -> &GameConfig {
        &self.config
    }

    fn validate_code(&self, player: &Player) -> Result<Validation, ArenaError> {
        Ok(check_submission_file(player, SUBMISSION)?.unwrap_or_else(Validation::valid))
    }

    fn execute_round(
        &self,
        players: &[&Player],
        round_num: usize,
    ) -> Result<RoundArtifact, ArenaError> {
        let warriors: Vec<String> = players
            .iter()
            .map(|p| p.codebase_file(SUBMISSION))
            .collect();
        let cmd = format!(
            "{} {}",
            GameArgs::new(&self.config.args, ArgPrefix::SingleDash).append_to("./src/pmars"),
            warriors.join(" ")
        );
        event!(Level::INFO, round = round_num, "Running game: {cmd}");
        let out = self
            .environment
            .execute(&cmd, None, Some(self.config.timeout()))?;
        let out = assert_zero_exit_code(out, &cmd)?;
        Ok(RoundArtifact::from_output(out.output))
    }

    fn get_results(
        &self,
        players: &[&Player],
        round_num: usize,
        artifact: &RoundArtifact,
    ) -> Result<RoundStats, ArenaError> {
        let names = player_names(players);
        let mut stats = RoundStats::new(round_num, &names);
        let scores: Vec<f64> = artifact
            .result_output
            .lines()
            .filter_map(|line| SCORES.as_ref()?.captures(line))
            .filter_map(|caps| caps[1].parse::<f64>().ok())
            .collect();

        if scores.len() < names.len() {
            event!(
                Level::WARN,
                round = round_num,
                "Expected {} scores, found {}",
                names.len(),
                scores.len()
            );
            return Ok(stats);
        }
        for (name, score) in names.iter().zip(scores) {
            stats.set_score(name, score);
        }
        let leader = stats.leader();
        stats.set_winner(leader);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arena::{games::test_players::players, Winner},
        test_util::{Scripted, ScriptedEnvironment},
    };

    const OUTPUT: &str = "Imp by A.K. Dewdney scores 120\nDwarf by A.K. Dewdney scores 315\nResults: 30 95 75\n";

    #[test]
    fn test_round() {
        let env = Arc::new(ScriptedEnvironment::new().on("pmars", Scripted::ok(OUTPUT)));
        let config = GameConfig::new("CoreWar").arg("r", 100i64);
        let arena = CoreWarArena::new(config, env.clone());
        let ps = players(&["alice", "bob"], env.clone());
        let refs: Vec<&Player> = ps.iter().collect();

        let artifact = arena.execute_round(&refs, 1).unwrap();
        assert_eq!(
            env.commands(),
            vec!["./src/pmars -r 100 /alice/warriors/warrior.red /bob/warriors/warrior.red".to_string()]
        );
        let stats = arena.get_results(&refs, 1, &artifact).unwrap();
        assert_eq!(stats.winner, Winner::player("bob"));
        assert_eq!(stats.scores["alice"], 120.0);
        assert_eq!(stats.scores["bob"], 315.0);
    }

    #[test]
    fn test_missing_scores_is_tie() {
        let env = Arc::new(ScriptedEnvironment::new());
        let arena = CoreWarArena::new(GameConfig::new("CoreWar"), env.clone());
        let ps = players(&["alice", "bob"], env);
        let refs: Vec<&Player> = ps.iter().collect();
        let stats = arena
            .get_results(
                &refs,
                1,
                &RoundArtifact::from_output("Imp by A.K. Dewdney scores 120\n"),
            )
            .unwrap();
        assert!(stats.winner.is_tie());
    }
}
