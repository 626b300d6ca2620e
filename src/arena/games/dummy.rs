use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{event, Level};

use crate::{
    agent::Player,
    arena::{
        games::validate_python_submission, player_names, Arena, ArenaError, GameConfig,
        RoundArtifact, RoundStats, Validation,
    },
    environment::{assert_zero_exit_code, Environment},
};

const SUBMISSION: &str = "main.py";

static BOT_WINS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Bot_(\d+)_main:\s(\d+)\srounds\swon").ok());

/// A stand in game for exercising the tournament machinery. The engine plays
/// `sims_per_round` games and prints how many each bot won.
pub struct DummyArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
}

impl DummyArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Self {
        DummyArena {
            config,
            environment,
        }
    }
}

impl Arena for DummyArena {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn config(&self) -> &GameConfig {
        &self.config
    }

    fn validate_code(&self, player: &Player) -> Result<Validation, ArenaError> {
        validate_python_submission(player, SUBMISSION)
    }

    fn execute_round(
        &self,
        players: &[&Player],
        round_num: usize,
    ) -> Result<RoundArtifact, ArenaError> {
        let bots: Vec<String> = players
            .iter()
            .map(|p| p.codebase_file(SUBMISSION))
            .collect();
        let cmd = format!(
            "python engine.py {} -r {}",
            bots.join(" "),
            self.config.sims_per_round
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
        let results = artifact
            .result_output
            .rsplit("FINAL_RESULTS")
            .next()
            .unwrap_or_default();

        let mut found = false;
        for caps in results.lines().filter_map(|line| BOT_WINS.as_ref()?.captures(line)) {
            let (Ok(bot), Ok(won)) = (caps[1].parse::<usize>(), caps[2].parse::<f64>()) else {
                continue;
            };
            if let Some(name) = bot.checked_sub(1).and_then(|idx| names.get(idx)) {
                stats.set_score(name, won);
                found = true;
            }
        }
        if found {
            let leader = stats.leader();
            stats.set_winner(leader);
        } else {
            event!(Level::WARN, round = round_num, "No results found in game output");
        }
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

    const OUTPUT: &str = "Round 1: Bot_1 wins\nRound 2: Bot_2 wins\nFINAL_RESULTS\nBot_1_main: 2 rounds won\nBot_2_main: 1 rounds won\n";

    #[test]
    fn test_execute_and_parse() {
        let env = Arc::new(ScriptedEnvironment::new().on("engine.py", Scripted::ok(OUTPUT)));
        let arena = DummyArena::new(GameConfig::new("Dummy").sims_per_round(3), env.clone());
        let ps = players(&["alice", "bob"], env.clone());
        let refs: Vec<&Player> = ps.iter().collect();

        let artifact = arena.execute_round(&refs, 1).unwrap();
        assert_eq!(
            env.commands(),
            vec!["python engine.py /alice/main.py /bob/main.py -r 3".to_string()]
        );

        let stats = arena.get_results(&refs, 1, &artifact).unwrap();
        assert_eq!(stats.winner, Winner::player("alice"));
        assert_eq!(stats.scores["alice"], 2.0);
        assert_eq!(stats.scores["bob"], 1.0);
        assert_eq!(stats.player_stats["bob"].score, Some(1.0));
    }

    #[test]
    fn test_engine_failure_is_fatal() {
        let env = Arc::new(ScriptedEnvironment::new().on("engine.py", Scripted::exit(1, "Traceback")));
        let arena = DummyArena::new(GameConfig::new("Dummy"), env.clone());
        let ps = players(&["alice", "bob"], env);
        let refs: Vec<&Player> = ps.iter().collect();
        assert!(matches!(
            arena.execute_round(&refs, 1),
            Err(ArenaError::ExecutionFailure(_))
        ));
    }

    #[test]
    fn test_garbled_output_is_a_tie() {
        let env = Arc::new(ScriptedEnvironment::new());
        let arena = DummyArena::new(GameConfig::new("Dummy"), env.clone());
        let ps = players(&["alice", "bob"], env);
        let refs: Vec<&Player> = ps.iter().collect();
        let stats = arena
            .get_results(&refs, 1, &RoundArtifact::from_output("segfault"))
            .unwrap();
        assert!(stats.winner.is_tie());

        let level = "FINAL_RESULTS\nBot_1_main: 1 rounds won\nBot_2_main: 1 rounds won\n";
        let stats = arena
            .get_results(&refs, 1, &RoundArtifact::from_output(level))
            .unwrap();
        assert!(stats.winner.is_tie());
    }
}
