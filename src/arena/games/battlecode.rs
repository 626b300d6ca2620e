use std::sync::{Arc, LazyLock};

use rand::seq::SliceRandom;
use regex::Regex;
use tracing::{event, Level};

use super::{check_python_syntax, check_submission_file, last_lines};
use crate::{
    agent::Player,
    arena::{
        player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig, RoundArtifact,
        RoundStats, Validation, Winner,
    },
    environment::{assert_zero_exit_code, Environment},
};

const SUBMISSION_DIR: &str = "src/mysubmission";
const SUBMISSION: &str = "src/mysubmission/bot.py";

static WINNER_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s\((.*)\)\swins\s\(").ok());

/// Two player game. Start position matters, so the seating is shuffled
/// every round.
pub struct BattleCodeArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
}

impl BattleCodeArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Self {
        BattleCodeArena {
            config,
            environment,
        }
    }

    fn run_command(&self, seating: &[String]) -> String {
        let mut cmd =
            GameArgs::new(&self.config.args, ArgPrefix::DoubleDash).append_to("python run.py run");
        for (idx, name) in seating.iter().enumerate() {
            let p = idx + 1;
            cmd.push_str(&format!(" --p{p}-dir src --p{p} {name}"));
        }
        cmd
    }
}

impl Arena for BattleCodeArena {
    fn name(&self) -> &str {
        "BattleCode"
    }

    fn config(&self) -> &GameConfig {
        &self.config
    }

    fn validate_code(&self, player: &Player) -> Result<Validation, ArenaError> {
        let dir = player
            .environment()
            .execute(&format!("test -d {SUBMISSION_DIR} && echo 'exists'"), None, None)?;
        if !dir.output.contains("exists") {
            return Ok(Validation::invalid(format!(
                "Submission directory '{SUBMISSION_DIR}' not found"
            )));
        }
        if let Some(invalid) = check_submission_file(player, SUBMISSION)? {
            return Ok(invalid);
        }
        if let Some(invalid) = check_python_syntax(player, SUBMISSION)? {
            return Ok(invalid);
        }
        Ok(Validation::valid())
    }

    fn execute_round(
        &self,
        players: &[&Player],
        round_num: usize,
    ) -> Result<RoundArtifact, ArenaError> {
        if players.len() != 2 {
            return Err(ArenaError::InvalidConfig(format!(
                "BattleCode is a two-player game, got {} players",
                players.len()
            )));
        }
        let env = self.environment.as_ref();
        for player in players {
            let cmd = format!(
                "cp -r {}/ src/{}",
                player.codebase_file(SUBMISSION_DIR),
                player.name()
            );
            assert_zero_exit_code(env.execute(&cmd, None, None)?, &cmd)?;
        }

        let mut seating = player_names(players);
        seating.shuffle(&mut rand::rng());
        let cmd = self.run_command(&seating);
        event!(Level::INFO, round = round_num, "Running game: {cmd}");
        let out = env.execute(&cmd, None, Some(self.config.timeout()))?;
        let out = assert_zero_exit_code(out, &cmd)?;

        let mut artifact = RoundArtifact::from_output(out.output);
        artifact.start_order = seating;
        Ok(artifact)
    }

    fn get_results(
        &self,
        players: &[&Player],
        round_num: usize,
        artifact: &RoundArtifact,
    ) -> Result<RoundStats, ArenaError> {
        let names = player_names(players);
        let seating = if artifact.start_order.is_empty() {
            &names
        } else {
            &artifact.start_order
        };
        let mut stats = RoundStats::new(round_num, &names);

        let lines = last_lines(&artifact.result_output, 3);
        let winner_line = if lines.len() == 3 { lines[0] } else { "" };
        let winner = WINNER_LINE
            .as_ref()
            .and_then(|re| re.captures(winner_line))
            .and_then(|caps| match &caps[1] {
                "A" => seating.first().cloned(),
                "B" => seating.get(1).cloned(),
                _ => None,
            })
            .map_or(Winner::Tie, Winner::Player);

        if let Winner::Player(name) = &winner {
            stats.set_score(name, 1.0);
        } else {
            event!(Level::DEBUG, round = round_num, "No winner line found");
        }
        stats.sync_player_scores();
        stats.set_winner(winner);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arena::games::test_players::players,
        test_util::{Scripted, ScriptedEnvironment},
    };

    const OUTPUT: &str = "[server] Match starting\n[server] bob (B) wins (round 1337)\n[server] Reason: destroyed\nDone.\n";

    #[test]
    fn test_seating_maps_a_and_b() {
        let env = Arc::new(ScriptedEnvironment::new().on("run.py run", Scripted::ok(OUTPUT)));
        let arena = BattleCodeArena::new(GameConfig::new("BattleCode"), env.clone());
        let ps = players(&["alice", "bob"], env.clone());
        let refs: Vec<&Player> = ps.iter().collect();

        let artifact = arena.execute_round(&refs, 1).unwrap();
        assert_eq!(artifact.start_order.len(), 2);
        let run = env.commands_matching("run.py run");
        let p2 = &artifact.start_order[1];
        assert!(run[0].ends_with(&format!("--p2-dir src --p2 {p2}")));
        assert_eq!(env.commands_matching("cp -r /alice/src/mysubmission/ src/alice").len(), 1);

        // B is whoever was seated second.
        let stats = arena.get_results(&refs, 1, &artifact).unwrap();
        assert_eq!(stats.winner, Winner::player(p2.as_str()));
        assert_eq!(stats.scores[p2.as_str()], 1.0);
    }

    #[test]
    fn test_unrecognised_output_is_tie() {
        let env = Arc::new(ScriptedEnvironment::new());
        let arena = BattleCodeArena::new(GameConfig::new("BattleCode"), env.clone());
        let ps = players(&["alice", "bob"], env);
        let refs: Vec<&Player> = ps.iter().collect();

        let stats = arena
            .get_results(&refs, 1, &RoundArtifact::from_output("crashed"))
            .unwrap();
        assert!(stats.winner.is_tie());
        assert_eq!(stats.scores["alice"], 0.0);
    }

    #[test]
    fn test_requires_two_players() {
        let env = Arc::new(ScriptedEnvironment::new());
        let arena = BattleCodeArena::new(GameConfig::new("BattleCode"), env.clone());
        let ps = players(&["alice", "bob", "carol"], env);
        let refs: Vec<&Player> = ps.iter().collect();
        assert!(matches!(
            arena.execute_round(&refs, 1),
            Err(ArenaError::InvalidConfig(_))
        ));
    }
}
