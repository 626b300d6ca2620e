use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{event, Level};

use super::{apply_vote, validate_python_submission};
use crate::{
    agent::Player,
    arena::{
        majority_vote, player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig,
        RoundArtifact, RoundStats, SimulationPool, Validation, Winner,
    },
    environment::Environment,
};

const SUBMISSION: &str = "robot.py";

static TEAM_WON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(blue|red)\s+(?:won|wins)\b").ok());

/// Two robot teams, Blue (first player) and Red (second), fight on a grid.
pub struct RobotRumbleArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
    pool: SimulationPool,
}

impl RobotRumbleArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Result<Self, ArenaError> {
        let pool = SimulationPool::new(config.sim_workers, config.timeout())?;
        Ok(RobotRumbleArena {
            config,
            environment,
            pool,
        })
    }

    fn parse_sim(log: &str, names: &[String]) -> Winner {
        // The verdict is at the end; scan backwards.
        for line in log.lines().rev() {
            if line.to_lowercase().contains("it was a tie!") {
                return Winner::Tie;
            }
            if let Some(caps) = TEAM_WON.as_ref().and_then(|re| re.captures(line)) {
                let seat = if caps[1].eq_ignore_ascii_case("blue") { 0 } else { 1 };
                return names
                    .get(seat)
                    .map_or(Winner::Tie, |name| Winner::player(name.as_str()));
            }
        }
        Winner::Tie
    }
}

impl Arena for RobotRumbleArena {
    fn name(&self) -> &str {
        "RobotRumble"
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
        let robots: Vec<String> = players
            .iter()
            .map(|p| p.codebase_file(SUBMISSION))
            .collect();
        let cmd = format!(
            "{} {}",
            GameArgs::new(&self.config.args, ArgPrefix::DoubleDash)
                .append_to("./rumblebot run term"),
            robots.join(" ")
        );
        event!(Level::INFO, round = round_num, "Running game: {cmd}");
        let env = self.environment.as_ref();
        let sim_logs = self.pool.run(self.config.sims_per_round, |_, timeout| {
            env.execute(&cmd, None, Some(timeout))
        })?;
        Ok(RoundArtifact::from_sims(sim_logs))
    }

    fn get_results(
        &self,
        players: &[&Player],
        round_num: usize,
        artifact: &RoundArtifact,
    ) -> Result<RoundStats, ArenaError> {
        let names = player_names(players);
        let votes: Vec<Winner> = artifact
            .sim_logs
            .iter()
            .flatten()
            .map(|log| Self::parse_sim(log, &names))
            .collect();
        let mut stats = RoundStats::new(round_num, &names);
        apply_vote(
            &mut stats,
            majority_vote(&names, &votes, self.config.tie_policy),
        );
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

    #[test]
    fn test_blue_is_first_player() {
        let env = Arc::new(
            ScriptedEnvironment::new()
                .on_times("rumblebot", 2, Scripted::ok("turn 100\nRed won!\n"))
                .on("rumblebot", Scripted::ok("turn 100\nit was a tie!\n")),
        );
        let config = GameConfig::new("RobotRumble").sims_per_round(5);
        let arena = RobotRumbleArena::new(config, env.clone()).unwrap();
        let ps = players(&["alice", "bob"], env.clone());
        let refs: Vec<&Player> = ps.iter().collect();

        let artifact = arena.execute_round(&refs, 1).unwrap();
        assert_eq!(
            env.commands()[0],
            "./rumblebot run term /alice/robot.py /bob/robot.py"
        );
        let stats = arena.get_results(&refs, 1, &artifact).unwrap();
        assert_eq!(stats.winner, Winner::player("bob"));
        assert_eq!(stats.scores["bob"], 2.0);
        assert_eq!(stats.scores["Tie"], 3.0);
    }

    #[test]
    fn test_parse_sim() {
        let names = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(
            RobotRumbleArena::parse_sim("Blue won!", &names),
            Winner::player("alice")
        );
        assert!(RobotRumbleArena::parse_sim("panic: robot crashed", &names).is_tie());
    }
}
