use std::{path::Path, sync::Arc};

use tracing::{event, Level};

use super::{apply_vote, validate_python_submission, wait_for_servers};
use crate::{
    agent::Player,
    arena::{
        majority_vote, player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig,
        RoundArtifact, RoundStats, SimulationPool, Validation, Winner,
    },
    environment::{BackgroundGuard, Environment, ExecOutput},
};

const SUBMISSION: &str = "main.py";
const FIRST_PORT: usize = 8001;
const GAME_DIR: &str = "game";

/// Every player runs an HTTP snake server; the `battlesnake` CLI plays
/// `sims_per_round` games between them.
pub struct BattleSnakeArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
    pool: SimulationPool,
}

impl BattleSnakeArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Result<Self, ArenaError> {
        let pool = SimulationPool::new(config.sim_workers, config.timeout())?;
        Ok(BattleSnakeArena {
            config,
            environment,
            pool,
        })
    }

    fn play_command(&self, players: &[&Player]) -> String {
        let mut cmd = GameArgs::new(&self.config.args, ArgPrefix::DoubleDash)
            .append_to("./battlesnake play");
        for (idx, player) in players.iter().enumerate() {
            let port = FIRST_PORT + idx;
            cmd.push_str(&format!(
                " --url http://0.0.0.0:{port} -n {}",
                player.name()
            ));
        }
        cmd
    }

    /// The winner of one game from the last line of its JSON output.
    fn parse_sim(log: &str) -> Winner {
        let Some(last) = log.trim().lines().last() else {
            return Winner::Tie;
        };
        match serde_json::from_str::<serde_json::Value>(last) {
            Ok(value) => match value.get("winnerName").and_then(|w| w.as_str()) {
                Some(name) if !name.is_empty() => Winner::player(name),
                _ => Winner::Tie,
            },
            Err(e) => {
                event!(Level::DEBUG, "Unreadable simulation result: {e}");
                Winner::Tie
            }
        }
    }
}

impl Arena for BattleSnakeArena {
    fn name(&self) -> &str {
        "BattleSnake"
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
        let env = self.environment.as_ref();
        let mut guard = BackgroundGuard::new(env);
        for (idx, player) in players.iter().enumerate() {
            let port = FIRST_PORT + idx;
            guard.spawn(
                &format!("PORT={port} python {SUBMISSION}"),
                Some(player.codebase()),
                format!("pkill -f 'python {SUBMISSION}' || true"),
            )?;
        }
        wait_for_servers(env)?;

        let play = self.play_command(players);
        event!(Level::INFO, round = round_num, "Running game: {play}");
        let game_dir = Path::new(GAME_DIR);
        let sim_logs = self.pool.run(self.config.sims_per_round, |idx, timeout| {
            let output_file = format!("round_{round_num}_sim_{idx}.json");
            let out = env.execute(
                &format!("{play} -o {output_file}"),
                Some(game_dir),
                Some(timeout),
            )?;
            if !out.success() {
                return Ok(out);
            }
            let result = env.execute(&format!("cat {output_file}"), Some(game_dir), None)?;
            env.execute(&format!("rm -f {output_file}"), Some(game_dir), None)?;
            Ok(ExecOutput::new(0, result.output))
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
            .map(|log| Self::parse_sim(log))
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

    fn result_line(winner: &str) -> String {
        format!(
            "{{\"turn\": 1}}\n{{\"winnerId\": \"x\", \"winnerName\": \"{winner}\", \"isDraw\": false}}\n"
        )
    }

    #[test]
    fn test_servers_are_cleaned_up_after_round() {
        let env = Arc::new(
            ScriptedEnvironment::new()
                .on_times("cat round_1_sim", 2, Scripted::ok(result_line("bob")))
                .on("cat round_1_sim", Scripted::ok(result_line("alice"))),
        );
        let arena =
            BattleSnakeArena::new(GameConfig::new("BattleSnake").sims_per_round(3), env.clone())
                .unwrap();
        let ps = players(&["alice", "bob"], env.clone());
        let refs: Vec<&Player> = ps.iter().collect();

        let artifact = arena.execute_round(&refs, 1).unwrap();
        let commands = env.commands();
        assert_eq!(commands[0], "PORT=8001 python main.py &");
        assert_eq!(commands[1], "PORT=8002 python main.py &");
        assert_eq!(
            commands.last().unwrap(),
            "pkill -f 'python main.py' || true"
        );
        assert_eq!(env.commands_matching("pkill").len(), 1);
        assert_eq!(
            env.commands_matching("./battlesnake play --url http://0.0.0.0:8001 -n alice --url http://0.0.0.0:8002 -n bob -o").len(),
            3
        );

        let stats = arena.get_results(&refs, 1, &artifact).unwrap();
        assert_eq!(stats.winner, Winner::player("bob"));
        assert_eq!(stats.scores["bob"], 2.0);
        assert_eq!(stats.scores["alice"], 1.0);
    }

    #[test]
    fn test_servers_are_cleaned_up_on_error() {
        let env = Arc::new(
            ScriptedEnvironment::new().on("battlesnake play", Scripted::Unreachable("gone".into())),
        );
        let arena = BattleSnakeArena::new(GameConfig::new("BattleSnake"), env.clone()).unwrap();
        let ps = players(&["alice", "bob"], env.clone());
        let refs: Vec<&Player> = ps.iter().collect();

        assert!(arena.execute_round(&refs, 1).is_err());
        assert_eq!(
            env.commands().last().unwrap(),
            "pkill -f 'python main.py' || true"
        );
    }

    #[test]
    fn test_timed_out_and_garbled_sims_do_not_vote() {
        let env = Arc::new(ScriptedEnvironment::new());
        let arena = BattleSnakeArena::new(GameConfig::new("BattleSnake"), env.clone()).unwrap();
        let ps = players(&["alice", "bob"], env);
        let refs: Vec<&Player> = ps.iter().collect();

        let artifact = RoundArtifact::from_sims(vec![
            None,
            Some("not json".to_string()),
            Some(result_line("alice")),
            Some(result_line("")),
        ]);
        let stats = arena.get_results(&refs, 2, &artifact).unwrap();
        assert_eq!(stats.winner, Winner::player("alice"));
        assert_eq!(stats.scores["alice"], 1.0);
        assert_eq!(stats.scores["Tie"], 2.0);

        let artifact = RoundArtifact::from_sims(vec![None, None]);
        let stats = arena.get_results(&refs, 2, &artifact).unwrap();
        assert!(stats.winner.is_tie());
    }
}
