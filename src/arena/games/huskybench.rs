use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{event, Level};

use super::{validate_python_submission, wait_for_servers};
use crate::{
    agent::Player,
    arena::{
        player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig, RoundArtifact,
        RoundStats, Validation,
    },
    environment::{BackgroundGuard, Environment},
};

const CLIENT: &str = "client/main.py";
const LOG_DIR: &str = "/testbed/engine/logs";
const PORT: u16 = 8000;

static FINAL_CHIPS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)player\s+(\S+)\s+final\s+chips:\s*(-?\d+(?:\.\d+)?)").ok()
});

/// Poker. A game engine server deals a number of hands to one client per
/// player; the player holding the most chips at the end wins.
///
/// A broken client simply loses its chips, so players with an invalid
/// submission still take their seat.
pub struct HuskyBenchArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
}

impl HuskyBenchArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Self {
        HuskyBenchArena {
            config,
            environment,
        }
    }

    fn engine_command(&self) -> String {
        let base = format!(
            "python engine/main.py --port {PORT} --sim --sim-rounds {}",
            self.config.sims_per_round
        );
        GameArgs::new(&self.config.args, ArgPrefix::DoubleDash).append_to(&base)
    }
}

impl Arena for HuskyBenchArena {
    fn name(&self) -> &str {
        "HuskyBench"
    }

    fn config(&self) -> &GameConfig {
        &self.config
    }

    fn requires_valid_submission(&self) -> bool {
        false
    }

    fn validate_code(&self, player: &Player) -> Result<Validation, ArenaError> {
        validate_python_submission(player, CLIENT)
    }

    fn execute_round(
        &self,
        players: &[&Player],
        round_num: usize,
    ) -> Result<RoundArtifact, ArenaError> {
        let env = self.environment.as_ref();
        env.execute(&format!("rm -rf {LOG_DIR}; mkdir -p {LOG_DIR}"), None, None)?;

        let engine = self.engine_command();
        event!(Level::INFO, round = round_num, "Starting engine: {engine}");
        let mut guard = BackgroundGuard::new(env);
        guard.spawn(
            &format!("{engine} > {LOG_DIR}/engine.log 2>&1"),
            None,
            "pkill -f 'python engine/main.py' || true",
        )?;
        wait_for_servers(env)?;
        for player in players {
            guard.spawn(
                &format!(
                    "python {CLIENT} --port {PORT} > {LOG_DIR}/{}.log 2>&1",
                    player.name()
                ),
                Some(player.codebase()),
                format!("pkill -f 'python {CLIENT}' || true"),
            )?;
        }

        // The engine exits once every hand is played.
        let wait = "while pgrep -f 'python engine/main.py' > /dev/null; do sleep 1; done";
        env.execute(wait, None, Some(self.config.timeout()))?;

        let log = env.execute(&format!("cat {LOG_DIR}/engine.log"), None, None)?;
        Ok(RoundArtifact::from_output(log.output))
    }

    fn get_results(
        &self,
        players: &[&Player],
        round_num: usize,
        artifact: &RoundArtifact,
    ) -> Result<RoundStats, ArenaError> {
        let names = player_names(players);
        let mut stats = RoundStats::new(round_num, &names);
        let mut found = false;
        // Later lines overwrite earlier ones.
        for caps in artifact
            .result_output
            .lines()
            .filter_map(|line| FINAL_CHIPS.as_ref()?.captures(line))
        {
            let name = &caps[1];
            if !names.iter().any(|n| n == name) {
                continue;
            }
            if let Ok(chips) = caps[2].parse::<f64>() {
                stats.set_score(name, chips);
                found = true;
            }
        }
        if found {
            let leader = stats.leader();
            stats.set_winner(leader);
        } else {
            event!(Level::WARN, round = round_num, "No chip counts in engine log");
        }
        Ok(stats)
    }
}
