use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{event, Level};

use super::{apply_vote, last_lines};
use crate::{
    agent::Player,
    arena::{
        majority_vote, player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig,
        RoundArtifact, RoundStats, SimulationPool, Validation, Winner,
    },
    environment::{shell_quote, Environment},
};

const BOT: &str = "airesources/Python/RandomBot.py";
const REPLAY_DIR: &str = "logs";

static RANK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Player\s#(\d+),\s(.*),\scame\sin\srank\s#(\d+)").ok());

/// Halite runs `sims_per_round` independent games per round; the player
/// ranked first most often wins the round.
pub struct HaliteArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
    pool: SimulationPool,
}

impl HaliteArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Result<Self, ArenaError> {
        let pool = SimulationPool::new(config.sim_workers, config.timeout())?;
        Ok(HaliteArena {
            config,
            environment,
            pool,
        })
    }

    /// The player ranked first in one simulation.
    fn parse_sim(log: &str, names: &[String]) -> Winner {
        for line in last_lines(log, names.len() + 1) {
            let Some(caps) = RANK.as_ref().and_then(|re| re.captures(line)) else {
                continue;
            };
            let (Ok(player), Ok(rank)) = (caps[1].parse::<usize>(), caps[3].parse::<usize>())
            else {
                continue;
            };
            if rank == 1 {
                if let Some(name) = player.checked_sub(1).and_then(|idx| names.get(idx)) {
                    return Winner::player(name.as_str());
                }
            }
        }
        Winner::Tie
    }
}

impl Arena for HaliteArena {
    fn name(&self) -> &str {
        "Halite"
    }

    fn config(&self) -> &GameConfig {
        &self.config
    }

    fn validate_code(&self, _player: &Player) -> Result<Validation, ArenaError> {
        Ok(Validation::valid())
    }

    fn execute_round(
        &self,
        players: &[&Player],
        round_num: usize,
    ) -> Result<RoundArtifact, ArenaError> {
        let entries: Vec<String> = players
            .iter()
            .map(|p| shell_quote(&format!("python {}", p.codebase_file(BOT))))
            .collect();
        let base = format!("./environment/halite --replaydirectory {REPLAY_DIR}");
        let cmd = format!(
            "{} {}",
            GameArgs::new(&self.config.args, ArgPrefix::DoubleDash).append_to(&base),
            entries.join(" ")
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
