use std::{
    path::Path,
    sync::{Arc, LazyLock},
};

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{event, Level};

use super::check_submission_file;
use crate::{
    agent::Player,
    arena::{
        player_names, ArgPrefix, Arena, ArenaError, GameArgs, GameConfig, RoundArtifact,
        RoundStats, Validation, Winner,
    },
    environment::{assert_zero_exit_code, write_file, Environment},
};

const SUBMISSION: &str = "robots/custom/MyTank.java";
const ROBOT_DIR: &str = "robots/custom";

/// `1st: alice.MyTank*   1234 (52%) ...`
static RESULT_ROW: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\w*:\s+(\S+)\s+(-?\d+(?:\.\d+)?)").ok());

fn default_battle() -> Value {
    json!({
        "battle": {
            "numRounds": 10,
            "gunCoolingRate": 0.1,
            "rules": {"inactivityTime": 450, "hideEnemyNames": true},
        },
        "battleField": {"width": 800, "height": 600},
    })
}

/// Recursively merge `user` into `base`. Nested objects merge, anything
/// else replaces.
fn merge(base: &mut Map<String, Value>, user: &Map<String, Value>) {
    for (key, value) in user {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(overrides)) => merge(existing, overrides),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn flatten(map: &Map<String, Value>, prefix: &str, lines: &mut Vec<String>) {
    for (key, value) in map {
        match value {
            Value::Object(inner) => flatten(inner, &format!("{prefix}{key}."), lines),
            Value::String(s) => lines.push(format!("robocode.{prefix}{key}={s}")),
            other => lines.push(format!("robocode.{prefix}{key}={other}")),
        }
    }
}

/// The properties of a `.battle` file: defaults overridden by the `battle`
/// section of the game configuration.
pub(crate) fn battle_properties(user: &Value) -> String {
    let mut battle = match default_battle() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(overrides) = user {
        merge(&mut battle, overrides);
    }
    let mut lines = vec!["#Battle Properties".to_string()];
    flatten(&battle, "", &mut lines);
    lines.join("\n")
}

/// Java tanks. Every player's robot is copied into the game, renamed into
/// its own package and compiled; then one battle decides the round.
pub struct RoboCodeArena {
    config: GameConfig,
    environment: Arc<dyn Environment>,
}

impl RoboCodeArena {
    pub fn new(config: GameConfig, environment: Arc<dyn Environment>) -> Self {
        RoboCodeArena {
            config,
            environment,
        }
    }

    fn install_robot(&self, player: &Player) -> Result<(), ArenaError> {
        let env = self.environment.as_ref();
        let name = player.name();
        for cmd in [
            format!("mkdir -p robots/{name}"),
            format!("cp -r {}/* robots/{name}/", player.codebase_file(ROBOT_DIR)),
            format!("find robots/{name}/ -name '*.java' -exec sed -i 's/custom/{name}/g' {{}} +"),
        ] {
            assert_zero_exit_code(env.execute(&cmd, None, None)?, &cmd)?;
        }
        let javac = format!("javac -cp \"libs/robocode.jar\" robots/{name}/*.java");
        let out = env.execute(&javac, None, Some(self.config.timeout()))?;
        if !out.success() {
            // The battle goes ahead without the robot.
            event!(
                Level::WARN,
                player = %name,
                "Robot failed to compile:\n{}",
                out.output
            );
        }
        Ok(())
    }
}

impl Arena for RoboCodeArena {
    fn name(&self) -> &str {
        "RoboCode"
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
        for player in players {
            self.install_robot(player)?;
        }

        let env = self.environment.as_ref();
        let selected = players
            .iter()
            .map(|p| format!("{}.MyTank*", p.name()))
            .collect::<Vec<_>>()
            .join(",");
        let battle_file = format!("battles/round_{round_num}.battle");
        let content = format!(
            "{}\nrobocode.battle.selectedRobots={selected}\n",
            battle_properties(&self.config.battle)
        );
        write_file(env, Path::new(&battle_file), &content)?;

        let results_file = format!("results_round_{round_num}.txt");
        let cmd = format!(
            "{} -battle {battle_file} -results {results_file}",
            GameArgs::new(&self.config.args, ArgPrefix::SingleDash).append_to("./robocode.sh")
        );
        event!(Level::INFO, round = round_num, "Running game: {cmd}");
        let out = env.execute(&cmd, None, Some(self.config.timeout()))?;
        let out = assert_zero_exit_code(out, &cmd)?;
        let results = env.execute(&format!("cat {results_file}"), None, None)?;
        env.execute(&format!("rm -f {results_file}"), None, None)?;

        Ok(RoundArtifact {
            log_output: out.output,
            result_output: results.output,
            ..Default::default()
        })
    }

    fn get_results(
        &self,
        players: &[&Player],
        round_num: usize,
        artifact: &RoundArtifact,
    ) -> Result<RoundStats, ArenaError> {
        let names = player_names(players);
        let mut stats = RoundStats::new(round_num, &names);
        let lines: Vec<&str> = artifact.result_output.trim().lines().collect();

        for line in lines.iter().skip(1) {
            let Some(caps) = RESULT_ROW.as_ref().and_then(|re| re.captures(line)) else {
                continue;
            };
            let robot = caps[1].rsplit_once('.').map_or(&caps[1], |(pkg, _)| pkg);
            if let (true, Ok(score)) = (names.iter().any(|n| n == robot), caps[2].parse::<f64>()) {
                stats.set_score(robot, score);
            }
        }

        // The second line names the winner.
        let winner = lines
            .get(1)
            .and_then(|line| line.split_whitespace().nth(1))
            .map(|robot| robot.rsplit_once('.').map_or(robot, |(pkg, _)| pkg))
            .map_or(Winner::Tie, |robot| Winner::player(robot));
        stats.set_winner(winner);
        Ok(stats)
    }
}
