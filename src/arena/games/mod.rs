//! The concrete games.
mod battlecode;
mod battlesnake;
mod corewar;
mod dummy;
mod halite;
mod huskybench;
mod robocode;
mod robotrumble;

use std::{sync::Arc, time::Duration};

use super::{Arena, ArenaError, GameConfig, RoundStats, Validation, VoteOutcome};
use crate::{agent::Player, environment::Environment};

pub use battlecode::BattleCodeArena;
pub use battlesnake::BattleSnakeArena;
pub use corewar::CoreWarArena;
pub use dummy::DummyArena;
pub use halite::HaliteArena;
pub use huskybench::HuskyBenchArena;
pub use robocode::RoboCodeArena;
pub use robotrumble::RobotRumbleArena;

/// Every game the registry knows about.
pub const ARENA_NAMES: [&str; 8] = [
    "BattleCode",
    "BattleSnake",
    "CoreWar",
    "Dummy",
    "Halite",
    "HuskyBench",
    "RoboCode",
    "RobotRumble",
];

/// Looks up games by name.
pub struct ArenaRegistry;

impl ArenaRegistry {
    /// Create the arena named by `config.name`, running its commands in
    /// `environment`.
    pub fn create(
        config: &GameConfig,
        environment: Arc<dyn Environment>,
    ) -> Result<Box<dyn Arena>, ArenaError> {
        let config = config.clone();
        let arena: Box<dyn Arena> = match config.name.as_str() {
            "BattleCode" => Box::new(BattleCodeArena::new(config, environment)),
            "BattleSnake" => Box::new(BattleSnakeArena::new(config, environment)?),
            "CoreWar" => Box::new(CoreWarArena::new(config, environment)),
            "Dummy" => Box::new(DummyArena::new(config, environment)),
            "Halite" => Box::new(HaliteArena::new(config, environment)?),
            "HuskyBench" => Box::new(HuskyBenchArena::new(config, environment)),
            "RoboCode" => Box::new(RoboCodeArena::new(config, environment)),
            "RobotRumble" => Box::new(RobotRumbleArena::new(config, environment)?),
            other => return Err(ArenaError::UnknownGame(other.to_string())),
        };
        Ok(arena)
    }

    pub fn names() -> &'static [&'static str] {
        &ARENA_NAMES
    }
}

/// Shorthand for [`ArenaRegistry::create`].
pub fn create_arena(
    config: &GameConfig,
    environment: Arc<dyn Environment>,
) -> Result<Box<dyn Arena>, ArenaError> {
    ArenaRegistry::create(config, environment)
}

/// How long to give freshly started servers before connecting to them.
pub(crate) const SERVER_STARTUP: Duration = Duration::from_secs(3);

/// Block until servers started in the background are up.
///
/// The wait runs inside the environment so it applies to wherever the
/// servers live.
pub(crate) fn wait_for_servers(environment: &dyn Environment) -> Result<(), ArenaError> {
    let secs = SERVER_STARTUP.as_secs();
    environment.execute(&format!("sleep {secs}"), None, Some(SERVER_STARTUP * 2))?;
    Ok(())
}

/// Check that `file` exists in the player's codebase and is not empty.
///
/// `Ok(Some(..))` carries the reason the submission is invalid.
pub(crate) fn check_submission_file(
    player: &Player,
    file: &str,
) -> Result<Option<Validation>, ArenaError> {
    let env = player.environment();
    let exists = env.execute(&format!("test -f {file} && echo 'exists'"), None, None)?;
    if !exists.output.contains("exists") {
        return Ok(Some(Validation::invalid(format!(
            "Submission file '{file}' not found"
        ))));
    }
    let content = env.execute(&format!("cat {file}"), None, None)?;
    if content.output.trim().is_empty() {
        return Ok(Some(Validation::invalid(format!(
            "Submission file '{file}' is empty"
        ))));
    }
    Ok(None)
}

/// Check that a Python `file` in the player's codebase compiles.
pub(crate) fn check_python_syntax(
    player: &Player,
    file: &str,
) -> Result<Option<Validation>, ArenaError> {
    let out = player
        .environment()
        .execute(&format!("python -m py_compile {file}"), None, None)?;
    if out.success() {
        Ok(None)
    } else {
        Ok(Some(Validation::invalid(format!(
            "Python syntax error in '{file}':\n{}",
            out.output
        ))))
    }
}

/// Validate a single file Python submission.
pub(crate) fn validate_python_submission(
    player: &Player,
    file: &str,
) -> Result<Validation, ArenaError> {
    if let Some(invalid) = check_submission_file(player, file)? {
        return Ok(invalid);
    }
    if let Some(invalid) = check_python_syntax(player, file)? {
        return Ok(invalid);
    }
    Ok(Validation::valid())
}

/// Record the outcome of a majority vote: simulations won per player, the
/// number of undecided simulations and the round winner.
pub(crate) fn apply_vote(stats: &mut RoundStats, outcome: VoteOutcome) {
    for (name, count) in &outcome.counts {
        stats.set_score(name, *count as f64);
    }
    stats.set_tie_count(outcome.ties as f64);
    stats.set_winner(outcome.winner);
}

/// The last `n` non-empty lines of `text`, in order.
pub(crate) fn last_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{Scripted, ScriptedEnvironment};

    #[test]
    fn test_registry_knows_every_game() {
        for name in ArenaRegistry::names() {
            let arena = create_arena(&GameConfig::new(*name), Arc::new(ScriptedEnvironment::new()))
                .unwrap();
            assert_eq!(arena.name(), *name);
        }
    }

    #[test]
    fn test_unknown_game() {
        let err = create_arena(&GameConfig::new("Chess"), Arc::new(ScriptedEnvironment::new()))
            .err()
            .unwrap();
        assert!(matches!(err, ArenaError::UnknownGame(name) if name == "Chess"));
    }

    #[test]
    fn test_validate_python_submission() {
        let env = Arc::new(
            ScriptedEnvironment::new()
                .on("test -f", Scripted::ok("exists"))
                .on("cat main.py", Scripted::ok("print('hi')"))
                .on("py_compile", Scripted::exit(1, "SyntaxError: invalid syntax")),
        );
        let players = test_players::players(&["alice"], env);
        let validation = validate_python_submission(&players[0], "main.py").unwrap();
        assert!(!validation.ok);
        assert!(validation.reason.unwrap().contains("SyntaxError"));
    }

    #[test]
    fn test_missing_and_empty_submission() {
        let env = Arc::new(ScriptedEnvironment::new().on("test -f", Scripted::exit(1, "")));
        let players = test_players::players(&["alice"], env);
        let validation = validate_python_submission(&players[0], "main.py").unwrap();
        assert_eq!(
            validation.reason.as_deref(),
            Some("Submission file 'main.py' not found")
        );

        let env = Arc::new(
            ScriptedEnvironment::new()
                .on("test -f", Scripted::ok("exists"))
                .on("cat", Scripted::ok("  \n")),
        );
        let players = test_players::players(&["alice"], env);
        let validation = validate_python_submission(&players[0], "main.py").unwrap();
        assert_eq!(
            validation.reason.as_deref(),
            Some("Submission file 'main.py' is empty")
        );
    }

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc\n\n", 2), vec!["b", "c"]);
        assert_eq!(last_lines("a", 3), vec!["a"]);
        assert!(last_lines("", 3).is_empty());
    }
}
