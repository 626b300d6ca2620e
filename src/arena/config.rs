use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use super::{ArgValue, TiePolicy};

fn default_sims_per_round() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_sim_workers() -> usize {
    5
}

/// The `game` section of a tournament configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub name: String,
    #[serde(default = "default_sims_per_round")]
    pub sims_per_round: usize,
    /// Extra arguments for the game binary.
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
    /// Timeout of a single game command or simulation trial.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Size of the worker pool running simulation trials.
    #[serde(default = "default_sim_workers")]
    pub sim_workers: usize,
    #[serde(default)]
    pub tie_policy: TiePolicy,
    /// Game specific settings, for example the battle properties of
    /// RoboCode.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub battle: serde_json::Value,
}

impl GameConfig {
    pub fn new(name: impl Into<String>) -> Self {
        GameConfig {
            name: name.into(),
            sims_per_round: default_sims_per_round(),
            args: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            sim_workers: default_sim_workers(),
            tie_policy: TiePolicy::default(),
            battle: serde_json::Value::Null,
        }
    }

    pub fn sims_per_round(mut self, sims: usize) -> Self {
        self.sims_per_round = sims;
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn sim_workers(mut self, workers: usize) -> Self {
        self.sim_workers = workers;
        self
    }

    pub fn tie_policy(mut self, policy: TiePolicy) -> Self {
        self.tie_policy = policy;
        self
    }

    pub fn battle(mut self, battle: serde_json::Value) -> Self {
        self.battle = battle;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
