use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Winner;

/// What to do when the most-voted participants are level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// A level vote, or no decisive simulation at all, is a tie.
    #[default]
    Tie,
    /// Level leaders resolve to whichever comes first in player order. A
    /// vote with no decisive simulation is still a tie.
    FirstListed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    pub winner: Winner,
    /// Number of simulations each participant won. Every participant is
    /// present, with zero when they won nothing.
    pub counts: BTreeMap<String, usize>,
    /// Simulations with no decisive winner.
    pub ties: usize,
}

/// Resolve a round from per simulation outcomes.
///
/// Each entry of `votes` is the winner of one simulation. Votes for names
/// outside `players` are ignored.
pub fn majority_vote<S: AsRef<str>>(players: &[S], votes: &[Winner], policy: TiePolicy) -> VoteOutcome {
    let mut counts: BTreeMap<String, usize> = players
        .iter()
        .map(|p| (p.as_ref().to_string(), 0))
        .collect();
    let mut ties = 0;
    for vote in votes {
        match vote {
            Winner::Player(name) => {
                if let Some(c) = counts.get_mut(name) {
                    *c += 1;
                }
            }
            Winner::Tie => ties += 1,
        }
    }

    let max = counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<&str> = players
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| counts.get(*p).copied() == Some(max))
        .collect();

    let winner = if max == 0 {
        Winner::Tie
    } else if leaders.len() == 1 {
        Winner::player(leaders[0])
    } else {
        match policy {
            TiePolicy::Tie => Winner::Tie,
            TiePolicy::FirstListed => Winner::player(leaders[0]),
        }
    };

    VoteOutcome {
        winner,
        counts,
        ties,
    }
}
