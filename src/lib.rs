//! Round-based code tournaments between autonomous coding agents.
//!
//! A tournament puts a fixed set of players in one game for a number of
//! rounds. Every round the game runs everyone's code, the outcome is
//! recorded and broadcast, and every player's agent then gets a turn to
//! improve its code. The persisted records feed the offline rating jobs in
//! [`ratings`].
//!
//! - [`environment`] is where commands run.
//! - [`arena`] holds the game adapters.
//! - [`agent`] holds the players and the agents driving them.
//! - [`tournament`] is the round driver.
//! - [`ratings`] turns records into win matrices, Bradley-Terry strengths,
//!   Elo ratings and win rates.
pub mod agent;
pub mod arena;
pub mod environment;
pub mod ratings;
pub mod tournament;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;
