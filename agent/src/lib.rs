//! Belief-revision planning agent for rule-rewriting grid puzzles.
//!
//! The agent plans against a transition function it believes in, executes
//! the plan in the real game and repairs its beliefs whenever the game
//! disagrees. The crate keeps a strict split:
//!
//! - **[`core`]**: pure world model, rule-table physics and diffs. No I/O.
//! - **[`planner`]**: breadth-first and width-based search over a
//!   [`planner::Transition`].
//! - **[`io`]**: configuration, persistence, prompts and the HTTP clients for
//!   the game bridge and the oracles.
//! - **[`agents`]**: the critic, the transition runner and belief repair.
//!
//! [`reconcile`] ties them together into the episode loop behind `agent run`.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planner;
pub mod reconcile;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
