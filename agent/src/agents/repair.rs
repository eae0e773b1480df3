//! Belief repair after a prediction diverged from the environment.

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::agents::critic::Critic;
use crate::agents::transition::TransitionRunner;
use crate::core::action::Action;
use crate::core::world::WorldState;
use crate::io::belief_store::BeliefStore;
use crate::io::oracle::Oracle;

/// The synthesis oracle could not produce a table matching the observation.
#[derive(Debug, Error)]
#[error("belief could not be implemented after {attempts} debug attempts: {belief}")]
pub struct ContradictoryBeliefError {
    pub belief: String,
    pub attempts: u32,
}

/// One observed divergence.
#[derive(Debug, Clone, Copy)]
pub struct Mismatch<'a> {
    pub action: Action,
    pub previous: &'a WorldState,
    pub simulated: &'a WorldState,
    pub real: &'a WorldState,
}

/// Revise beliefs and the transition until the transition reproduces
/// `mismatch.real` from `mismatch.previous`.
///
/// Returns the corrected simulated state. After `max_debug_attempts`
/// contrastive rounds without agreement, fails with
/// [`ContradictoryBeliefError`].
#[instrument(skip_all, fields(action = %mismatch.action))]
pub fn repair<I: Oracle, S: Oracle>(
    critic: &Critic<I>,
    runner: &mut TransitionRunner<S>,
    beliefs: &mut BeliefStore,
    max_debug_attempts: u32,
    mismatch: Mismatch<'_>,
) -> Result<WorldState> {
    let Mismatch {
        action,
        previous,
        simulated,
        real,
    } = mismatch;

    let hypotheses = critic.analyze_mismatch(action, previous, simulated, real, beliefs)?;
    let belief = Value::Object(hypotheses).to_string();
    info!(%belief, "implementing revised belief");

    runner.implement_belief(&belief)?;
    let mut current = runner
        .run(previous, action)
        .context("re-run transition after belief update")?;

    let mut attempts = 0u32;
    while current != *real {
        if attempts >= max_debug_attempts {
            error!(%belief, attempts, "belief is likely flawed or contradictory");
            return Err(ContradictoryBeliefError { belief, attempts }.into());
        }
        attempts += 1;
        info!(attempt = attempts, max_debug_attempts, "transition still mispredicts, debugging");
        runner.revise_for_mismatch(&belief, previous, action, &current, real)?;
        current = runner
            .run(previous, action)
            .context("re-run transition after debug round")?;
    }

    info!(attempts, "transition reproduces observation");
    Ok(current)
}
