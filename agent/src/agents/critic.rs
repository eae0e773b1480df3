//! Critic: asks the inference oracle for rule hypotheses and merges them into
//! the belief store.

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::core::action::Action;
use crate::core::diff::format_tile_diffs;
use crate::core::extract::extract_json_object;
use crate::core::world::WorldState;
use crate::io::belief_store::{BeliefStore, render_beliefs};
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::prompt::{Prompt, PromptEngine};

/// Property names granted by any rule active in one of `states`.
pub fn rule_predicates(states: &[&WorldState]) -> Vec<String> {
    let mut names: Vec<String> = states
        .iter()
        .flat_map(|state| state.active_properties())
        .collect();
    names.sort();
    names.dedup();
    names
}

pub struct Critic<O> {
    oracle: O,
    prompts: PromptEngine,
    temperature: f32,
}

impl<O: Oracle> Critic<O> {
    pub fn new(oracle: O, temperature: f32) -> Self {
        Self {
            oracle,
            prompts: PromptEngine::new(),
            temperature,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Hypothesise which properties control the player and which win.
    #[instrument(skip_all)]
    pub fn infer_player_and_win_condition(
        &self,
        state: &WorldState,
        beliefs: &mut BeliefStore,
    ) -> Result<Map<String, Value>> {
        info!(rules = %state.rules_text(), "inferring player and win condition");
        let prompt = self.prompts.infer_player_and_win(&state.rules_text())?;
        self.ask(&prompt, beliefs)
    }

    /// Hypothesise why `real` differs from `simulated` after `action`.
    ///
    /// Only beliefs about properties active in one of the three states are
    /// shown to the oracle.
    #[instrument(skip_all, fields(action = %action))]
    pub fn analyze_mismatch(
        &self,
        action: Action,
        previous: &WorldState,
        simulated: &WorldState,
        real: &WorldState,
        beliefs: &mut BeliefStore,
    ) -> Result<Map<String, Value>> {
        let differences = format_tile_diffs(previous, simulated, real);
        info!(%differences, "analyzing discrepancy");

        let predicates = rule_predicates(&[previous, simulated, real]);
        let context = render_beliefs(&beliefs.restricted_to(&predicates))?;
        let prompt = self.prompts.analyze_mismatch(
            action.label(),
            &previous.rules_text(),
            &context,
            &differences,
        )?;
        self.ask(&prompt, beliefs)
    }

    /// Send `prompt`; merge and return whatever JSON object comes back.
    fn ask(&self, prompt: &Prompt, beliefs: &mut BeliefStore) -> Result<Map<String, Value>> {
        let response = self.oracle.complete(&CompletionRequest {
            system: &prompt.system,
            user: &prompt.user,
            temperature: self.temperature,
        })?;
        let hypotheses = extract_json_object(&response).unwrap_or_default();
        if !hypotheses.is_empty() {
            info!(properties = ?hypotheses.keys().collect::<Vec<_>>(), "merging new beliefs");
            beliefs.merge(hypotheses.clone())?;
        }
        Ok(hypotheses)
    }
}
