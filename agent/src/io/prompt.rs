//! Oracle prompts rendered from templates compiled into the binary.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::physics::Behaviour;

const CRITIC_SYSTEM: &str = include_str!("prompts/critic.system.md");
const CRITIC_INFER: &str = include_str!("prompts/critic_infer.md");
const CRITIC_MISMATCH: &str = include_str!("prompts/critic_mismatch.md");
const SYNTHESIS_SYSTEM: &str = include_str!("prompts/synthesis.system.md");
const SYNTH_BELIEF: &str = include_str!("prompts/synth_belief.md");
const SYNTH_ERROR: &str = include_str!("prompts/synth_error.md");
const SYNTH_MISMATCH: &str = include_str!("prompts/synth_mismatch.md");

/// A rendered system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Inputs for the contrastive repair prompt.
#[derive(Debug, Clone, Copy)]
pub struct MismatchPrompt<'a> {
    pub source: &'a str,
    pub belief: &'a str,
    pub previous: &'a str,
    pub action: &'a str,
    pub predicted: &'a str,
    pub observed: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("critic.system", CRITIC_SYSTEM),
            ("critic_infer", CRITIC_INFER),
            ("critic_mismatch", CRITIC_MISMATCH),
            ("synthesis.system", SYNTHESIS_SYSTEM),
            ("synth_belief", SYNTH_BELIEF),
            ("synth_error", SYNTH_ERROR),
            ("synth_mismatch", SYNTH_MISMATCH),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt template should be valid");
        }
        Self { env }
    }

    fn critic(&self, user: String) -> Result<Prompt> {
        let system = self.env.get_template("critic.system")?.render(context! {})?;
        Ok(Prompt { system, user })
    }

    fn synthesis(&self, user: String) -> Result<Prompt> {
        let behaviours: Vec<&str> = Behaviour::ALL.iter().map(|b| b.as_str()).collect();
        let system = self
            .env
            .get_template("synthesis.system")?
            .render(context! { behaviours => behaviours })?;
        Ok(Prompt { system, user })
    }

    /// Ask which properties control the player and which win.
    pub fn infer_player_and_win(&self, active_rules: &str) -> Result<Prompt> {
        let user = self.env.get_template("critic_infer")?.render(context! {
            active_rules => active_rules.trim(),
        })?;
        self.critic(user)
    }

    /// Ask for revised beliefs explaining an observed divergence.
    pub fn analyze_mismatch(
        &self,
        action: &str,
        active_rules: &str,
        beliefs: &str,
        differences: &str,
    ) -> Result<Prompt> {
        let beliefs = beliefs.trim();
        let user = self.env.get_template("critic_mismatch")?.render(context! {
            action => action,
            active_rules => active_rules.trim(),
            beliefs => (!beliefs.is_empty() && beliefs != "{}").then_some(beliefs),
            differences => differences.trim(),
        })?;
        self.critic(user)
    }

    /// Ask for a table implementing `beliefs`.
    pub fn implement_belief(&self, source: &str, beliefs: &str) -> Result<Prompt> {
        let user = self.env.get_template("synth_belief")?.render(context! {
            source => source.trim(),
            beliefs => beliefs.trim(),
        })?;
        self.synthesis(user)
    }

    /// Ask for a table that no longer faults.
    pub fn repair_fault(&self, source: &str, kind: &str, message: &str) -> Result<Prompt> {
        let user = self.env.get_template("synth_error")?.render(context! {
            source => source.trim(),
            kind => kind,
            message => message.trim(),
        })?;
        self.synthesis(user)
    }

    /// Ask for a table that predicts the observed transition.
    pub fn revise_for_mismatch(&self, input: &MismatchPrompt<'_>) -> Result<Prompt> {
        let user = self.env.get_template("synth_mismatch")?.render(context! {
            source => input.source.trim(),
            belief => input.belief.trim(),
            previous => input.previous,
            action => input.action,
            predicted => input.predicted,
            observed => input.observed,
        })?;
        self.synthesis(user)
    }
}
