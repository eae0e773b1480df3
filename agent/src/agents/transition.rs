//! Transition runner: executes the installed physics table and replaces it
//! through the synthesis oracle when it faults or mispredicts.
//!
//! The installed source is only ever replaced whole. Each replacement is
//! persisted and compiled lazily on the next step, so a broken table shows
//! up as a fault during execution and drives the resynthesis loop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::action::Action;
use crate::core::extract::extract_code_block;
use crate::core::physics::{Physics, PhysicsError, RuleTable};
use crate::core::world::WorldState;
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::paths::write_atomic;
use crate::io::prompt::{MismatchPrompt, Prompt, PromptEngine};
use crate::planner::Transition;

/// Source installed before anything has been learned: the no-op table.
pub const PLACEHOLDER_SOURCE: &str = "";

/// The table kept faulting after every allowed resynthesis round.
#[derive(Debug, Error)]
#[error("transition still faulting after {attempts} resynthesis attempts ({kind}: {message})")]
pub struct ResynthesisExhaustedError {
    pub attempts: u32,
    pub kind: &'static str,
    pub message: String,
}

/// What the synthesis oracle is told about a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    pub kind: &'static str,
    pub message: String,
    pub source: String,
}

impl FaultReport {
    fn new(err: &PhysicsError, source: &str) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            source: source.to_string(),
        }
    }
}

enum Stage {
    Executing,
    Faulted(FaultReport),
    Resynthesizing(FaultReport),
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub temperature: f32,
    pub max_resynthesis_attempts: u32,
}

/// Owns the installed transition source and its compiled form.
pub struct TransitionRunner<O> {
    oracle: O,
    prompts: PromptEngine,
    settings: RunnerSettings,
    source: String,
    compiled: Option<RuleTable>,
    path: Option<PathBuf>,
    installs: u32,
}

impl<O: Oracle> TransitionRunner<O> {
    /// A runner holding the placeholder source, not yet persisted anywhere.
    pub fn new(oracle: O, settings: RunnerSettings) -> Self {
        Self {
            oracle,
            prompts: PromptEngine::new(),
            settings,
            source: PLACEHOLDER_SOURCE.to_string(),
            compiled: None,
            path: None,
            installs: 0,
        }
    }

    /// Persist every future replacement to `path`.
    pub fn persist_to(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// Adopt the source stored at `path`, if any, and persist to it from now on.
    ///
    /// Returns `true` when a stored source was found.
    pub fn restore(&mut self, path: &Path) -> Result<bool> {
        self.persist_to(path);
        if !path.exists() {
            debug!(path = %path.display(), "no stored transition source");
            return Ok(false);
        }
        let source =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        info!(path = %path.display(), bytes = source.len(), "restored transition source");
        self.source = source;
        self.compiled = None;
        Ok(true)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of sources installed since construction.
    pub fn installs(&self) -> u32 {
        self.installs
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Replace the installed source whole and persist it.
    pub fn install(&mut self, source: impl Into<String>) -> Result<()> {
        self.source = source.into();
        self.compiled = None;
        self.installs += 1;
        if let Some(path) = &self.path {
            write_atomic(path, &self.source)
                .with_context(|| format!("persist transition source {}", path.display()))?;
        }
        info!(bytes = self.source.len(), installs = self.installs, "installed transition source");
        Ok(())
    }

    /// Predict the successor of `state` under `action`.
    ///
    /// Faults trigger resynthesis and a retry of the same step, up to the
    /// configured ceiling.
    #[instrument(skip_all, fields(action = %action))]
    pub fn run(&mut self, state: &WorldState, action: Action) -> Result<WorldState> {
        let mut stage = Stage::Executing;
        let mut attempts = 0u32;
        loop {
            stage = match stage {
                Stage::Executing => match self.execute(state, action) {
                    Ok(next) => return Ok(next),
                    Err(err) => Stage::Faulted(FaultReport::new(&err, &self.source)),
                },
                Stage::Faulted(report) => {
                    warn!(kind = report.kind, message = %report.message, attempts, "transition faulted");
                    if attempts >= self.settings.max_resynthesis_attempts {
                        return Err(ResynthesisExhaustedError {
                            attempts,
                            kind: report.kind,
                            message: report.message,
                        }
                        .into());
                    }
                    attempts += 1;
                    Stage::Resynthesizing(report)
                }
                Stage::Resynthesizing(report) => {
                    let prompt =
                        self.prompts
                            .repair_fault(&report.source, report.kind, &report.message)?;
                    self.synthesize(&prompt)
                        .context("resynthesize faulting transition")?;
                    Stage::Executing
                }
            };
        }
    }

    fn execute(&mut self, state: &WorldState, action: Action) -> Result<WorldState, PhysicsError> {
        let table = match self.compiled.take() {
            Some(table) => table,
            None => RuleTable::compile(&self.source)?,
        };
        let next = table.apply(state, action);
        self.compiled = Some(table);
        next
    }

    /// Ask for a table implementing the given beliefs.
    ///
    /// Returns `false` when the response carried no code block and the
    /// installed source was kept.
    pub fn implement_belief(&mut self, beliefs: &str) -> Result<bool> {
        let prompt = self.prompts.implement_belief(&self.source, beliefs)?;
        self.synthesize(&prompt)
            .context("synthesize transition for beliefs")
    }

    /// Ask for a table that turns `previous` into `observed` under `action`.
    pub fn revise_for_mismatch(
        &mut self,
        belief: &str,
        previous: &WorldState,
        action: Action,
        predicted: &WorldState,
        observed: &WorldState,
    ) -> Result<bool> {
        let prompt = self.prompts.revise_for_mismatch(&MismatchPrompt {
            source: &self.source,
            belief,
            previous: &previous.to_grid_string(),
            action: action.label(),
            predicted: &predicted.to_grid_string(),
            observed: &observed.to_grid_string(),
        })?;
        self.synthesize(&prompt)
            .context("revise transition for mismatch")
    }

    fn synthesize(&mut self, prompt: &Prompt) -> Result<bool> {
        let response = self.oracle.complete(&CompletionRequest {
            system: &prompt.system,
            user: &prompt.user,
            temperature: self.settings.temperature,
        })?;
        match extract_code_block(&response) {
            Some(source) => {
                self.install(source)?;
                Ok(true)
            }
            None => {
                warn!("synthesis response has no code block, keeping installed source");
                Ok(false)
            }
        }
    }
}

impl<O: Oracle> Transition for TransitionRunner<O> {
    fn step(&mut self, state: &WorldState, action: Action) -> Result<WorldState> {
        self.run(state, action)
    }
}
