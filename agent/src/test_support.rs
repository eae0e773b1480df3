//! Test-only doubles for the oracles and the environment, plus grid fixtures.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::action::Action;
use crate::core::physics::{Physics, RuleTable, STANDARD_SOURCE};
use crate::core::world::{Outcome, WorldState};
use crate::io::environment::Environment;
use crate::io::oracle::{CompletionRequest, Oracle};
use crate::io::paths::AgentPaths;

/// A request as seen by a test oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl RecordedRequest {
    fn from_request(request: &CompletionRequest<'_>) -> Self {
        Self {
            system: request.system.to_string(),
            user: request.user.to_string(),
            temperature: request.temperature,
        }
    }
}

/// Oracle answering from a fixed script, one response per call.
///
/// Running out of responses is an error, so tests notice unexpected calls.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }

    /// The `index`-th request received. Panics if there is none.
    pub fn request(&self, index: usize) -> RecordedRequest {
        self.requests.borrow()[index].clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.requests
            .borrow_mut()
            .push(RecordedRequest::from_request(request));
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle has no response left"))
    }
}

/// Oracle giving the same answer to every request.
#[derive(Debug)]
pub struct FixedOracle {
    response: String,
    calls: Cell<usize>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl FixedOracle {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: Cell::new(0),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn request(&self, index: usize) -> RecordedRequest {
        self.requests.borrow()[index].clone()
    }
}

impl Oracle for FixedOracle {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.requests
            .borrow_mut()
            .push(RecordedRequest::from_request(request));
        Ok(self.response.clone())
    }
}

/// Wrap `source` in a fenced code block the way a synthesis oracle answers.
pub fn fenced(source: &str) -> String {
    format!("Here is the table:\n```toml\n{source}```\n")
}

/// In-process game driven by a rule table, with an undo history.
pub struct SimulatedEnvironment {
    physics: RuleTable,
    initial: WorldState,
    state: WorldState,
    history: Vec<WorldState>,
    undo_restores: bool,
    pub sent: Vec<Action>,
    pub undo_calls: Vec<u32>,
    pub loaded_level: Option<u32>,
}

impl SimulatedEnvironment {
    pub fn new(physics_source: &str, initial: WorldState) -> Result<Self> {
        Ok(Self {
            physics: RuleTable::compile(physics_source)?,
            state: initial.clone(),
            initial,
            history: Vec::new(),
            undo_restores: true,
            sent: Vec::new(),
            undo_calls: Vec::new(),
            loaded_level: None,
        })
    }

    /// A game following the usual rules.
    pub fn standard(initial: WorldState) -> Self {
        Self::new(STANDARD_SOURCE, initial).expect("standard rules compile")
    }

    /// Make `undo` acknowledge requests without reverting anything.
    pub fn with_broken_undo(mut self) -> Self {
        self.undo_restores = false;
        self
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }
}

impl Environment for SimulatedEnvironment {
    fn get_state(&mut self) -> Result<WorldState> {
        let mut observed = self.state.clone();
        if observed.outcome() != Outcome::Win {
            observed.set_outcome(Outcome::Ongoing);
        }
        Ok(observed)
    }

    fn send_actions(&mut self, actions: &[Action]) -> Result<()> {
        for &action in actions {
            let next = self.physics.apply(&self.state, action)?;
            self.history.push(std::mem::replace(&mut self.state, next));
            self.sent.push(action);
        }
        Ok(())
    }

    fn undo(&mut self, n: u32) -> Result<()> {
        self.undo_calls.push(n);
        if !self.undo_restores {
            return Ok(());
        }
        for _ in 0..n {
            if let Some(previous) = self.history.pop() {
                self.state = previous;
            }
        }
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.state = self.initial.clone();
        self.history.clear();
        Ok(())
    }

    fn load_level(&mut self, level_id: u32) -> Result<()> {
        self.loaded_level = Some(level_id);
        self.restart()
    }
}

/// A temporary project root with its `.agent/` layout.
pub struct TestProject {
    _dir: TempDir,
    pub paths: AgentPaths,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let paths = AgentPaths::new(dir.path());
        Ok(Self { _dir: dir, paths })
    }
}

fn grid(text: &str) -> WorldState {
    WorldState::from_grid_string(text).expect("fixture grid parses")
}

/// BABA three cells left of the flag.
pub fn corridor() -> WorldState {
    grid(
        "\
y/x | 1 | 2 | 3 | 4
----+---+---+---+---
1   | text_baba | text_is | text_you |
2   | baba | | | flag
3   | text_flag | text_is | text_win |",
    )
}

/// BABA directly left of the flag.
pub fn one_step_from_win() -> WorldState {
    grid(
        "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_baba | text_is | text_you
2   | baba | flag |
3   | text_flag | text_is | text_win",
    )
}

/// A stopping wall between BABA and the flag; the way round is one row down.
pub fn walled_corridor() -> WorldState {
    grid(
        "\
y/x | 1 | 2 | 3 | 4
----+---+---+---+---
1   | text_baba | text_is | text_you |
2   | baba | wall | flag |
3   | | | |
4   | text_flag | text_is | text_win |
5   | text_wall | text_is | text_stop |",
    )
}
