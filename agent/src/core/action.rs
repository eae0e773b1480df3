//! Closed set of agent actions and their grid deltas.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// A single agent action.
///
/// Iteration order of [`Action::ALL`] is the expansion order used by the
/// planners, so it is part of the observable behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Still,
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Still,
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
    ];

    /// Offset applied to `(x, y)`, where `x` is the row and `y` the column.
    pub fn delta(self) -> (i64, i64) {
        match self {
            Action::Still => (0, 0),
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }

    /// Command name understood by the game bridge.
    pub fn wire_name(self) -> &'static str {
        match self {
            Action::Still => "idle",
            Action::Up => "up",
            Action::Down => "down",
            Action::Left => "left",
            Action::Right => "right",
        }
    }

    /// Upper-case name used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Action::Still => "STILL",
            Action::Up => "UP",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let action = match s.trim().to_ascii_lowercase().as_str() {
            "still" | "idle" => Action::Still,
            "up" => Action::Up,
            "down" => Action::Down,
            "left" => Action::Left,
            "right" => Action::Right,
            other => bail!("unknown action {other:?}"),
        };
        Ok(action)
    }
}

/// Format a plan as a comma-separated list of upper-case labels.
pub fn format_plan(plan: &[Action]) -> String {
    plan.iter()
        .map(|action| action.label())
        .collect::<Vec<_>>()
        .join(", ")
}
