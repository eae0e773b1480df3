//! Persistent store of rule beliefs (`.agent/memory/beliefs.json`).
//!
//! Beliefs are keyed by lowercase property name and merged last-write-wins.
//! Every update is written through to disk when the store has a path.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::io::paths::write_atomic;

/// A hypothesis about what one rule property does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleBelief {
    pub description: String,
    #[serde(default)]
    pub last_rationale: String,
}

/// Any belief value the inference oracle may return.
///
/// Values that are not a [`RuleBelief`] or a plain string are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Belief {
    Rule(RuleBelief),
    Text(String),
    Raw(Value),
}

impl Belief {
    /// Human-readable description used in prompts and logs.
    pub fn description(&self) -> String {
        match self {
            Belief::Rule(rule) => rule.description.clone(),
            Belief::Text(text) => text.clone(),
            Belief::Raw(value) => value.to_string(),
        }
    }
}

/// Rule beliefs, owned by the agent and passed explicitly to whoever updates them.
#[derive(Debug, Clone, Default)]
pub struct BeliefStore {
    beliefs: BTreeMap<String, Belief>,
    path: Option<PathBuf>,
}

impl BeliefStore {
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// An empty store that persists to `path` on every update.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            beliefs: BTreeMap::new(),
            path: Some(path.into()),
        }
    }

    /// Open the store at `path`, loading any beliefs saved there.
    ///
    /// A corrupted file is reported and the store starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::at(path.clone());
        if !path.exists() {
            debug!(path = %path.display(), "no stored beliefs");
            return Ok(store);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        match serde_json::from_str::<BTreeMap<String, Belief>>(&contents) {
            Ok(beliefs) => {
                info!(path = %path.display(), count = beliefs.len(), "loaded stored beliefs");
                store.beliefs = beliefs;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "beliefs file is corrupted, starting empty");
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Belief> {
        self.beliefs.get(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Belief)> {
        self.beliefs.iter()
    }

    /// Merge `hypotheses` into the store and persist the result.
    ///
    /// Keys are lowercased; a key already present is overwritten.
    pub fn merge(&mut self, hypotheses: Map<String, Value>) -> Result<()> {
        if hypotheses.is_empty() {
            return Ok(());
        }
        for (name, value) in hypotheses {
            let belief: Belief =
                serde_json::from_value(value).context("convert hypothesis to belief")?;
            self.beliefs.insert(name.to_lowercase(), belief);
        }
        self.save()
    }

    /// Beliefs whose names appear in `names`.
    pub fn restricted_to(&self, names: &[String]) -> BTreeMap<String, Belief> {
        names
            .iter()
            .filter_map(|name| {
                let key = name.to_lowercase();
                self.beliefs.get(&key).map(|belief| (key, belief.clone()))
            })
            .collect()
    }

    /// All beliefs rendered as pretty JSON for prompts.
    pub fn to_json(&self) -> Result<String> {
        render_beliefs(&self.beliefs)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut buf = render_beliefs(&self.beliefs)?;
        buf.push('\n');
        write_atomic(path, &buf)?;
        debug!(path = %path.display(), count = self.beliefs.len(), "saved beliefs");
        Ok(())
    }
}

/// Pretty JSON with four-space indentation.
pub fn render_beliefs(beliefs: &BTreeMap<String, Belief>) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    beliefs
        .serialize(&mut serializer)
        .context("serialize beliefs")?;
    String::from_utf8(buf).context("beliefs json is not utf-8")
}
