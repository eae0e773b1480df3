//! Episode logging helpers for `.agent/episodes/`.
//!
//! Each episode gets a directory `<level>/<episode>/` holding `meta.json`
//! and snapshots of the beliefs and physics table as they were when the
//! episode ended.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::action::Action;
use crate::core::world::Outcome;

/// Why an episode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeEnd {
    /// The environment reported a win.
    Won,
    /// Every planned action was executed without a win.
    PlanExhausted,
    /// The planner found no plan under the depth bound.
    NoPlan,
    /// Undo left the environment somewhere other than expected.
    Desynced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub level_id: u32,
    pub episode: u32,
    pub plan: Option<Vec<Action>>,
    pub actions_executed: usize,
    pub repairs: u32,
    pub outcome: Outcome,
    pub end: EpisodeEnd,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct EpisodePaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub beliefs_path: PathBuf,
    pub physics_path: PathBuf,
}

impl EpisodePaths {
    pub fn new(episodes_dir: &Path, level_id: u32, episode: u32) -> Self {
        let dir = episodes_dir
            .join(level_id.to_string())
            .join(episode.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            beliefs_path: dir.join("beliefs.json"),
            physics_path: dir.join("physics.toml"),
            dir,
        }
    }
}

pub struct EpisodeWriteRequest<'a> {
    pub episodes_dir: &'a Path,
    pub meta: &'a EpisodeMeta,
    pub beliefs_json: &'a str,
    pub physics_source: &'a str,
}

pub fn write_episode(request: &EpisodeWriteRequest<'_>) -> Result<EpisodePaths> {
    let paths = EpisodePaths::new(
        request.episodes_dir,
        request.meta.level_id,
        request.meta.episode,
    );
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create episode dir {}", paths.dir.display()))?;

    let mut meta = serde_json::to_string_pretty(request.meta)?;
    meta.push('\n');
    write_text(&paths.meta_path, &meta)?;
    write_text(&paths.beliefs_path, request.beliefs_json)?;
    write_text(&paths.physics_path, request.physics_source)?;
    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
