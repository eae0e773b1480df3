//! Canonical locations of the agent's files under `.agent/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// All canonical paths within `.agent/` for a project root.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub root: PathBuf,
    pub agent_dir: PathBuf,
    pub config_path: PathBuf,
    pub memory_dir: PathBuf,
    pub beliefs_path: PathBuf,
    pub physics_path: PathBuf,
    pub episodes_dir: PathBuf,
}

impl AgentPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let agent_dir = root.join(".agent");
        let memory_dir = agent_dir.join("memory");
        Self {
            root: root.clone(),
            agent_dir: agent_dir.clone(),
            config_path: agent_dir.join("config.toml"),
            memory_dir: memory_dir.clone(),
            beliefs_path: memory_dir.join("beliefs.json"),
            physics_path: memory_dir.join("physics.toml"),
            episodes_dir: agent_dir.join("episodes"),
        }
    }
}

/// Write `contents` next to `path` and rename it into place.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let paths = AgentPaths::new("/tmp/project");
        assert!(paths.config_path.ends_with(".agent/config.toml"));
        assert!(paths.beliefs_path.ends_with(".agent/memory/beliefs.json"));
        assert!(paths.physics_path.ends_with(".agent/memory/physics.toml"));
        assert!(paths.episodes_dir.ends_with(".agent/episodes"));
    }

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/dir/file.txt");
        write_atomic(&path, "one").expect("first write");
        write_atomic(&path, "two").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!path.with_file_name("file.txt.tmp").exists());
    }
}
