//! Command files picked up by the game's mod.
//!
//! Every request becomes one `<k>.lua` file in the commands directory, with
//! `k` the smallest number not currently in use. The game runs the file and
//! deletes it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

/// Commands the game accepts through `command(...)`.
pub const COMMAND_LIST: [&str; 6] = ["up", "down", "left", "right", "idle", "restart_instant"];

/// Most undo steps a single request may queue.
pub const MAX_UNDO: u32 = 1_000;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Split and validate a comma-separated command string.
pub fn parse_commands(commands: &str) -> Result<Vec<String>> {
    let parsed: Vec<String> = commands
        .split(',')
        .map(|cmd| cmd.trim().to_ascii_lowercase())
        .filter(|cmd| !cmd.is_empty())
        .collect();
    if parsed.is_empty() {
        bail!("no valid commands provided");
    }
    if let Some(invalid) = parsed.iter().find(|cmd| !COMMAND_LIST.contains(&cmd.as_str())) {
        bail!(
            "invalid command: {invalid}. Valid commands are: {}",
            COMMAND_LIST.join(", ")
        );
    }
    Ok(parsed)
}

/// Writer for the commands directory.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    dir: PathBuf,
}

impl CommandQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete leftover command files so a new session starts from `0.lua`.
    pub fn clear(&self) -> Result<usize> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create commands dir {}", self.dir.display()))?;
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("read commands dir {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "lua") {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, dir = %self.dir.display(), "cleared stale command files");
        }
        Ok(removed)
    }

    /// Smallest unused `<k>.lua` path.
    pub fn next_path(&self) -> PathBuf {
        let mut k = 0u64;
        loop {
            let path = self.dir.join(format!("{k}.lua"));
            if !path.exists() {
                return path;
            }
            k += 1;
        }
    }

    fn write(&self, lines: &[String]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create commands dir {}", self.dir.display()))?;
        let path = self.next_path();
        let mut body = lines.join("\n");
        body.push('\n');
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), lines = lines.len(), "queued command file");
        Ok(path)
    }

    pub fn queue_commands(&self, commands: &[String]) -> Result<PathBuf> {
        let lines: Vec<String> = commands
            .iter()
            .map(|cmd| format!("command(\"{cmd}\",1)"))
            .collect();
        self.write(&lines)
    }

    pub fn queue_undo(&self, n: u32) -> Result<PathBuf> {
        if n == 0 || n > MAX_UNDO {
            bail!("undo count must be between 1 and {MAX_UNDO}, got {n}");
        }
        self.write(&vec!["undo()".to_string(); n as usize])
    }

    pub fn queue_restart(&self) -> Result<PathBuf> {
        self.queue_commands(&["restart_instant".to_string()])
    }

    pub fn queue_load_level(&self, level_id: u32) -> Result<PathBuf> {
        self.write(&[format!("load_level({level_id})")])
    }
}

/// Wait until the game deletes `path`, or fail after `timeout`.
pub async fn wait_until_consumed(path: &Path, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    while path.exists() {
        if started.elapsed() >= timeout {
            bail!(
                "game did not consume {} within {} ms",
                path.display(),
                timeout.as_millis()
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_commands() {
        let parsed = parse_commands(" Up, left ,idle").expect("parse");
        assert_eq!(parsed, vec!["up", "left", "idle"]);
    }

    #[test]
    fn rejects_unknown_and_empty_commands() {
        let err = parse_commands("up,jump").expect_err("invalid");
        assert!(err.to_string().contains("invalid command: jump"));
        assert!(parse_commands(" , ").is_err());
    }

    /// Verifies files are numbered by the smallest free index.
    #[test]
    fn numbering_reuses_smallest_free_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = CommandQueue::new(temp.path());
        let first = queue.queue_commands(&["up".to_string()]).expect("queue");
        let second = queue.queue_undo(2).expect("queue");
        assert!(first.ends_with("0.lua"));
        assert!(second.ends_with("1.lua"));
        assert_eq!(fs::read_to_string(&second).expect("read"), "undo()\nundo()\n");

        fs::remove_file(&first).expect("consume");
        let third = queue.queue_restart().expect("queue");
        assert!(third.ends_with("0.lua"));
        assert_eq!(
            fs::read_to_string(&third).expect("read"),
            "command(\"restart_instant\",1)\n"
        );
    }

    #[test]
    fn undo_count_is_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = CommandQueue::new(temp.path());
        assert!(queue.queue_undo(0).is_err());
        assert!(queue.queue_undo(MAX_UNDO + 1).is_err());
        assert!(!queue.next_path().exists());
        let path = queue.queue_undo(MAX_UNDO).expect("queue");
        let body = fs::read_to_string(path).expect("read");
        assert_eq!(body.lines().count(), MAX_UNDO as usize);
    }

    #[test]
    fn clear_removes_only_command_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = CommandQueue::new(temp.path());
        queue.queue_load_level(3).expect("queue");
        fs::write(temp.path().join("notes.txt"), "keep").expect("write");
        assert_eq!(queue.clear().expect("clear"), 1);
        assert!(temp.path().join("notes.txt").exists());
        assert!(queue.next_path().ends_with("0.lua"));
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_consumes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("0.lua");
        fs::write(&path, "undo()\n").expect("write");
        let err = wait_until_consumed(&path, Duration::from_millis(60))
            .await
            .expect_err("timeout");
        assert!(err.to_string().contains("did not consume"));
        wait_until_consumed(&temp.path().join("missing.lua"), Duration::ZERO)
            .await
            .expect("consumed");
    }
}
