//! Shared application state for the bridge server.

use std::path::PathBuf;
use std::time::Duration;

use crate::commands::CommandQueue;

/// Shared state accessible from all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The game's `world_data.txt`.
    pub world_data: PathBuf,
    pub commands: CommandQueue,
    /// How long a request waits for the game to consume its command file.
    /// `None` returns as soon as the file is written.
    pub consume_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(world_data: impl Into<PathBuf>, commands_dir: impl Into<PathBuf>) -> Self {
        Self {
            world_data: world_data.into(),
            commands: CommandQueue::new(commands_dir),
            consume_timeout: None,
        }
    }

    pub fn with_consume_timeout(mut self, timeout: Duration) -> Self {
        self.consume_timeout = Some(timeout);
        self
    }
}
