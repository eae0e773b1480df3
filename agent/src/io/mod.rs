//! Side-effecting operations: filesystem, HTTP clients and prompt rendering.

pub mod belief_store;
pub mod config;
pub mod environment;
pub mod episode_log;
pub mod oracle;
pub mod paths;
pub mod prompt;
