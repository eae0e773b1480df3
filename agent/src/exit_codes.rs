//! Stable exit codes for agent CLI commands.

/// Command succeeded; for `agent run`, the level was won.
pub const OK: i32 = 0;
/// Invalid config, unreachable services, I/O or oracle failures.
pub const INVALID: i32 = 1;
/// `agent run` used up `max_episodes` without a win.
pub const EPISODE_LIMIT: i32 = 2;
/// A belief could not be implemented within the debug budget.
pub const CONTRADICTORY: i32 = 3;
