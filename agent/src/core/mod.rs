//! Deterministic, pure logic shared by the agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! world states and return deterministic outputs suitable for tests.

pub mod action;
pub mod diff;
pub mod extract;
pub mod kinds;
pub mod physics;
pub mod world;
