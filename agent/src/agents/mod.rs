//! Oracle-backed collaborators of the reconciliation loop.
//!
//! The critic turns observations into rule beliefs, the transition runner
//! turns beliefs into an executable physics table, and repair ties the two
//! together when a prediction turns out wrong.

pub mod critic;
pub mod repair;
pub mod transition;
