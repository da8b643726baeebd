//! CLI command implementations.

pub mod agent;
pub mod sync;
