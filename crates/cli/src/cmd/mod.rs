//! CLI command implementations

pub mod cleanup;
pub mod config;
pub mod edit;
pub mod resolved;
