//! Subcommand implementations

pub mod nodes;
pub mod pods;
