//! Subcommand implementations

pub mod actions;
pub mod costs;
pub mod health;
pub mod resources;
pub mod samples;
