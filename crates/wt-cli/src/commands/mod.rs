//! CLI subcommand implementations.

pub mod project;
pub mod projects;
pub mod rate;
pub mod start;
pub mod status;
