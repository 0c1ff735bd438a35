//! Subcommand argument types and handlers.

pub mod manifest_cmd;
pub mod run_cmd;
