//! Flare operator CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, ThrottleCommands};
pub use commands::{
    commit, commit_loop, find, init_logging, load_settings, optimize, remove, remove_by,
    render_config, search, show_config, throttle_status, SearchArgs,
};
