//! Command-line interface
//!
//! Argument parsing lives in [`args`], subcommand handlers in [`commands`].

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
