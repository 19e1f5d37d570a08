//! Command-line interface for Omni

pub mod args;
pub mod commands;

pub use args::{Cli, Command, Commands, RunOptions};
