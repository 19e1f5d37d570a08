//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};

/// High performance task runner for any codebase
///
/// Runs target pipelines in dependency order, replaying cached logs and
/// restoring cached outputs for tasks whose inputs are unchanged.
#[derive(Parser, Debug)]
#[command(name = "omni", version, about, long_about = None)]
#[command(disable_version_flag = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Tasks to run (shorthand for `omni run [TASKS...]`)
    #[arg(value_name = "TASKS")]
    pub tasks: Vec<String>,

    /// Invalidate the cache before running tasks
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Disable color output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use the remote cache
    #[arg(short, long, global = true)]
    pub remote: bool,

    /// Load tasks from a specific target directory
    #[arg(short, long, global = true, value_name = "PATH")]
    pub target: Option<String>,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    pub version: Option<bool>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run tasks (default)
    Run {
        /// Tasks to run
        #[arg(value_name = "TASKS")]
        tasks: Vec<String>,
    },

    /// Print the dependency tree as JSON
    Tree {
        /// Tasks to include in the tree
        #[arg(value_name = "TASKS")]
        tasks: Vec<String>,
    },

    /// Forcefully release the workspace lock
    Unlock,
}

impl Cli {
    /// Collapse the default-command shorthand: bare positionals mean
    /// `run`
    pub fn into_command(self) -> (Command, RunOptions) {
        let options = RunOptions {
            no_cache: self.no_cache,
            remote: self.remote,
            target: self.target,
        };

        let command = match self.command {
            None => Command::Run(self.tasks),
            Some(Commands::Run { tasks }) => Command::Run(tasks),
            Some(Commands::Tree { tasks }) => Command::Tree(tasks),
            Some(Commands::Unlock) => Command::Unlock,
        };

        (command, options)
    }
}

/// A fully resolved invocation
#[derive(Debug)]
pub enum Command {
    Run(Vec<String>),
    Tree(Vec<String>),
    Unlock,
}

/// Flags shared by the run and tree paths
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub no_cache: bool,
    pub remote: bool,
    pub target: Option<String>,
}
