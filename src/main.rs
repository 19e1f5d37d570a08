//! Omni - High performance task runner with content-addressed caching
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use omni::cli::{commands, Cli, Command};
use omni::error::{OmniError, OmniResult};
use omni::ui;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {hint}", console::style("hint:").yellow());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> OmniResult<()> {
    let cli = Cli::parse();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("omni=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let (command, options) = cli.into_command();
    match command {
        Command::Run(tasks) => {
            validate_task_names(&tasks)?;
            commands::run::execute(&tasks, &options).await
        }
        Command::Tree(tasks) => {
            validate_task_names(&tasks)?;
            commands::tree::execute(&tasks, &options)
        }
        Command::Unlock => commands::unlock::execute().await,
    }
}

fn validate_task_names(tasks: &[String]) -> OmniResult<()> {
    if tasks.is_empty() {
        return Err(OmniError::MissingTasks);
    }

    for task in tasks {
        if task.contains(':') {
            return Err(OmniError::BadTaskName(task.clone()));
        }
    }

    Ok(())
}
