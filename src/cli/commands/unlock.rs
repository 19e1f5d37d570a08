//! Unlock command - forcefully release the workspace lock

use crate::cli::commands::run::create_lock;
use crate::config::WorkspaceConfig;
use crate::error::OmniResult;
use std::path::Path;

/// Release the lock regardless of which process acquired it, for
/// recovery after a crashed or killed run
pub async fn execute() -> OmniResult<()> {
    let workspace = WorkspaceConfig::load(Path::new("."))?;
    let lock = create_lock(&workspace, workspace.remote_cache.enabled).await;

    lock.unlock().await?;
    println!("Lock removed successfully.");
    Ok(())
}
