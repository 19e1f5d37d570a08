//! Run command - execute tasks with caching under the workspace lock

use crate::cache::{CacheDirs, CacheReader, CacheWriter};
use crate::cli::RunOptions;
use crate::config::{self, WorkspaceConfig};
use crate::error::OmniResult;
use crate::exec::Executor;
use crate::graph::DependencyGraph;
use crate::lock::{LocalLock, Lock, RemoteLock};
use crate::transport::{LocalTransport, RemoteTransport, Transport};
use crate::ui::{self, ConsoleSink};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Execute the run command from the current directory as workspace root
pub async fn execute(tasks: &[String], options: &RunOptions) -> OmniResult<()> {
    let root = Path::new(".");
    let workspace = WorkspaceConfig::load(root)?;
    let target_configs = config::load_target_configs(root, &workspace, options.target.as_deref())?;

    let use_remote = options.remote || workspace.remote_cache.enabled;
    if use_remote {
        workspace.validate_remote()?;
    }

    let lock = create_lock(&workspace, use_remote).await;
    lock.lock().await?;
    listen_for_interrupts(lock.clone());

    let outcome = execute_graph(root, &workspace, target_configs, tasks, options, use_remote).await;
    let unlock_outcome = lock.unlock().await;

    outcome?;
    unlock_outcome
}

async fn execute_graph(
    root: &Path,
    workspace: &WorkspaceConfig,
    target_configs: std::collections::HashMap<String, config::TargetConfig>,
    tasks: &[String],
    options: &RunOptions,
    use_remote: bool,
) -> OmniResult<()> {
    let transport = create_transport(root, workspace, use_remote).await;
    let dirs = CacheDirs::create()?;
    let targets: Vec<String> = workspace
        .targets
        .iter()
        .map(|dir| config::clean_path(dir))
        .collect();

    let reader = Arc::new(CacheReader::new(
        transport.clone(),
        target_configs.clone(),
        targets,
        root,
        &dirs,
        options.no_cache,
    ));
    let writer = Arc::new(CacheWriter::new(transport, reader.clone(), &dirs));
    let executor = Arc::new(Executor::new(reader, writer, Arc::new(ConsoleSink::new())));

    let mut graph = DependencyGraph::new(target_configs);
    graph.populate(tasks, options.target.as_deref())?;
    debug!("executing {} task node(s)", graph.nodes().len());

    graph.execute(executor).await;
    Ok(())
}

/// Build the configured lock backend
pub(crate) async fn create_lock(workspace: &WorkspaceConfig, use_remote: bool) -> Arc<dyn Lock> {
    if use_remote {
        Arc::new(RemoteLock::connect(&workspace.name, &workspace.remote_cache).await)
    } else {
        Arc::new(LocalLock::in_workspace(Path::new(".")))
    }
}

async fn create_transport(
    root: &Path,
    workspace: &WorkspaceConfig,
    use_remote: bool,
) -> Arc<dyn Transport> {
    if use_remote {
        Arc::new(RemoteTransport::connect(&workspace.name, &workspace.remote_cache).await)
    } else {
        Arc::new(LocalTransport::in_workspace(root))
    }
}

/// Release the lock and bail out when the process is interrupted
fn listen_for_interrupts(lock: Arc<dyn Lock>) {
    tokio::spawn(async move {
        wait_for_interrupt().await;
        if let Err(err) = lock.unlock().await {
            ui::error(&err);
        }
        std::process::exit(1);
    });
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            ui::error(&err);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}
