//! Standalone mode: every node runs in this process against one
//! in-memory coordination store.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use gridalloc_coord::MemoryCoordinator;
use gridalloc_core::{DaemonConfig, LocalNode};
use gridalloc_scheduler::{AllocationStore, Role, Scheduler};
use gridalloc_solver::{ProcessSolver, local_node};
use gridalloc_state::{NodeStatus, RegistryStore};

/// Registry IDs of the in-process watcher nodes.
const WATCHER_ID_PREFIX: &str = "standalone-watcher-";

/// Port in the URL the in-process watchers advertise.
const WATCHER_PORT: u16 = 1323;

type Node = Scheduler<ProcessSolver, MemoryCoordinator>;

pub async fn run(config: DaemonConfig, watchers: usize) -> anyhow::Result<()> {
    info!(
        solver = config.is_solver_node,
        watchers,
        epoch_secs = config.epoch_duration_secs,
        lease_ttl_secs = config.lease_ttl_secs,
        "gridalloc daemon starting in standalone mode"
    );
    if watchers > 254 {
        bail!("at most 254 watcher nodes are supported, got {watchers}");
    }
    if config.has_expiry_gap() {
        warn!(
            lease_ttl_secs = config.lease_ttl_secs,
            epoch_secs = config.epoch_duration_secs,
            "lease ttl is shorter than the epoch, the plan will be absent between expiry and the next publish"
        );
    }

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let db_path = config.data_dir.join("gridalloc.redb");
    let registry = RegistryStore::open(&db_path)?;
    info!(path = ?db_path, "registry opened");

    let local = local_node(config.advertise_ip.as_deref()).context("probing local resources")?;
    let solver = ProcessSolver::new(config.solver_command.clone(), config.solver_timeout())?;
    let store = AllocationStore::new(
        MemoryCoordinator::new(),
        config.lease_ttl(),
        config.get_timeout(),
    );

    let mut nodes: Vec<Node> = vec![Scheduler::new(
        Role::from_flag(config.is_solver_node),
        config.epoch_duration(),
        registry.clone(),
        local.clone(),
        solver.clone(),
        store.clone(),
    )];

    let stale = clear_watcher_peers(&registry)?;
    if stale > 0 {
        info!(removed = stale, "removed watcher peers from a previous run");
    }
    for i in 1..=watchers {
        let node = watcher_node(i, &local);
        registry.put_node(&watcher_status(i, &node))?;
        nodes.push(Scheduler::new(
            Role::Watcher,
            config.epoch_duration(),
            registry.clone(),
            node,
            solver.clone(),
            store.clone(),
        ));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for node in nodes {
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move { node.run(shutdown).await });
    }

    // Runs until Ctrl-C or until a node's loop ends on its own, which
    // only happens on a fatal solver error.
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to install Ctrl-C handler")?;
            info!("shutdown signal received");
            Ok(())
        }
        Some(joined) = tasks.join_next() => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("scheduler stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("scheduler task panicked")),
        },
    };

    let _ = shutdown_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "scheduler stopped with error"),
            Err(e) => error!(error = %e, "scheduler task panicked"),
        }
    }

    info!("gridalloc daemon stopped");
    outcome
}

fn watcher_node(index: usize, local: &LocalNode) -> LocalNode {
    LocalNode {
        ip: format!("127.0.1.{index}"),
        resources: local.resources.clone(),
    }
}

fn watcher_status(index: usize, node: &LocalNode) -> NodeStatus {
    NodeStatus {
        id: format!("{WATCHER_ID_PREFIX}{index:03}"),
        url: format!("http://{}:{WATCHER_PORT}", node.ip),
        resources: node.resources.clone(),
        last_heartbeat: epoch_secs(),
    }
}

fn clear_watcher_peers(registry: &RegistryStore) -> anyhow::Result<usize> {
    let mut removed = 0;
    for node in registry.list_nodes()? {
        if node.id.starts_with(WATCHER_ID_PREFIX) && registry.delete_node(&node.id)? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridalloc_core::NodeResources;
    use gridalloc_solver::snapshot::peer_ip;

    fn local() -> LocalNode {
        LocalNode {
            ip: "10.1.0.1".to_string(),
            resources: NodeResources {
                total_memory_mb: 4_000,
                computational_capacity: 4_000.0,
                maximum_capacity: 2_000.0,
                ipc: 1.0,
                power_consumption: 400.0,
            },
        }
    }

    #[test]
    fn watcher_url_resolves_to_its_ip() {
        let node = watcher_node(3, &local());
        let status = watcher_status(3, &node);

        assert_eq!(node.ip, "127.0.1.3");
        assert_eq!(status.id, "standalone-watcher-003");
        assert_eq!(peer_ip(&status.url).as_deref(), Some("127.0.1.3"));
    }

    #[test]
    fn stale_watchers_are_cleared() {
        let registry = RegistryStore::open_in_memory().unwrap();
        for i in 1..=3 {
            registry
                .put_node(&watcher_status(i, &watcher_node(i, &local())))
                .unwrap();
        }
        registry
            .put_node(&NodeStatus {
                id: "edge-1".to_string(),
                url: "http://10.1.0.2:1323".to_string(),
                resources: local().resources,
                last_heartbeat: 0,
            })
            .unwrap();

        assert_eq!(clear_watcher_peers(&registry).unwrap(), 3);
        let left = registry.list_nodes().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "edge-1");
    }
}
