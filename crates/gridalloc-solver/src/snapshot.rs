//! Snapshot assembly — registry state to index-aligned solver arrays.
//!
//! Position `i` of every node array (and of `node_ips`) is the same
//! node; position `i` of every function array is `function_names[i]`.
//! Peers are sorted by node ID and the local node is always last, so
//! the same registry content always yields the same snapshot.

use http::Uri;
use tracing::{debug, warn};

use gridalloc_core::{FunctionName, LocalNode, NodeIp, NodeResources};
use gridalloc_state::{FunctionSpec, NodeStatus, RegistryStore, StateResult};

use crate::error::SnapshotResult;

/// Per-node solver inputs, as parallel integer arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeArrays {
    pub total_memory_mb: Vec<i64>,
    pub computational_capacity: Vec<i64>,
    pub maximum_capacity: Vec<i64>,
    /// IPC in fixed point, ×10.
    pub ipc: Vec<i64>,
    pub power_consumption: Vec<i64>,
}

impl NodeArrays {
    fn with_capacity(n: usize) -> Self {
        Self {
            total_memory_mb: Vec::with_capacity(n),
            computational_capacity: Vec::with_capacity(n),
            maximum_capacity: Vec::with_capacity(n),
            ipc: Vec::with_capacity(n),
            power_consumption: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, res: &NodeResources) {
        self.total_memory_mb.push(res.total_memory_mb as i64);
        self.computational_capacity
            .push(res.computational_capacity as i64);
        self.maximum_capacity.push(res.maximum_capacity as i64);
        self.ipc.push((res.ipc * 10.0) as i64);
        self.power_consumption.push(res.power_consumption as i64);
    }
}

/// Per-function solver inputs, as parallel integer arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionArrays {
    pub memory_mb: Vec<i64>,
    /// Normalized workload (raw / 1e6).
    pub workload: Vec<i64>,
    pub deadline: Vec<i64>,
    pub invocations: Vec<i64>,
}

impl FunctionArrays {
    fn zeroed(n: usize) -> Self {
        Self {
            memory_mb: vec![0; n],
            workload: vec![0; n],
            deadline: vec![0; n],
            invocations: vec![0; n],
        }
    }

    fn set(&mut self, i: usize, spec: &FunctionSpec) {
        self.memory_mb[i] = spec.memory_mb as i64;
        self.workload[i] = spec.normalized_workload() as i64;
        self.deadline[i] = spec.deadline as i64;
        self.invocations[i] = spec.invocations as i64;
    }
}

/// Point-in-time inputs for one solve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub nodes: NodeArrays,
    pub node_ips: Vec<NodeIp>,
    pub functions: FunctionArrays,
    pub function_names: Vec<FunctionName>,
}

impl Snapshot {
    pub fn node_count(&self) -> usize {
        self.node_ips.len()
    }

    pub fn function_count(&self) -> usize {
        self.function_names.len()
    }
}

/// Host part of a peer's advertised URL.
pub fn peer_ip(url: &str) -> Option<NodeIp> {
    let uri: Uri = url.parse().ok()?;
    let host = uri.host()?;
    // Bracketed IPv6 literals come back with their brackets.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (!host.is_empty()).then(|| host.to_string())
}

/// Build node arrays from peers (sorted by ID) followed by the local node.
///
/// A peer whose URL has no parseable host is left out of every array, so
/// the arrays can hold fewer than `peers.len() + 1` entries.
pub fn assemble_nodes(peers: &[NodeStatus], local: &LocalNode) -> (NodeArrays, Vec<NodeIp>) {
    let mut ordered: Vec<&NodeStatus> = peers.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut arrays = NodeArrays::with_capacity(ordered.len() + 1);
    let mut ips = Vec::with_capacity(ordered.len() + 1);

    for peer in ordered {
        let Some(ip) = peer_ip(&peer.url) else {
            warn!(node_id = %peer.id, url = %peer.url, "peer url has no host, leaving node out");
            continue;
        };
        arrays.push(&peer.resources);
        ips.push(ip);
    }

    arrays.push(&local.resources);
    ips.push(local.ip.clone());

    (arrays, ips)
}

/// Build function arrays, index-aligned with `names`.
///
/// A failed or empty lookup leaves that function's entry zeroed and the
/// rest of the snapshot intact.
pub fn assemble_functions<F>(names: &[FunctionName], mut lookup: F) -> FunctionArrays
where
    F: FnMut(&str) -> StateResult<Option<FunctionSpec>>,
{
    let mut arrays = FunctionArrays::zeroed(names.len());

    for (i, name) in names.iter().enumerate() {
        match lookup(name) {
            Ok(Some(spec)) => arrays.set(i, &spec),
            Ok(None) => warn!(function = %name, "function metadata not found, entry left zeroed"),
            Err(e) => {
                warn!(function = %name, error = %e, "function lookup failed, entry left zeroed")
            }
        }
    }

    arrays
}

/// Assembles snapshots from the node and function registries.
pub struct SnapshotBuilder<'a> {
    registry: &'a RegistryStore,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(registry: &'a RegistryStore) -> Self {
        Self { registry }
    }

    /// Assemble the snapshot for one cycle.
    ///
    /// Returns `None` when there is nothing to solve (no functions).
    /// Failing to list peers or function names fails the whole call.
    pub fn build(&self, local: &LocalNode) -> SnapshotResult<Option<Snapshot>> {
        let peers = self.registry.list_nodes()?;
        let function_names = self.registry.list_function_names()?;

        if function_names.is_empty() {
            debug!(peers = peers.len(), "no functions registered, nothing to solve");
            return Ok(None);
        }

        let (nodes, node_ips) = assemble_nodes(&peers, local);
        let functions = assemble_functions(&function_names, |name| self.registry.get_function(name));

        debug!(
            nodes = node_ips.len(),
            functions = function_names.len(),
            "snapshot assembled"
        );

        Ok(Some(Snapshot {
            nodes,
            node_ips,
            functions,
            function_names,
        }))
    }
}
