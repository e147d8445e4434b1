//! Domain types shared across the allocation controller.
//!
//! `AllocationPlan` is what gets published under the coordination key
//! and cached on every node. `SolverResult` mirrors the JSON document
//! the external solver returns. Field names on the wire are PascalCase
//! to stay compatible with the solver and with plans already in the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// IP address of a node, as it appears in plan instance maps.
pub type NodeIp = String;

/// Name of a registered function.
pub type FunctionName = String;

// ── Node resources ────────────────────────────────────────────────

/// Compute and memory capability of a single node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeResources {
    /// Total memory in decimal megabytes (bytes / 1e6).
    pub total_memory_mb: u64,
    /// Aggregate clock across all cores (MHz × cores).
    pub computational_capacity: f64,
    /// Clock of a single representative core (MHz).
    pub maximum_capacity: f64,
    /// Instructions per cycle. Placeholder, not measured.
    pub ipc: f64,
    /// Power draw in watts. Placeholder, not measured.
    pub power_consumption: f64,
}

/// The node this process runs on: its resources and advertised IP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalNode {
    pub ip: NodeIp,
    pub resources: NodeResources,
}

// ── Solver result ─────────────────────────────────────────────────

/// Result document produced by the external solver.
///
/// `nodes_instances` values are kept as raw JSON so a single malformed
/// entry can be skipped instead of rejecting the whole document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SolverResult {
    pub solver_walltime: f64,
    pub solver_status_name: String,
    pub objective_value: f64,
    #[serde(default)]
    pub active_nodes_indexes: Vec<i64>,
    pub functions_capacity: Vec<f64>,
    #[serde(default)]
    pub nodes_instances: BTreeMap<usize, Vec<serde_json::Value>>,
}

impl SolverResult {
    /// Whether the solver proved optimality.
    pub fn is_optimal(&self) -> bool {
        self.solver_status_name == "OPTIMAL"
    }
}

// ── Allocation plan ───────────────────────────────────────────────

/// Allocation of a single function across the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionAllocation {
    #[serde(rename = "Capacity")]
    pub capacity: f64,
    /// Node IP → number of instances to run there.
    #[serde(rename = "Instances")]
    pub instances: BTreeMap<NodeIp, u32>,
}

impl FunctionAllocation {
    /// Total instances across all nodes.
    pub fn total_instances(&self) -> u64 {
        self.instances.values().map(|&n| u64::from(n)).sum()
    }
}

/// Function name → allocation. Always replaced as a whole, never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AllocationPlan(BTreeMap<FunctionName, FunctionAllocation>);

impl AllocationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, function: impl Into<FunctionName>, allocation: FunctionAllocation) {
        self.0.insert(function.into(), allocation);
    }

    pub fn get(&self, function: &str) -> Option<&FunctionAllocation> {
        self.0.get(function)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Instances across every function and node.
    pub fn total_instances(&self) -> u64 {
        self.0.values().map(FunctionAllocation::total_instances).sum()
    }

    /// Instances of `function` assigned to the node with `ip`, 0 if none.
    pub fn instances_on(&self, function: &str, ip: &str) -> u32 {
        self.0
            .get(function)
            .and_then(|a| a.instances.get(ip))
            .copied()
            .unwrap_or(0)
    }
}

impl FromIterator<(FunctionName, FunctionAllocation)> for AllocationPlan {
    fn from_iter<I: IntoIterator<Item = (FunctionName, FunctionAllocation)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
