//! Registry record types.

use serde::{Deserialize, Serialize};

use gridalloc_core::NodeResources;

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

// ── Node ──────────────────────────────────────────────────────────

/// Last status a peer node reported to the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStatus {
    pub id: NodeId,
    /// Advertised service URL, e.g. `http://10.0.0.7:1323`.
    pub url: String,
    pub resources: NodeResources,
    /// Unix timestamp of the last status report.
    pub last_heartbeat: u64,
}

// ── Function ──────────────────────────────────────────────────────

/// Metadata of a registered function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    /// Memory per instance, in MB.
    pub memory_mb: u64,
    /// Work per invocation in raw units. The solver sees `workload / 1e6`.
    pub workload: u64,
    /// Completion deadline per invocation.
    pub deadline: u64,
    /// Observed invocation count.
    pub invocations: u64,
    /// Capacity share relative to the solver node's fastest core,
    /// rewritten after every solve.
    #[serde(default)]
    pub cpu_demand: f64,
}

/// Divisor applied to raw workload before it is handed to the solver.
pub const WORKLOAD_SCALE: u64 = 1_000_000;

impl FunctionSpec {
    /// Workload in the solver's unit (truncating).
    pub fn normalized_workload(&self) -> u64 {
        self.workload / WORKLOAD_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_is_truncated_to_millions() {
        let spec = FunctionSpec {
            name: "thumb".to_string(),
            memory_mb: 128,
            workload: 2_999_999,
            deadline: 500,
            invocations: 10,
            cpu_demand: 0.0,
        };
        assert_eq!(spec.normalized_workload(), 2);
    }

    #[test]
    fn cpu_demand_defaults_when_absent() {
        let json = r#"{"name":"f","memory_mb":64,"workload":0,"deadline":1,"invocations":0}"#;
        let spec: FunctionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.cpu_demand, 0.0);
    }
}
