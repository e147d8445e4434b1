//! Allocation planner — solver output to a distributable plan.
//!
//! For every function the planner collects per-node instance counts
//! (node index resolved to IP through the snapshot), records the
//! allocated capacity, and writes the derived CPU demand back to the
//! function's registry record.
//!
//! Registry writes happen one function at a time. A failure partway
//! through aborts planning, but functions written before the failure
//! keep their new demand value; the batch is not atomic.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use gridalloc_core::{AllocationPlan, FunctionAllocation, FunctionName, NodeIp, SolverResult};
use gridalloc_state::RegistryStore;

use crate::error::{PlanError, PlanResult};

/// Instance count from a raw solver value.
///
/// Accepts any finite non-negative JSON number, truncating fractions.
/// Anything else (strings, null, negatives) yields `None`.
pub fn coerce_instances(value: &Value) -> Option<u32> {
    let n = value.as_f64()?;
    if !n.is_finite() || n < 0.0 || n > f64::from(u32::MAX) {
        return None;
    }
    Some(n as u32)
}

/// Capacity relative to the local fastest core, rounded to 2 decimals.
pub fn cpu_demand(capacity: f64, local_maximum_capacity: f64) -> f64 {
    ((capacity / local_maximum_capacity) * 100.0).round() / 100.0
}

/// Turns solver results into allocation plans.
pub struct AllocationPlanner<'a> {
    registry: &'a RegistryStore,
    local_maximum_capacity: f64,
}

impl<'a> AllocationPlanner<'a> {
    pub fn new(registry: &'a RegistryStore, local_maximum_capacity: f64) -> Self {
        Self {
            registry,
            local_maximum_capacity,
        }
    }

    /// Build the plan for `function_names`, index-aligned with the
    /// solver's capacity list, resolving node indexes through `node_ips`.
    pub fn plan(
        &self,
        result: &SolverResult,
        function_names: &[FunctionName],
        node_ips: &[NodeIp],
    ) -> PlanResult<AllocationPlan> {
        if self.local_maximum_capacity.is_nan() || self.local_maximum_capacity <= 0.0 {
            return Err(PlanError::InvalidLocalCapacity(self.local_maximum_capacity));
        }

        let mut plan = AllocationPlan::new();

        for (i, name) in function_names.iter().enumerate() {
            let capacity = *result
                .functions_capacity
                .get(i)
                .ok_or(PlanError::MissingCapacity(i))?;

            let instances = instances_for(result, i, node_ips);
            plan.insert(
                name.clone(),
                FunctionAllocation {
                    capacity,
                    instances,
                },
            );

            let mut spec = self
                .registry
                .get_function(name)?
                .ok_or_else(|| PlanError::FunctionNotFound(name.clone()))?;
            spec.cpu_demand = cpu_demand(capacity, self.local_maximum_capacity);
            self.registry.put_function(&spec)?;
            debug!(function = %name, capacity, cpu_demand = spec.cpu_demand, "function planned");
        }

        Ok(plan)
    }
}

/// Node IP → instance count for function `index`.
///
/// Entries that cannot be used are skipped with a warning: a node index
/// outside the snapshot, a sequence too short to cover the function, or
/// a value that is not a usable number.
fn instances_for(result: &SolverResult, index: usize, node_ips: &[NodeIp]) -> BTreeMap<NodeIp, u32> {
    let mut instances = BTreeMap::new();

    for (&node, values) in &result.nodes_instances {
        let Some(ip) = node_ips.get(node) else {
            warn!(node, nodes = node_ips.len(), "solver node index outside snapshot, skipping");
            continue;
        };
        let Some(value) = values.get(index) else {
            warn!(node, function_index = index, "no instance entry for function, skipping");
            continue;
        };
        match coerce_instances(value) {
            Some(count) => {
                instances.insert(ip.clone(), count);
            }
            None => warn!(
                node,
                function_index = index,
                %value,
                "instance count is not a usable number, skipping"
            ),
        }
    }

    instances
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridalloc_state::FunctionSpec;
    use serde_json::json;

    fn registry_with(names: &[&str]) -> RegistryStore {
        let registry = RegistryStore::open_in_memory().unwrap();
        for name in names {
            registry
                .put_function(&FunctionSpec {
                    name: name.to_string(),
                    memory_mb: 128,
                    workload: 1_000_000,
                    deadline: 100,
                    invocations: 1,
                    cpu_demand: 0.0,
                })
                .unwrap();
        }
        registry
    }

    fn result(capacity: Vec<f64>, instances: Vec<(usize, Vec<Value>)>) -> SolverResult {
        SolverResult {
            solver_walltime: 0.2,
            solver_status_name: "OPTIMAL".to_string(),
            objective_value: 800.0,
            active_nodes_indexes: instances.iter().map(|(n, _)| *n as i64).collect(),
            functions_capacity: capacity,
            nodes_instances: instances.into_iter().collect(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn ips(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cpu_demand_arithmetic() {
        assert_eq!(cpu_demand(150.0, 200.0), 0.75);
        assert_eq!(cpu_demand(100.0, 300.0), 0.33);
        assert_eq!(cpu_demand(200.0, 300.0), 0.67);
        assert_eq!(cpu_demand(0.0, 2400.0), 0.0);
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(coerce_instances(&json!(3.0)), Some(3));
        assert_eq!(coerce_instances(&json!(2)), Some(2));
        assert_eq!(coerce_instances(&json!(2.9)), Some(2));
        assert_eq!(coerce_instances(&json!("3")), None);
        assert_eq!(coerce_instances(&json!(null)), None);
        assert_eq!(coerce_instances(&json!(-1.0)), None);
    }

    #[test]
    fn plan_maps_node_indexes_to_ips() {
        let registry = registry_with(&["auth", "resize"]);
        let planner = AllocationPlanner::new(&registry, 200.0);
        let res = result(
            vec![150.0, 40.0],
            vec![(0, vec![json!(3.0), json!(0.0)]), (2, vec![json!(1.0), json!(4.0)])],
        );

        let plan = planner
            .plan(&res, &names(&["auth", "resize"]), &ips(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]))
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.instances_on("auth", "10.0.0.1"), 3);
        assert_eq!(plan.instances_on("auth", "10.0.0.3"), 1);
        assert_eq!(plan.get("resize").unwrap().capacity, 40.0);
        assert_eq!(plan.get("resize").unwrap().instances.len(), 2);
        assert!(!plan.get("auth").unwrap().instances.contains_key("10.0.0.2"));
    }

    #[test]
    fn plan_persists_cpu_demand() {
        let registry = registry_with(&["auth"]);
        let planner = AllocationPlanner::new(&registry, 200.0);
        let res = result(vec![150.0], vec![(0, vec![json!(3.0)])]);

        planner.plan(&res, &names(&["auth"]), &ips(&["10.0.0.1"])).unwrap();

        let stored = registry.get_function("auth").unwrap().unwrap();
        assert_eq!(stored.cpu_demand, 0.75);
    }

    #[test]
    fn non_numeric_entry_is_skipped_not_fatal() {
        let registry = registry_with(&["auth"]);
        let planner = AllocationPlanner::new(&registry, 200.0);
        let res = result(
            vec![150.0],
            vec![(0, vec![json!("lots")]), (1, vec![json!(2.0)])],
        );

        let plan = planner
            .plan(&res, &names(&["auth"]), &ips(&["10.0.0.1", "10.0.0.2"]))
            .unwrap();

        let alloc = plan.get("auth").unwrap();
        assert!(!alloc.instances.contains_key("10.0.0.1"));
        assert_eq!(alloc.instances["10.0.0.2"], 2);
    }

    #[test]
    fn unknown_node_index_and_short_sequences_are_skipped() {
        let registry = registry_with(&["a", "b"]);
        let planner = AllocationPlanner::new(&registry, 100.0);
        let res = result(
            vec![10.0, 20.0],
            vec![(0, vec![json!(1.0)]), (7, vec![json!(5.0), json!(5.0)])],
        );

        let plan = planner
            .plan(&res, &names(&["a", "b"]), &ips(&["10.0.0.1"]))
            .unwrap();

        assert_eq!(plan.instances_on("a", "10.0.0.1"), 1);
        assert!(plan.get("b").unwrap().instances.is_empty());
    }

    #[test]
    fn missing_function_aborts_after_earlier_writes() {
        let registry = registry_with(&["a"]);
        let planner = AllocationPlanner::new(&registry, 100.0);
        let res = result(vec![50.0, 20.0], vec![]);

        let err = planner
            .plan(&res, &names(&["a", "gone"]), &ips(&["10.0.0.1"]))
            .unwrap_err();

        assert!(matches!(err, PlanError::FunctionNotFound(ref n) if n == "gone"));
        // The earlier function was already written.
        assert_eq!(registry.get_function("a").unwrap().unwrap().cpu_demand, 0.5);
    }

    #[test]
    fn missing_capacity_is_an_error() {
        let registry = registry_with(&["a"]);
        let planner = AllocationPlanner::new(&registry, 100.0);
        let res = result(vec![], vec![]);

        assert!(matches!(
            planner.plan(&res, &names(&["a"]), &ips(&["10.0.0.1"])),
            Err(PlanError::MissingCapacity(0))
        ));
    }

    #[test]
    fn unusable_local_capacity_is_rejected() {
        let registry = registry_with(&["a"]);
        let res = result(vec![1.0], vec![]);

        for capacity in [0.0, -5.0, f64::NAN] {
            let planner = AllocationPlanner::new(&registry, capacity);
            assert!(matches!(
                planner.plan(&res, &names(&["a"]), &ips(&["10.0.0.1"])),
                Err(PlanError::InvalidLocalCapacity(_))
            ));
        }
    }
}
