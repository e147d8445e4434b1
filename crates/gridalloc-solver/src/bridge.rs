//! Solver bridge — the boundary to the external optimization engine.
//!
//! The engine is consumed through the [`Solve`] capability: one request
//! in, one [`SolverResult`] out. The request is a structured message
//! carrying the positional contract (node count, function count, five
//! node arrays, four function arrays); both sides are validated here so
//! that a malformed exchange never reaches the planner.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use gridalloc_core::SolverResult;

use crate::error::{SolveError, SolveResult};
use crate::snapshot::Snapshot;

/// Positional solve contract, as a structured message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SolveRequest {
    pub number_of_nodes: usize,
    pub number_of_functions: usize,
    pub node_memory: Vec<i64>,
    pub node_capacity: Vec<i64>,
    pub maximum_capacity: Vec<i64>,
    pub node_ipc: Vec<i64>,
    pub node_power_consumption: Vec<i64>,
    pub function_memory: Vec<i64>,
    pub function_workload: Vec<i64>,
    pub function_deadline: Vec<i64>,
    pub function_invocations: Vec<i64>,
}

impl SolveRequest {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let nodes = &snapshot.nodes;
        let functions = &snapshot.functions;
        Self {
            number_of_nodes: snapshot.node_count(),
            number_of_functions: snapshot.function_count(),
            node_memory: nodes.total_memory_mb.clone(),
            node_capacity: nodes.computational_capacity.clone(),
            maximum_capacity: nodes.maximum_capacity.clone(),
            node_ipc: nodes.ipc.clone(),
            node_power_consumption: nodes.power_consumption.clone(),
            function_memory: functions.memory_mb.clone(),
            function_workload: functions.workload.clone(),
            function_deadline: functions.deadline.clone(),
            function_invocations: functions.invocations.clone(),
        }
    }

    /// Every array must match its declared count, and neither count may be zero.
    pub fn validate(&self) -> SolveResult<()> {
        if self.number_of_nodes == 0 || self.number_of_functions == 0 {
            return Err(SolveError::InvalidRequest(format!(
                "empty problem: {} nodes, {} functions",
                self.number_of_nodes, self.number_of_functions
            )));
        }

        let node_arrays = [
            ("NodeMemory", &self.node_memory),
            ("NodeCapacity", &self.node_capacity),
            ("MaximumCapacity", &self.maximum_capacity),
            ("NodeIpc", &self.node_ipc),
            ("NodePowerConsumption", &self.node_power_consumption),
        ];
        let function_arrays = [
            ("FunctionMemory", &self.function_memory),
            ("FunctionWorkload", &self.function_workload),
            ("FunctionDeadline", &self.function_deadline),
            ("FunctionInvocations", &self.function_invocations),
        ];

        let checks = node_arrays
            .iter()
            .map(|(name, a)| (name, a.len(), self.number_of_nodes))
            .chain(
                function_arrays
                    .iter()
                    .map(|(name, a)| (name, a.len(), self.number_of_functions)),
            );
        for (name, len, expected) in checks {
            if len != expected {
                return Err(SolveError::InvalidRequest(format!(
                    "{name} has {len} entries, expected {expected}"
                )));
            }
        }
        Ok(())
    }
}

/// The external solve capability.
///
/// One synchronous call per epoch. Implementations decide the binding
/// (subprocess, embedded engine, remote service).
pub trait Solve: Send + Sync {
    fn solve(&self, request: &SolveRequest) -> impl Future<Output = SolveResult<SolverResult>> + Send;
}

/// Parse and validate a solver response against the request it answers.
pub fn parse_response(raw: &[u8], function_count: usize) -> SolveResult<SolverResult> {
    let result: SolverResult =
        serde_json::from_slice(raw).map_err(|e| SolveError::Malformed(e.to_string()))?;
    validate_response(&result, function_count)?;
    Ok(result)
}

/// A response must report a capacity for every function.
pub fn validate_response(result: &SolverResult, function_count: usize) -> SolveResult<()> {
    if result.functions_capacity.len() < function_count {
        return Err(SolveError::Malformed(format!(
            "FunctionsCapacity has {} entries for {} functions",
            result.functions_capacity.len(),
            function_count
        )));
    }
    Ok(())
}

/// Run one solve for `snapshot` and log the outcome.
pub async fn solve_snapshot<S: Solve>(solver: &S, snapshot: &Snapshot) -> SolveResult<SolverResult> {
    let request = SolveRequest::from_snapshot(snapshot);
    request.validate()?;

    debug!(
        nodes = request.number_of_nodes,
        functions = request.number_of_functions,
        "invoking solver"
    );
    let result = solver.solve(&request).await?;
    validate_response(&result, request.number_of_functions)?;

    info!(
        walltime = result.solver_walltime,
        status = %result.solver_status_name,
        objective = result.objective_value,
        active_nodes = ?result.active_nodes_indexes,
        functions_capacity = ?result.functions_capacity,
        "solver finished"
    );
    for (node, instances) in &result.nodes_instances {
        debug!(node, ?instances, "node instances");
    }
    debug!(node_ips = ?snapshot.node_ips, "node ip addresses");

    Ok(result)
}

/// Runs the solver as a child process: request JSON on stdin, result
/// JSON on stdout. The child is killed if it outlives `timeout`.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    command: Vec<String>,
    timeout: Duration,
}

impl ProcessSolver {
    pub fn new(command: Vec<String>, timeout: Duration) -> SolveResult<Self> {
        if command.is_empty() {
            return Err(SolveError::EmptyCommand);
        }
        Ok(Self { command, timeout })
    }
}

impl Solve for ProcessSolver {
    async fn solve(&self, request: &SolveRequest) -> SolveResult<SolverResult> {
        let payload =
            serde_json::to_vec(request).map_err(|e| SolveError::InvalidRequest(e.to_string()))?;

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child.stdin.take();
        let write = async move {
            if let Some(stdin) = stdin.as_mut()
                && let Err(e) = stdin.write_all(&payload).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e);
            }
            // Closing stdin signals end of request.
            drop(stdin);
            Ok(())
        };
        // Output is drained while the request is still being written.
        let run = async move {
            let (written, output) = tokio::join!(write, child.wait_with_output());
            written?;
            output
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| SolveError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(SolveError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_response(&output.stdout, request.number_of_functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FunctionArrays, NodeArrays};

    fn snapshot() -> Snapshot {
        Snapshot {
            nodes: NodeArrays {
                total_memory_mb: vec![8_000, 16_000],
                computational_capacity: vec![9_600, 19_200],
                maximum_capacity: vec![2_400, 2_400],
                ipc: vec![10, 10],
                power_consumption: vec![400, 400],
            },
            node_ips: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            functions: FunctionArrays {
                memory_mb: vec![128],
                workload: vec![30],
                deadline: vec![500],
                invocations: vec![12],
            },
            function_names: vec!["resize".to_string()],
        }
    }

    const RESPONSE: &str = r#"{"SolverWalltime":0.1,"SolverStatusName":"OPTIMAL","ObjectiveValue":400.0,"ActiveNodesIndexes":[1],"FunctionsCapacity":[150.0],"NodesInstances":{"1":[3.0]}}"#;

    struct Canned(&'static str);

    impl Solve for Canned {
        async fn solve(&self, request: &SolveRequest) -> SolveResult<SolverResult> {
            parse_response(self.0.as_bytes(), request.number_of_functions)
        }
    }

    #[test]
    fn request_mirrors_snapshot() {
        let request = SolveRequest::from_snapshot(&snapshot());
        assert_eq!(request.number_of_nodes, 2);
        assert_eq!(request.number_of_functions, 1);
        assert_eq!(request.node_memory, [8_000, 16_000]);
        assert_eq!(request.function_workload, [30]);
        request.validate().unwrap();
    }

    #[test]
    fn request_wire_names_are_pascal_case() {
        let json = serde_json::to_value(SolveRequest::from_snapshot(&snapshot())).unwrap();
        assert_eq!(json["NumberOfNodes"], 2);
        assert_eq!(json["NodePowerConsumption"], serde_json::json!([400, 400]));
        assert_eq!(json["FunctionInvocations"], serde_json::json!([12]));
    }

    #[test]
    fn misaligned_request_is_rejected() {
        let mut request = SolveRequest::from_snapshot(&snapshot());
        request.node_ipc.pop();
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("NodeIpc"));
    }

    #[test]
    fn empty_request_is_rejected() {
        let mut request = SolveRequest::from_snapshot(&snapshot());
        request.number_of_functions = 0;
        request.function_memory.clear();
        request.function_workload.clear();
        request.function_deadline.clear();
        request.function_invocations.clear();
        assert!(matches!(request.validate(), Err(SolveError::InvalidRequest(_))));
    }

    #[test]
    fn unparsable_response_is_malformed() {
        assert!(matches!(
            parse_response(b"Traceback (most recent call last):", 1),
            Err(SolveError::Malformed(_))
        ));
    }

    #[test]
    fn short_capacity_list_is_malformed() {
        let doc = r#"{"SolverWalltime":0.1,"SolverStatusName":"INFEASIBLE","ObjectiveValue":0.0,"FunctionsCapacity":[]}"#;
        assert!(matches!(parse_response(doc.as_bytes(), 1), Err(SolveError::Malformed(_))));
    }

    #[tokio::test]
    async fn solve_snapshot_returns_validated_result() {
        let result = solve_snapshot(&Canned(RESPONSE), &snapshot()).await.unwrap();
        assert_eq!(result.functions_capacity, [150.0]);
        assert_eq!(result.nodes_instances[&1], [serde_json::json!(3.0)]);
    }

    #[test]
    fn empty_command_rejected() {
        assert!(matches!(
            ProcessSolver::new(vec![], Duration::from_secs(1)),
            Err(SolveError::EmptyCommand)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_solver_round_trip() {
        let script = format!("cat > /dev/null; printf '%s' '{RESPONSE}'");
        let solver = ProcessSolver::new(
            vec!["sh".to_string(), "-c".to_string(), script],
            Duration::from_secs(10),
        )
        .unwrap();

        let request = SolveRequest::from_snapshot(&snapshot());
        let result = solver.solve(&request).await.unwrap();
        assert!(result.is_optimal());
        assert_eq!(result.objective_value, 400.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_solver_sees_request_on_stdin() {
        // Echo back a capacity equal to the declared node count.
        let script = r#"n=$(sed 's/.*"NumberOfNodes":\([0-9]*\).*/\1/'); printf '{"SolverWalltime":0,"SolverStatusName":"OPTIMAL","ObjectiveValue":0,"FunctionsCapacity":[%s]}' "$n""#;
        let solver = ProcessSolver::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(10),
        )
        .unwrap();

        let result = solver
            .solve(&SolveRequest::from_snapshot(&snapshot()))
            .await
            .unwrap();
        assert_eq!(result.functions_capacity, [2.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_solver_drains_output_while_request_is_written() {
        // Both the request and the solver's early output exceed a pipe buffer.
        let mut request = SolveRequest::from_snapshot(&snapshot());
        request.node_memory = vec![8_000; 200_000];
        let script = format!("head -c 262144 /dev/zero >&2; cat > /dev/null; printf '%s' '{RESPONSE}'");
        let solver = ProcessSolver::new(
            vec!["sh".to_string(), "-c".to_string(), script],
            Duration::from_secs(10),
        )
        .unwrap();

        let result = solver.solve(&request).await.unwrap();
        assert_eq!(result.functions_capacity, [150.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_solver_nonzero_exit() {
        let solver = ProcessSolver::new(
            vec!["sh".to_string(), "-c".to_string(), "echo infeasible model >&2; exit 3".to_string()],
            Duration::from_secs(10),
        )
        .unwrap();

        let err = solver
            .solve(&SolveRequest::from_snapshot(&snapshot()))
            .await
            .unwrap_err();
        match err {
            SolveError::Failed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "infeasible model");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_solver_times_out() {
        let solver = ProcessSolver::new(
            vec!["sleep".to_string(), "30".to_string()],
            Duration::from_millis(200),
        )
        .unwrap();

        let err = solver
            .solve(&SolveRequest::from_snapshot(&snapshot()))
            .await
            .unwrap_err();
        assert!(matches!(err, SolveError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let solver = ProcessSolver::new(
            vec!["/nonexistent/gridalloc-solver".to_string()],
            Duration::from_secs(1),
        )
        .unwrap();

        let err = solver
            .solve(&SolveRequest::from_snapshot(&snapshot()))
            .await
            .unwrap_err();
        assert!(matches!(err, SolveError::Io(_)));
    }
}
