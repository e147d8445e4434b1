//! gridalloc.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Whether this node computes the plan. Fixed for the process lifetime.
    pub is_solver_node: bool,
    /// Solver tick period in seconds.
    pub epoch_duration_secs: u64,
    /// TTL of the lease the published plan is bound to.
    pub lease_ttl_secs: u64,
    /// Bound on a single read of the plan from the coordination store.
    pub get_timeout_secs: u64,
    /// Bound on one call to the external solver.
    pub solver_timeout_secs: u64,
    /// argv of the external solver process.
    pub solver_command: Vec<String>,
    /// IP to advertise for this node. Detected when unset.
    pub advertise_ip: Option<String>,
    /// Directory holding the registry database.
    pub data_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            is_solver_node: false,
            epoch_duration_secs: 30,
            lease_ttl_secs: 60,
            get_timeout_secs: 5,
            solver_timeout_secs: 300,
            solver_command: vec!["python3".to_string(), "solver.py".to_string()],
            advertise_ip: None,
            data_dir: PathBuf::from("/var/lib/gridalloc"),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn epoch_duration(&self) -> Duration {
        Duration::from_secs(self.epoch_duration_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.get_timeout_secs)
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_timeout_secs)
    }

    /// True when a published plan can expire before the next epoch
    /// publishes its replacement.
    pub fn has_expiry_gap(&self) -> bool {
        self.lease_ttl_secs < self.epoch_duration_secs
    }
}
