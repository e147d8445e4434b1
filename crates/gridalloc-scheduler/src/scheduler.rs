//! Scheduler — the per-process role state machine.
//!
//! The solver role ticks every epoch and drives one full cycle per tick.
//! Cycles never overlap: a cycle that overruns the epoch leaves at most
//! one tick pending, later ticks are dropped. Any cycle error ends the
//! loop and is returned to the caller.
//!
//! The watcher role blocks on the plan key's watch stream and, for each
//! event, fetches the whole plan and swaps it into the cache. Fetch
//! errors are logged and the loop keeps watching.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use gridalloc_coord::{Coordinator, Revision, WatchEvent};
use gridalloc_core::LocalNode;
use gridalloc_solver::{AllocationPlanner, Solve, SnapshotBuilder, solve_snapshot};
use gridalloc_state::RegistryStore;

use crate::cache::AllocationCache;
use crate::error::SchedulerResult;
use crate::store::AllocationStore;

/// Pause before re-subscribing when a watch stream ends.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Process role, fixed by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Solver,
    Watcher,
}

impl Role {
    pub fn from_flag(is_solver_node: bool) -> Self {
        if is_solver_node {
            Role::Solver
        } else {
            Role::Watcher
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Solver => write!(f, "solver"),
            Role::Watcher => write!(f, "watcher"),
        }
    }
}

/// Where the role loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Solving,
    Publishing,
    Watching,
    Applying,
}

/// Result of one solver cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing registered to solve for; no solve, no publish.
    Skipped,
    Published { functions: usize, revision: Revision },
}

pub struct Scheduler<S: Solve, C: Coordinator> {
    role: Role,
    epoch: Duration,
    registry: RegistryStore,
    local: LocalNode,
    solver: S,
    store: AllocationStore<C>,
    cache: AllocationCache,
    phase: watch::Sender<Phase>,
}

impl<S: Solve, C: Coordinator> Scheduler<S, C> {
    pub fn new(
        role: Role,
        epoch: Duration,
        registry: RegistryStore,
        local: LocalNode,
        solver: S,
        store: AllocationStore<C>,
    ) -> Self {
        Self {
            role,
            epoch,
            registry,
            local,
            solver,
            store,
            cache: AllocationCache::new(),
            phase: watch::Sender::new(Phase::Idle),
        }
    }

    /// Read handle on the allocation cache.
    pub fn cache(&self) -> AllocationCache {
        self.cache.clone()
    }

    /// The last cached plan.
    pub fn allocation(&self) -> std::sync::Arc<gridalloc_core::AllocationPlan> {
        self.cache.get()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Follow phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    /// Run the role loop until `shutdown` flips or a fatal error occurs.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        info!(
            role = %self.role,
            ip = %self.local.ip,
            epoch_secs = self.epoch.as_secs(),
            "scheduler started"
        );
        match self.role {
            Role::Solver => self.run_solver(shutdown).await,
            Role::Watcher => {
                self.run_watcher(shutdown).await;
                Ok(())
            }
        }
    }

    async fn run_solver(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        let mut ticker = tokio::time::interval(self.epoch);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first cycle runs one
        // epoch after start.
        ticker.tick().await;

        let mut epoch = 0u64;
        loop {
            // Shutdown wins over a tick left pending by an overrunning cycle.
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("solver loop shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    epoch += 1;
                    match self.solve_once().await {
                        Ok(CycleOutcome::Skipped) => debug!(epoch, "cycle skipped"),
                        Ok(CycleOutcome::Published { functions, revision }) => {
                            info!(epoch, functions, revision, "cycle complete");
                        }
                        Err(e) => {
                            error!(epoch, error = %e, "solve cycle failed, stopping solver");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Run one Snapshot → Solve → Plan → Publish cycle.
    ///
    /// On success the published plan also replaces the local cache.
    pub async fn solve_once(&self) -> SchedulerResult<CycleOutcome> {
        self.set_phase(Phase::Solving);
        let outcome = self.cycle().await;
        self.set_phase(Phase::Idle);
        outcome
    }

    async fn cycle(&self) -> SchedulerResult<CycleOutcome> {
        let Some(snapshot) = SnapshotBuilder::new(&self.registry).build(&self.local)? else {
            return Ok(CycleOutcome::Skipped);
        };

        let result = solve_snapshot(&self.solver, &snapshot).await?;
        if !result.is_optimal() {
            warn!(status = %result.solver_status_name, "solver result is not optimal");
        }

        let plan = AllocationPlanner::new(&self.registry, self.local.resources.maximum_capacity)
            .plan(&result, &snapshot.function_names, &snapshot.node_ips)?;

        self.set_phase(Phase::Publishing);
        let revision = self.store.publish(&plan).await?;
        let functions = plan.len();
        debug!(functions, instances = plan.total_instances(), "plan published");
        self.cache.replace(plan);

        Ok(CycleOutcome::Published {
            functions,
            revision,
        })
    }

    async fn run_watcher(&self, mut shutdown: watch::Receiver<bool>) {
        let mut stream = self.store.watch();
        loop {
            self.set_phase(Phase::Watching);
            tokio::select! {
                event = stream.next() => match event {
                    Some(event) => self.apply(&event).await,
                    None => {
                        warn!(key = stream.key(), "watch stream closed, resubscribing");
                        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                        stream = self.store.watch();
                    }
                },
                _ = shutdown.changed() => {
                    info!("watch loop shutting down");
                    break;
                }
            }
        }
        self.set_phase(Phase::Idle);
    }

    /// Fetch the current plan and replace the cache with it.
    async fn apply(&self, event: &WatchEvent) {
        self.set_phase(Phase::Applying);
        debug!(kind = event.kind(), revision = event.revision(), "allocation changed");

        match self.store.get().await {
            Ok(plan) => {
                info!(
                    revision = event.revision(),
                    functions = plan.len(),
                    instances = plan.total_instances(),
                    "allocation cache updated"
                );
                self.cache.replace(plan);
            }
            Err(e) => warn!(
                kind = event.kind(),
                error = %e,
                "failed to fetch allocation, keeping cached plan"
            ),
        }
    }
}
