//! Replication Bootstrap
//!
//! One-shot startup sequence that prepares the master, prepares the replicas
//! and starts replication. Steps run strictly in order. A failing step is
//! logged and the sequence moves on; only steps that depend on a failed step
//! are skipped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::config::Config;
use crate::endpoint::{Endpoint, EndpointRegistry, LogPosition, ReplicationCredential, ReplicationSource};
use crate::error::Error;

/// Bootstrap steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    WaitForMaster,
    EnsureReplicationIdentity,
    EnsureWriteSchema,
    EnsureReplicaSchemas,
    CaptureLogPosition,
    ConfigureReplicas,
}

impl Step {
    /// Every step, in the order it runs
    pub const SEQUENCE: [Step; 6] = [
        Step::WaitForMaster,
        Step::EnsureReplicationIdentity,
        Step::EnsureWriteSchema,
        Step::EnsureReplicaSchemas,
        Step::CaptureLogPosition,
        Step::ConfigureReplicas,
    ];

    /// Steps that must have succeeded for this one to run
    pub fn requires(&self) -> &'static [Step] {
        match self {
            Step::ConfigureReplicas => &[Step::EnsureReplicationIdentity, Step::CaptureLogPosition],
            _ => &[],
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// Per-replica step where some replicas failed
    Degraded { failed: Vec<String> },
    Failed { reason: String },
    /// Not run because a required step did not succeed
    Skipped { missing: Step },
}

impl StepOutcome {
    /// Whether dependent steps may run
    pub fn is_usable(&self) -> bool {
        matches!(self, StepOutcome::Succeeded | StepOutcome::Degraded { .. })
    }
}

/// Ordered record of what bootstrap did
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub steps: Vec<(Step, StepOutcome)>,
    pub position: Option<LogPosition>,
}

impl BootstrapReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    /// True when any step did not fully succeed
    pub fn is_degraded(&self) -> bool {
        self.steps.iter().any(|(_, o)| *o != StepOutcome::Succeeded)
    }

    fn usable(&self, step: Step) -> bool {
        self.outcome(step).map(StepOutcome::is_usable).unwrap_or(false)
    }
}

/// Parameters of the bootstrap sequence
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub credential: ReplicationCredential,
    /// Master address as replicas see it
    pub master_host: String,
    pub master_port: u16,
    pub wait_attempts: u32,
    pub wait_delay: Duration,
}

impl BootstrapSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            credential: ReplicationCredential {
                username: config.replication.user.clone(),
                password: config.replication.password.clone(),
            },
            master_host: config.master.advertise_host().to_string(),
            master_port: config.master.port,
            wait_attempts: config.replication.wait_attempts,
            wait_delay: config.wait_delay(),
        }
    }
}

/// Startup state machine for replication
pub struct ReplicationBootstrapper {
    registry: Arc<EndpointRegistry>,
    settings: BootstrapSettings,
    position: Option<LogPosition>,
}

impl ReplicationBootstrapper {
    pub fn new(registry: Arc<EndpointRegistry>, settings: BootstrapSettings) -> Self {
        Self {
            registry,
            settings,
            position: None,
        }
    }

    /// Run the whole sequence once
    pub async fn run(mut self) -> BootstrapReport {
        tracing::info!(
            "Starting replication bootstrap ({} replicas)",
            self.registry.replica_count()
        );
        let mut report = BootstrapReport::default();

        for step in Step::SEQUENCE {
            let outcome = match step.requires().iter().find(|r| !report.usable(**r)) {
                Some(missing) => StepOutcome::Skipped { missing: *missing },
                None => self.run_step(step).await,
            };

            match &outcome {
                StepOutcome::Succeeded => tracing::info!("Bootstrap step {} succeeded", step),
                StepOutcome::Degraded { failed } => {
                    tracing::warn!("Bootstrap step {} degraded, failed replicas: {:?}", step, failed)
                }
                StepOutcome::Failed { reason } => {
                    tracing::error!("Bootstrap step {} failed: {}", step, reason)
                }
                StepOutcome::Skipped { missing } => {
                    tracing::warn!("Bootstrap step {} skipped: {} did not succeed", step, missing)
                }
            }
            report.steps.push((step, outcome));
        }

        report.position = self.position.take();
        if report.is_degraded() {
            tracing::warn!("Replication bootstrap finished in degraded state");
        } else {
            tracing::info!("Replication bootstrap complete");
        }
        report
    }

    /// Execute a single step without dependency checks
    pub async fn run_step(&mut self, step: Step) -> StepOutcome {
        match step {
            Step::WaitForMaster => self.wait_for_master().await,
            Step::EnsureReplicationIdentity => {
                let master = self.registry.acquire_write();
                single(master.ensure_replication_user(&self.settings.credential).await)
            }
            Step::EnsureWriteSchema => single(self.registry.acquire_write().ensure_schema().await),
            Step::EnsureReplicaSchemas => {
                per_replica(self.registry.replicas(), |replica| async move {
                    replica.ensure_schema().await
                })
                .await
            }
            Step::CaptureLogPosition => match self.registry.acquire_write().log_position().await {
                Ok(position) => {
                    tracing::info!("Captured master log position {}", position);
                    self.position = Some(position);
                    StepOutcome::Succeeded
                }
                Err(e) => StepOutcome::Failed { reason: e.to_string() },
            },
            Step::ConfigureReplicas => {
                let Some(position) = self.position.clone() else {
                    return StepOutcome::Failed {
                        reason: "no master log position captured".to_string(),
                    };
                };
                let source = ReplicationSource {
                    host: self.settings.master_host.clone(),
                    port: self.settings.master_port,
                    credential: self.settings.credential.clone(),
                    position,
                };
                let source = &source;
                per_replica(self.registry.replicas(), |replica| async move {
                    replica.follow(source).await
                })
                .await
            }
        }
    }

    async fn wait_for_master(&self) -> StepOutcome {
        let master = self.registry.acquire_write();
        let attempts = self.settings.wait_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match master.ping().await {
                Ok(()) => {
                    tracing::info!("Master {} reachable (attempt {}/{})", master.name(), attempt, attempts);
                    return StepOutcome::Succeeded;
                }
                Err(e) => {
                    tracing::warn!(
                        "Waiting for master {} (attempt {}/{}): {}",
                        master.name(),
                        attempt,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.wait_delay).await;
            }
        }

        StepOutcome::Failed {
            reason: format!(
                "master unreachable after {} attempts: {}",
                attempts,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        }
    }
}

fn single(result: Result<(), Error>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Succeeded,
        Err(e) => StepOutcome::Failed { reason: e.to_string() },
    }
}

/// Run `op` on every replica concurrently; failures stay isolated per replica
async fn per_replica<'a, F, Fut>(replicas: &'a [Arc<dyn Endpoint>], op: F) -> StepOutcome
where
    F: Fn(&'a Arc<dyn Endpoint>) -> Fut,
    Fut: std::future::Future<Output = Result<(), Error>> + 'a,
{
    let results = join_all(replicas.iter().map(|replica| {
        let fut = op(replica);
        async move { (replica.name(), fut.await) }
    }))
    .await;

    let mut failed = Vec::new();
    for (name, result) in results {
        if let Err(e) = result {
            tracing::warn!("Replica {} failed: {}", name, e);
            failed.push(name.to_string());
        }
    }

    if failed.is_empty() {
        StepOutcome::Succeeded
    } else if failed.len() == replicas.len() {
        StepOutcome::Failed {
            reason: format!("all replicas failed: {}", failed.join(", ")),
        }
    } else {
        StepOutcome::Degraded { failed }
    }
}
