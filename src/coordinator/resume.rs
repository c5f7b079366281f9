//! Scale paused controllers back to their captured replica count

use std::time::Instant;

use tracing::{error, info, instrument, warn};

use super::{Coordinator, ResumeOutcome};
use crate::error::{Error, ReferenceError, Result};
use crate::metrics;
use crate::replicas::write_replicas;
use crate::snapshot::ReplicaSnapshot;
use crate::workload::WorkloadRef;

impl Coordinator {
    /// Resume a batch of workload references.
    ///
    /// In-memory `captured_replicas` win; otherwise the count comes from the
    /// snapshot record, loaded once for the whole pass. References with no
    /// captured count anywhere are skipped with `Error::NotCaptured`; an
    /// unreadable record yields `Error::SnapshotRead`. Each entry is dropped
    /// once its workload has been scaled back.
    #[instrument(skip_all, fields(references = references.len()))]
    pub async fn resume(&self, references: Vec<WorkloadRef>) -> ResumeOutcome {
        let started = Instant::now();

        let snapshot = if references.iter().any(|r| captured(r).is_none()) {
            match self.store.load().await {
                Ok(snapshot) => {
                    info!(entries = snapshot.len(), "Loaded replica snapshot");
                    Ok(snapshot)
                }
                Err(e) => {
                    error!(error = %e, "Failed to load replica snapshot");
                    Err(format!("{}: {}", e.kind(), e))
                }
            }
        } else {
            Ok(ReplicaSnapshot::default())
        };
        let snapshot = &snapshot;

        let results = self
            .run_pass(references, |target| async move {
                let result = self.resume_one(&target, snapshot).await;
                (target, result)
            })
            .await;

        let mut outcome = ResumeOutcome::default();
        for (target, result) in results {
            match result {
                Ok(replicas) => {
                    metrics::record_operation("resume", "success");
                    outcome.resumed.push(target.with_captured(replicas));
                }
                Err(e) => {
                    error!(workload = %target, error = %e, "Failed to resume controller, edit it to scale back");
                    metrics::record_operation("resume", e.kind());
                    outcome
                        .errors
                        .push(ReferenceError::new(target.identity(), e));
                }
            }
        }

        if outcome.is_success() && self.settings.clear_snapshot_after_resume {
            if let Err(e) = self.clear_snapshot().await {
                warn!(error = %e, "Failed to delete replica snapshot after resume");
            }
        }

        metrics::PASS_DURATION
            .with_label_values(&["resume"])
            .observe(started.elapsed().as_secs_f64());
        if outcome.is_success() {
            metrics::PAUSED_WORKLOADS.set(0.0);
        }

        info!(
            resumed = outcome.resumed.len(),
            failed = outcome.errors.len(),
            "Resume pass finished"
        );
        outcome
    }

    /// Delete the durable snapshot record
    pub async fn clear_snapshot(&self) -> Result<()> {
        self.store.clear().await
    }

    async fn resume_one(
        &self,
        target: &WorkloadRef,
        snapshot: &std::result::Result<ReplicaSnapshot, String>,
    ) -> Result<i32> {
        let identity = target.identity();
        let replicas = match (captured(target), snapshot) {
            (Some(replicas), _) => replicas,
            (None, Ok(snapshot)) => snapshot
                .get(&identity)
                .ok_or_else(|| Error::NotCaptured(identity.clone()))?,
            (None, Err(reason)) => {
                return Err(Error::SnapshotRead(format!("{}: {}", identity, reason)))
            }
        };

        info!(workload = %target, "Processing controller for resume");
        let accessor = self.resolver.resolve(target)?;

        let mut attempt = 0;
        loop {
            let mut obj = accessor.get(&target.name).await?;
            write_replicas(&mut obj, replicas)?;
            info!(workload = %target, replicas, "Scaling up controller");
            match accessor.update(&obj).await {
                Ok(_) => {
                    self.release(&identity).await;
                    return Ok(replicas);
                }
                Err(e) if e.is_retryable() && attempt < self.settings.conflict_retries => {
                    attempt += 1;
                    warn!(workload = %target, attempt, "Conflict scaling up, refetching");
                }
                Err(e) => return Err(e),
            }
        }
    }

    // A resumed workload is no longer paused; a leftover entry would be taken
    // for its original count by the next pause.
    async fn release(&self, identity: &str) {
        match self.store.forget(identity).await {
            Ok(()) => metrics::SNAPSHOT_WRITES.with_label_values(&["released"]).inc(),
            Err(e) => {
                metrics::SNAPSHOT_WRITES
                    .with_label_values(&["release_failure"])
                    .inc();
                warn!(identity = %identity, error = %e, "Failed to drop replica entry after resume");
            }
        }
    }
}

fn captured(target: &WorkloadRef) -> Option<i32> {
    target.captured_replicas.filter(|r| *r >= 0)
}
