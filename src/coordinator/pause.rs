//! Scale controllers down, recording their original replica count first

use std::time::Instant;

use tracing::{error, info, instrument, warn};

use super::{Coordinator, PauseOutcome};
use crate::client::ResourceAccessor;
use crate::collection::{ControllerClassifier, ResourceCollection};
use crate::error::{Error, ReferenceError, Result};
use crate::metrics;
use crate::replicas::{read_replicas, write_replicas};
use crate::workload::WorkloadRef;

/// Where a pause attempt failed relative to the snapshot write
enum PauseFailure {
    /// Nothing was written; the live object is untouched
    BeforeSnapshot(Error),
    /// The snapshot holds an entry but the object was not scaled down
    AfterSnapshot(Error),
}

impl Coordinator {
    /// Pause every controller the classifier selects from the collection.
    pub async fn pause(
        &self,
        collection: &ResourceCollection,
        classifier: &dyn ControllerClassifier,
    ) -> PauseOutcome {
        let references = collection.workload_refs(classifier);
        info!(
            objects = collection.len(),
            controllers = references.len(),
            "Classified controllers for pause"
        );
        self.pause_references(references).await
    }

    /// Pause a batch of workload references.
    ///
    /// A reference is reported paused only after its original count has been
    /// recorded and the object has been updated to zero replicas.
    #[instrument(skip_all, fields(references = references.len()))]
    pub async fn pause_references(&self, references: Vec<WorkloadRef>) -> PauseOutcome {
        let started = Instant::now();

        let results = self
            .run_pass(references, |target| async move {
                let result = self.pause_one(&target).await;
                (target, result)
            })
            .await;

        let mut outcome = PauseOutcome::default();
        for (target, result) in results {
            match result {
                Ok(replicas) => {
                    metrics::record_operation("pause", "success");
                    outcome.paused.push(target.with_captured(replicas));
                }
                Err(e) => {
                    error!(workload = %target, error = %e, "Failed to pause controller, skipping it");
                    metrics::record_operation("pause", e.kind());
                    outcome
                        .errors
                        .push(ReferenceError::new(target.identity(), e));
                }
            }
        }

        metrics::PASS_DURATION
            .with_label_values(&["pause"])
            .observe(started.elapsed().as_secs_f64());
        metrics::PAUSED_WORKLOADS.set(outcome.paused.len() as f64);

        info!(
            paused = outcome.paused.len(),
            failed = outcome.errors.len(),
            "Pause pass finished"
        );
        outcome
    }

    async fn pause_one(&self, target: &WorkloadRef) -> Result<i32> {
        info!(workload = %target, "Processing controller for pause");
        let accessor = self.resolver.resolve(target)?;
        let identity = target.identity();

        let mut attempt = 0;
        loop {
            match self.capture_and_zero(accessor.as_ref(), target, &identity).await {
                Ok(replicas) => return Ok(replicas),
                Err(PauseFailure::BeforeSnapshot(e)) => return Err(e),
                Err(PauseFailure::AfterSnapshot(e))
                    if e.is_retryable() && attempt < self.settings.conflict_retries =>
                {
                    attempt += 1;
                    warn!(workload = %target, attempt, "Conflict scaling down, refetching");
                }
                Err(PauseFailure::AfterSnapshot(e)) => {
                    self.retract(&identity).await;
                    return Err(e);
                }
            }
        }
    }

    async fn capture_and_zero(
        &self,
        accessor: &dyn ResourceAccessor,
        target: &WorkloadRef,
        identity: &str,
    ) -> std::result::Result<i32, PauseFailure> {
        let mut obj = accessor
            .get(&target.name)
            .await
            .map_err(PauseFailure::BeforeSnapshot)?;
        let live = read_replicas(&obj).map_err(PauseFailure::BeforeSnapshot)?;

        // Already at zero with a recorded original: a repeated pause must not
        // capture the zero.
        if live == 0 {
            let existing = self
                .store
                .lookup(identity)
                .await
                .map_err(PauseFailure::BeforeSnapshot)?;
            if let Some(original) = existing {
                self.record(identity, original)
                    .await
                    .map_err(PauseFailure::BeforeSnapshot)?;
                info!(workload = %target, replicas = original, "Controller already paused");
                return Ok(original);
            }
        }

        self.record(identity, live)
            .await
            .map_err(PauseFailure::BeforeSnapshot)?;

        write_replicas(&mut obj, 0).map_err(PauseFailure::AfterSnapshot)?;
        info!(workload = %target, replicas = live, "Scaling down controller to 0");
        accessor
            .update(&obj)
            .await
            .map_err(PauseFailure::AfterSnapshot)?;

        Ok(live)
    }

    async fn record(&self, identity: &str, replicas: i32) -> Result<()> {
        match self.store.record(identity, replicas).await {
            Ok(()) => {
                metrics::SNAPSHOT_WRITES.with_label_values(&["success"]).inc();
                Ok(())
            }
            Err(e) => {
                metrics::SNAPSHOT_WRITES.with_label_values(&["failure"]).inc();
                Err(match e {
                    Error::SnapshotWrite(_) => e,
                    other => Error::snapshot_write(format!("{}: {}", identity, other)),
                })
            }
        }
    }

    // The object kept its original scale, so its entry must not be mistaken
    // for a pause by a later resume.
    async fn retract(&self, identity: &str) {
        if let Err(e) = self.store.forget(identity).await {
            warn!(
                identity = %identity,
                error = %e,
                "Failed to retract replica entry; it records the current scale of an unpaused controller"
            );
        }
    }
}
