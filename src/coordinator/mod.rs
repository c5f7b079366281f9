//! Pause and resume coordination
//!
//! A pass walks a batch of workload references through a bounded pool. Every
//! reference is attempted independently and failures are collected rather
//! than aborting the batch. Two operations never act on the same
//! `namespace/name` at once.

mod pause;
mod resume;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::client::ResourceResolver;
use crate::config::Config;
use crate::error::{Error, ReferenceError, Result};
use crate::snapshot::ReplicaStore;
use crate::workload::WorkloadRef;

/// Tunables for a coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Workloads processed concurrently
    pub concurrency: usize,
    /// Fresh-fetch retries after an update conflict
    pub conflict_retries: u32,
    /// Delete the snapshot record after a fully successful resume
    pub clear_snapshot_after_resume: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            conflict_retries: 0,
            clear_snapshot_after_resume: false,
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            conflict_retries: config.conflict_retries,
            clear_snapshot_after_resume: config.clear_snapshot_after_resume,
        }
    }
}

/// Result of a pause pass
#[derive(Debug, Default)]
pub struct PauseOutcome {
    /// References now at zero, with `captured_replicas` set
    pub paused: Vec<WorkloadRef>,
    pub errors: Vec<ReferenceError>,
}

impl PauseOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of a resume pass
#[derive(Debug, Default)]
pub struct ResumeOutcome {
    /// References scaled back, with the count they were restored to
    pub resumed: Vec<WorkloadRef>,
    pub errors: Vec<ReferenceError>,
}

impl ResumeOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives workloads to zero replicas and back
pub struct Coordinator {
    resolver: Arc<dyn ResourceResolver>,
    store: Arc<dyn ReplicaStore>,
    settings: Settings,
    cancel: CancellationToken,
    locks: IdentityLocks,
}

impl Coordinator {
    pub fn new(
        resolver: Arc<dyn ResourceResolver>,
        store: Arc<dyn ReplicaStore>,
        settings: Settings,
    ) -> Self {
        Self {
            resolver,
            store,
            settings,
            cancel: CancellationToken::new(),
            locks: IdentityLocks::default(),
        }
    }

    /// Stop starting new references once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run `op` for every reference, at most `concurrency` at a time, holding
    /// the identity lock for the duration of each call. Results keep input
    /// order.
    async fn run_pass<F, Fut>(
        &self,
        references: Vec<WorkloadRef>,
        op: F,
    ) -> Vec<(WorkloadRef, Result<i32>)>
    where
        F: Fn(WorkloadRef) -> Fut,
        Fut: Future<Output = (WorkloadRef, Result<i32>)>,
    {
        let op = &op;
        futures::stream::iter(references)
            .map(|target| async move {
                if self.cancel.is_cancelled() {
                    let identity = target.identity();
                    return (target, Err(Error::Cancelled(identity)));
                }
                let _guard = self.locks.acquire(&target.identity()).await;
                op(target).await
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }
}

/// One async mutex per `namespace/name`
#[derive(Default)]
struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    async fn acquire(&self, identity: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop locks nobody holds or waits on.
            locks.retain(|key, lock| key == identity || Arc::strong_count(lock) > 1);
            locks
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
