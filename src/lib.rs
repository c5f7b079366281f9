//! Controller pause/resume coordinator
//!
//! Scales controller workloads to zero before a backup or restore touches the
//! cluster, records their original replica counts in a durable snapshot, and
//! scales them back afterwards.

pub mod client;
pub mod collection;
pub mod config;
pub mod coordinator;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod replicas;
pub mod snapshot;
pub mod workload;

pub use coordinator::{Coordinator, PauseOutcome, ResumeOutcome, Settings};
pub use error::{Error, ReferenceError, Result};
pub use workload::WorkloadRef;
