//! Error types for the controller pause coordinator

use thiserror::Error;

/// Result type alias using the coordinator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coordinator error types
#[derive(Error, Debug)]
pub enum Error {
    /// API version or resource coordinate could not be parsed
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Object does not exist on the API server
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Replica field missing or in an unrecognized encoding
    #[error("Invalid replica field: {0}")]
    FieldShape(String),

    /// Optimistic concurrency mismatch on update
    #[error("Conflict updating {0}")]
    Conflict(String),

    /// Durable replica record could not be written
    #[error("Snapshot write failed: {0}")]
    SnapshotWrite(String),

    /// Durable replica record could not be read
    #[error("Snapshot read failed: {0}")]
    SnapshotRead(String),

    /// No captured replica count exists for the workload
    #[error("No captured replica count for {0}")]
    NotCaptured(String),

    /// Pass was cancelled before the workload was started
    #[error("Cancelled before processing {0}")]
    Cancelled(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid reference error
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Error::InvalidReference(msg.into())
    }

    /// Create a field shape error
    pub fn field_shape(msg: impl Into<String>) -> Self {
        Error::FieldShape(msg.into())
    }

    /// Create a snapshot write error
    pub fn snapshot_write(msg: impl Into<String>) -> Self {
        Error::SnapshotWrite(msg.into())
    }

    /// Whether a fresh fetch followed by another update may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Short label used for metrics and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidReference(_) => "invalid_reference",
            Error::NotFound(_) => "not_found",
            Error::FieldShape(_) => "field_shape",
            Error::Conflict(_) => "conflict",
            Error::SnapshotWrite(_) => "snapshot_write",
            Error::SnapshotRead(_) => "snapshot_read",
            Error::NotCaptured(_) => "not_captured",
            Error::Cancelled(_) => "cancelled",
            Error::Kube(_) => "kube",
            Error::Config(_) => "config",
            Error::Serialization(_) | Error::Yaml(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}

/// Failure of a single workload within a pause or resume pass
#[derive(Error, Debug)]
#[error("{identity}: {error}")]
pub struct ReferenceError {
    /// `namespace/name` of the workload
    pub identity: String,
    #[source]
    pub error: Error,
}

impl ReferenceError {
    pub fn new(identity: impl Into<String>, error: Error) -> Self {
        Self {
            identity: identity.into(),
            error,
        }
    }
}

/// Map a kube API error onto the coordinator taxonomy.
///
/// 404 becomes `NotFound` and 409 becomes `Conflict`; everything else is kept
/// as a raw `Kube` error.
pub fn classify_kube_error(err: kube::Error, what: &str) -> Error {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => Error::NotFound(what.to_string()),
        kube::Error::Api(api_err) if api_err.code == 409 => Error::Conflict(what.to_string()),
        other => Error::Kube(other),
    }
}
