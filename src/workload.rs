//! Workload references under pause/resume control

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crd::ControllerReference;

/// Identity and API coordinates of a controller-managed object.
///
/// `captured_replicas` is only set once a pause pass has durably recorded the
/// object's original scale. It is never read from the live object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRef {
    pub api_version: String,
    /// Plural resource name, e.g. `deployments`
    pub resource: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_replicas: Option<i32>,
}

impl WorkloadRef {
    pub fn new(
        api_version: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<&str>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            resource: resource.into(),
            name: name.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            captured_replicas: None,
        }
    }

    /// Snapshot key: `namespace/name`, with an empty namespace for
    /// cluster-scoped objects.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace.as_deref().unwrap_or(""), self.name)
    }

    pub fn with_captured(mut self, replicas: i32) -> Self {
        self.captured_replicas = Some(replicas);
        self
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.api_version, self.resource, self.identity())
    }
}

impl From<&ControllerReference> for WorkloadRef {
    fn from(reference: &ControllerReference) -> Self {
        let mut workload = WorkloadRef::new(
            reference.api_version.clone(),
            reference.resource.clone(),
            reference.name.clone(),
            reference.namespace.as_deref(),
        );
        workload.captured_replicas = reference.replicas.filter(|r| *r >= 0);
        workload
    }
}
