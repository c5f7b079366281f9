//! ResourceSet Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::workload::WorkloadRef;

/// ResourceSet resource specification
///
/// Only the controller references are modelled here; they are the explicit
/// classification of which workloads get paused around a backup or restore.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "resources.cattle.io",
    version = "v1",
    kind = "ResourceSet",
    plural = "resourcesets",
    singular = "resourceset",
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSetSpec {
    /// Controllers scaled to zero while a backup or restore runs
    #[serde(default)]
    pub controller_references: Vec<ControllerReference>,
}

/// Reference to a scalable controller workload
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerReference {
    /// API version, e.g. `apps/v1`
    pub api_version: String,

    /// Plural resource name, e.g. `deployments`
    pub resource: String,

    /// Object name
    pub name: String,

    /// Namespace (empty for cluster-scoped workloads)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Replica count to restore, when already known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

impl ResourceSetSpec {
    /// Copy captured replica counts onto the matching controller references
    pub fn record_captured(&mut self, workloads: &[WorkloadRef]) {
        for reference in &mut self.controller_references {
            let identity = WorkloadRef::from(&*reference).identity();
            if let Some(workload) = workloads.iter().find(|w| {
                w.identity() == identity
                    && w.api_version == reference.api_version
                    && w.resource == reference.resource
            }) {
                reference.replicas = workload.captured_replicas;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: resources.cattle.io/v1
kind: ResourceSet
metadata:
  name: rancher-resource-set
spec:
  controllerReferences:
    - apiVersion: apps/v1
      resource: deployments
      name: fleet-controller
      namespace: cattle-fleet-system
    - apiVersion: apps/v1
      resource: deployments
      name: cluster-controller
"#;

    #[test]
    fn parses_controller_references() {
        let rs: ResourceSet = serde_yaml::from_str(MANIFEST).unwrap();
        let refs = &rs.spec.controller_references;
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].namespace.as_deref(), Some("cattle-fleet-system"));
        assert_eq!(refs[1].namespace, None);
        assert_eq!(refs[1].replicas, None);
    }

    #[test]
    fn record_captured_fills_matching_references() {
        let mut rs: ResourceSet = serde_yaml::from_str(MANIFEST).unwrap();
        let paused = vec![WorkloadRef::new(
            "apps/v1",
            "deployments",
            "fleet-controller",
            Some("cattle-fleet-system"),
        )
        .with_captured(3)];
        rs.spec.record_captured(&paused);
        assert_eq!(rs.spec.controller_references[0].replicas, Some(3));
        assert_eq!(rs.spec.controller_references[1].replicas, None);
    }
}
