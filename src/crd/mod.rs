//! Custom Resource Definitions used by the pause coordinator

mod resource_set;

pub use resource_set::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![serde_yaml::to_string(&ResourceSet::crd()).unwrap()]
}
