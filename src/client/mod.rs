//! Dynamic resource access by API coordinate
//!
//! The coordinators never hold typed clients. A `ResourceResolver` turns the
//! coordinates of a workload reference into a `ResourceAccessor` that can
//! fetch and replace arbitrary objects of that resource kind.

mod kube_resolver;

pub use kube_resolver::KubeResolver;

use async_trait::async_trait;
use kube::api::DynamicObject;

use crate::error::{Error, Result};
use crate::workload::WorkloadRef;

/// Get-by-name and whole-object update for one resource kind and scope
#[async_trait]
pub trait ResourceAccessor: Send + Sync {
    /// Fetch an object. Missing objects yield `Error::NotFound`.
    async fn get(&self, name: &str) -> Result<DynamicObject>;

    /// Replace an object. The object's `resourceVersion` is sent as-is so
    /// stale writes are rejected with `Error::Conflict`.
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject>;
}

/// Builds accessors from workload coordinates
pub trait ResourceResolver: Send + Sync {
    /// Resolve an accessor scoped to the reference's resource kind and, when
    /// non-empty, its namespace.
    fn resolve(&self, target: &WorkloadRef) -> Result<Box<dyn ResourceAccessor>>;
}

/// Split an API version into `(group, version)`.
///
/// Accepts `group/version`, or a bare `version` for the core group.
pub fn parse_group_version(api_version: &str) -> Result<(String, String)> {
    let invalid = || Error::invalid_reference(format!("malformed apiVersion '{}'", api_version));

    if api_version.is_empty() || api_version.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let mut parts = api_version.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(version), None, None) => Ok((String::new(), version.to_string())),
        (Some(group), Some(version), None) if !group.is_empty() && !version.is_empty() => {
            Ok((group.to_string(), version.to_string()))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_and_core_versions() {
        assert_eq!(
            parse_group_version("apps/v1").unwrap(),
            ("apps".to_string(), "v1".to_string())
        );
        assert_eq!(
            parse_group_version("v1").unwrap(),
            (String::new(), "v1".to_string())
        );
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", "/v1", "apps/", "apps/v1/extra", "apps /v1", "/"] {
            assert!(
                matches!(parse_group_version(bad), Err(Error::InvalidReference(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
