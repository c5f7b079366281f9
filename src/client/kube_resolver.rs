//! Resolver backed by the kube dynamic API

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use tracing::debug;

use super::{parse_group_version, ResourceAccessor, ResourceResolver};
use crate::error::{classify_kube_error, Error, Result};
use crate::workload::WorkloadRef;

/// Resolver producing `Api<DynamicObject>` accessors
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
}

impl KubeResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Build the `ApiResource` for a workload reference.
///
/// Only the plural is known for a reference, so `kind` stays empty; request
/// paths are built from the plural alone.
pub fn api_resource_for(target: &WorkloadRef) -> Result<ApiResource> {
    if target.resource.is_empty() {
        return Err(Error::invalid_reference(format!(
            "empty resource for {}",
            target.identity()
        )));
    }
    let (group, version) = parse_group_version(&target.api_version)?;
    Ok(ApiResource {
        group,
        version,
        api_version: target.api_version.clone(),
        kind: String::new(),
        plural: target.resource.clone(),
    })
}

impl ResourceResolver for KubeResolver {
    fn resolve(&self, target: &WorkloadRef) -> Result<Box<dyn ResourceAccessor>> {
        let ar = api_resource_for(target)?;
        let api: Api<DynamicObject> = match target.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        };
        debug!(
            api_version = %target.api_version,
            resource = %target.resource,
            namespace = target.namespace.as_deref().unwrap_or(""),
            "Resolved dynamic accessor"
        );
        Ok(Box::new(KubeAccessor {
            api,
            scope: target.namespace.clone().unwrap_or_default(),
        }))
    }
}

struct KubeAccessor {
    api: Api<DynamicObject>,
    scope: String,
}

impl KubeAccessor {
    fn describe(&self, name: &str) -> String {
        format!("{}/{}", self.scope, name)
    }
}

#[async_trait]
impl ResourceAccessor for KubeAccessor {
    async fn get(&self, name: &str) -> Result<DynamicObject> {
        self.api
            .get(name)
            .await
            .map_err(|e| classify_kube_error(e, &self.describe(name)))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.name_any();
        self.api
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify_kube_error(e, &self.describe(&name)))
    }
}
