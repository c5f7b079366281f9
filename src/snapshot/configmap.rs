//! ConfigMap-backed replica snapshot

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::{debug, info};

use super::{parse_count, ReplicaSnapshot, ReplicaStore};
use crate::error::{Error, Result};

/// Annotation holding the time of the last write
pub const LAST_UPDATED_ANNOTATION: &str = "resources.cattle.io/last-updated";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGER: &str = "controller-pause";

/// Replica snapshot stored in a ConfigMap with a fixed name and namespace.
///
/// ConfigMap keys may not contain `/`, so the identity `namespace/name` is
/// stored as `namespace.name`. Namespaces never contain dots, which keeps the
/// encoding reversible.
#[derive(Clone)]
pub struct ConfigMapReplicaStore {
    api: Api<ConfigMap>,
    name: String,
    namespace: String,
}

impl ConfigMapReplicaStore {
    pub fn new(client: Client, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            name: name.into(),
            namespace,
        }
    }

    fn location(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    async fn merge(&self, key: &str, value: serde_json::Value) -> kube::Result<ConfigMap> {
        let patch = json!({
            "metadata": {
                "annotations": { LAST_UPDATED_ANNOTATION: Utc::now().to_rfc3339() }
            },
            "data": { key: value }
        });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
    }

    fn new_record(&self, key: &str, replicas: i32) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGER.to_string(),
                )])),
                annotations: Some(BTreeMap::from([(
                    LAST_UPDATED_ANNOTATION.to_string(),
                    Utc::now().to_rfc3339(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_string(), replicas.to_string())])),
            ..Default::default()
        }
    }

    async fn fetch(&self) -> Result<Option<ConfigMap>> {
        Ok(self.api.get_opt(&self.name).await?)
    }
}

/// Encode an identity as a ConfigMap data key
pub fn encode_key(identity: &str) -> String {
    identity.replacen('/', ".", 1)
}

/// Decode a ConfigMap data key back into an identity
pub fn decode_key(key: &str) -> String {
    key.replacen('.', "/", 1)
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == code)
}

#[async_trait]
impl ReplicaStore for ConfigMapReplicaStore {
    async fn record(&self, identity: &str, replicas: i32) -> Result<()> {
        let key = encode_key(identity);
        let write_failed =
            |e: kube::Error| Error::snapshot_write(format!("{} in {}: {}", identity, self.location(), e));

        match self.merge(&key, json!(replicas.to_string())).await {
            Ok(_) => {}
            Err(e) if is_status(&e, 404) => {
                info!(snapshot = %self.location(), "Creating replica snapshot record");
                match self
                    .api
                    .create(&PostParams::default(), &self.new_record(&key, replicas))
                    .await
                {
                    Ok(_) => {}
                    // Lost a creation race with another writer; the record exists now.
                    Err(e) if is_status(&e, 409) => {
                        self.merge(&key, json!(replicas.to_string()))
                            .await
                            .map_err(write_failed)?;
                    }
                    Err(e) => return Err(write_failed(e)),
                }
            }
            Err(e) => return Err(write_failed(e)),
        }

        debug!(identity = %identity, replicas, snapshot = %self.location(), "Recorded replica count");
        Ok(())
    }

    async fn forget(&self, identity: &str) -> Result<()> {
        match self.merge(&encode_key(identity), serde_json::Value::Null).await {
            Ok(_) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn lookup(&self, identity: &str) -> Result<Option<i32>> {
        let key = encode_key(identity);
        Ok(self
            .fetch()
            .await?
            .and_then(|cm| cm.data)
            .and_then(|data| data.get(&key).and_then(|raw| parse_count(raw))))
    }

    async fn load(&self) -> Result<ReplicaSnapshot> {
        let data = self
            .fetch()
            .await?
            .and_then(|cm| cm.data)
            .unwrap_or_default();
        let decoded: BTreeMap<String, String> = data
            .into_iter()
            .map(|(key, value)| (decode_key(&key), value))
            .collect();
        Ok(ReplicaSnapshot::from_data(&decoded))
    }

    async fn clear(&self) -> Result<()> {
        match self.api.delete(&self.name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(snapshot = %self.location(), "Deleted replica snapshot record");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }
}
