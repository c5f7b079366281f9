//! In-memory stand-ins for the API server and the snapshot record

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::ResourceExt;
use serde_json::Value;

use controller_pause::client::{parse_group_version, ResourceAccessor, ResourceResolver};
use controller_pause::snapshot::{ReplicaSnapshot, ReplicaStore};
use controller_pause::{Error, Result, WorkloadRef};

/// (apiVersion, resource, namespace, name)
type ObjectKey = (String, String, String, String);

#[derive(Default)]
struct ClusterState {
    objects: HashMap<ObjectKey, DynamicObject>,
    /// Remaining forced conflicts per `namespace/name`
    conflicts: HashMap<String, usize>,
    /// (apiVersion, resource, namespace) of every resolved accessor
    resolved: Vec<(String, String, Option<String>)>,
    updates: Vec<(String, i64)>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Fake API server holding dynamic objects
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
    latency: Option<Duration>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add(&self, target: &WorkloadRef, data: Value) {
        let (group, version) = parse_group_version(&target.api_version).unwrap();
        let ar = ApiResource {
            group,
            version,
            api_version: target.api_version.clone(),
            kind: "Deployment".to_string(),
            plural: target.resource.clone(),
        };
        let mut obj = DynamicObject::new(&target.name, &ar).data(data);
        obj.metadata.namespace = target.namespace.clone();
        obj.metadata.resource_version = Some("1".to_string());
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key_of(target), obj);
    }

    pub fn remove(&self, target: &WorkloadRef) {
        self.state.lock().unwrap().objects.remove(&key_of(target));
    }

    pub fn object(&self, target: &WorkloadRef) -> Option<DynamicObject> {
        self.state.lock().unwrap().objects.get(&key_of(target)).cloned()
    }

    /// Raw `spec.replicas` of the stored object
    pub fn replicas(&self, target: &WorkloadRef) -> Option<Value> {
        self.object(target)
            .and_then(|o| o.data.get("spec").and_then(|s| s.get("replicas")).cloned())
    }

    /// Fail the next `times` updates of an identity with a conflict
    pub fn conflict_on_update(&self, identity: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .conflicts
            .insert(identity.to_string(), times);
    }

    /// Change the stored object behind the coordinator's back
    pub fn external_scale(&self, target: &WorkloadRef, replicas: i64) {
        let mut state = self.state.lock().unwrap();
        let obj = state.objects.get_mut(&key_of(target)).unwrap();
        obj.data["spec"]["replicas"] = Value::from(replicas);
        bump_version(obj);
    }

    pub fn resolved(&self) -> Vec<(String, String, Option<String>)> {
        self.state.lock().unwrap().resolved.clone()
    }

    pub fn update_count(&self, identity: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .filter(|(id, _)| id == identity)
            .count()
    }

    /// Highest number of simultaneous calls observed for one identity
    pub fn max_in_flight(&self, identity: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_in_flight
            .get(identity)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of simultaneous calls observed overall
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self, identity: &str) {
        let mut state = self.state.lock().unwrap();
        let current = {
            let n = state.in_flight.entry(identity.to_string()).or_default();
            *n += 1;
            *n
        };
        let max = state.max_in_flight.entry(identity.to_string()).or_default();
        *max = (*max).max(current);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
    }

    fn leave(&self, identity: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(n) = state.in_flight.get_mut(identity) {
            *n -= 1;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn pause_for_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn key_of(target: &WorkloadRef) -> ObjectKey {
    (
        target.api_version.clone(),
        target.resource.clone(),
        target.namespace.clone().unwrap_or_default(),
        target.name.clone(),
    )
}

fn bump_version(obj: &mut DynamicObject) {
    let next = obj
        .metadata
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    obj.metadata.resource_version = Some(next.to_string());
}

impl ResourceResolver for FakeCluster {
    fn resolve(&self, target: &WorkloadRef) -> Result<Box<dyn ResourceAccessor>> {
        parse_group_version(&target.api_version)?;
        self.state.lock().unwrap().resolved.push((
            target.api_version.clone(),
            target.resource.clone(),
            target.namespace.clone(),
        ));
        Ok(Box::new(FakeAccessor {
            cluster: self.clone(),
            api_version: target.api_version.clone(),
            resource: target.resource.clone(),
            namespace: target.namespace.clone().unwrap_or_default(),
        }))
    }
}

struct FakeAccessor {
    cluster: FakeCluster,
    api_version: String,
    resource: String,
    namespace: String,
}

impl FakeAccessor {
    fn key(&self, name: &str) -> ObjectKey {
        (
            self.api_version.clone(),
            self.resource.clone(),
            self.namespace.clone(),
            name.to_string(),
        )
    }

    fn identity(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }
}

#[async_trait]
impl ResourceAccessor for FakeAccessor {
    async fn get(&self, name: &str) -> Result<DynamicObject> {
        let identity = self.identity(name);
        self.cluster.enter(&identity);
        self.cluster.pause_for_latency().await;
        let found = self
            .cluster
            .state
            .lock()
            .unwrap()
            .objects
            .get(&self.key(name))
            .cloned();
        self.cluster.leave(&identity);
        found.ok_or(Error::NotFound(identity))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.name_any();
        let identity = self.identity(&name);
        self.cluster.enter(&identity);
        self.cluster.pause_for_latency().await;

        let result = {
            let mut state = self.cluster.state.lock().unwrap();
            let forced = match state.conflicts.get_mut(&identity) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            };
            match state.objects.get(&self.key(&name)).cloned() {
                None => Err(Error::NotFound(identity.clone())),
                Some(_) if forced => Err(Error::Conflict(identity.clone())),
                Some(current)
                    if current.metadata.resource_version != obj.metadata.resource_version =>
                {
                    Err(Error::Conflict(identity.clone()))
                }
                Some(_) => {
                    let mut stored = obj.clone();
                    bump_version(&mut stored);
                    let replicas = stored.data["spec"]["replicas"].as_i64().unwrap_or(-1);
                    state.updates.push((identity.clone(), replicas));
                    state.objects.insert(self.key(&name), stored.clone());
                    Ok(stored)
                }
            }
        };

        self.cluster.leave(&identity);
        result
    }
}

/// Snapshot record kept in memory, keyed by `namespace/name`
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    fail_forget: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> BTreeMap<String, String> {
        self.data.lock().unwrap().clone()
    }

    pub fn insert(&self, identity: &str, raw: &str) {
        self.data
            .lock()
            .unwrap()
            .insert(identity.to_string(), raw.to_string());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_forget(&self, fail: bool) {
        self.fail_forget.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::config("snapshot record unreadable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplicaStore for MemoryStore {
    async fn record(&self, identity: &str, replicas: i32) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::snapshot_write(format!("{}: store unavailable", identity)));
        }
        self.insert(identity, &replicas.to_string());
        Ok(())
    }

    async fn forget(&self, identity: &str) -> Result<()> {
        if self.fail_forget.load(Ordering::SeqCst) {
            return Err(Error::snapshot_write(format!("{}: store unavailable", identity)));
        }
        self.data.lock().unwrap().remove(identity);
        Ok(())
    }

    async fn lookup(&self, identity: &str) -> Result<Option<i32>> {
        self.check_reads()?;
        Ok(ReplicaSnapshot::from_data(&self.data()).get(identity))
    }

    async fn load(&self) -> Result<ReplicaSnapshot> {
        self.check_reads()?;
        Ok(ReplicaSnapshot::from_data(&self.data()))
    }

    async fn clear(&self) -> Result<()> {
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

pub fn deployment(name: &str, namespace: &str) -> WorkloadRef {
    WorkloadRef::new("apps/v1", "deployments", name, Some(namespace))
}
