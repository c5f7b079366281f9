//! Resource collections and controller classification
//!
//! A `ResourceCollection` is the set of live objects gathered for one backup
//! or restore run, grouped by API version and plural resource. Which of those
//! objects are pausable controllers is decided by a `ControllerClassifier`
//! supplied by the caller.

use std::collections::{BTreeMap, BTreeSet};

use kube::api::DynamicObject;
use kube::ResourceExt;

use crate::crd::ControllerReference;
use crate::workload::WorkloadRef;

/// API version plus plural resource name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceCoordinate {
    pub api_version: String,
    pub resource: String,
}

impl ResourceCoordinate {
    pub fn new(api_version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            resource: resource.into(),
        }
    }
}

/// Decides whether an object is a controller to pause
pub trait ControllerClassifier: Send + Sync {
    fn is_controller(&self, coordinate: &ResourceCoordinate, obj: &DynamicObject) -> bool;
}

/// Controllers explicitly declared by a ResourceSet
#[derive(Clone, Debug, Default)]
pub struct DeclaredControllers {
    declared: BTreeSet<(String, String, String, String)>,
}

impl DeclaredControllers {
    pub fn new<'a>(references: impl IntoIterator<Item = &'a ControllerReference>) -> Self {
        let declared = references
            .into_iter()
            .map(|r| {
                (
                    r.api_version.clone(),
                    r.resource.clone(),
                    r.namespace.clone().unwrap_or_default(),
                    r.name.clone(),
                )
            })
            .collect();
        Self { declared }
    }
}

impl ControllerClassifier for DeclaredControllers {
    fn is_controller(&self, coordinate: &ResourceCoordinate, obj: &DynamicObject) -> bool {
        self.declared.contains(&(
            coordinate.api_version.clone(),
            coordinate.resource.clone(),
            obj.namespace().unwrap_or_default(),
            obj.name_any(),
        ))
    }
}

/// Deployments whose name contains `controller`.
///
/// Inherited naming heuristic, kept for ResourceSets that predate declared
/// controller references. Prefer `DeclaredControllers`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NameHeuristic;

impl ControllerClassifier for NameHeuristic {
    fn is_controller(&self, coordinate: &ResourceCoordinate, obj: &DynamicObject) -> bool {
        let is_deployment = obj
            .types
            .as_ref()
            .map(|t| t.kind.eq_ignore_ascii_case("deployment"))
            .unwrap_or_else(|| coordinate.resource == "deployments");
        is_deployment && obj.name_any().contains("controller")
    }
}

/// Live objects of one run, keyed by coordinate
#[derive(Clone, Debug, Default)]
pub struct ResourceCollection {
    objects: BTreeMap<ResourceCoordinate, Vec<DynamicObject>>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coordinate: ResourceCoordinate, obj: DynamicObject) {
        self.objects.entry(coordinate).or_default().push(obj);
    }

    pub fn objects(&self) -> impl Iterator<Item = (&ResourceCoordinate, &DynamicObject)> {
        self.objects
            .iter()
            .flat_map(|(coordinate, objs)| objs.iter().map(move |obj| (coordinate, obj)))
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Workload references for every object the classifier accepts, in
    /// collection order. Duplicate identities within a coordinate are kept
    /// once.
    pub fn workload_refs(&self, classifier: &dyn ControllerClassifier) -> Vec<WorkloadRef> {
        let mut seen = BTreeSet::new();
        self.objects()
            .filter(|(coordinate, obj)| classifier.is_controller(coordinate, obj))
            .map(|(coordinate, obj)| {
                WorkloadRef::new(
                    coordinate.api_version.clone(),
                    coordinate.resource.clone(),
                    obj.name_any(),
                    obj.namespace().as_deref(),
                )
            })
            .filter(|r| seen.insert((r.api_version.clone(), r.resource.clone(), r.identity())))
            .collect()
    }
}
