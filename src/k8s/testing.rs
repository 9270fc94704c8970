//! In-memory cluster for unit tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;
use serde_json::Value;

use super::client::ClusterApi;
use super::context::ClusterContext;
use super::document::ResourceKey;
use super::error::{ClusterError, ClusterResult};

type Change = Box<dyn FnOnce(&mut DynamicObject) + Send>;

struct PendingChange {
    key: ResourceKey,
    remaining_gets: usize,
    apply: Change,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ResourceKey, DynamicObject>,
    next_version: u64,
    injected_conflicts: u32,
    pending: Vec<PendingChange>,
    calls: Vec<String>,
}

impl State {
    fn bump(&mut self, obj: &mut DynamicObject) {
        self.next_version += 1;
        obj.metadata.resource_version = Some(self.next_version.to_string());
    }
}

/// A [`ClusterApi`] holding objects in memory with resourceVersion checks
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context in `project` backed by this cluster
    pub fn context(&self, project: &str) -> ClusterContext {
        ClusterContext::from_api(Arc::new(self.clone()), project, "fake")
    }

    /// Store an object as if the control plane created it
    pub fn insert(&self, resource: &ApiResource, mut obj: DynamicObject) {
        let mut state = self.state.lock().unwrap();
        state.bump(&mut obj);
        let key = ResourceKey::of_dynamic(resource, &obj);
        state.objects.insert(key, obj);
    }

    pub fn object(&self, key: &ResourceKey) -> Option<DynamicObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.state.lock().unwrap().objects.contains_key(key)
    }

    /// Modify a stored object out of band, bumping its resourceVersion
    pub fn mutate(&self, key: &ResourceKey, change: impl FnOnce(&mut DynamicObject)) {
        let mut state = self.state.lock().unwrap();
        let mut obj = state.objects.remove(key).expect("object to mutate");
        change(&mut obj);
        state.bump(&mut obj);
        state.objects.insert(key.clone(), obj);
    }

    /// Set `status` of a stored object
    pub fn set_status(&self, key: &ResourceKey, status: Value) {
        self.mutate(key, |obj| {
            obj.data["status"] = status;
        });
    }

    /// Apply `change` once `key` has been fetched `gets` more times
    pub fn change_after_gets(
        &self,
        key: &ResourceKey,
        gets: usize,
        change: impl FnOnce(&mut DynamicObject) + Send + 'static,
    ) {
        self.state.lock().unwrap().pending.push(PendingChange {
            key: key.clone(),
            remaining_gets: gets,
            apply: Box::new(change),
        });
    }

    /// Make the next `count` updates fail as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        self.state.lock().unwrap().injected_conflicts = count;
    }

    /// Calls received so far, as `"<verb> <key>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(verb))
            .count()
    }
}

fn matches_selector(obj: &DynamicObject, selector: &str) -> bool {
    let labels = obj.labels();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term.trim()),
        })
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> ClusterResult<DynamicObject> {
        let key = ResourceKey::new(resource.kind.clone(), namespace, name);
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {key}"));

        let mut due = Vec::new();
        for change in std::mem::take(&mut state.pending) {
            if change.key != key {
                state.pending.push(change);
            } else if change.remaining_gets <= 1 {
                due.push(change.apply);
            } else {
                state.pending.push(PendingChange {
                    remaining_gets: change.remaining_gets - 1,
                    ..change
                });
            }
        }
        if let Some(mut obj) = state.objects.remove(&key) {
            if !due.is_empty() {
                for apply in due {
                    apply(&mut obj);
                }
                state.bump(&mut obj);
            }
            state.objects.insert(key.clone(), obj);
        }

        state
            .objects
            .get(&key)
            .cloned()
            .ok_or(ClusterError::NotFound(key))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        document: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let key = ResourceKey::of_dynamic(resource, document);
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {key}"));
        if state.objects.contains_key(&key) {
            return Err(ClusterError::Submission {
                message: format!("{key} already exists"),
                key,
            });
        }
        let mut obj = document.clone();
        if let Some(data) = obj.data.as_object_mut() {
            data.remove("status");
        }
        state.bump(&mut obj);
        state.objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        document: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let key = ResourceKey::of_dynamic(resource, document);
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update {key}"));

        let Some(mut current) = state.objects.remove(&key) else {
            return Err(ClusterError::NotFound(key));
        };
        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            state.bump(&mut current);
            state.objects.insert(key.clone(), current);
            return Err(ClusterError::Conflict(key));
        }
        if current.metadata.resource_version != document.metadata.resource_version {
            state.objects.insert(key.clone(), current);
            return Err(ClusterError::Conflict(key));
        }

        let status = current.data.get("status").cloned();
        let mut obj = document.clone();
        if let Some(status) = status {
            obj.data["status"] = status;
        }
        state.bump(&mut obj);
        state.objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
        ignore_not_found: bool,
    ) -> ClusterResult<bool> {
        let key = ResourceKey::new(resource.kind.clone(), namespace, name);
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete {key}"));
        match state.objects.remove(&key) {
            Some(_) => Ok(true),
            None if ignore_not_found => Ok(false),
            None => Err(ClusterError::NotFound(key)),
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<DynamicObject>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list {}", resource.kind));
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == resource.kind)
            .filter(|(key, _)| namespace.is_none() || key.namespace.as_deref() == namespace)
            .filter(|(_, obj)| label_selector.map_or(true, |s| matches_selector(obj, s)))
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}
