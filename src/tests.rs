// Copyright 2025 The Open Cluster Management Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::context::Error;
use crate::store::ResourceStore;
use crate::types::v1::cluster_manager::{ClusterManager, ClusterManagerSpec};
use crate::types::v1::key::{ResourceKey, SubResourceKind};
use crate::types::v1::klusterlet::{Klusterlet, KlusterletSpec};
use crate::types::v1::managed::{ManagedResource, SubResource, spec_hash};
use crate::types::v1::status::Status;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::ResourceExt;
use kube::api::DynamicObject;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

// Helper functions to create test resources (available to submodule tests via crate::tests)
pub fn create_test_cluster_manager(registration_image: &str, work_image: &str) -> ClusterManager {
    ClusterManager {
        metadata: metav1::ObjectMeta {
            name: Some("cluster-manager".to_string()),
            uid: Some("test-uid-123".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: ClusterManagerSpec {
            registration_image_pull_spec: registration_image.to_string(),
            work_image_pull_spec: work_image.to_string(),
        },
        status: None,
    }
}

pub fn create_test_klusterlet(namespace: &str, registration_image: &str) -> Klusterlet {
    Klusterlet {
        metadata: metav1::ObjectMeta {
            name: Some("klusterlet".to_string()),
            uid: Some("test-uid-123".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: KlusterletSpec {
            namespace: namespace.to_string(),
            registration_image_pull_spec: registration_image.to_string(),
            cluster_name: "cluster1".to_string(),
            ..Default::default()
        },
        status: None,
    }
}

fn injected(operation: &str) -> Error {
    Error::Timeout {
        operation: operation.to_string(),
        timeout: Duration::ZERO,
    }
}

fn mark_deleting(value: &mut serde_json::Value, resource_version: String) {
    value["metadata"]["deletionTimestamp"] = json!("2025-01-01T00:00:00Z");
    value["metadata"]["resourceVersion"] = json!(resource_version);
}

#[derive(Default)]
struct MemoryState {
    managed: BTreeMap<(String, String), serde_json::Value>,
    objects: BTreeMap<ResourceKey, DynamicObject>,
    resource_version: u64,

    failing_applies: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    pending_conflicts: u32,
    pending_finalizer_conflicts: u32,
    apply_delay: Option<Duration>,
    deployments_unready: bool,
    delete_on_apply: bool,
    drifted: BTreeSet<ResourceKey>,

    applied: Vec<ResourceKey>,
    deleted: Vec<ResourceKey>,
    status_writes: u32,
}

impl MemoryState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Someone else wrote `kind/name` in between.
    fn bump(&mut self, key: &(String, String)) {
        let version = self.next_version();
        if let Some(value) = self.managed.get_mut(key) {
            value["metadata"]["resourceVersion"] = json!(version);
        }
    }
}

/// A resource store kept in memory, with knobs to inject failures.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn managed_key<K: ManagedResource>(name: &str) -> (String, String) {
    (K::kind(&()).to_string(), name.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn insert<K: ManagedResource>(&self, mut resource: K) {
        let mut state = self.state();
        resource.meta_mut().resource_version = Some(state.next_version());
        let key = managed_key::<K>(&resource.name_any());
        state
            .managed
            .insert(key, serde_json::to_value(&resource).unwrap());
    }

    pub fn managed<K: ManagedResource>(&self, name: &str) -> Option<K> {
        self.state()
            .managed
            .get(&managed_key::<K>(name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn status<K: ManagedResource>(&self, name: &str) -> Status {
        self.managed::<K>(name)
            .and_then(|r| r.status().cloned())
            .unwrap_or_default()
    }

    /// Edits the spec like a user would, bumping the generation.
    pub fn edit<K: ManagedResource>(&self, name: &str, edit: impl FnOnce(&mut K)) {
        let mut resource = self.managed::<K>(name).unwrap();
        edit(&mut resource);
        let generation = resource.meta().generation.unwrap_or_default() + 1;
        resource.meta_mut().generation = Some(generation);
        self.insert(resource);
    }

    pub fn mark_deleting<K: ManagedResource>(&self, name: &str) {
        let mut state = self.state();
        let version = state.next_version();
        if let Some(value) = state.managed.get_mut(&managed_key::<K>(name)) {
            mark_deleting(value, version);
        }
    }

    pub fn fail_apply(&self, name: &str) {
        self.state().failing_applies.insert(name.to_string());
    }

    pub fn heal_apply(&self, name: &str) {
        self.state().failing_applies.remove(name);
    }

    pub fn fail_delete(&self, name: &str) {
        self.state().failing_deletes.insert(name.to_string());
    }

    pub fn heal_delete(&self, name: &str) {
        self.state().failing_deletes.remove(name);
    }

    /// The next `n` status writes lose against a competing writer.
    pub fn conflict_next(&self, n: u32) {
        self.state().pending_conflicts = n;
    }

    /// The next `n` finalizer writes lose against a competing writer.
    pub fn finalizer_conflicts_next(&self, n: u32) {
        self.state().pending_finalizer_conflicts = n;
    }

    pub fn set_apply_delay(&self, delay: Option<Duration>) {
        self.state().apply_delay = delay;
    }

    pub fn set_deployments_ready(&self, ready: bool) {
        self.state().deployments_unready = !ready;
    }

    /// Marks every managed resource as deleting on the next apply.
    pub fn delete_on_apply(&self) {
        self.state().delete_on_apply = true;
    }

    /// Simulates an out-of-band edit of a live sub-resource.
    pub fn drift(&self, key: &ResourceKey) {
        let mut guard = self.state();
        let state = &mut *guard;
        if let Some(object) = state.objects.get_mut(key) {
            let generation = object.metadata.generation.unwrap_or_default() + 1;
            object.metadata.generation = Some(generation);
            state.drifted.insert(key.clone());
        }
    }

    pub fn object(&self, key: &ResourceKey) -> Option<DynamicObject> {
        self.state().objects.get(key).cloned()
    }

    pub fn remove_object(&self, key: &ResourceKey) {
        self.state().objects.remove(key);
    }

    pub fn object_keys(&self) -> BTreeSet<ResourceKey> {
        self.state().objects.keys().cloned().collect()
    }

    /// Keys applied since the last call.
    pub fn take_applied(&self) -> Vec<ResourceKey> {
        std::mem::take(&mut self.state().applied)
    }

    pub fn take_deleted(&self) -> Vec<ResourceKey> {
        std::mem::take(&mut self.state().deleted)
    }

    pub fn status_writes(&self) -> u32 {
        self.state().status_writes
    }

    fn live_status(kind: Option<SubResourceKind>, generation: i64, ready: bool) -> serde_json::Value {
        match kind {
            Some(SubResourceKind::Deployment) => {
                let ready_replicas = if ready { 3 } else { 0 };
                json!({
                    "observedGeneration": generation,
                    "replicas": 3,
                    "updatedReplicas": 3,
                    "readyReplicas": ready_replicas,
                })
            }
            Some(SubResourceKind::CustomResourceDefinition) => {
                json!({"conditions": [{"type": "Established", "status": "True"}]})
            }
            _ => serde_json::Value::Null,
        }
    }

    fn check_version<K: ManagedResource>(state: &MemoryState, base: &K) -> Result<(), Error> {
        let name = base.name_any();
        let stored: Option<K> = state
            .managed
            .get(&managed_key::<K>(&name))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?;
        match stored {
            Some(stored) if stored.meta().resource_version == base.meta().resource_version => Ok(()),
            _ => Err(Error::Conflict {
                kind: K::kind(&()).to_string(),
                name,
            }),
        }
    }
}

impl ResourceStore for MemoryStore {
    async fn get<K: ManagedResource>(&self, name: &str) -> Result<Option<K>, Error> {
        let value = self.state().managed.get(&managed_key::<K>(name)).cloned();
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn update_status<K: ManagedResource>(&self, base: &K, status: &Status) -> Result<K, Error> {
        let mut state = self.state();
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            state.bump(&managed_key::<K>(&base.name_any()));
        }
        Self::check_version(&state, base)?;

        let mut updated = base.clone();
        *updated.status_mut() = Some(status.clone());
        updated.meta_mut().resource_version = Some(state.next_version());
        state.status_writes += 1;
        state.managed.insert(
            managed_key::<K>(&updated.name_any()),
            serde_json::to_value(&updated)?,
        );
        Ok(updated)
    }

    async fn update_finalizers<K: ManagedResource>(
        &self,
        base: &K,
        finalizers: Vec<String>,
    ) -> Result<K, Error> {
        let mut state = self.state();
        if state.pending_finalizer_conflicts > 0 {
            state.pending_finalizer_conflicts -= 1;
            state.bump(&managed_key::<K>(&base.name_any()));
        }
        Self::check_version(&state, base)?;

        let mut updated = base.clone();
        updated.meta_mut().finalizers = Some(finalizers);
        updated.meta_mut().resource_version = Some(state.next_version());

        let key = managed_key::<K>(&updated.name_any());
        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.managed.remove(&key);
        } else {
            state.managed.insert(key, serde_json::to_value(&updated)?);
        }
        Ok(updated)
    }

    async fn apply(&self, sub: &SubResource) -> Result<DynamicObject, Error> {
        let delay = self.state().apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.delete_on_apply {
            state.delete_on_apply = false;
            let keys: Vec<_> = state.managed.keys().cloned().collect();
            for key in keys {
                let version = state.next_version();
                if let Some(value) = state.managed.get_mut(&key) {
                    mark_deleting(value, version);
                }
            }
        }

        if state.failing_applies.contains(&sub.key.name) {
            return Err(injected(&format!("apply {}", sub.key.name)));
        }

        let previous = state.objects.get(&sub.key);
        let generation = match previous {
            None => 1,
            Some(live) => {
                let current = live.metadata.generation.unwrap_or_default();
                let changed =
                    spec_hash(live) != sub.spec_hash() || state.drifted.contains(&sub.key);
                if changed { current + 1 } else { current }
            }
        };

        let mut object = sub.object.clone();
        object.metadata.generation = Some(generation);
        let status = Self::live_status(sub.key.kind(), generation, !state.deployments_unready);
        if !status.is_null() {
            object.data["status"] = status;
        }

        state.drifted.remove(&sub.key);
        state.applied.push(sub.key.clone());
        state.objects.insert(sub.key.clone(), object.clone());
        Ok(object)
    }

    async fn observe(&self, key: &ResourceKey) -> Result<Option<DynamicObject>, Error> {
        Ok(self.state().objects.get(key).cloned())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), Error> {
        let mut state = self.state();
        if state.failing_deletes.contains(&key.name) {
            return Err(injected(&format!("delete {}", key.name)));
        }
        state.objects.remove(key);
        state.deleted.push(key.clone());
        Ok(())
    }
}
