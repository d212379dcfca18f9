// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`Platform`] used by unit and scenario tests.
//!
//! Objects are stored as JSON keyed by kind, namespace and name. The store keeps the
//! bookkeeping the reconcilers depend on: `resourceVersion` is bumped on every write
//! and used as a precondition, `generation` is bumped when `spec` changes, and `status`
//! is only writable through [`Platform::update_status`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::Resource;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{EventRecord, EventSink, Object, Platform};
use crate::errors::{Error, Result};

/// Operations failures can be injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Replace,
    Patch,
    UpdateStatus,
    Delete,
}

type ObjectKey = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    cluster_role_bindings: BTreeMap<String, ClusterRoleBinding>,
    last_resource_version: u64,
    failures: Vec<(Verb, String)>,
    writes: usize,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.last_resource_version += 1;
        self.last_resource_version.to_string()
    }

    /// Consumes an injected failure matching the call.
    fn take_failure(&mut self, verb: Verb, kind: &str) -> Result<()> {
        if let Some(index) = self
            .failures
            .iter()
            .position(|(v, k)| *v == verb && k == kind)
        {
            self.failures.remove(index);
            return Err(Error::Transport(format!("injected {verb:?} failure on {kind}")));
        }
        Ok(())
    }
}

/// Shared in-memory object store.
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    state: Arc<Mutex<State>>,
}

fn kind_of<K: Object>() -> String {
    K::kind(&()).to_string()
}

fn metadata_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get("metadata")?.get(field)?.as_str()
}

fn labels_match(value: &Value, selector: &BTreeMap<String, String>) -> bool {
    let labels = value.get("metadata").and_then(|m| m.get("labels"));
    selector.iter().all(|(key, expected)| {
        labels
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
            .is_some_and(|actual| actual == expected)
    })
}

fn decode<K: Object>(value: &Value) -> Result<K> {
    Ok(serde_json::from_value(value.clone())?)
}

impl MemoryPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `verb` on objects of kind `K` fail with a transport error.
    pub fn fail_next<K: Object>(&self, verb: Verb) {
        self.lock().failures.push((verb, kind_of::<K>()));
    }

    /// Number of successful write operations so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Inserts an object as if a user created it.
    ///
    /// # Errors
    ///
    /// Fails when the object already exists or cannot be serialized.
    pub fn seed<K: Object>(&self, object: &K) -> Result<K> {
        let mut state = self.lock();
        insert(&mut state, kind_of::<K>(), serde_json::to_value(object)?).and_then(|v| decode(&v))
    }

    /// Marks an object as being deleted.
    pub fn mark_deleted<K: Object>(&self, namespace: &str, name: &str) {
        let mut state = self.lock();
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        if let Some(value) = state.objects.get_mut(&key) {
            value["metadata"]["deletionTimestamp"] = json!("2025-01-01T00:00:00Z");
        }
    }

    /// Names of the stored objects of kind `K` in a namespace.
    #[must_use]
    pub fn names<K: Object>(&self, namespace: &str) -> Vec<String> {
        let kind = kind_of::<K>();
        self.lock()
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// A stored cluster role binding.
    #[must_use]
    pub fn cluster_role_binding(&self, name: &str) -> Option<ClusterRoleBinding> {
        self.lock().cluster_role_bindings.get(name).cloned()
    }
}

fn insert(state: &mut State, kind: String, mut value: Value) -> Result<Value> {
    let namespace = metadata_str(&value, "namespace")
        .filter(|ns| !ns.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| Error::Transport(format!("{kind} without namespace")))?;
    let name = metadata_str(&value, "name")
        .map(ToString::to_string)
        .ok_or_else(|| Error::Transport(format!("{kind} without name")))?;
    let key = (kind.clone(), namespace.clone(), name.clone());
    if state.objects.contains_key(&key) {
        return Err(Error::conflict(&kind, &namespace, &name));
    }

    let resource_version = state.next_resource_version();
    let metadata = &mut value["metadata"];
    metadata["resourceVersion"] = json!(resource_version);
    metadata["generation"] = json!(1);
    metadata["uid"] = json!(format!("uid-{kind}-{namespace}-{name}").to_lowercase());
    state.objects.insert(key, value.clone());
    Ok(value)
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::Get, &kind)?;
        state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .map(decode)
            .transpose()
    }

    async fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::List, &kind)?;
        state
            .objects
            .iter()
            .filter(|((k, ns, _), value)| *k == kind && ns == namespace && labels_match(value, labels))
            .map(|(_, value)| decode(value))
            .collect()
    }

    async fn create<K: Object>(&self, object: &K) -> Result<K> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::Create, &kind)?;
        let mut value = serde_json::to_value(object)?;
        if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove("resourceVersion");
        }
        let stored = insert(&mut state, kind, value)?;
        state.writes += 1;
        decode(&stored)
    }

    async fn replace<K: Object>(&self, object: &K) -> Result<K> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::Replace, &kind)?;
        let mut value = serde_json::to_value(object)?;
        let namespace = metadata_str(&value, "namespace").unwrap_or_default().to_string();
        let name = metadata_str(&value, "name").unwrap_or_default().to_string();
        let key = (kind.clone(), namespace.clone(), name.clone());

        let Some(existing) = state.objects.get(&key).cloned() else {
            return Err(Error::not_found(&kind, &namespace, &name));
        };
        let expected = metadata_str(&value, "resourceVersion").unwrap_or_default();
        let current = metadata_str(&existing, "resourceVersion").unwrap_or_default();
        if !expected.is_empty() && expected != current {
            return Err(Error::conflict(&kind, &namespace, &name));
        }

        let mut generation = existing["metadata"]["generation"].as_i64().unwrap_or(1);
        if value.get("spec") != existing.get("spec") {
            generation += 1;
        }
        // Status is owned by the status subresource.
        match existing.get("status") {
            Some(status) => value["status"] = status.clone(),
            None => {
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("status");
                }
            }
        }
        let resource_version = state.next_resource_version();
        let metadata = &mut value["metadata"];
        metadata["resourceVersion"] = json!(resource_version);
        metadata["generation"] = json!(generation);
        metadata["uid"] = existing["metadata"]["uid"].clone();
        if let Some(deletion) = existing["metadata"].get("deletionTimestamp") {
            metadata["deletionTimestamp"] = deletion.clone();
        }
        state.objects.insert(key, value.clone());
        state.writes += 1;
        decode(&value)
    }

    async fn patch_annotations<K: Object>(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, Option<String>>,
    ) -> Result<()> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::Patch, &kind)?;
        let resource_version = state.next_resource_version();
        let key = (kind.clone(), namespace.to_string(), name.to_string());
        let value = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(&kind, namespace, name))?;

        let metadata = &mut value["metadata"];
        if !metadata["annotations"].is_object() {
            metadata["annotations"] = json!({});
        }
        if let Some(existing) = metadata["annotations"].as_object_mut() {
            for (key, annotation) in annotations {
                match annotation {
                    Some(v) => {
                        existing.insert(key.clone(), json!(v));
                    }
                    None => {
                        existing.remove(key);
                    }
                }
            }
        }
        metadata["resourceVersion"] = json!(resource_version);
        state.writes += 1;
        Ok(())
    }

    async fn update_status<K: Object>(&self, object: &K, status: Value) -> Result<()> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::UpdateStatus, &kind)?;
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        let expected = object.meta().resource_version.clone().unwrap_or_default();
        let resource_version = state.next_resource_version();
        let key = (kind.clone(), namespace.clone(), name.clone());
        let value = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(&kind, &namespace, &name))?;

        if !expected.is_empty()
            && metadata_str(value, "resourceVersion").unwrap_or_default() != expected
        {
            return Err(Error::conflict(&kind, &namespace, &name));
        }
        value["status"] = status;
        value["metadata"]["resourceVersion"] = json!(resource_version);
        state.writes += 1;
        Ok(())
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.lock();
        let kind = kind_of::<K>();
        state.take_failure(Verb::Delete, &kind)?;
        let removed = state
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some();
        if removed {
            state.writes += 1;
        }
        Ok(removed)
    }

    async fn apply_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<()> {
        let mut state = self.lock();
        let name = binding.metadata.name.clone().unwrap_or_default();
        state.cluster_role_bindings.insert(name, binding.clone());
        state.writes += 1;
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<bool> {
        let mut state = self.lock();
        let removed = state.cluster_role_bindings.remove(name).is_some();
        if removed {
            state.writes += 1;
        }
        Ok(removed)
    }
}

/// Records published events.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<(String, EventRecord)>>,
}

impl MemoryEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Events about the object named `name`.
    #[must_use]
    pub fn events_for(&self, name: &str) -> Vec<EventRecord> {
        self.lock()
            .iter()
            .filter(|(regarding, _)| regarding == name)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Reasons of every event published so far.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.lock().iter().map(|(_, e)| e.reason.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, EventRecord)>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord) {
        let name = regarding.name.clone().unwrap_or_default();
        self.lock().push((name, event));
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
