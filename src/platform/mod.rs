// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Platform access used by the reconcilers.
//!
//! The reconcilers never talk to the Kubernetes API directly. They go through the
//! [`Platform`] trait, which exposes the handful of typed operations they need, and
//! publish events through an [`EventSink`].
//!
//! - [`client::KubePlatform`] / [`client::KubeEventSink`] - backed by a `kube::Client`
//! - [`memory::MemoryPlatform`] / [`memory::MemoryEventSink`] - in-memory, used by tests
//!
//! Cancellation: dropping a reconcile future drops any in-flight call.

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::errors::Result;

pub mod client;
pub mod memory;
pub mod retry;

/// Namespaced object types the platform can store.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed operations on the platform API.
///
/// Writes are protected by optimistic concurrency: `replace` and `update_status` fail
/// with a conflict when the object changed since it was read.
#[async_trait]
pub trait Platform: Clone + Send + Sync + 'static {
    /// Fetches an object, `None` when it does not exist.
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Lists the objects of a namespace carrying every given label.
    async fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>>;

    /// Creates an object in the namespace set in its metadata.
    async fn create<K: Object>(&self, object: &K) -> Result<K>;

    /// Replaces an object. A set `resourceVersion` is used as precondition.
    async fn replace<K: Object>(&self, object: &K) -> Result<K>;

    /// Merges annotations into an object, `None` values remove the annotation.
    async fn patch_annotations<K: Object>(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, Option<String>>,
    ) -> Result<()>;

    /// Writes the status subresource, conditional on the `resourceVersion` of `object`.
    async fn update_status<K: Object>(&self, object: &K, status: serde_json::Value) -> Result<()>;

    /// Deletes an object. Returns false when it did not exist.
    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Creates or replaces a cluster scoped role binding.
    async fn apply_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<()>;

    /// Deletes a cluster scoped role binding. Returns false when it did not exist.
    async fn delete_cluster_role_binding(&self, name: &str) -> Result<bool>;
}

/// Severity of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// An event about a custom resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub event_type: EventType,
    pub reason: String,
    pub action: String,
    pub note: String,
}

impl EventRecord {
    #[must_use]
    pub fn normal(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Normal,
            reason: reason.to_string(),
            action: action.to_string(),
            note: note.into(),
        }
    }

    #[must_use]
    pub fn warning(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Warning,
            reason: reason.to_string(),
            action: action.to_string(),
            note: note.into(),
        }
    }
}

/// Where events about custom resources go.
///
/// Publishing is best effort: failures are logged by the implementation and never
/// fail a reconcile.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, regarding: &k8s_openapi::api::core::v1::ObjectReference, event: EventRecord);
}
