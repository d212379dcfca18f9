// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`Platform`] and [`EventSink`] backed by the Kubernetes API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::retry::retry_api_call;
use super::{EventRecord, EventSink, EventType, Object, Platform};
use crate::constants::FIELD_MANAGER;
use crate::errors::{Error, Result};

/// Platform operations over a `kube::Client`.
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Renders a label map as a selector string: `a=b,c=d`.
pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Maps 404 and 409 responses to the dedicated error variants.
fn classify<K: Object>(err: Error, namespace: &str, name: &str) -> Error {
    let kind = K::kind(&()).to_string();
    if err.is_not_found() {
        Error::not_found(&kind, namespace, name)
    } else if err.is_conflict() {
        Error::conflict(&kind, namespace, name)
    } else {
        err
    }
}

fn namespace_and_name<K: Object>(object: &K) -> (String, String) {
    (object.namespace().unwrap_or_default(), object.name_any())
}

#[async_trait]
impl Platform for KubePlatform {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api = self.api::<K>(namespace);
        let operation = format!("get {} {namespace}/{name}", K::kind(&()));
        retry_api_call(|| api.get_opt(name), &operation).await
    }

    async fn list<K: Object>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let api = self.api::<K>(namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        let operation = format!("list {} in {namespace}", K::kind(&()));
        let list = retry_api_call(|| api.list(&params), &operation).await?;
        Ok(list.items)
    }

    async fn create<K: Object>(&self, object: &K) -> Result<K> {
        let (namespace, name) = namespace_and_name(object);
        let api = self.api::<K>(&namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let operation = format!("create {} {namespace}/{name}", K::kind(&()));
        debug!(namespace = %namespace, name = %name, kind = %K::kind(&()), "Creating object");
        retry_api_call(|| api.create(&params, object), &operation)
            .await
            .map_err(|e| classify::<K>(e, &namespace, &name))
    }

    async fn replace<K: Object>(&self, object: &K) -> Result<K> {
        let (namespace, name) = namespace_and_name(object);
        let api = self.api::<K>(&namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let operation = format!("replace {} {namespace}/{name}", K::kind(&()));
        debug!(namespace = %namespace, name = %name, kind = %K::kind(&()), "Replacing object");
        retry_api_call(|| api.replace(&name, &params, object), &operation)
            .await
            .map_err(|e| classify::<K>(e, &namespace, &name))
    }

    async fn patch_annotations<K: Object>(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, Option<String>>,
    ) -> Result<()> {
        let api = self.api::<K>(namespace);
        let patch = Patch::Merge(json!({ "metadata": { "annotations": annotations } }));
        let params = PatchParams::apply(FIELD_MANAGER);
        let operation = format!("patch annotations of {} {namespace}/{name}", K::kind(&()));
        retry_api_call(|| api.patch(name, &params, &patch), &operation)
            .await
            .map_err(|e| classify::<K>(e, namespace, name))?;
        Ok(())
    }

    async fn update_status<K: Object>(&self, object: &K, status: serde_json::Value) -> Result<()> {
        let (namespace, name) = namespace_and_name(object);
        let api = self.api::<K>(&namespace);
        // A resourceVersion in a merge patch turns it into a conditional update.
        let patch = Patch::Merge(json!({
            "metadata": { "resourceVersion": object.resource_version() },
            "status": status,
        }));
        let params = PatchParams::default();
        let operation = format!("update status of {} {namespace}/{name}", K::kind(&()));
        retry_api_call(|| api.patch_status(&name, &params, &patch), &operation)
            .await
            .map_err(|e| classify::<K>(e, &namespace, &name))?;
        Ok(())
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<bool> {
        let api = self.api::<K>(namespace);
        let operation = format!("delete {} {namespace}/{name}", K::kind(&()));
        let params = DeleteParams::background();
        match retry_api_call(|| api.delete(name, &params), &operation).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn apply_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<()> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let name = binding.name_any();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let patch = Patch::Apply(binding);
        let operation = format!("apply ClusterRoleBinding {name}");
        retry_api_call(|| api.patch(&name, &params, &patch), &operation).await?;
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<bool> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let operation = format!("delete ClusterRoleBinding {name}");
        let params = DeleteParams::default();
        match retry_api_call(|| api.delete(name, &params), &operation).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Publishes events through the `events.k8s.io` API.
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    #[must_use]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, regarding: &ObjectReference, event: EventRecord) {
        let type_ = match event.event_type {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        };
        let kube_event = Event {
            type_,
            reason: event.reason.clone(),
            note: Some(event.note.clone()),
            action: event.action.clone(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&kube_event, regarding).await {
            warn!(reason = %event.reason, error = %e, "Failed to publish event");
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
