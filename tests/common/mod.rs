// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common fixtures for the scenario tests.
//!
//! Every scenario runs the reconcilers against the in-memory platform, so the tests
//! need no cluster.

#![allow(dead_code)]

use beacon::config::OperatorConfig;
use beacon::context::Context;
use beacon::crd::{Beat, BeatSpec, DaemonSetSpec, Dashboard, DashboardSpec};
use beacon::labels::CONFIG_HASH_ANNOTATION;
use beacon::platform::memory::{MemoryEventSink, MemoryPlatform};
use beacon::platform::Platform;
use beacon::secrets;
use beacon::watches::DynamicWatches;
use k8s_openapi::api::core::v1::{PodTemplateSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use std::sync::Arc;

pub const NAMESPACE: &str = "ns";

/// A platform, its event sink and a context over both.
pub struct Harness {
    pub platform: MemoryPlatform,
    pub events: Arc<MemoryEventSink>,
    pub ctx: Context<MemoryPlatform>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OperatorConfig::default())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let platform = MemoryPlatform::new();
        let events = Arc::new(MemoryEventSink::new());
        let ctx = Context::new(
            platform.clone(),
            Arc::new(DynamicWatches::new()),
            events.clone(),
            config,
        );
        Self {
            platform,
            events,
            ctx,
        }
    }

    /// Reads an object that must exist.
    pub async fn must_get<K: beacon::platform::Object>(&self, name: &str) -> K {
        self.platform
            .get::<K>(NAMESPACE, name)
            .await
            .expect("platform get")
            .unwrap_or_else(|| panic!("{name} not found"))
    }

    /// Reads, edits and writes back an object.
    pub async fn update<K, F>(&self, name: &str, edit: F)
    where
        K: beacon::platform::Object,
        F: FnOnce(&mut K),
    {
        let mut object: K = self.must_get(name).await;
        edit(&mut object);
        self.platform.replace(&object).await.expect("platform replace");
    }
}

/// The Beat of scenario 1: a filebeat daemon with inline configuration.
pub fn filebeat(name: &str) -> Beat {
    let mut beat = Beat::new(
        name,
        BeatSpec {
            r#type: "filebeat".to_string(),
            version: "7.15.0".to_string(),
            config: Some(json!({"foo": "bar"})),
            daemon_set: Some(DaemonSetSpec::default()),
            ..Default::default()
        },
    );
    beat.metadata.namespace = Some(NAMESPACE.to_string());
    beat
}

pub fn dashboard(name: &str, spec: DashboardSpec) -> Dashboard {
    let mut dashboard = Dashboard::new(name, spec);
    dashboard.metadata.namespace = Some(NAMESPACE.to_string());
    dashboard
}

pub fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(secrets::data_from(data.iter().copied())),
        ..Default::default()
    }
}

/// Config hash stamped on a pod template.
pub fn config_hash(template: &PodTemplateSpec) -> String {
    template
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(CONFIG_HASH_ANNOTATION))
        .cloned()
        .expect("pod template carries a config hash")
}
