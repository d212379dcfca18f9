// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Beacon - Log Shipper and Dashboard Operator for Kubernetes
//!
//! Beacon reconciles two custom resources into running workloads:
//!
//! - `Beat` - a log or metrics shipper, run as a `DaemonSet` or a `Deployment`
//! - `Dashboard` - the visualization front-end, run as a `Deployment`
//!
//! ## Overview
//!
//! Each resource is rendered into a configuration secret and a workload whose pod
//! template carries a hash of everything the pods depend on. References to other
//! resources (index stores, dashboards, monitoring clusters) are resolved by the
//! association manager, which caches connection details in annotations and gates
//! rollouts on the version of the target.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`association`] - Association resolution, version gating and the dashboard association controller
//! - [`validation`] - Admission-style validation of specs and spec updates
//! - [`settings`] - Hierarchical configuration trees and their merge rules
//! - [`platform`] - The API seam, backed by a cluster or by memory
//! - [`watches`] - Dynamic watches of secrets and dashboards
//!
//! ## Example
//!
//! ```rust,no_run
//! use beacon::crd::{Beat, BeatSpec, DaemonSetSpec, ObjectSelector};
//!
//! let beat = Beat::new(
//!     "filebeat",
//!     BeatSpec {
//!         r#type: "filebeat".to_string(),
//!         version: "8.15.0".to_string(),
//!         index_store_ref: Some(ObjectSelector::named("es")),
//!         config: Some(serde_json::json!({"filebeat.inputs": [{"type": "container"}]})),
//!         daemon_set: Some(DaemonSetSpec::default()),
//!         ..Default::default()
//!     },
//! );
//! ```

pub mod association;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod hash;
pub mod labels;
pub mod metrics;
pub mod names;
pub mod platform;
pub mod reconcilers;
pub mod secrets;
pub mod settings;
pub mod status_reasons;
pub mod validation;
pub mod version;
pub mod watches;
