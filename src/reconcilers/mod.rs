// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcilers for the Beat and Dashboard custom resources.
//!
//! Each reconciler reads its resource, drives the owned objects toward the rendered
//! desired state and reports the outcome in status.
//!
//! # Reconciliation Architecture
//!
//! 1. **Validate** - Reject specs the workload cannot run with
//! 2. **Associate** - Resolve connection details of referenced resources
//! 3. **Render** - Compose configuration and pod templates
//! 4. **Apply** - Create or update secrets, services and workloads
//! 5. **Status** - Report counts, version, associations and health
//!
//! # Available Reconcilers
//!
//! - [`reconcile_beat`] - Renders a Beat into a DaemonSet or a Deployment
//! - [`reconcile_dashboard`] - Renders a Dashboard into a Deployment and a Service
//!
//! Both take a [`crate::context::Context`] and the namespaced name of the resource, so
//! they run unchanged against a live cluster or the in-memory platform:
//!
//! ```rust,no_run
//! use beacon::config::OperatorConfig;
//! use beacon::context::Context;
//! use beacon::names::NamespacedName;
//! use beacon::platform::memory::{MemoryEventSink, MemoryPlatform};
//! use beacon::reconcilers::reconcile_beat;
//! use beacon::watches::DynamicWatches;
//! use std::sync::Arc;
//!
//! async fn reconcile_once() -> beacon::errors::Result<()> {
//!     let ctx = Context::new(
//!         MemoryPlatform::new(),
//!         Arc::new(DynamicWatches::new()),
//!         Arc::new(MemoryEventSink::new()),
//!         OperatorConfig::default(),
//!     );
//!     reconcile_beat(&ctx, &NamespacedName::new("observability", "filebeat")).await?;
//!     Ok(())
//! }
//! ```

pub mod beat;
pub mod dashboard;
pub mod driver;
pub mod keystore;
pub mod pod_template;
pub mod resources;
pub mod results;
pub mod status;
pub mod user_config;
pub mod workload;

pub use beat::reconcile_beat;
pub use dashboard::reconcile_dashboard;
pub use results::Results;
