// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the platform used for API operations
//! - the dynamic watch registry shared by all controllers
//! - the event sink
//! - the immutable operator configuration

use kube::Resource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::OperatorConfig;
use crate::platform::{EventRecord, EventSink, Platform};
use crate::watches::DynamicWatches;

/// Shared context passed to a controller.
pub struct Context<P: Platform> {
    /// Platform API access
    pub platform: P,

    /// Dynamic watches, shared between controllers
    pub watches: Arc<DynamicWatches>,

    /// Where events about custom resources are published
    pub events: Arc<dyn EventSink>,

    /// Operator configuration
    pub config: OperatorConfig,

    iterations: AtomicU64,
}

impl<P: Platform> Context<P> {
    #[must_use]
    pub fn new(
        platform: P,
        watches: Arc<DynamicWatches>,
        events: Arc<dyn EventSink>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            platform,
            watches,
            events,
            config,
            iterations: AtomicU64::new(0),
        }
    }

    /// Increments and returns the reconcile iteration counter of this controller.
    pub fn next_iteration(&self) -> u64 {
        self.iterations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Publishes an event about `object`.
    pub async fn emit<K>(&self, object: &K, event: EventRecord)
    where
        K: Resource<DynamicType = ()>,
    {
        self.events.publish(&object.object_ref(&()), event).await;
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
