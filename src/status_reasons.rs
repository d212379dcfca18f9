// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard condition reasons and event reasons for Beacon resources.
//!
//! Reasons are programmatic identifiers in `CamelCase`. Condition reasons explain the
//! status of the single encompassing `Ready` condition; event reasons are attached to
//! the events the operator publishes on its custom resources.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   health: yellow
//!   availableNodes: 2
//!   expectedNodes: 3
//!   conditions:
//!     - type: Ready
//!       status: "False"
//!       reason: PartiallyReady
//!       message: "2/3 pods are ready"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The single encompassing condition type
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Condition status values
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Condition status values
pub const CONDITION_STATUS_FALSE: &str = "False";

// ============================================================================
// Condition Reasons
// ============================================================================

/// Every expected pod is ready and every association is established.
pub const REASON_ALL_READY: &str = "AllReady";

/// Some but not all expected pods are ready.
pub const REASON_PARTIALLY_READY: &str = "PartiallyReady";

/// No pod is ready yet.
pub const REASON_NOT_READY: &str = "NotReady";

/// A defined association is not established.
pub const REASON_ASSOCIATION_PENDING: &str = "AssociationPending";

/// The resource spec failed validation.
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// The configuration could not be composed.
pub const REASON_CONFIG_ERROR: &str = "ConfigError";

/// An association is malformed.
pub const REASON_ASSOCIATION_ERROR: &str = "AssociationError";

/// Reconciliation failed for an infrastructure reason.
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

// ============================================================================
// Event Reasons
// ============================================================================

/// Generic reconciliation failure
pub const EVENT_REASON_RECONCILIATION_ERROR: &str = "ReconciliationError";

/// A defined association has no usable configuration
pub const EVENT_REASON_ASSOCIATION_ERROR: &str = "AssociationError";

/// The resource failed validation
pub const EVENT_REASON_VALIDATION: &str = "Validation";

/// The version gate delayed the reconciliation
pub const EVENT_REASON_DELAYED: &str = "Delayed";

/// The association status map changed
pub const EVENT_REASON_ASSOCIATION_STATUS_CHANGE: &str = "AssociationStatusChange";

/// Event action used when publishing reconcile events
pub const EVENT_ACTION_RECONCILE: &str = "Reconcile";

/// Event action used when publishing validation events
pub const EVENT_ACTION_VALIDATE: &str = "Validate";

/// Returns the condition reason for a ready/desired pod count.
#[must_use]
pub fn reason_for_pod_counts(ready: i32, desired: i32) -> &'static str {
    if desired > 0 && ready >= desired {
        REASON_ALL_READY
    } else if ready > 0 {
        REASON_PARTIALLY_READY
    } else {
        REASON_NOT_READY
    }
}

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
