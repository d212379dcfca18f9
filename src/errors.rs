// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the Beacon operator.
//!
//! Every fallible operation in the reconciliation core returns [`Error`]. Each variant
//! carries a failure class that drives how the controller reacts:
//!
//! | Class | Event | Requeue |
//! |-------|-------|---------|
//! | [`Error::InvalidSpec`] | `Warning/Validation` | no, the user must edit the resource |
//! | [`Error::NotFound`] | none | yes, the resource may appear later |
//! | [`Error::Conflict`] | none | immediately |
//! | [`Error::ConfigMerge`] | `Warning/ReconciliationError` | no |
//! | [`Error::Api`], [`Error::Transport`] | `Warning/ReconciliationError` | with backoff |

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::constants::ERROR_REQUEUE_DURATION_SECS;
use crate::status_reasons::{
    EVENT_REASON_RECONCILIATION_ERROR, EVENT_REASON_VALIDATION, REASON_ASSOCIATION_ERROR,
    REASON_CONFIG_ERROR, REASON_INVALID_SPEC, REASON_RECONCILE_FAILED,
};

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single validation failure on a custom resource field.
///
/// Renders the way the API server renders field errors:
/// `spec.version: Invalid value: "8.1.0": Version downgrades are not supported`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted field path, e.g. `spec.version` or `metadata.name`
    pub path: String,
    /// The offending value, when it helps the user
    pub value: Option<String>,
    /// Human readable explanation
    pub message: String,
}

impl FieldError {
    /// Field error with an offending value.
    #[must_use]
    pub fn invalid(path: impl Into<String>, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: Some(value.into()),
            message: message.into(),
        }
    }

    /// Field error that refers to the field only (forbidden or required fields).
    #[must_use]
    pub fn forbidden(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}: Invalid value: {value:?}: {}", self.path, self.message),
            None => write!(f, "{}: Forbidden: {}", self.path, self.message),
        }
    }
}

/// Joins field errors into a single bracketed message.
#[must_use]
pub fn format_field_errors(errors: &[FieldError]) -> String {
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

fn format_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced by the reconciliation core.
#[derive(Error, Debug)]
pub enum Error {
    /// The custom resource failed validation.
    ///
    /// Not retried: the next reconcile happens when the user edits the resource.
    #[error("{kind} {namespace}/{name} is invalid: {}", format_field_errors(.errors))]
    InvalidSpec {
        /// Kind of the invalid resource
        kind: String,
        /// Namespace of the invalid resource
        namespace: String,
        /// Name of the invalid resource
        name: String,
        /// Every field error found
        errors: Vec<FieldError>,
    },

    /// A referenced object does not exist (yet).
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Namespace of the missing object
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// Optimistic concurrency failure, the object changed since it was read.
    #[error("conflict writing {kind} {namespace}/{name}: the object has been modified")]
    Conflict {
        /// Kind of the object
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// Error returned by the Kubernetes API.
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Transport level failure from a non-Kubernetes platform backend.
    #[error("platform transport error: {0}")]
    Transport(String),

    /// Two configuration trees disagree on the type of a key.
    #[error("cannot merge configuration at '{path}': {reason}")]
    ConfigMerge {
        /// Dotted path of the conflicting key
        path: String,
        /// What conflicted
        reason: String,
    },

    /// Configuration bytes are not valid YAML or not a mapping.
    #[error("cannot parse configuration: {0}")]
    ConfigParse(String),

    /// A secret exists but lacks a required key.
    #[error("secret {namespace}/{name} is missing key '{key}'")]
    MissingSecretKey {
        /// Namespace of the secret
        namespace: String,
        /// Name of the secret
        name: String,
        /// The missing key
        key: String,
    },

    /// An association is malformed (bad annotation, bad external secret).
    #[error("invalid {association} association: {reason}")]
    InvalidAssociation {
        /// Association type
        association: String,
        /// What is wrong with it
        reason: String,
    },

    /// A version string could not be parsed.
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion {
        /// The raw version string
        version: String,
        /// Parse failure
        reason: String,
    },

    /// JSON (de)serialization failure.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failure.
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Several independent steps of one reconcile failed, in the order they ran.
    #[error("{} errors: {}", .0.len(), format_errors(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    #[must_use]
    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Shorthand for [`Error::Conflict`].
    #[must_use]
    pub fn conflict(kind: &str, namespace: &str, name: &str) -> Self {
        Self::Conflict {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Returns true for missing objects, whether reported by us or by the API server.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api(kube::Error::Api(api_err)) => api_err.code == 404,
            _ => false,
        }
    }

    /// Returns true for resourceVersion conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Api(kube::Error::Api(api_err)) => api_err.code == 409,
            _ => false,
        }
    }

    /// Returns true when retrying without any user action can succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Conflict { .. } | Self::Transport(_) => true,
            Self::Api(kube::Error::Api(api_err)) => {
                matches!(api_err.code, 404 | 409 | 429) || api_err.code >= 500
            }
            Self::Api(_) => true,
            Self::Aggregate(errors) => errors.iter().any(Error::is_retriable),
            Self::InvalidSpec { .. }
            | Self::ConfigMerge { .. }
            | Self::ConfigParse(_)
            | Self::MissingSecretKey { .. }
            | Self::InvalidAssociation { .. }
            | Self::InvalidVersion { .. }
            | Self::Json(_)
            | Self::Yaml(_) => false,
        }
    }

    /// Event reason to emit for this error, `None` when the error is not user-actionable.
    #[must_use]
    pub fn event_reason(&self) -> Option<&'static str> {
        if let Self::Aggregate(errors) = self {
            return errors.iter().find_map(Error::event_reason);
        }
        if self.is_not_found() || self.is_conflict() {
            return None;
        }
        match self {
            Self::InvalidSpec { .. } => Some(EVENT_REASON_VALIDATION),
            _ => Some(EVENT_REASON_RECONCILIATION_ERROR),
        }
    }

    /// Requeue delay for this error, `None` means wait for the next watch event.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        if let Self::Aggregate(errors) = self {
            return errors.iter().filter_map(Error::requeue_after).min();
        }
        if self.is_conflict() {
            return Some(Duration::ZERO);
        }
        if self.is_retriable() {
            return Some(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS));
        }
        None
    }

    /// Condition reason describing this error in a status `Ready` condition.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::InvalidSpec { .. } | Self::InvalidVersion { .. } => REASON_INVALID_SPEC,
            Self::ConfigMerge { .. } | Self::ConfigParse(_) | Self::MissingSecretKey { .. } => {
                REASON_CONFIG_ERROR
            }
            Self::InvalidAssociation { .. } => REASON_ASSOCIATION_ERROR,
            Self::Aggregate(errors) => errors
                .first()
                .map_or(REASON_RECONCILE_FAILED, Error::status_reason),
            _ => REASON_RECONCILE_FAILED,
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
