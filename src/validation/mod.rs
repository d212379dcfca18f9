// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom resource validation.
//!
//! Validation is a pure function of the previous (on update) and current resource. Two
//! check families run in sequence:
//!
//! - **default checks** on every create and update (unknown fields, name length,
//!   supported version, exclusive fields, references)
//! - **update checks** when a previous resource is known (no downgrade)
//!
//! The reconciler runs the default checks before touching anything, so an invalid
//! resource is never rolled out even when the admission webhook is not installed. Update
//! checks need the previous object and only run on the admission path.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{MAX_NAME_LENGTH, MIN_STACK_MONITORING_VERSION};
use crate::crd::{ConfigRef, Monitoring, ObjectSelector};
use crate::errors::{Error, FieldError, Result};
use crate::labels::{
    ANNOTATION_TRUE, DISABLE_DOWNGRADE_VALIDATION_ANNOTATION, LAST_APPLIED_CONFIGURATION_ANNOTATION,
};
use crate::platform::Object;
use crate::version::{SupportedRange, Version};

pub mod beat;
pub mod dashboard;

/// Message of the downgrade check.
pub const DOWNGRADE_MSG: &str = "Version downgrades are not supported";

/// A custom resource the operator validates.
pub trait Validate: Object {
    /// Spec type, decoded from the last applied configuration to find unknown fields.
    type Spec: Serialize + DeserializeOwned;

    /// Checks run on every create and update.
    fn default_checks(&self) -> Vec<FieldError>;

    /// Checks run on update only.
    fn update_checks(&self, previous: &Self) -> Vec<FieldError>;
}

/// Runs every applicable check and returns the field errors found.
#[must_use]
pub fn validate<K: Validate>(previous: Option<&K>, current: &K) -> Vec<FieldError> {
    let mut errors = current.default_checks();
    if errors.is_empty() {
        if let Some(previous) = previous {
            errors.extend(current.update_checks(previous));
        }
    }
    errors
}

/// Same as [`validate`], as an [`Error::InvalidSpec`].
///
/// # Errors
///
/// Returns [`Error::InvalidSpec`] carrying every field error found.
pub fn check<K: Validate>(previous: Option<&K>, current: &K) -> Result<()> {
    let errors = validate(previous, current);
    if errors.is_empty() {
        return Ok(());
    }
    let meta = current.meta();
    Err(Error::InvalidSpec {
        kind: K::kind(&()).to_string(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        name: meta.name.clone().unwrap_or_default(),
        errors,
    })
}

// ============================================================================
// Shared checks
// ============================================================================

/// Rejects fields of the user-supplied manifest the resource schema does not know.
///
/// The manifest is read from the `kubectl apply` annotation. Resources created without
/// it pass.
pub fn check_no_unknown_fields<K: Validate>(object: &K) -> Vec<FieldError> {
    let Some(raw) = object
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(LAST_APPLIED_CONFIGURATION_ANNOTATION))
    else {
        return Vec::new();
    };

    let supplied: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return vec![FieldError::forbidden(
                format!("metadata.annotations[{LAST_APPLIED_CONFIGURATION_ANNOTATION}]"),
                format!("cannot decode the last applied configuration: {e}"),
            )]
        }
    };
    let Some(supplied_spec) = supplied.get("spec") else {
        return Vec::new();
    };

    let known = match serde_json::from_value::<K::Spec>(supplied_spec.clone())
        .and_then(|spec| serde_json::to_value(&spec))
    {
        Ok(known) => known,
        // Type errors are reported by the API server schema validation.
        Err(_) => return Vec::new(),
    };

    let mut unknown = Vec::new();
    collect_unknown_fields(supplied_spec, &known, "spec", &mut unknown);
    unknown
        .into_iter()
        .map(|path| {
            FieldError::forbidden(
                path.clone(),
                format!(
                    "{path} field found in the {LAST_APPLIED_CONFIGURATION_ANNOTATION} annotation is unknown. \
                     This is often due to incorrect indentation in the manifest."
                ),
            )
        })
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Paths present in `supplied` but lost when decoding into the schema.
///
/// Keys dropped because they hold an empty value are defaults, not unknown fields.
fn collect_unknown_fields(supplied: &Value, known: &Value, path: &str, unknown: &mut Vec<String>) {
    match (supplied, known) {
        (Value::Object(supplied), Value::Object(known)) => {
            for (key, value) in supplied {
                let child = format!("{path}.{key}");
                match known.get(key) {
                    Some(known_value) => collect_unknown_fields(value, known_value, &child, unknown),
                    None if is_empty_value(value) => {}
                    None => unknown.push(child),
                }
            }
        }
        (Value::Array(supplied), Value::Array(known)) => {
            for (index, (s, k)) in supplied.iter().zip(known).enumerate() {
                collect_unknown_fields(s, k, &format!("{path}[{index}]"), unknown);
            }
        }
        _ => {}
    }
}

/// Rejects names too long to prefix generated resource names.
#[must_use]
pub fn check_name_length(name: &str) -> Vec<FieldError> {
    if name.len() > MAX_NAME_LENGTH {
        return vec![FieldError::invalid(
            "metadata.name",
            name,
            format!("name length cannot exceed {MAX_NAME_LENGTH} characters"),
        )];
    }
    Vec::new()
}

/// Parses `spec.version` and checks it is in the supported range.
#[must_use]
pub fn check_supported_version(raw: &str) -> Vec<FieldError> {
    match Version::parse(raw) {
        Ok(version) => match SupportedRange::stack().check(&version) {
            Ok(()) => Vec::new(),
            Err(reason) => vec![FieldError::invalid("spec.version", raw, reason)],
        },
        Err(e) => vec![FieldError::invalid(
            "spec.version",
            raw,
            format!("Invalid version: {e}"),
        )],
    }
}

/// Rejects `config` and `configRef` set together.
#[must_use]
pub fn check_single_config_source(
    config: Option<&Value>,
    config_ref: Option<&ConfigRef>,
) -> Vec<FieldError> {
    if config.is_some() && config_ref.is_some() {
        let msg = "Specify at most one of [`config`, `configRef`], not both";
        return vec![
            FieldError::forbidden("spec.config", msg),
            FieldError::forbidden("spec.configRef", msg),
        ];
    }
    Vec::new()
}

/// Checks every reference combines its fields correctly.
#[must_use]
pub fn check_association_refs<'a, I>(refs: I) -> Vec<FieldError>
where
    I: IntoIterator<Item = (String, &'a ObjectSelector)>,
{
    refs.into_iter()
        .filter_map(|(path, selector)| {
            selector
                .validate()
                .err()
                .map(|message| FieldError::forbidden(path, message))
        })
        .collect()
}

/// Checks stack monitoring references and that the version supports it.
#[must_use]
pub fn check_monitoring(monitoring: Option<&Monitoring>, raw_version: &str) -> Vec<FieldError> {
    let Some(monitoring) = monitoring else {
        return Vec::new();
    };
    let mut errors = Vec::new();

    for (field, targets) in [("metrics", &monitoring.metrics), ("logs", &monitoring.logs)] {
        let path = format!("spec.monitoring.{field}.indexStoreRefs");
        if targets.index_store_refs.len() > 1 {
            errors.push(FieldError::forbidden(
                path.clone(),
                "Only one index store reference is supported for stack monitoring",
            ));
        }
        errors.extend(check_association_refs(
            targets
                .index_store_refs
                .iter()
                .enumerate()
                .map(|(i, selector)| (format!("{path}[{i}]"), selector)),
        ));
    }

    if monitoring.is_defined() {
        if let Ok(version) = Version::parse(raw_version) {
            let min = Version::parse(MIN_STACK_MONITORING_VERSION)
                .unwrap_or(Version::new(7, 14, 0));
            if !version.gte(&min) {
                errors.push(FieldError::invalid(
                    "spec.version",
                    raw_version,
                    format!(
                        "Unsupported version for stack monitoring. Required >= {MIN_STACK_MONITORING_VERSION}."
                    ),
                ));
            }
        }
    }
    errors
}

/// Rejects version decreases unless the resource opts in.
#[must_use]
pub fn check_no_downgrade<K: Object>(current: &K, previous_version: &str, current_version: &str) -> Vec<FieldError> {
    let allowed = current
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(DISABLE_DOWNGRADE_VALIDATION_ANNOTATION))
        .is_some_and(|v| v == ANNOTATION_TRUE);
    if allowed {
        return Vec::new();
    }
    // An unparseable previous version cannot be compared, the default checks cover the current one.
    let (Ok(previous), Ok(next)) = (Version::parse(previous_version), Version::parse(current_version)) else {
        return Vec::new();
    };
    if next < previous {
        return vec![FieldError::forbidden("spec.version", DOWNGRADE_MSG)];
    }
    Vec::new()
}
