// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Validation of [`Beat`] resources.

use kube::ResourceExt;

use super::{
    check_association_refs, check_monitoring, check_name_length, check_no_downgrade,
    check_no_unknown_fields, check_single_config_source, check_supported_version, Validate,
};
use crate::constants::{KNOWN_BEAT_TYPES, MAX_BEAT_TYPE_LENGTH};
use crate::crd::{Beat, BeatSpec};
use crate::errors::FieldError;

/// Pattern a Beat type must match, for messages.
pub const BEAT_TYPE_PATTERN: &str = "^[a-zA-Z0-9-]+$";

fn check_beat_type(beat: &Beat) -> Vec<FieldError> {
    let beat_type = &beat.spec.r#type;
    let well_formed = !beat_type.is_empty()
        && beat_type.len() <= MAX_BEAT_TYPE_LENGTH
        && beat_type.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if well_formed {
        return Vec::new();
    }
    vec![FieldError::invalid(
        "spec.type",
        beat_type.as_str(),
        format!("Type has to match {BEAT_TYPE_PATTERN} and be at most {MAX_BEAT_TYPE_LENGTH} characters"),
    )]
}

fn check_image_if_type_unknown(beat: &Beat) -> Vec<FieldError> {
    let known = KNOWN_BEAT_TYPES.contains(&beat.spec.r#type.as_str());
    let has_image = beat.spec.image.as_ref().is_some_and(|i| !i.is_empty());
    if known || has_image {
        return Vec::new();
    }
    vec![FieldError::invalid(
        "spec.image",
        "",
        format!(
            "Image is required if Beat type is not one of [{}]",
            KNOWN_BEAT_TYPES.join(", ")
        ),
    )]
}

fn check_workload_shape(beat: &Beat) -> Vec<FieldError> {
    match (&beat.spec.daemon_set, &beat.spec.deployment) {
        (Some(_), Some(_)) => {
            let msg = "Specify either daemonSet or deployment, not both";
            vec![
                FieldError::forbidden("spec.daemonSet", msg),
                FieldError::forbidden("spec.deployment", msg),
            ]
        }
        (None, None) => vec![FieldError::forbidden(
            "spec",
            "Either daemonSet or deployment must be specified",
        )],
        _ => Vec::new(),
    }
}

/// Inline configuration and `configRef` are exclusive, `check_single_config_source`
/// covers both being set.
fn check_config_source_set(beat: &Beat) -> Vec<FieldError> {
    if beat.spec.config.is_none() && beat.spec.config_ref.is_none() {
        return vec![FieldError::forbidden(
            "spec",
            "Either config or configRef must be specified",
        )];
    }
    Vec::new()
}

fn check_associations(beat: &Beat) -> Vec<FieldError> {
    let refs = [
        ("spec.indexStoreRef", beat.spec.index_store_ref.as_ref()),
        ("spec.dashboardRef", beat.spec.dashboard_ref.as_ref()),
    ];
    check_association_refs(
        refs.into_iter()
            .filter_map(|(path, selector)| selector.map(|s| (path.to_string(), s))),
    )
}

impl Validate for Beat {
    type Spec = BeatSpec;

    fn default_checks(&self) -> Vec<FieldError> {
        let mut errors = check_no_unknown_fields(self);
        errors.extend(check_name_length(&self.name_any()));
        errors.extend(check_supported_version(&self.spec.version));
        errors.extend(check_workload_shape(self));
        errors.extend(check_image_if_type_unknown(self));
        errors.extend(check_beat_type(self));
        errors.extend(check_single_config_source(
            self.spec.config.as_ref(),
            self.spec.config_ref.as_ref(),
        ));
        errors.extend(check_config_source_set(self));
        errors.extend(check_associations(self));
        errors.extend(check_monitoring(self.spec.monitoring.as_ref(), &self.spec.version));
        errors
    }

    fn update_checks(&self, previous: &Self) -> Vec<FieldError> {
        check_no_downgrade(self, &previous.spec.version, &self.spec.version)
    }
}

#[cfg(test)]
#[path = "beat_tests.rs"]
mod beat_tests;
