// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Validation of [`Dashboard`] resources.

use kube::ResourceExt;

use super::{
    check_association_refs, check_monitoring, check_name_length, check_no_downgrade,
    check_no_unknown_fields, check_single_config_source, check_supported_version, Validate,
};
use crate::crd::{Dashboard, DashboardSpec};
use crate::errors::FieldError;

fn check_tls(dashboard: &Dashboard) -> Vec<FieldError> {
    let Some(tls) = dashboard.spec.http.as_ref().and_then(|h| h.tls.as_ref()) else {
        return Vec::new();
    };
    if tls.disabled && tls.certificate_secret_name.as_ref().is_some_and(|s| !s.is_empty()) {
        return vec![FieldError::forbidden(
            "spec.http.tls.certificateSecretName",
            "a certificate cannot be provided when TLS is disabled",
        )];
    }
    Vec::new()
}

impl Validate for Dashboard {
    type Spec = DashboardSpec;

    fn default_checks(&self) -> Vec<FieldError> {
        let mut errors = check_no_unknown_fields(self);
        errors.extend(check_name_length(&self.name_any()));
        errors.extend(check_supported_version(&self.spec.version));
        errors.extend(check_single_config_source(
            self.spec.config.as_ref(),
            self.spec.config_ref.as_ref(),
        ));
        if let Some(selector) = self.spec.index_store_ref.as_ref() {
            errors.extend(check_association_refs([(
                "spec.indexStoreRef".to_string(),
                selector,
            )]));
        }
        errors.extend(check_tls(self));
        errors.extend(check_monitoring(self.spec.monitoring.as_ref(), &self.spec.version));
        errors
    }

    fn update_checks(&self, previous: &Self) -> Vec<FieldError> {
        check_no_downgrade(self, &previous.spec.version, &self.spec.version)
    }
}

#[cfg(test)]
#[path = "dashboard_tests.rs"]
mod dashboard_tests;
