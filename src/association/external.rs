// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Associations to resources not managed by the operator.
//!
//! The user provides a secret describing the target:
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `url` | yes | URL of the target |
//! | `username` + `password` | one of | basic authentication |
//! | `api-key` | one of | API key authentication |
//! | `ca.crt` | no | CA of the target certificate |
//! | `version` | no | version of the target, enables the version gate |

use k8s_openapi::api::core::v1::Secret;
use url::Url;

use super::{AssociationType, Credentials};
use crate::constants::CA_FILE_NAME;
use crate::crd::AssociationConf;
use crate::errors::{Error, Result};
use crate::secrets;

pub const URL_KEY: &str = "url";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const API_KEY_KEY: &str = "api-key";
pub const VERSION_KEY: &str = "version";

fn invalid(association_type: AssociationType, secret: &Secret, reason: &str) -> Error {
    Error::InvalidAssociation {
        association: association_type.to_string(),
        reason: format!(
            "secret {}: {reason}",
            secret.metadata.name.as_deref().unwrap_or_default()
        ),
    }
}

/// Builds the conf of an external association from its secret.
///
/// # Errors
///
/// Returns [`Error::InvalidAssociation`] when the URL is missing or malformed, or when
/// the secret holds neither basic credentials nor an API key.
pub fn conf_from_secret(association_type: AssociationType, secret: &Secret) -> Result<AssociationConf> {
    let secret_name = secret.metadata.name.clone().unwrap_or_default();

    let raw_url = secrets::string_value(secret, URL_KEY)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| invalid(association_type, secret, "url is missing"))?;
    Url::parse(&raw_url)
        .map_err(|e| invalid(association_type, secret, &format!("url {raw_url} is invalid: {e}")))?;

    let auth_secret_key = if secrets::has_value(secret, API_KEY_KEY) {
        API_KEY_KEY
    } else if secrets::has_value(secret, USERNAME_KEY) && secrets::has_value(secret, PASSWORD_KEY) {
        PASSWORD_KEY
    } else {
        return Err(invalid(
            association_type,
            secret,
            "expected username and password, or api-key",
        ));
    };

    Ok(AssociationConf {
        auth_secret_name: secret_name.clone(),
        auth_secret_key: auth_secret_key.to_string(),
        ca_cert_provided: secrets::has_value(secret, CA_FILE_NAME),
        ca_secret_name: secret_name,
        url: raw_url,
        version: secrets::string_value(secret, VERSION_KEY).unwrap_or_default(),
        service_account: None,
    })
}

/// Reads the credentials of an external association.
///
/// # Errors
///
/// Returns [`Error::InvalidAssociation`] when the secret holds no usable credentials.
pub fn credentials_from_secret(association_type: AssociationType, secret: &Secret) -> Result<Credentials> {
    if let Some(key) = secrets::string_value(secret, API_KEY_KEY).filter(|k| !k.is_empty()) {
        return Ok(Credentials::Token(key));
    }
    match (
        secrets::string_value(secret, USERNAME_KEY),
        secrets::string_value(secret, PASSWORD_KEY),
    ) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Ok(Credentials::Basic { username, password })
        }
        _ => Err(invalid(
            association_type,
            secret,
            "expected username and password, or api-key",
        )),
    }
}

#[cfg(test)]
#[path = "external_tests.rs"]
mod external_tests;
