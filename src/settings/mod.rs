// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration composition primitives.
//!
//! [`CanonicalConfig`] is the normalized configuration tree every Agent and Dashboard
//! configuration is assembled from before it is rendered into a secret.

pub mod canonical_config;

pub use canonical_config::CanonicalConfig;
