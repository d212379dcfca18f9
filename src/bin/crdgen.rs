// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates Kubernetes CRD YAML files from the Rust types in src/crd.rs, so the YAML
//! files in deploy/crds/ never drift from the code.
//!
//! Usage:
//!   cargo run --bin crdgen
//!
//! Generated files are written to deploy/crds/ with the license header.

use anyhow::{Context, Result};
use beacon::crd::{Beat, Dashboard};
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<()> {
    let output_dir = Path::new("deploy/crds");

    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<Beat>("beats.crd.yaml", output_dir)?;
    generate_crd::<Dashboard>("dashboards.crd.yaml", output_dir)?;

    println!("✓ Successfully generated CRD YAML files in deploy/crds/");
    println!("\nNext steps:");
    println!("  1. Review the generated files");
    println!("  2. Deploy with: kubectl apply -f deploy/crds/");

    Ok(())
}

/// Renders the CRD of `T` as YAML behind the license header.
fn render_crd<T: CustomResourceExt>() -> Result<String> {
    let yaml = serde_yaml::to_string(&T::crd())?;
    Ok(format!("{COPYRIGHT_HEADER}{yaml}"))
}

fn generate_crd<T: CustomResourceExt>(filename: &str, output_dir: &Path) -> Result<()> {
    let output_path = output_dir.join(filename);
    fs::write(&output_path, render_crd::<T>()?)
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!("  ✓ Generated {filename}");

    Ok(())
}
