// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hierarchical configuration tree with deterministic rendering.
//!
//! A [`CanonicalConfig`] is a tree of maps, sequences and scalars. Keys containing dots
//! are expanded into nested maps when the tree is built, so `a.b: c` and `a: {b: c}`
//! are the same configuration. Maps are ordered, which makes [`CanonicalConfig::render`]
//! byte-for-byte stable for equal trees.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

/// Separator between the segments of a key path.
pub const PATH_SEPARATOR: char = '.';

/// A normalized configuration tree. The root is always a map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanonicalConfig {
    root: Map<String, Value>,
}

impl CanonicalConfig {
    /// Empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from a JSON value, expanding dotted keys.
    ///
    /// `null` yields an empty configuration. Keys holding `null` are dropped, a `null`
    /// value means unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] when the value is not a map, and
    /// [`Error::ConfigMerge`] when dotted and nested spellings of the same key disagree
    /// on its type.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self {
                root: normalize_map(map, "")?,
            }),
            other => Err(Error::ConfigParse(format!(
                "configuration must be a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Builds a configuration from any serializable value.
    ///
    /// # Errors
    ///
    /// See [`CanonicalConfig::from_value`].
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Parses YAML bytes. Empty input yields an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for invalid YAML or a non-map document.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }
        let value: Value =
            serde_yaml::from_slice(bytes).map_err(|e| Error::ConfigParse(e.to_string()))?;
        Self::from_value(value)
    }

    /// A configuration holding a single value at `path`.
    ///
    /// # Errors
    ///
    /// Fails only when `value` itself contains conflicting dotted keys.
    pub fn single(path: &str, value: impl Into<Value>) -> Result<Self> {
        let mut config = Self::new();
        config.set(path, value)?;
        Ok(config)
    }

    /// True when the configuration holds no key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Right-biased deep merge: later configurations win.
    ///
    /// Maps are merged recursively, scalars and sequences are replaced. A `null` value
    /// never overrides anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigMerge`] when a map and a non-map meet at the same path.
    pub fn merge_with<'a, I>(&mut self, others: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a CanonicalConfig>,
    {
        for other in others {
            merge_maps(&mut self.root, &other.root, "")?;
        }
        Ok(())
    }

    /// Convenience merge of a single optional configuration, `None` is a no-op.
    ///
    /// # Errors
    ///
    /// See [`CanonicalConfig::merge_with`].
    pub fn merge_opt(&mut self, other: Option<&CanonicalConfig>) -> Result<()> {
        self.merge_with(other)
    }

    /// Sets `value` at a dotted path, creating intermediate maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigMerge`] when an intermediate segment holds a non-map.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let normalized = normalize_value(value.into(), path)?;
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| Error::ConfigParse("empty key path".to_string()))?;

        let mut current = &mut self.root;
        let mut walked = String::new();
        for segment in parents {
            push_segment(&mut walked, segment);
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                other => {
                    return Err(Error::ConfigMerge {
                        path: walked,
                        reason: format!("cannot set a child key under a {}", type_name(other)),
                    })
                }
            };
        }
        current.insert((*last).to_string(), normalized);
        Ok(())
    }

    /// Sets several string values at once.
    ///
    /// # Errors
    ///
    /// See [`CanonicalConfig::set`].
    pub fn set_strings(&mut self, pairs: &[(&str, &str)]) -> Result<()> {
        for (path, value) in pairs {
            self.set(path, *value)?;
        }
        Ok(())
    }

    /// Removes the value at a dotted path, returning it.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let (last, parents) = segments.split_last()?;
        let mut current = &mut self.root;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    /// Value at a dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(PATH_SEPARATOR);
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// String value at a dotted path.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Returns the subset of `paths` present in the configuration.
    #[must_use]
    pub fn has_keys(&self, paths: &[&str]) -> Vec<String> {
        paths
            .iter()
            .filter(|path| self.get(path).is_some())
            .map(|path| (*path).to_string())
            .collect()
    }

    /// Decodes the subtree at `path`, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] when the subtree does not match the schema.
    pub fn unpack_at<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Renders the tree as YAML with lexicographically sorted keys.
    ///
    /// An empty configuration renders to zero bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`] if serialization fails.
    pub fn render(&self) -> Result<Vec<u8>> {
        if self.root.is_empty() {
            return Ok(Vec::new());
        }
        let sorted = sorted_yaml(&Value::Object(self.root.clone()));
        Ok(serde_yaml::to_string(&sorted)?.into_bytes())
    }

    /// Flattened paths whose values differ between the two trees.
    ///
    /// Paths starting with one of `ignore` are skipped.
    #[must_use]
    pub fn diff(&self, other: &CanonicalConfig, ignore: &[&str]) -> Vec<String> {
        let ours = flatten(&self.root);
        let theirs = flatten(&other.root);

        let keys: BTreeSet<&String> = ours.keys().chain(theirs.keys()).collect();
        keys.into_iter()
            .filter(|key| !ignore.iter().any(|prefix| key.starts_with(prefix)))
            .filter(|key| ours.get(*key) != theirs.get(*key))
            .cloned()
            .collect()
    }
}

fn push_segment(path: &mut String, segment: &str) {
    if !path.is_empty() {
        path.push(PATH_SEPARATOR);
    }
    path.push_str(segment);
}

fn join_path(prefix: &str, key: &str) -> String {
    let mut path = prefix.to_string();
    push_segment(&mut path, key);
    path
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Expands dotted keys and normalizes nested values.
fn normalize_map(map: Map<String, Value>, prefix: &str) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let path = join_path(prefix, &key);
        let value = normalize_value(value, &path)?;
        // Rebuild `a.b.c: v` as `{a: {b: {c: v}}}` and merge it into what we have.
        let nested = key
            .split(PATH_SEPARATOR)
            .rev()
            .fold(value, |acc, segment| {
                let mut wrapper = Map::new();
                wrapper.insert(segment.to_string(), acc);
                Value::Object(wrapper)
            });
        if let Value::Object(nested) = nested {
            merge_maps(&mut out, &nested, prefix)?;
        }
    }
    Ok(out)
}

fn normalize_value(value: Value, path: &str) -> Result<Value> {
    match value {
        Value::Object(map) => Ok(Value::Object(normalize_map(map, path)?)),
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|item| normalize_value(item, path))
                .collect::<Result<Vec<_>>>()?,
        )),
        scalar => Ok(scalar),
    }
}

/// Merges `source` into `target`.
///
/// `null` is the identity on both sides: an incoming `null` leaves the target as is and
/// an existing `null` takes any incoming value. Merging stays associative.
fn merge_maps(target: &mut Map<String, Value>, source: &Map<String, Value>, prefix: &str) -> Result<()> {
    for (key, incoming) in source {
        if incoming.is_null() {
            continue;
        }
        let path = join_path(prefix, key);
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming, &path)?;
            }
            (Some(existing), incoming)
                if !existing.is_null() && existing.is_object() != incoming.is_object() =>
            {
                return Err(Error::ConfigMerge {
                    path,
                    reason: format!(
                        "cannot merge a {} into a {}",
                        type_name(incoming),
                        type_name(existing)
                    ),
                });
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
    Ok(())
}

/// Flattens a tree into `dotted.path -> leaf` pairs. Empty maps are kept as leaves.
fn flatten(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    fn walk(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    walk(&join_path(prefix, key), child, out);
                }
            }
            leaf => {
                out.insert(prefix.to_string(), leaf.clone());
            }
        }
    }

    let mut out = BTreeMap::new();
    for (key, value) in map {
        walk(key, value, &mut out);
    }
    out
}

/// Converts a JSON tree into a YAML tree whose mappings are inserted in sorted key order.
fn sorted_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut mapping = serde_yaml::Mapping::new();
            for key in keys {
                if let Some(child) = map.get(key) {
                    mapping.insert(serde_yaml::Value::String(key.clone()), sorted_yaml(child));
                }
            }
            serde_yaml::Value::Mapping(mapping)
        }
        Value::Array(items) => serde_yaml::Value::Sequence(items.iter().map(sorted_yaml).collect()),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                serde_yaml::Value::Number(u.into())
            } else {
                serde_yaml::Value::Number(n.as_f64().unwrap_or_default().into())
            }
        }
        Value::Null => serde_yaml::Value::Null,
    }
}

#[cfg(test)]
#[path = "canonical_config_tests.rs"]
mod canonical_config_tests;
