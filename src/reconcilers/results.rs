// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Aggregated outcome of a reconcile.
//!
//! Sub-steps of a reconcile each return a [`Results`]. The parent merges them: errors are
//! collected in order and the soonest requeue wins.

use std::time::Duration;

use crate::errors::{Error, Result};

/// Errors and requeue request accumulated over the sub-steps of a reconcile.
#[derive(Debug, Default)]
pub struct Results {
    requeue_after: Option<Duration>,
    errors: Vec<Error>,
}

fn soonest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl Results {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Results asking to be reconciled again after `after`.
    #[must_use]
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            errors: Vec::new(),
        }
    }

    /// Keeps the soonest of the current and the given requeue.
    #[must_use]
    pub fn with_requeue(mut self, after: Duration) -> Self {
        self.add_requeue(after);
        self
    }

    pub fn add_requeue(&mut self, after: Duration) {
        self.requeue_after = soonest(self.requeue_after, Some(after));
    }

    #[must_use]
    pub fn with_error(mut self, error: Error) -> Self {
        self.add_error(error);
        self
    }

    pub fn add_error(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Records the error of a sub-step, returning its value on success.
    pub fn absorb<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add_error(error);
                None
            }
        }
    }

    /// Folds the results of a sub-step into these.
    pub fn merge(&mut self, other: Results) {
        self.requeue_after = soonest(self.requeue_after, other.requeue_after);
        self.errors.extend(other.errors);
    }

    /// Soonest requeue across the explicit request and the collected errors.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        self.errors
            .iter()
            .map(Error::requeue_after)
            .fold(self.requeue_after, soonest)
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// First error collected.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.errors.first()
    }

    /// The results when no step failed, otherwise the collected errors: the error itself
    /// when there is one, an [`Error::Aggregate`] when there are several.
    ///
    /// # Errors
    ///
    /// Returns the collected errors.
    pub fn aggregate(mut self) -> Result<Self> {
        match self.errors.len() {
            0 => Ok(self),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Aggregate(self.errors)),
        }
    }
}
