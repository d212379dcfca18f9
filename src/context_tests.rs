// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `context.rs`

#[cfg(test)]
mod tests {
    use crate::config::OperatorConfig;
    use crate::context::Context;
    use crate::crd::{Beat, BeatSpec};
    use crate::platform::memory::{MemoryEventSink, MemoryPlatform};
    use crate::platform::EventRecord;
    use crate::watches::DynamicWatches;
    use std::sync::Arc;

    #[test]
    fn test_iterations_are_monotonic() {
        let ctx = Context::new(
            MemoryPlatform::new(),
            Arc::new(DynamicWatches::new()),
            Arc::new(MemoryEventSink::new()),
            OperatorConfig::default(),
        );

        assert_eq!(ctx.next_iteration(), 1);
        assert_eq!(ctx.next_iteration(), 2);
    }

    #[tokio::test]
    async fn test_emit_publishes_about_object() {
        let sink = Arc::new(MemoryEventSink::new());
        let ctx = Context::new(
            MemoryPlatform::new(),
            Arc::new(DynamicWatches::new()),
            sink.clone(),
            OperatorConfig::default(),
        );
        let mut beat = Beat::new("k", BeatSpec::default());
        beat.metadata.namespace = Some("ns".to_string());

        ctx.emit(&beat, EventRecord::normal("Delayed", "Reconcile", "waiting"))
            .await;

        assert_eq!(sink.events_for("k").len(), 1);
    }
}
