//! Consumer span helpers.
//!
//! Every log line a consumer emits happens inside its span, so the node
//! and instance tags travel with it to stdout and to the OTLP backend.

use tracing::Span;

/// Start the span covering one consumer's whole drain run.
///
/// The `drain.state` field is declared empty and is updated via
/// [`record_state_transition`].
pub fn start_consumer_span(node_id: &str, instance_id: &str) -> Span {
    tracing::info_span!(
        "consumer",
        node = node_id,
        instance = instance_id,
        "drain.state" = tracing::field::Empty,
    )
}

/// Record a drain-loop state transition on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("drain.state", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
