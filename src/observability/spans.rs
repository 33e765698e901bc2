//! Operation spans.

use tracing::Span;
use uuid::Uuid;

/// Span wrapping one lifecycle operation on one instance.
///
/// Every event logged inside carries the same `operation_id`.
pub fn operation_span(operation: &str, instance: &str) -> Span {
    tracing::info_span!(
        "lifecycle",
        operation = %operation,
        instance = %instance,
        operation_id = %Uuid::new_v4()
    )
}
