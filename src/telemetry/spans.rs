//! Span utilities and extension traits for invocation tracing.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for task invocation spans.
pub struct InvocationSpan;

impl InvocationSpan {
    /// Fields:
    /// - `node_id`: node the task runs in
    /// - `entry`: entry point class as requested
    /// - `status`, `error.message`: filled in by `SpanExt::record_result`
    /// - `cost_total`: filled in after execution
    pub fn new(node_id: &str, entry: &str) -> Span {
        info_span!(
            "task_invocation",
            node_id = %node_id,
            entry = %entry,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            cost_total = tracing::field::Empty,
        )
    }
}
