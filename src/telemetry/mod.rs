//! Telemetry for the sandbox runtime.
//!
//! Structured logging, tracing spans, security audit events and metric
//! counters. Nothing here opens network connections; metrics go through the
//! `metrics` facade and are dropped unless the host installs a recorder.

mod logging;
mod metrics;
pub mod security_log;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_cache_hit, record_class_rewritten, record_invocation, record_load_failure,
};
pub use security_log::{log_security_event, SecurityEvent, SecuritySeverity};
pub use spans::{InvocationSpan, SpanExt};
