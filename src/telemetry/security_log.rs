//! Security audit logging.
//!
//! Structured records for everything the sandbox refuses, rewrites or trips
//! on, so violations can be audited after the fact.

use std::time::{SystemTime, UNIX_EPOCH};

/// Security event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// A class referenced a FORBID-classified type.
    ForbiddenReference,
    /// A call to a non-deterministic API was replaced, rejected or trapped.
    NonDeterministicCall,
    /// A native method body was replaced by a stub.
    NativeMethodStubbed,
    /// Sandboxed code executed a trap.
    RuleViolationTrap,
    /// A cost counter passed its threshold.
    CostBudgetExceeded,
    /// The interpreter frame stack passed its limit.
    StackDepthExceeded,
    /// Path traversal attempt detected.
    PathTraversalAttempt,
    /// A sandbox node was destroyed.
    NodeDestroyed,
}

impl SecurityEvent {
    /// Get the severity level for this event.
    pub fn severity(&self) -> SecuritySeverity {
        match self {
            Self::ForbiddenReference => SecuritySeverity::Warning,
            Self::NonDeterministicCall => SecuritySeverity::Info,
            Self::NativeMethodStubbed => SecuritySeverity::Info,
            Self::RuleViolationTrap => SecuritySeverity::Warning,
            Self::CostBudgetExceeded => SecuritySeverity::Warning,
            Self::StackDepthExceeded => SecuritySeverity::Warning,
            Self::PathTraversalAttempt => SecuritySeverity::Critical,
            Self::NodeDestroyed => SecuritySeverity::Debug,
        }
    }

    /// Get a string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForbiddenReference => "forbidden_reference",
            Self::NonDeterministicCall => "non_deterministic_call",
            Self::NativeMethodStubbed => "native_method_stubbed",
            Self::RuleViolationTrap => "rule_violation_trap",
            Self::CostBudgetExceeded => "cost_budget_exceeded",
            Self::StackDepthExceeded => "stack_depth_exceeded",
            Self::PathTraversalAttempt => "path_traversal_attempt",
            Self::NodeDestroyed => "node_destroyed",
        }
    }
}

/// Severity levels for security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecuritySeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Log a security event with structured data.
///
/// # Arguments
/// * `event` - The type of security event
/// * `message` - Human-readable description
/// * `details` - Additional structured details as key-value pairs
///
/// # Example
/// ```
/// use detbox_core::telemetry::{log_security_event, SecurityEvent};
///
/// log_security_event(
///     SecurityEvent::ForbiddenReference,
///     "Disallowed reference to rt.net.Socket",
///     &[("class", "com/acme/Fetcher")]
/// );
/// ```
pub fn log_security_event(event: SecurityEvent, message: &str, details: &[(&str, &str)]) {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let event_type = event.as_str();
    let severity = event.severity();

    // Build structured log message
    let details_str = details
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");

    // Format as structured log line
    let log_line = if details_str.is_empty() {
        format!(
            "[{}] SECURITY {} {}: {}",
            timestamp,
            severity.as_str(),
            event_type,
            message
        )
    } else {
        format!(
            "[{}] SECURITY {} {}: {} | {}",
            timestamp,
            severity.as_str(),
            event_type,
            message,
            details_str
        )
    };

    // Log to appropriate level using tracing
    match severity {
        SecuritySeverity::Debug => tracing::debug!("{}", log_line),
        SecuritySeverity::Info => tracing::info!("{}", log_line),
        SecuritySeverity::Warning => tracing::warn!("{}", log_line),
        SecuritySeverity::Error => tracing::error!("{}", log_line),
        SecuritySeverity::Critical => tracing::error!("CRITICAL {}", log_line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_severity() {
        assert_eq!(
            SecurityEvent::NativeMethodStubbed.severity(),
            SecuritySeverity::Info
        );
        assert_eq!(
            SecurityEvent::ForbiddenReference.severity(),
            SecuritySeverity::Warning
        );
        assert_eq!(
            SecurityEvent::PathTraversalAttempt.severity(),
            SecuritySeverity::Critical
        );
    }

    #[test]
    fn test_event_as_str() {
        assert_eq!(SecurityEvent::CostBudgetExceeded.as_str(), "cost_budget_exceeded");
        assert_eq!(
            SecurityEvent::PathTraversalAttempt.as_str(),
            "path_traversal_attempt"
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(SecuritySeverity::Critical > SecuritySeverity::Error);
        assert!(SecuritySeverity::Error > SecuritySeverity::Warning);
        assert!(SecuritySeverity::Warning > SecuritySeverity::Info);
        assert!(SecuritySeverity::Info > SecuritySeverity::Debug);
    }
}
