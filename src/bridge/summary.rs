//! Host-side values and invocation summaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::CostCounters;

/// A value as the host sees it. Serialized as
/// `{"type": "long", "value": 42}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HostValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Object {
        /// Original (host namespace) class name.
        class: String,
        #[serde(default)]
        fields: BTreeMap<String, HostValue>,
    },
}

impl HostValue {
    pub fn string(value: &str) -> Self {
        Self::String(value.to_string())
    }

    pub fn object(class: &str) -> Self {
        Self::Object { class: class.to_string(), fields: BTreeMap::new() }
    }

    pub fn with_field(mut self, name: &str, value: HostValue) -> Self {
        if let Self::Object { fields, .. } = &mut self {
            fields.insert(name.to_string(), value);
        }
        self
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
            Self::Object { class, fields } => {
                write!(f, "{}{{", class)?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Why an invocation produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    #[error("Class not found: {class}")]
    ClassNotFound { class: String },

    #[error("Malformed class {class}: {reason}")]
    MalformedClass { class: String, reason: String },

    #[error("Rule violation: {reason}")]
    RuleViolation { reason: String },

    #[error("Cannot rewrite {class}: {reason}")]
    RewriteError { class: String, reason: String },

    #[error("{class} is not a task: {reason}")]
    NotATask { class: String, reason: String },

    #[error("Cannot marshal input: {reason}")]
    UnmarshalableInput { reason: String },

    #[error("Cannot marshal result: {reason}")]
    UnmarshalableResult { reason: String },

    #[error("Cost budget exceeded: {counter} reached {value}, threshold {threshold}")]
    CostBudgetExceeded { counter: String, value: u64, threshold: u64 },

    #[error("Stack depth {depth} exceeds limit {limit}")]
    StackDepthExceeded { depth: usize, limit: usize },

    #[error("Sandboxed code threw {exception}: {}", .message.as_deref().unwrap_or("<no message>"))]
    SandboxedFault { exception: String, message: Option<String> },
}

impl ExecutionFailure {
    /// Returns true if the sandbox refused something the task attempted.
    pub fn is_security_concern(&self) -> bool {
        matches!(
            self,
            Self::RuleViolation { .. } | Self::CostBudgetExceeded { .. } | Self::StackDepthExceeded { .. }
        )
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassNotFound { .. } => "class_not_found",
            Self::MalformedClass { .. } => "malformed_class",
            Self::RuleViolation { .. } => "rule_violation",
            Self::RewriteError { .. } => "rewrite_error",
            Self::NotATask { .. } => "not_a_task",
            Self::UnmarshalableInput { .. } => "unmarshalable_input",
            Self::UnmarshalableResult { .. } => "unmarshalable_result",
            Self::CostBudgetExceeded { .. } => "cost_budget_exceeded",
            Self::StackDepthExceeded { .. } => "stack_depth_exceeded",
            Self::SandboxedFault { .. } => "sandboxed_fault",
        }
    }
}

/// Outcome of one task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub result: Result<HostValue, ExecutionFailure>,
    pub costs: CostCounters,
}

impl ExecutionSummary {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        self.result.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_value_json_shape() {
        let json = serde_json::to_string(&HostValue::Long(42)).unwrap();
        assert_eq!(json, r#"{"type":"long","value":42}"#);
        let null: HostValue = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert_eq!(null, HostValue::Null);
    }

    #[test]
    fn test_object_json_shape() {
        let value = HostValue::object("com.acme.Point").with_field("x", HostValue::Long(1));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["value"]["class"], "com.acme.Point");
        assert_eq!(json["value"]["fields"]["x"]["value"], 1);
    }

    #[test]
    fn test_failure_json_tagged() {
        let failure = ExecutionFailure::StackDepthExceeded { depth: 9, limit: 8 };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "stack_depth_exceeded");
        assert!(failure.is_security_concern());
    }

    #[test]
    fn test_fault_display() {
        let fault = ExecutionFailure::SandboxedFault {
            exception: "rt.ArithmeticException".to_string(),
            message: Some("/ by zero".to_string()),
        };
        assert_eq!(fault.to_string(), "Sandboxed code threw rt.ArithmeticException: / by zero");
    }
}
