//! Namespace rules and determinism fixups.
//!
//! The catalog decides, per class name, whether a reference passes through,
//! is remapped into the sandbox namespace, is forbidden, or is pinned to a
//! single hierarchy-wide copy. Fixups name individual host members whose
//! behaviour is non-deterministic and say how the rewriter treats calls to them.

mod catalog;
mod fixups;

pub use catalog::{NamespaceRule, Pattern, Policy, RuleCatalog};
pub use fixups::{FixupAction, FixupPolicy, FixupRule};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid rule pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to parse rules document: {0}")]
    Parse(String),
}
