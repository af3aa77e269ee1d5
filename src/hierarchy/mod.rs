//! Namespace-isolated class spaces.
//!
//! A hierarchy is a tree of `SandboxNode`s. Each node owns a cache of the
//! classes it rewrote; children reuse compatible ancestors' classes
//! read-only and cache their own rewrites locally.

mod cache;
mod config;
mod loaded;
mod node;
mod resolver;

use thiserror::Error;

use crate::classfile::ClassFormatError;
use crate::rewrite::RewriteError;

pub use config::{
    SandboxConfig, DEFAULT_COST_BUDGET, DEFAULT_MAX_STACK_DEPTH, DEFAULT_NAMESPACE_PREFIX,
};
pub use loaded::LoadedClass;
pub use node::{NodeStats, SandboxNode};
pub use resolver::{
    ChainResolver, ClassResolver, DirectoryResolver, MemoryResolver, ResolveError,
    CLASS_FILE_EXTENSION,
};

/// Misuse of the hierarchy itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Sandbox node has been destroyed")]
    NodeDestroyed,

    #[error("Sandbox node still has {count} live children")]
    NodeHasChildren { count: usize },

    #[error("Invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

impl HierarchyError {
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::NodeDestroyed)
    }
}

/// Failure to materialize one class. Never cached.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Class not found: {0}")]
    NotFound(String),

    #[error("Malformed class {class}: {source}")]
    Malformed {
        class: String,
        #[source]
        source: ClassFormatError,
    },

    #[error("Rule violation in {class}: {reason}")]
    RuleViolation { class: String, reason: String },

    #[error("Cannot rewrite {class}: {reason}")]
    Rewrite { class: String, reason: String },

    #[error("Class {class} could not be read: {reason}")]
    Resolve { class: String, reason: String },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl LoadError {
    pub fn is_rule_violation(&self) -> bool {
        matches!(self, Self::RuleViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn from_resolve(class: &str, err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(name) => Self::NotFound(name),
            other => Self::Resolve { class: class.to_string(), reason: other.to_string() },
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Malformed { .. } => "malformed",
            Self::RuleViolation { .. } => "rule_violation",
            Self::Rewrite { .. } => "rewrite",
            Self::Resolve { .. } => "resolve",
            Self::Hierarchy(_) => "hierarchy",
        }
    }
}

impl From<RewriteError> for LoadError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::RuleViolation { class, reason } => Self::RuleViolation { class, reason },
            RewriteError::Inconsistent { class, reason } => Self::Rewrite { class, reason },
        }
    }
}
