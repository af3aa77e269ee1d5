//! Execution substrate for rewritten classes.
//!
//! An iterative stack interpreter runs methods of classes loaded through a
//! `SandboxNode`. Frames live on a heap-allocated stack, so sandboxed
//! recursion never recurses on the host. Classes under `rt/` are host
//! intrinsics implemented natively.

mod context;
mod cost;
mod interpreter;
mod intrinsics;
mod locale;
mod value;

use thiserror::Error;

use crate::hierarchy::LoadError;

pub use context::{ExecutionContext, HASH_OFFSET};
pub use cost::{
    CostCategory, CostCounters, CostModel, CostViolation, CostWeights, ExecutionProfile,
    RuntimeCost, RuntimeCostSummary,
};
pub use interpreter::Interpreter;
pub use intrinsics::{intrinsic_super, is_intrinsic_class, is_throwable_class};
pub use locale::{LocaleTag, ISO_COUNTRIES, ISO_LANGUAGES};
pub use value::{Object, ObjectRef, Value};

/// Why an invocation stopped without returning.
///
/// Only `Thrown` is visible to sandboxed exception handlers; the others
/// unwind every frame.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Uncaught exception {0}")]
    Thrown(Value),

    #[error(transparent)]
    CostExceeded(#[from] CostViolation),

    #[error("Stack depth {depth} exceeds limit {limit}")]
    StackDepthExceeded { depth: usize, limit: usize },

    #[error("{0}")]
    RuleViolation(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Verification failed: {0}")]
    Verify(String),
}
