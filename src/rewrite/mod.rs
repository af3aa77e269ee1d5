//! Class rewriting pipeline.
//!
//! Passes run in a fixed order:
//! 1. closure consistency check on the original names
//! 2. determinism fixups and native-method stubbing
//! 3. namespace remapping of every type reference
//! 4. annotation stitching
//! 5. cost instrumentation
//!
//! Rewriting is a pure function of the descriptor and the context, and is
//! idempotent: feeding the output back in yields an equal descriptor.

mod closure;
mod determinism;
mod instrument;
mod remap;
mod stitch;

use thiserror::Error;
use tracing::debug;

use crate::classfile::ClassDescriptor;
use crate::rules::{FixupPolicy, Policy, RuleCatalog};

pub use remap::Remapper;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// The class references something the rules or fixups forbid.
    #[error("Rule violation in {class}: {reason}")]
    RuleViolation { class: String, reason: String },

    /// The class cannot be rewritten consistently.
    #[error("Cannot rewrite {class}: {reason}")]
    Inconsistent { class: String, reason: String },
}

impl RewriteError {
    pub fn is_rule_violation(&self) -> bool {
        matches!(self, Self::RuleViolation { .. })
    }
}

/// Inputs a rewrite depends on.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub namespace_prefix: &'a str,
    pub rules: &'a RuleCatalog,
    pub fixups: &'a FixupPolicy,
}

impl<'a> RewriteContext<'a> {
    /// Policy for a name, judging prefixed names by their original name.
    pub fn classify(&self, name: &str) -> Policy {
        self.rules.classify_with_prefix(name, self.namespace_prefix)
    }

    pub fn original_name<'n>(&self, name: &'n str) -> &'n str {
        name.strip_prefix(self.namespace_prefix).unwrap_or(name)
    }
}

/// Counters describing what a rewrite changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RewriteStats {
    pub references_remapped: usize,
    pub fixups_applied: usize,
    pub natives_stubbed: usize,
    pub annotations_stitched: usize,
    pub meters_inserted: usize,
}

#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub descriptor: ClassDescriptor,
    pub modified: bool,
    pub stats: RewriteStats,
}

pub struct ClassRewriter<'a> {
    ctx: RewriteContext<'a>,
}

impl<'a> ClassRewriter<'a> {
    pub fn new(ctx: RewriteContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn rewrite(&self, class: ClassDescriptor) -> Result<RewriteOutcome, RewriteError> {
        let original = class.clone();
        let mut class = class;
        let mut stats = RewriteStats::default();

        closure::check(&class, &self.ctx)?;
        determinism::apply(&mut class, &self.ctx, &mut stats)?;

        let mut remapper = Remapper::new(&self.ctx, &original.name);
        remapper.apply(&mut class)?;
        stats.annotations_stitched = stitch::apply(&mut class, &mut remapper)?;
        stats.references_remapped = remapper.remapped();
        stats.meters_inserted = instrument::apply(&mut class);

        let modified = class != original;
        debug!(
            class = %original.name,
            modified,
            remapped = stats.references_remapped,
            fixups = stats.fixups_applied,
            meters = stats.meters_inserted,
            "Class rewritten"
        );
        Ok(RewriteOutcome { descriptor: class, modified, stats })
    }
}

/// Convenience wrapper around `ClassRewriter`.
pub fn rewrite(class: ClassDescriptor, ctx: RewriteContext<'_>) -> Result<RewriteOutcome, RewriteError> {
    ClassRewriter::new(ctx).rewrite(class)
}
