//! Loaded (rewritten) classes.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::classfile::ClassDescriptor;
use crate::rewrite::RewriteStats;

/// A rewritten class owned by the node that defined it. Identity is the
/// `Arc` holding it: two lookups observe the same class when the pointers
/// are equal.
#[derive(Debug)]
pub struct LoadedClass {
    descriptor: ClassDescriptor,
    original_name: String,
    defining_node: Uuid,
    digest: String,
    modified: bool,
    stats: RewriteStats,
}

impl LoadedClass {
    pub(crate) fn new(
        descriptor: ClassDescriptor,
        original_name: String,
        defining_node: Uuid,
        bytes: &[u8],
        modified: bool,
        stats: RewriteStats,
    ) -> Self {
        let digest = hex::encode(Sha256::digest(bytes));
        Self { descriptor, original_name, defining_node, digest, modified, stats }
    }

    /// Runtime (possibly sandboxed) name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Name the class was requested and resolved under.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn descriptor(&self) -> &ClassDescriptor {
        &self.descriptor
    }

    pub fn defining_node(&self) -> Uuid {
        self.defining_node
    }

    /// SHA-256 of the rewritten class bytes, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn was_modified(&self) -> bool {
        self.modified
    }

    pub fn rewrite_stats(&self) -> RewriteStats {
        self.stats
    }
}
