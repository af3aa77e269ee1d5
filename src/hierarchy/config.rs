//! Per-node sandbox configuration.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::rules::{FixupPolicy, RuleCatalog};
use crate::runtime::{CostWeights, ExecutionProfile};

use super::HierarchyError;

pub const DEFAULT_NAMESPACE_PREFIX: &str = "sandbox/";
pub const DEFAULT_COST_BUDGET: u64 = 10_000_000;
pub const DEFAULT_MAX_STACK_DEPTH: usize = 256;

/// Configuration a node is created with. Children start from a copy of their
/// parent's configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Prefix that places remapped names in the sandbox namespace.
    pub namespace_prefix: String,
    /// Overall cost budget per invocation.
    pub cost_budget: u64,
    pub max_stack_depth: usize,
    pub profile: ExecutionProfile,
    pub cost_weights: CostWeights,
    pub rules: Arc<RuleCatalog>,
    pub fixups: Arc<FixupPolicy>,
    /// Original annotation types whose stitched twins reflection reports.
    pub visible_annotations: BTreeSet<String>,
    /// Seed of the deterministic random source, fixed per invocation.
    pub random_seed: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            cost_budget: DEFAULT_COST_BUDGET,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            profile: ExecutionProfile::DEFAULT,
            cost_weights: CostWeights::default(),
            rules: Arc::new(RuleCatalog::standard()),
            fixups: Arc::new(FixupPolicy::standard()),
            visible_annotations: BTreeSet::new(),
            random_seed: 0,
        }
    }
}

impl SandboxConfig {
    pub fn with_rules(mut self, rules: RuleCatalog) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_fixups(mut self, fixups: FixupPolicy) -> Self {
        self.fixups = Arc::new(fixups);
        self
    }

    pub fn with_namespace_prefix(mut self, prefix: &str) -> Self {
        self.namespace_prefix = prefix.to_string();
        self
    }

    pub fn with_cost_budget(mut self, budget: u64) -> Self {
        self.cost_budget = budget;
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_profile(mut self, profile: ExecutionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_cost_weights(mut self, weights: CostWeights) -> Self {
        self.cost_weights = weights;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Retain the original view of an annotation type. Accepts dotted or
    /// internal names.
    pub fn with_visible_annotation(mut self, type_name: &str) -> Self {
        self.visible_annotations.insert(type_name.replace('.', "/"));
        self
    }

    pub fn retains_annotation(&self, type_name: &str) -> bool {
        self.visible_annotations.contains(type_name)
    }

    pub fn validate(&self) -> Result<(), HierarchyError> {
        let prefix = &self.namespace_prefix;
        if prefix.is_empty() || !prefix.ends_with('/') || prefix.starts_with('/') || prefix.contains('.') {
            return Err(HierarchyError::InvalidConfig(format!(
                "namespace prefix {:?} must be a non-empty package path ending in '/'",
                prefix
            )));
        }
        if self.cost_budget == 0 {
            return Err(HierarchyError::InvalidConfig("cost budget must be positive".to_string()));
        }
        if self.max_stack_depth == 0 {
            return Err(HierarchyError::InvalidConfig(
                "max stack depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
