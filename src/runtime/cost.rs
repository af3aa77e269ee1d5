//! Runtime cost accounting.
//!
//! Each metered instruction charges its category and the overall budget.
//! A charge that pushes a counter past its threshold still records the new
//! value, then reports the violation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Allocation,
    Invocation,
    Jump,
    Throw,
}

impl CostCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Invocation => "invocation",
            Self::Jump => "jump",
            Self::Throw => "throw",
        }
    }
}

/// Pricing hook for metered operations.
pub trait CostModel: Send + Sync + std::fmt::Debug {
    fn weight(&self, category: CostCategory) -> u64;
}

/// Per-category weights. The default charges one unit per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostWeights {
    pub allocation: u64,
    pub invocation: u64,
    pub jump: u64,
    pub throw: u64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self { allocation: 1, invocation: 1, jump: 1, throw: 1 }
    }
}

impl CostModel for CostWeights {
    fn weight(&self, category: CostCategory) -> u64 {
        match category {
            CostCategory::Allocation => self.allocation,
            CostCategory::Invocation => self.invocation,
            CostCategory::Jump => self.jump,
            CostCategory::Throw => self.throw,
        }
    }
}

/// Per-category thresholds applied on top of the overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub allocation_threshold: u64,
    pub invocation_threshold: u64,
    pub jump_threshold: u64,
    pub throw_threshold: u64,
}

impl ExecutionProfile {
    pub const UNLIMITED: Self = Self {
        allocation_threshold: u64::MAX,
        invocation_threshold: u64::MAX,
        jump_threshold: u64::MAX,
        throw_threshold: u64::MAX,
    };

    pub const DEFAULT: Self = Self {
        allocation_threshold: 1_000_000,
        invocation_threshold: 1_000_000,
        jump_threshold: 1_000_000,
        throw_threshold: 1_000_000,
    };

    fn threshold(&self, category: CostCategory) -> u64 {
        match category {
            CostCategory::Allocation => self.allocation_threshold,
            CostCategory::Invocation => self.invocation_threshold,
            CostCategory::Jump => self.jump_threshold,
            CostCategory::Throw => self.throw_threshold,
        }
    }
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{counter} cost {value} exceeds threshold {threshold}")]
pub struct CostViolation {
    /// Category name, or `total` for the overall budget.
    pub counter: String,
    pub value: u64,
    pub threshold: u64,
}

/// A single counter with an upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCost {
    name: &'static str,
    value: u64,
    threshold: u64,
}

impl RuntimeCost {
    pub fn new(name: &'static str, threshold: u64) -> Self {
        Self { name, value: 0, threshold }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn increment(&mut self, amount: u64) -> Result<(), CostViolation> {
        self.value = self.value.saturating_add(amount);
        if self.value > self.threshold {
            return Err(CostViolation {
                counter: self.name.to_string(),
                value: self.value,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Serializable snapshot of an invocation's costs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCounters {
    pub allocations: u64,
    pub invocations: u64,
    pub jumps: u64,
    pub throws: u64,
    pub total: u64,
}

/// All counters for one invocation.
#[derive(Debug)]
pub struct RuntimeCostSummary {
    allocations: RuntimeCost,
    invocations: RuntimeCost,
    jumps: RuntimeCost,
    throws: RuntimeCost,
    total: RuntimeCost,
    model: Box<dyn CostModel>,
}

impl RuntimeCostSummary {
    pub fn new(profile: &ExecutionProfile, budget: u64, model: Box<dyn CostModel>) -> Self {
        Self {
            allocations: RuntimeCost::new("allocation", profile.threshold(CostCategory::Allocation)),
            invocations: RuntimeCost::new("invocation", profile.threshold(CostCategory::Invocation)),
            jumps: RuntimeCost::new("jump", profile.threshold(CostCategory::Jump)),
            throws: RuntimeCost::new("throw", profile.threshold(CostCategory::Throw)),
            total: RuntimeCost::new("total", budget),
            model,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(&ExecutionProfile::UNLIMITED, u64::MAX, Box::new(CostWeights::default()))
    }

    /// Charge one metered operation.
    pub fn record(&mut self, category: CostCategory) -> Result<(), CostViolation> {
        self.record_units(category, 1)
    }

    /// Charge `units` operations of one category at once.
    pub fn record_units(&mut self, category: CostCategory, units: u64) -> Result<(), CostViolation> {
        let weight = self.model.weight(category).saturating_mul(units);
        let counter = match category {
            CostCategory::Allocation => &mut self.allocations,
            CostCategory::Invocation => &mut self.invocations,
            CostCategory::Jump => &mut self.jumps,
            CostCategory::Throw => &mut self.throws,
        };
        let category_result = counter.increment(weight);
        let total_result = self.total.increment(weight);
        category_result.and(total_result)
    }

    pub fn snapshot(&self) -> CostCounters {
        CostCounters {
            allocations: self.allocations.value(),
            invocations: self.invocations.value(),
            jumps: self.jumps.value(),
            throws: self.throws.value(),
            total: self.total.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_past_threshold_records_value() {
        let mut cost = RuntimeCost::new("invocation", 10);
        assert!(cost.increment(10).is_ok());
        let err = cost.increment(1).unwrap_err();
        assert_eq!(err.value, 11);
        assert_eq!(cost.value(), 11);
    }

    #[test]
    fn test_single_jump_over_threshold() {
        let mut cost = RuntimeCost::new("jump", 10);
        assert!(cost.increment(11).is_err());
        assert_eq!(cost.value(), 11);
    }

    #[test]
    fn test_saturating() {
        let mut cost = RuntimeCost::new("total", u64::MAX);
        cost.increment(u64::MAX).unwrap();
        assert!(cost.increment(1).is_ok());
        assert_eq!(cost.value(), u64::MAX);
    }

    #[test]
    fn test_summary_budget_applies_across_categories() {
        let mut summary = RuntimeCostSummary::new(&ExecutionProfile::UNLIMITED, 3, Box::new(CostWeights::default()));
        summary.record(CostCategory::Invocation).unwrap();
        summary.record(CostCategory::Jump).unwrap();
        summary.record(CostCategory::Allocation).unwrap();
        let err = summary.record(CostCategory::Throw).unwrap_err();
        assert_eq!(err.counter, "total");
        let snapshot = summary.snapshot();
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.throws, 1);
    }

    #[test]
    fn test_weights_applied() {
        let weights = CostWeights { allocation: 5, ..CostWeights::default() };
        let mut summary = RuntimeCostSummary::new(&ExecutionProfile::DEFAULT, 100, Box::new(weights));
        summary.record(CostCategory::Allocation).unwrap();
        assert_eq!(summary.snapshot().allocations, 5);
        assert_eq!(summary.snapshot().total, 5);
    }

    #[test]
    fn test_record_units_scales_weight() {
        let weights = CostWeights { allocation: 2, ..CostWeights::default() };
        let mut summary = RuntimeCostSummary::new(&ExecutionProfile::UNLIMITED, 10, Box::new(weights));
        summary.record_units(CostCategory::Allocation, 4).unwrap();
        assert_eq!(summary.snapshot().allocations, 8);
        assert_eq!(summary.record_units(CostCategory::Allocation, 2).unwrap_err().counter, "total");
    }

    #[test]
    fn test_category_threshold() {
        let profile = ExecutionProfile { jump_threshold: 1, ..ExecutionProfile::UNLIMITED };
        let mut summary = RuntimeCostSummary::new(&profile, u64::MAX, Box::new(CostWeights::default()));
        summary.record(CostCategory::Jump).unwrap();
        assert_eq!(summary.record(CostCategory::Jump).unwrap_err().counter, "jump");
    }
}
