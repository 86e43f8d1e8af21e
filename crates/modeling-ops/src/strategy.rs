use native_kernel::Capabilities;
use serde::{Deserialize, Serialize};

use crate::types::StrategyPreference;

/// How an N-ary boolean is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStrategy {
    /// One bulk kernel call with every operand.
    BatchFastPath,
    /// For fuse, the general N-way solver over all operands. For cut, one
    /// cut against a compound of every tool.
    Native,
    /// Recursive pairwise combination. Always available.
    Pairwise,
}

impl OperationStrategy {
    /// Strategies to attempt for a fuse, in order.
    pub fn plan_fuse(preference: StrategyPreference, caps: Capabilities) -> Vec<OperationStrategy> {
        if preference == StrategyPreference::Pairwise {
            return vec![OperationStrategy::Pairwise];
        }
        let mut plan = Vec::new();
        if caps.bulk_fuse {
            plan.push(OperationStrategy::BatchFastPath);
        }
        if caps.general_fuse {
            plan.push(OperationStrategy::Native);
        }
        if plan.is_empty() {
            plan.push(OperationStrategy::Pairwise);
        }
        plan
    }

    /// Strategies to attempt for a cut, in order.
    pub fn plan_cut(preference: StrategyPreference, caps: Capabilities) -> Vec<OperationStrategy> {
        if preference == StrategyPreference::Pairwise {
            return vec![OperationStrategy::Pairwise];
        }
        let mut plan = Vec::new();
        if caps.bulk_cut {
            plan.push(OperationStrategy::BatchFastPath);
        }
        plan.push(OperationStrategy::Native);
        plan
    }
}
