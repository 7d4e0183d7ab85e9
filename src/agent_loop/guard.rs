//! Bounds on nested runs: recursion depth and token spend.

use serde::{Deserialize, Serialize};

use crate::config::run::DEFAULT_MAX_DEPTH;
use crate::error::ConvoyError;
use crate::types::TokenUsage;

/// Position of a run in a tree of nested runs.
///
/// `max` is fixed at the root and inherited unchanged by every descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingDepth {
    pub current: usize,
    pub max: usize,
}

impl Default for NestingDepth {
    fn default() -> Self {
        Self::root(DEFAULT_MAX_DEPTH)
    }
}

impl NestingDepth {
    pub fn root(max: usize) -> Self {
        Self { current: 0, max }
    }

    pub fn can_descend(&self) -> bool {
        self.current < self.max
    }

    /// Depth for a run nested one level below this one.
    pub fn descend(&self) -> Result<Self, ConvoyError> {
        if !self.can_descend() {
            return Err(ConvoyError::DepthExceeded {
                current: self.current,
                max: self.max,
            });
        }
        Ok(Self {
            current: self.current + 1,
            max: self.max,
        })
    }
}

/// Cap on total tokens a run may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub limit: u64,
}

impl TokenBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }

    pub fn check(&self, usage: &TokenUsage) -> Result<(), ConvoyError> {
        let used = usage.total();
        if used > self.limit {
            return Err(ConvoyError::BudgetExceeded {
                used,
                budget: self.limit,
            });
        }
        Ok(())
    }

    pub fn remaining(&self, usage: &TokenUsage) -> u64 {
        self.limit.saturating_sub(usage.total())
    }
}
