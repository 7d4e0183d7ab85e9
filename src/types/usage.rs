//! Token usage accounting.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token usage for one turn or a whole run.
///
/// All arithmetic saturates at `u64::MAX`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64, reasoning: u64) -> Self {
        Self {
            input,
            output,
            reasoning,
        }
    }

    pub fn total(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.reasoning)
    }

    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.reasoning = self.reasoning.saturating_add(other.reasoning);
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(mut self, rhs: TokenUsage) -> TokenUsage {
        self.merge(&rhs);
        self
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        self.merge(&rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_saturates_instead_of_overflowing() {
        let usage = TokenUsage::new(u64::MAX, 10, 1);
        assert_eq!(usage.total(), u64::MAX);
    }

    #[test]
    fn merge_is_componentwise_and_saturating() {
        let mut usage = TokenUsage::new(5, 7, 0);
        usage.merge(&TokenUsage::new(1, 2, 3));
        assert_eq!(usage, TokenUsage::new(6, 9, 3));

        usage += TokenUsage::new(u64::MAX, 0, 0);
        assert_eq!(usage.input, u64::MAX);
        assert_eq!(usage.output, 9);
    }

    #[test]
    fn missing_fields_deserialize_as_zero() {
        let usage: TokenUsage = serde_json::from_str(r#"{"input": 4}"#).unwrap();
        assert_eq!(usage, TokenUsage::new(4, 0, 0));
    }
}
