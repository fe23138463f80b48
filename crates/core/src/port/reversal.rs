// Reversal Policy Port
// Decides, per tick, whether a forward instance starts compensating

use crate::domain::{DomainError, QueueInstance};
use rand::Rng;

/// Compensation-injection hook consulted once per forward instance per tick
pub trait ReversalPolicy: Send + Sync {
    fn should_reverse(&self, instance: &QueueInstance) -> bool;
}

/// Never flips on its own; only explicit compensation requests reverse
pub struct NeverReverse;

impl ReversalPolicy for NeverReverse {
    fn should_reverse(&self, _instance: &QueueInstance) -> bool {
        false
    }
}

/// Flips each forward instance with a fixed probability per tick
#[derive(Debug, Clone)]
pub struct RandomReversal {
    probability: f64,
}

impl RandomReversal {
    /// # Errors
    /// `DomainError::ValidationError` unless `0.0 <= probability <= 1.0`
    pub fn new(probability: f64) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(DomainError::ValidationError(format!(
                "reversal probability {} outside 0..=1",
                probability
            )));
        }
        Ok(Self { probability })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl ReversalPolicy for RandomReversal {
    fn should_reverse(&self, _instance: &QueueInstance) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskContext;

    #[test]
    fn test_probability_bounds() {
        assert!(RandomReversal::new(-0.1).is_err());
        assert!(RandomReversal::new(1.5).is_err());
        assert!(RandomReversal::new(f64::NAN).is_err());
        assert!(RandomReversal::new(0.25).is_ok());
    }

    #[test]
    fn test_extreme_probabilities_are_deterministic() {
        let inst = QueueInstance::new("i", "QA", TaskContext::new());
        let never = RandomReversal::new(0.0).unwrap();
        let always = RandomReversal::new(1.0).unwrap();
        for _ in 0..50 {
            assert!(!never.should_reverse(&inst));
            assert!(always.should_reverse(&inst));
        }
        assert!(!NeverReverse.should_reverse(&inst));
    }
}
