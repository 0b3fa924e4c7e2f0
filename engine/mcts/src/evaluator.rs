//! Evaluator trait for position evaluation.
//!
//! The evaluator is the inference backend: given encoded positions it returns
//! a policy over moves, a win/loss value, a score estimate and ownership.
//! [`UniformEvaluator`] needs no model and is used for tests and as a
//! fallback when no network is configured.

use std::hash::{Hash, Hasher};

use thiserror::Error;

use engine_core::policy_len;

/// Errors that can occur during evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model error: {0}")]
    ModelError(String),
}

/// One position to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalInput {
    /// Encoded features, see [`engine_core::features`].
    pub features: Vec<f32>,
    /// Policy slots of the legal moves, pass included.
    pub legal: Vec<usize>,
    /// Side length the features are padded to.
    pub max_len: usize,
}

impl EvalInput {
    /// Hash identifying this input for caching and deduplication.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.max_len.hash(&mut hasher);
        for f in &self.features {
            f.to_bits().hash(&mut hasher);
        }
        self.legal.hash(&mut hasher);
        hasher.finish()
    }
}

/// Result of evaluating a position, from the side to move's perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    /// Probability per policy slot (`max_len * max_len + 1`). Illegal slots
    /// are zero and legal slots sum to ~1.0.
    pub policy: Vec<f32>,

    /// Expected result: -1.0 (certain loss) to +1.0 (certain win).
    pub win_loss: f32,

    /// Expected final score margin in points.
    pub score_mean: f32,

    /// Uncertainty of `score_mean`.
    pub score_stdev: f32,

    /// Per padded point, -1.0 (opponent owns) to +1.0 (side to move owns).
    pub ownership: Vec<f32>,
}

/// Trait for inference backends.
///
/// Implementations could be:
/// - UniformEvaluator: uniform policy and neutral values (for testing)
/// - OnnxEvaluator: neural network inference (behind the `onnx` feature)
pub trait Evaluator: Send + Sync {
    /// Evaluate a single position.
    fn evaluate(&self, input: &EvalInput) -> Result<EvalOutput, EvaluatorError>;

    /// Evaluate a batch of positions. Results are in input order.
    /// Default implementation calls evaluate() in a loop.
    fn evaluate_batch(&self, inputs: &[EvalInput]) -> Result<Vec<EvalOutput>, EvaluatorError> {
        inputs.iter().map(|input| self.evaluate(input)).collect()
    }
}

/// Uniform evaluator that assigns equal probability to all legal moves.
/// All values are neutral. Useful for testing the search without a model.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, input: &EvalInput) -> Result<EvalOutput, EvaluatorError> {
        let size = policy_len(input.max_len);
        let mut policy = vec![0.0; size];

        if let Some(&bad) = input.legal.iter().find(|&&slot| slot >= size) {
            return Err(EvaluatorError::InvalidInput(format!(
                "legal move slot {} out of range {}",
                bad, size
            )));
        }
        if !input.legal.is_empty() {
            let prob = 1.0 / input.legal.len() as f32;
            for &slot in &input.legal {
                policy[slot] = prob;
            }
        }

        Ok(EvalOutput {
            policy,
            win_loss: 0.0,
            score_mean: 0.0,
            score_stdev: 0.0,
            ownership: vec![0.0; input.max_len * input.max_len],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(legal: Vec<usize>) -> EvalInput {
        EvalInput {
            features: vec![0.0; 8],
            legal,
            max_len: 3,
        }
    }

    #[test]
    fn test_uniform_evaluator() {
        let eval = UniformEvaluator::new();
        let result = eval.evaluate(&input(vec![0, 4, 9])).unwrap();

        assert_eq!(result.policy.len(), 10);
        let sum: f32 = result.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((result.policy[4] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(result.policy[1], 0.0);
        assert_eq!(result.ownership.len(), 9);
        assert_eq!(result.win_loss, 0.0);
    }

    #[test]
    fn test_uniform_rejects_out_of_range_slot() {
        let eval = UniformEvaluator::new();
        assert!(matches!(
            eval.evaluate(&input(vec![10])),
            Err(EvaluatorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_default_batch_preserves_order() {
        let eval = UniformEvaluator::new();
        let results = eval
            .evaluate_batch(&[input(vec![0]), input(vec![1, 2])])
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].policy[0], 1.0);
        assert_eq!(results[1].policy[2], 0.5);
    }

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let a = input(vec![0, 1]);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.features[3] = 1.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), input(vec![0]).fingerprint());
    }
}
