//! ONNX Runtime evaluator for neural network inference.
//!
//! # Model Format
//!
//! The ONNX model is expected to have:
//! - Input: "features" - shape (batch_size, feature_len) float32, see
//!   [`engine_core::features`]
//! - Output: "policy_logits" - shape (batch_size, max_len * max_len + 1)
//! - Output: "value" - shape (batch_size, 1), win/loss in [-1, 1]
//! - Output: "score" - shape (batch_size, 2), score mean and stdev
//! - Output: "ownership" - shape (batch_size, max_len * max_len), optional
//!
//! All outputs are from the perspective of the side to move.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use ort::{session::Session, value::Value};
use tracing::{debug, info};

use engine_core::{feature_len, policy_len};

use crate::evaluator::{EvalInput, EvalOutput, Evaluator, EvaluatorError};

/// ONNX Runtime evaluator.
///
/// Uses a Mutex internally because `Session::run` requires `&mut self`,
/// but the `Evaluator` trait uses `&self` for thread-safe sharing.
pub struct OnnxEvaluator {
    session: Mutex<Session>,
    max_len: usize,
    /// Rows evaluated (for diagnostics)
    rows: AtomicU64,
    /// Total inference time in microseconds (for diagnostics)
    total_inference_time_us: AtomicU64,
}

impl std::fmt::Debug for OnnxEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEvaluator")
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}

impl OnnxEvaluator {
    /// Load a model for boards padded to `max_len`.
    pub fn load<P: AsRef<Path>>(model_path: P, max_len: usize, intra_threads: usize) -> Result<Self, EvaluatorError> {
        let path = model_path.as_ref();
        let session = Session::builder()
            .map_err(|e| EvaluatorError::ModelError(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| EvaluatorError::ModelError(format!("Failed to set intra threads: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| EvaluatorError::ModelError(format!("Failed to load model: {}", e)))?;
        info!(path = %path.display(), max_len, "Loaded ONNX model");

        Ok(Self {
            session: Mutex::new(session),
            max_len,
            rows: AtomicU64::new(0),
            total_inference_time_us: AtomicU64::new(0),
        })
    }

    /// Softmax over the legal slots only; every other slot is zero.
    fn masked_softmax(logits: &[f32], legal: &[usize], size: usize) -> Vec<f32> {
        let mut policy = vec![0.0; size];
        let max_logit = legal
            .iter()
            .filter_map(|&slot| logits.get(slot).copied())
            .fold(f32::NEG_INFINITY, f32::max);
        if max_logit == f32::NEG_INFINITY {
            return policy;
        }

        let mut exp_sum = 0.0;
        for &slot in legal {
            if let Some(&logit) = logits.get(slot) {
                let v = (logit - max_logit).exp();
                policy[slot] = v;
                exp_sum += v;
            }
        }
        if exp_sum > 0.0 {
            for v in &mut policy {
                *v /= exp_sum;
            }
        }
        policy
    }

    fn check_input(&self, input: &EvalInput) -> Result<(), EvaluatorError> {
        if input.max_len != self.max_len {
            return Err(EvaluatorError::InvalidInput(format!(
                "model expects max_len {}, got {}",
                self.max_len, input.max_len
            )));
        }
        if input.features.len() != feature_len(self.max_len) {
            return Err(EvaluatorError::InvalidInput(format!(
                "expected {} features, got {}",
                feature_len(self.max_len),
                input.features.len()
            )));
        }
        Ok(())
    }
}

impl Evaluator for OnnxEvaluator {
    fn evaluate(&self, input: &EvalInput) -> Result<EvalOutput, EvaluatorError> {
        let mut outputs = self.evaluate_batch(std::slice::from_ref(input))?;
        outputs
            .pop()
            .ok_or_else(|| EvaluatorError::EvaluationFailed("empty model output".to_string()))
    }

    fn evaluate_batch(&self, inputs: &[EvalInput]) -> Result<Vec<EvalOutput>, EvaluatorError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let batch_size = inputs.len();
        let width = feature_len(self.max_len);
        let policy_size = policy_len(self.max_len);
        let area = self.max_len * self.max_len;

        let mut flat = Vec::with_capacity(batch_size * width);
        for input in inputs {
            self.check_input(input)?;
            flat.extend_from_slice(&input.features);
        }

        let input_array = ndarray::Array2::from_shape_vec((batch_size, width), flat)
            .map_err(|e| EvaluatorError::InvalidInput(format!("Failed to create batch input array: {}", e)))?;
        let input_value = Value::from_array(input_array)
            .map_err(|e| EvaluatorError::ModelError(format!("Failed to create batch input tensor: {}", e)))?;

        // Run inference - extract all data inside the lock scope
        let inference_start = Instant::now();
        let (policy_flat, values, scores, ownership) = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| EvaluatorError::EvaluationFailed(format!("Failed to acquire session lock: {}", e)))?;
            let outputs = session
                .run(ort::inputs!["features" => input_value])
                .map_err(|e| EvaluatorError::EvaluationFailed(format!("Batch inference failed: {}", e)))?;

            let extract = |name: &str| -> Result<Vec<f32>, EvaluatorError> {
                let output = outputs
                    .get(name)
                    .ok_or_else(|| EvaluatorError::ModelError(format!("Missing {} output", name)))?;
                let (_shape, data) = output
                    .try_extract_tensor::<f32>()
                    .map_err(|e| EvaluatorError::ModelError(format!("Failed to extract {} tensor: {}", name, e)))?;
                Ok(data.to_vec())
            };

            let policy_flat = extract("policy_logits")?;
            let values = extract("value")?;
            let scores = extract("score")?;
            let ownership = if outputs.get("ownership").is_some() {
                extract("ownership")?
            } else {
                Vec::new()
            };
            (policy_flat, values, scores, ownership)
        };

        if policy_flat.len() < batch_size * policy_size || values.len() < batch_size || scores.len() < batch_size * 2 {
            return Err(EvaluatorError::ModelError(format!(
                "model outputs too small for batch of {}",
                batch_size
            )));
        }

        let elapsed_us = inference_start.elapsed().as_micros() as u64;
        let total_us = self.total_inference_time_us.fetch_add(elapsed_us, Ordering::Relaxed) + elapsed_us;
        let rows = self.rows.fetch_add(batch_size as u64, Ordering::Relaxed) + batch_size as u64;
        debug!(
            batch_size,
            elapsed_us,
            avg_us_per_row = total_us / rows.max(1),
            "ONNX batch evaluated"
        );

        let has_ownership = ownership.len() >= batch_size * area;
        let results = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let logits = &policy_flat[i * policy_size..(i + 1) * policy_size];
                EvalOutput {
                    policy: Self::masked_softmax(logits, &input.legal, policy_size),
                    win_loss: values[i].clamp(-1.0, 1.0),
                    score_mean: scores[2 * i],
                    score_stdev: scores[2 * i + 1].max(0.0),
                    ownership: if has_ownership {
                        ownership[i * area..(i + 1) * area].to_vec()
                    } else {
                        vec![0.0; area]
                    },
                }
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_softmax_ignores_illegal_slots() {
        let logits = vec![1.0, 100.0, 1.0, 0.0, 2.0];
        let policy = OnnxEvaluator::masked_softmax(&logits, &[0, 2, 4], 5);
        assert_eq!(policy[1], 0.0);
        assert_eq!(policy[3], 0.0);
        assert!((policy[0] - policy[2]).abs() < 1e-6);
        assert!(policy[4] > policy[0]);
        let sum: f32 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_masked_softmax_no_legal_moves() {
        let policy = OnnxEvaluator::masked_softmax(&[0.5, 0.5], &[], 2);
        assert_eq!(policy, vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model_fails() {
        let result = OnnxEvaluator::load("/nonexistent/model.onnx", 19, 1);
        assert!(matches!(result, Err(EvaluatorError::ModelError(_))));
    }
}
