// src/predictor.rs
//! Batch predictor seam.
//!
//! The search only ever talks to a [`Predictor`]: a batch of encoded
//! positions goes in, one scalar value in [0, 1] plus a move-logit vector
//! comes back per position. Concrete networks live behind this trait; the
//! crate ships the uniform fallback used when no network is attached or a
//! real one fails mid-search.

use thiserror::Error;

/// Move-logit vector length; indexed by [`crate::uci::MoveCodec`] tokens.
pub const POLICY_SIZE: usize = 4608;

#[derive(Debug, Error)]
pub enum PredictorError {
    /// Transient: the caller falls back to uniform predictions.
    #[error("predictor unavailable: {0}")]
    Unavailable(String),
    /// Contract break: aborts the search.
    #[error("prediction batch shape mismatch: expected {expected}, got {got}")]
    BadShape { expected: usize, got: usize },
}

/// Input to one predictor slot: the move-token history from the base
/// position, which is how positions are encoded on the wire.
#[derive(Clone, Debug, Default)]
pub struct EncodedPosition {
    pub tokens: Vec<u16>,
}

impl EncodedPosition {
    pub fn from_tokens(tokens: &[u16]) -> Self {
        Self {
            tokens: tokens.to_vec(),
        }
    }
}

/// One slot of predictor output.
#[derive(Clone, Debug)]
pub struct Prediction {
    /// Expected outcome for the side to move, in [0, 1].
    pub value: f32,
    /// Raw logits over the move-token space; the search masks and
    /// softmaxes them over legal moves.
    pub policy_logits: Vec<f32>,
}

pub trait Predictor: Send + Sync {
    /// Fixed batch capacity; callers may submit fewer positions.
    fn batch_size(&self) -> usize;

    /// Called once before the first search so lazy backends can spin up.
    fn warm_up(&self) -> Result<(), PredictorError> {
        Ok(())
    }

    fn predict(&self, batch: &[EncodedPosition]) -> Result<Vec<Prediction>, PredictorError>;
}

/// Offline fallback: every position evaluates to a draw with a flat policy.
pub struct UniformPredictor {
    batch_size: usize,
}

impl UniformPredictor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl Predictor for UniformPredictor {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn predict(&self, batch: &[EncodedPosition]) -> Result<Vec<Prediction>, PredictorError> {
        Ok(predict_batch_uniform(batch.len()))
    }
}

/// Uniform predictions for `count` slots, used both by [`UniformPredictor`]
/// and as the recovery path when a real predictor reports
/// [`PredictorError::Unavailable`].
pub fn predict_batch_uniform(count: usize) -> Vec<Prediction> {
    (0..count)
        .map(|_| Prediction {
            value: 0.5,
            policy_logits: vec![0.0; POLICY_SIZE],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_predictor_shapes() {
        let predictor = UniformPredictor::new(8);
        let batch = vec![EncodedPosition::default(); 3];
        let out = predictor.predict(&batch).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].policy_logits.len(), POLICY_SIZE);
        assert!((out[0].value - 0.5).abs() < f32::EPSILON);
    }
}
