//! Learned-weight scoring backends
//!
//! These models are placeholders: their parameters are either seeded at
//! random or loaded from postcard bytes, and there is no training loop. They
//! plug into the ensemble through [`super::ThreatModel`] and never dominate
//! the rule-based score.

#[cfg(any(feature = "sequence-model", feature = "reconstruction-model"))]
pub mod dense;
#[cfg(feature = "reconstruction-model")]
pub mod reconstruction;
#[cfg(feature = "sequence-model")]
pub mod sequence;

#[cfg(any(feature = "sequence-model", feature = "reconstruction-model"))]
pub use dense::Dense;
#[cfg(feature = "reconstruction-model")]
pub use reconstruction::ReconstructionModel;
#[cfg(feature = "sequence-model")]
pub use sequence::SequenceModel;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("layer expects {expected} weights, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("model weight must be finite and positive")]
    InvalidWeight,
    #[error("model decode failed: {0}")]
    Decode(postcard::Error),
    #[error("model encode failed: {0}")]
    Encode(postcard::Error),
}

/// Logistic function with the input clamped to ±10.
pub fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-10.0, 10.0);
    1.0 / (1.0 + libm::expf(-x))
}

pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_is_bounded() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(1e9) < 1.0);
        assert!(sigmoid(-1e9) > 0.0);
        assert_eq!(sigmoid(50.0), sigmoid(10.0));
    }

    #[test]
    fn test_encode_and_decode_errors_are_distinct() {
        let err = ModelError::Encode(postcard::Error::SerializeBufferFull);
        assert!(alloc::format!("{err}").starts_with("model encode failed"));
        assert_ne!(err, ModelError::Decode(postcard::Error::SerializeBufferFull));
    }

    #[test]
    fn test_relu() {
        assert_eq!(relu(-3.0), 0.0);
        assert_eq!(relu(2.5), 2.5);
    }
}
