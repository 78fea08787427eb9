//! Transfer Functions for Neurons
//!
//! Maps a neuron's net input to its activation value. Only the shape needed
//! for value and bound computation is modelled.

use serde::{Deserialize, Serialize};

/// Transfer function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferFunction {
    /// `max(0, tanh(x))`
    #[default]
    RectifiedTanh,
    /// `max(0, x)`
    RectifiedLinear,
    /// Logistic sigmoid
    Sigmoid,
    /// Identity
    Linear,
}

impl TransferFunction {
    /// Apply the transfer function
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            TransferFunction::RectifiedTanh => x.tanh().max(0.0),
            TransferFunction::RectifiedLinear => x.max(0.0),
            TransferFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            TransferFunction::Linear => x,
        }
    }

    /// Supremum of the function, the starting point for upper bounds.
    #[must_use]
    pub fn upper_limit(&self) -> f64 {
        match self {
            TransferFunction::RectifiedTanh | TransferFunction::Sigmoid => 1.0,
            TransferFunction::RectifiedLinear | TransferFunction::Linear => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectified_tanh() {
        let f = TransferFunction::RectifiedTanh;
        assert_eq!(f.apply(-2.0), 0.0);
        assert!((f.apply(1.0) - 1.0f64.tanh()).abs() < 1e-12);
        assert_eq!(f.upper_limit(), 1.0);
    }

    #[test]
    fn test_rectified_linear() {
        let f = TransferFunction::RectifiedLinear;
        assert_eq!(f.apply(-0.5), 0.0);
        assert_eq!(f.apply(3.5), 3.5);
        assert!(f.upper_limit().is_infinite());
        assert_eq!(f.apply(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn test_sigmoid() {
        let f = TransferFunction::Sigmoid;
        assert!((f.apply(0.0) - 0.5).abs() < 1e-12);
        assert_eq!(f.upper_limit(), 1.0);
    }
}
