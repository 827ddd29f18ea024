//! Differentiable loss functions for training.

use crate::autograd::Tensor;

/// Reduction mode for loss functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Return loss per element (no reduction)
    None,
    /// Return mean of losses (default)
    #[default]
    Mean,
    /// Return sum of losses
    Sum,
}

/// Mean Squared Error loss for regression.
///
/// Computes: MSE = mean((pred - target)²)
///
/// # Example
///
/// ```
/// use tasar::nn::loss::MSELoss;
/// use tasar::autograd::Tensor;
///
/// let criterion = MSELoss::new();
/// let pred = Tensor::from_slice(&[1.0, 2.0, 3.0]);
/// let target = Tensor::from_slice(&[1.0, 2.0, 3.0]);
/// let loss = criterion.forward(&pred, &target);
/// assert!(loss.item() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MSELoss {
    reduction: Reduction,
}

impl MSELoss {
    /// Create a new `MSELoss` with mean reduction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `MSELoss` with the given reduction.
    #[must_use]
    pub fn with_reduction(reduction: Reduction) -> Self {
        Self { reduction }
    }

    /// Compute the loss between predictions and targets.
    #[must_use]
    pub fn forward(&self, pred: &Tensor, target: &Tensor) -> Tensor {
        assert_eq!(
            pred.shape(),
            target.shape(),
            "Prediction and target shapes must match"
        );

        let squared = pred.sub(target).pow(2.0);
        match self.reduction {
            Reduction::None => squared,
            Reduction::Mean => squared.mean(),
            Reduction::Sum => squared.sum(),
        }
    }
}

/// Plain (non-differentiable) mean squared error between two slices.
///
/// Used by evaluation passes where no gradients are needed.
#[must_use]
pub fn mse(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(pred.len(), target.len(), "mse() length mismatch");
    if pred.is_empty() {
        return 0.0;
    }
    let sum: f32 = pred
        .iter()
        .zip(target.iter())
        .map(|(&p, &t)| (p - t) * (p - t))
        .sum();
    sum / pred.len() as f32
}

/// Plain mean absolute error between two slices.
#[must_use]
pub fn mae(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(pred.len(), target.len(), "mae() length mismatch");
    if pred.is_empty() {
        return 0.0;
    }
    let sum: f32 = pred
        .iter()
        .zip(target.iter())
        .map(|(&p, &t)| (p - t).abs())
        .sum();
    sum / pred.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_mse_zero_for_equal() {
        let criterion = MSELoss::new();
        let pred = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        let target = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        assert!(criterion.forward(&pred, &target).item() < 1e-7);
    }

    #[test]
    fn test_mse_known_value() {
        let criterion = MSELoss::new();
        let pred = Tensor::from_slice(&[2.0, 4.0]);
        let target = Tensor::from_slice(&[0.0, 0.0]);
        // (4 + 16) / 2 = 10
        assert!((criterion.forward(&pred, &target).item() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_mse_sum_reduction() {
        let criterion = MSELoss::with_reduction(Reduction::Sum);
        let pred = Tensor::from_slice(&[2.0, 4.0]);
        let target = Tensor::from_slice(&[0.0, 0.0]);
        assert!((criterion.forward(&pred, &target).item() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_mse_gradient() {
        clear_graph();
        let pred = Tensor::from_slice(&[3.0, 5.0]).requires_grad();
        let target = Tensor::from_slice(&[1.0, 1.0]);
        let loss = MSELoss::new().forward(&pred, &target);
        loss.backward();

        // d/dp mean((p - t)^2) = 2 (p - t) / n = [2, 4]
        let grad = get_grad(pred.id()).expect("pred grad");
        assert!((grad.data()[0] - 2.0).abs() < 1e-5);
        assert!((grad.data()[1] - 4.0).abs() < 1e-5);
        clear_graph();
    }

    #[test]
    fn test_plain_mse_mae() {
        assert!((mse(&[1.0, 2.0], &[0.0, 0.0]) - 2.5).abs() < 1e-6);
        assert!((mae(&[1.0, -2.0], &[0.0, 0.0]) - 1.5).abs() < 1e-6);
        assert_eq!(mse(&[], &[]), 0.0);
    }
}
