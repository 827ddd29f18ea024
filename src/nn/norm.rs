//! Layer normalization.
//!
//! Normalizes across the feature axis for each sample independently, with
//! learnable scale and shift. Fully differentiable: the backward pass is
//! recorded as a dedicated gradient function.
//!
//! # Reference
//!
//! - Ba, J. L., Kiros, J. R., & Hinton, G. E. (2016). Layer normalization.
//!   arXiv:1607.06450.

use std::sync::Arc;

use super::init::{constant, zeros};
use super::module::Module;
use crate::autograd::grad_fn::LayerNormBackward;
use crate::autograd::{track, Tensor};

/// Layer Normalization (Ba et al., 2016).
///
/// ```text
/// y = (x - E[x]) / sqrt(Var[x] + eps) * gamma + beta
/// ```
///
/// Statistics are computed over the last axis of the input, which must
/// equal the configured feature count.
#[derive(Debug)]
pub struct LayerNorm {
    /// Number of features normalized over
    num_features: usize,
    /// Small constant for numerical stability
    eps: f32,
    /// Learnable scale parameter (gamma)
    weight: Tensor,
    /// Learnable shift parameter (beta)
    bias: Tensor,
}

impl LayerNorm {
    /// Create a new `LayerNorm` over `num_features`.
    #[must_use]
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            eps: 1e-5,
            weight: constant(&[num_features], 1.0).requires_grad(),
            bias: zeros(&[num_features]).requires_grad(),
        }
    }

    /// Create `LayerNorm` with a custom epsilon.
    #[must_use]
    pub fn with_eps(num_features: usize, eps: f32) -> Self {
        let mut layer = Self::new(num_features);
        layer.eps = eps;
        layer
    }

    /// Number of normalized features.
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

impl Module for LayerNorm {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        let norm_size = self.num_features;
        assert_eq!(
            *shape.last().expect("non-scalar input"),
            norm_size,
            "LayerNorm expects last axis of {norm_size} features"
        );

        let rows = if norm_size == 0 {
            0
        } else {
            input.numel() / norm_size
        };
        let x = input.data();
        let gamma = self.weight.data();
        let beta = self.bias.data();

        let mut xhat = vec![0.0f32; x.len()];
        let mut inv_std = vec![0.0f32; rows];
        let mut output = vec![0.0f32; x.len()];

        for r in 0..rows {
            let off = r * norm_size;
            let row = &x[off..off + norm_size];

            let mean: f32 = row.iter().sum::<f32>() / norm_size as f32;
            let var: f32 =
                row.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / norm_size as f32;
            let istd = 1.0 / (var + self.eps).sqrt();
            inv_std[r] = istd;

            for j in 0..norm_size {
                let h = (row[j] - mean) * istd;
                xhat[off + j] = h;
                output[off + j] = h * gamma[j] + beta[j];
            }
        }

        let mut result = Tensor::new(&output, shape);
        track(
            &mut result,
            Arc::new(LayerNormBackward {
                xhat: Tensor::new(&xhat, shape),
                inv_std,
                weight: self.weight.detach(),
            }),
            &[input, &self.weight, &self.bias],
        );
        result
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};

    #[test]
    fn test_layer_norm_zero_mean_unit_var() {
        let norm = LayerNorm::new(4);
        let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[1, 4]);
        let y = norm.forward(&x);

        let mean: f32 = y.data().iter().sum::<f32>() / 4.0;
        let var: f32 = y.data().iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_layer_norm_3d_rows_independent() {
        let norm = LayerNorm::new(2);
        let x = Tensor::new(&[1.0, 3.0, 10.0, 30.0], &[1, 2, 2]);
        let y = norm.forward(&x);
        // Both rows normalize to the same pattern regardless of magnitude.
        assert!((y.data()[0] - y.data()[2]).abs() < 1e-4);
        assert!((y.data()[1] - y.data()[3]).abs() < 1e-4);
    }

    #[test]
    fn test_layer_norm_parameters() {
        let norm = LayerNorm::new(8);
        let params = norm.parameters();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].shape(), &[8]);
        assert_eq!(params[1].shape(), &[8]);
    }

    #[test]
    fn test_layer_norm_gradients_flow() {
        clear_graph();
        let norm = LayerNorm::new(3);
        let x = Tensor::new(&[1.0, 2.0, 4.0], &[1, 3]).requires_grad();
        let loss = norm.forward(&x).pow(2.0).sum();
        loss.backward();

        assert!(get_grad(x.id()).is_some());
        let gamma_grad = get_grad(norm.parameters()[0].id()).expect("gamma grad");
        assert_eq!(gamma_grad.shape(), &[3]);
        let beta_grad = get_grad(norm.parameters()[1].id()).expect("beta grad");
        assert_eq!(beta_grad.shape(), &[3]);
        clear_graph();
    }

    #[test]
    #[should_panic(expected = "LayerNorm expects last axis")]
    fn test_layer_norm_width_mismatch() {
        let norm = LayerNorm::new(4);
        let x = Tensor::ones(&[2, 3]);
        let _ = norm.forward(&x);
    }
}
