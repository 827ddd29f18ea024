//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW + b with the weight stored
//! `[in_features, out_features]`, so the forward pass is a plain matrix
//! product with no transpose bookkeeping.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of
//!   training deep feedforward neural networks. AISTATS.

use super::init::{xavier_uniform, zeros};
use super::module::Module;
use crate::autograd::Tensor;

/// Fully connected layer: y = xW + b.
///
/// # Shape
///
/// - Input: `(*, in_features)` where `*` means any number of batch axes
/// - Output: `(*, out_features)`
///
/// # Example
///
/// ```
/// use tasar::nn::{Linear, Module};
/// use tasar::autograd::Tensor;
///
/// let layer = Linear::with_seed(20, 30, Some(1));
/// let x = Tensor::zeros(&[128, 20]);
/// let y = layer.forward(&x);
/// assert_eq!(y.shape(), &[128, 30]);
/// ```
pub struct Linear {
    /// Weight matrix, shape: [`in_features`, `out_features`]
    weight: Tensor,

    /// Bias vector, shape: [`out_features`], or None if bias disabled
    bias: Option<Tensor>,

    /// Number of input features
    in_features: usize,

    /// Number of output features
    out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    #[must_use]
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a Linear layer with a specific random seed.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(&[in_features, out_features], in_features, out_features, seed)
            .requires_grad();
        let bias = zeros(&[out_features]).requires_grad();

        Self {
            weight,
            bias: Some(bias),
            in_features,
            out_features,
        }
    }

    /// Create a Linear layer without a bias term.
    #[must_use]
    pub fn without_bias(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(&[in_features, out_features], in_features, out_features, seed)
            .requires_grad();

        Self {
            weight,
            bias: None,
            in_features,
            out_features,
        }
    }

    /// Input feature dimension.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output feature dimension.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Whether this layer has a bias term.
    #[must_use]
    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    /// Reference to the weight tensor.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        let input_shape = input.shape();
        let ndim = input_shape.len();
        assert_eq!(
            input_shape[ndim - 1],
            self.in_features,
            "Input features mismatch: expected {}, got {}",
            self.in_features,
            input_shape[ndim - 1]
        );

        // Flatten leading batch axes for the 2-D matmul, restore after.
        let (reshaped, batch_shape) = if ndim > 2 {
            let batch: usize = input_shape[..ndim - 1].iter().product();
            (
                input.view(&[batch, self.in_features]),
                Some(input_shape[..ndim - 1].to_vec()),
            )
        } else {
            (input.clone(), None)
        };

        let output = reshaped.matmul(&self.weight);
        let output = match &self.bias {
            Some(b) => output.broadcast_add(b),
            None => output,
        };

        match batch_shape {
            Some(mut shape) => {
                shape.push(self.out_features);
                output.view(&shape)
            }
            None => output,
        }
    }

    fn parameters(&self) -> Vec<&Tensor> {
        match &self.bias {
            Some(b) => vec![&self.weight, b],
            None => vec![&self.weight],
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match &mut self.bias {
            Some(b) => vec![&mut self.weight, b],
            None => vec![&mut self.weight],
        }
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}
