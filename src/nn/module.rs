//! The `Module` trait: common interface for all neural network layers.

use crate::autograd::Tensor;

/// Common interface for neural network layers and models.
///
/// A module owns its parameters and defines a forward transformation.
/// Training-mode state (dropout on/off) is toggled with `train`/`eval`.
pub trait Module {
    /// Apply the module to an input tensor.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Immutable references to all learnable parameters, in a stable order.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Mutable references to all learnable parameters, in the same order
    /// as [`Module::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Switch to training mode.
    fn train(&mut self) {}

    /// Switch to evaluation mode.
    fn eval(&mut self) {}

    /// Whether the module is in training mode.
    fn training(&self) -> bool {
        true
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }
}
