//! Computation graph for automatic differentiation.
//!
//! Tape-based recording of operations and the reverse-order backward sweep.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::tensor::{Tensor, TensorId};

/// Entry in the computation tape.
#[derive(Clone)]
pub(crate) struct TapeEntry {
    /// ID of the output tensor
    pub output_id: TensorId,

    /// Function to compute gradients
    pub grad_fn: Arc<dyn GradFn>,

    /// IDs of input tensors
    pub input_ids: Vec<TensorId>,
}

/// Computation graph that records operations for the backward pass.
///
/// Operations are recorded in order during the forward pass, then
/// gradients are computed in reverse order, accumulating where a tensor
/// feeds multiple downstream operations.
///
/// # Thread Safety
///
/// Each thread owns its graph (`thread_local` in the parent module), so
/// independent batches can run forward passes on independent threads
/// without synchronization.
#[allow(missing_debug_implementations)]
pub struct ComputationGraph {
    /// Recorded operations (tape)
    tape: Vec<TapeEntry>,

    /// Leaf tensors that may receive gradients, by ID
    tensors: HashMap<TensorId, Tensor>,

    /// Tensor IDs that require gradients
    requires_grad: HashSet<TensorId>,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tape: Vec::new(),
            tensors: HashMap::new(),
            requires_grad: HashSet::new(),
        }
    }

    /// Clear all recorded operations.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.tensors.clear();
        self.requires_grad.clear();
    }

    /// Register a tensor that may participate in gradient computation.
    pub fn register_tensor(&mut self, tensor: Tensor) {
        if tensor.requires_grad_enabled() {
            self.requires_grad.insert(tensor.id());
        }
        self.tensors.insert(tensor.id(), tensor);
    }

    /// Record an operation to the tape.
    pub fn record(
        &mut self,
        output_id: TensorId,
        grad_fn: Arc<dyn GradFn>,
        input_ids: Vec<TensorId>,
    ) {
        self.tape.push(TapeEntry {
            output_id,
            grad_fn,
            input_ids,
        });
    }

    /// Compute gradients via backpropagation.
    ///
    /// 1. Seed `grad_output` for the output tensor.
    /// 2. Walk the tape in reverse.
    /// 3. For each operation, compute gradients w.r.t. its inputs.
    /// 4. Accumulate gradients for tensors used multiple times.
    pub fn backward(&mut self, output_id: TensorId, grad_output: Tensor) {
        let mut grads: HashMap<TensorId, Tensor> = HashMap::new();
        grads.insert(output_id, grad_output);

        for entry in self.tape.iter().rev() {
            let grad_out = match grads.get(&entry.output_id) {
                Some(g) => g.clone(),
                None => continue,
            };

            let input_grads = entry.grad_fn.backward(&grad_out);

            for (input_id, input_grad) in entry.input_ids.iter().zip(input_grads) {
                grads
                    .entry(*input_id)
                    .and_modify(|existing| {
                        let new_data: Vec<f32> = existing
                            .data()
                            .iter()
                            .zip(input_grad.data().iter())
                            .map(|(a, b)| a + b)
                            .collect();
                        *existing = Tensor::new(&new_data, existing.shape());
                    })
                    .or_insert(input_grad);
            }
        }

        // Store gradients in leaf tensors
        for (id, grad) in grads {
            if let Some(tensor) = self.tensors.get_mut(&id) {
                if tensor.requires_grad_enabled() && tensor.is_leaf() {
                    tensor.accumulate_grad(grad);
                }
            }
        }
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    /// Check if the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    /// Get gradient for a tensor by ID (after backward).
    #[must_use]
    pub fn get_grad(&self, id: TensorId) -> Option<Tensor> {
        self.tensors.get(&id).and_then(|t| t.grad().cloned())
    }

    /// Clear gradient for a specific tensor.
    pub fn clear_grad(&mut self, id: TensorId) {
        if let Some(tensor) = self.tensors.get_mut(&id) {
            tensor.clear_grad();
        }
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::grad_fn::ScaleBackward;
    use super::*;

    #[test]
    fn test_graph_creation() {
        let graph = ComputationGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_graph_clear() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        graph.register_tensor(t);
        assert!(!graph.tensors.is_empty());

        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.tensors.is_empty());
    }

    #[test]
    fn test_backward_simple() {
        let mut graph = ComputationGraph::new();

        let input = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let input_id = input.id();
        graph.register_tensor(input);

        let output = Tensor::from_slice(&[3.0, 6.0]);
        let output_id = output.id();
        graph.register_tensor(output);

        graph.record(output_id, Arc::new(ScaleBackward { factor: 3.0 }), vec![input_id]);

        graph.backward(output_id, Tensor::from_slice(&[1.0, 1.0]));

        let grad = graph.get_grad(input_id).expect("grad after backward");
        assert_eq!(grad.data(), &[3.0, 3.0]);
    }

    #[test]
    fn test_backward_accumulates_shared_input() {
        let mut graph = ComputationGraph::new();

        let input = Tensor::from_slice(&[1.0]).requires_grad();
        let input_id = input.id();
        graph.register_tensor(input);

        let out1 = Tensor::from_slice(&[2.0]);
        let out2 = Tensor::from_slice(&[3.0]);
        // Both outputs consume the same input; their gradients must add up.
        // Chain both into a common downstream id via two tape entries.
        let downstream = Tensor::from_slice(&[5.0]);
        let down_id = downstream.id();

        graph.record(out1.id(), Arc::new(ScaleBackward { factor: 2.0 }), vec![input_id]);
        graph.record(out2.id(), Arc::new(ScaleBackward { factor: 3.0 }), vec![input_id]);
        graph.record(down_id, Arc::new(ScaleBackward { factor: 1.0 }), vec![out1.id()]);
        graph.record(down_id, Arc::new(ScaleBackward { factor: 1.0 }), vec![out2.id()]);

        graph.backward(down_id, Tensor::from_slice(&[1.0]));

        let grad = graph.get_grad(input_id).expect("grad after backward");
        assert_eq!(grad.data(), &[5.0]);
    }

    #[test]
    fn test_backward_empty_tape() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0]).requires_grad();
        let id = t.id();
        graph.register_tensor(t);

        graph.backward(id, Tensor::from_slice(&[1.0]));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_get_grad_nonexistent() {
        let graph = ComputationGraph::new();
        let other = Tensor::from_slice(&[3.0]);
        assert!(graph.get_grad(other.id()).is_none());
    }
}
