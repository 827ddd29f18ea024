//! Reverse-mode automatic differentiation engine for model training.
//!
//! Implements tape-based automatic differentiation with a define-by-run
//! computational graph:
//! - Operations are recorded to a tape during the forward pass
//! - Gradients are computed in reverse order during the backward pass
//! - Gradients accumulate for tensors used by multiple operations
//!
//! # Example
//!
//! ```
//! use tasar::autograd::{clear_graph, get_grad, Tensor};
//!
//! let x = Tensor::from_slice(&[1.0, 2.0, 3.0]).requires_grad();
//! let w = Tensor::from_slice(&[0.5, 0.5, 0.5]).requires_grad();
//!
//! let y = x.mul(&w).sum();
//! y.backward();
//!
//! let grad = get_grad(x.id()).expect("gradient for x");
//! assert_eq!(grad.data(), &[0.5, 0.5, 0.5]);
//! clear_graph();
//! ```
//!
//! # References
//!
//! - Baydin, A. G., et al. (2018). Automatic differentiation in machine
//!   learning: a survey. JMLR.
//! - Rumelhart, D. E., et al. (1986). Learning representations by
//!   back-propagating errors. Nature.

pub(crate) mod grad_fn;
mod graph;
mod ops;
mod tensor;

pub use grad_fn::GradFn;
pub use graph::ComputationGraph;
pub use tensor::{Tensor, TensorId};

pub(crate) use ops::track;

use std::cell::RefCell;

thread_local! {
    /// Computation graph for the current thread.
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());

    /// Flag to disable gradient tracking (for inference).
    static GRAD_ENABLED: RefCell<bool> = const { RefCell::new(true) };
}

/// Execute a closure without gradient tracking.
///
/// Useful for inference or evaluation passes.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    GRAD_ENABLED.with(|enabled| {
        let prev = *enabled.borrow();
        *enabled.borrow_mut() = false;
        let result = f();
        *enabled.borrow_mut() = prev;
        result
    })
}

/// Check if gradient tracking is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|enabled| *enabled.borrow())
}

/// Run a closure against the thread-local computation graph.
pub(crate) fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&mut ComputationGraph) -> R,
{
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Clear the computation graph (call after each optimizer step).
pub fn clear_graph() {
    GRAPH.with(|graph| graph.borrow_mut().clear());
}

/// Get the gradient for a tensor by ID after a backward pass.
#[must_use]
pub fn get_grad(id: TensorId) -> Option<Tensor> {
    with_graph(|graph| graph.get_grad(id))
}

/// Clear the gradient for a specific tensor by ID.
pub fn clear_grad(id: TensorId) {
    with_graph(|graph| graph.clear_grad(id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_grad_context() {
        assert!(is_grad_enabled());

        no_grad(|| {
            assert!(!is_grad_enabled());
        });

        assert!(is_grad_enabled());
    }

    #[test]
    fn test_nested_no_grad() {
        no_grad(|| {
            assert!(!is_grad_enabled());
            no_grad(|| {
                assert!(!is_grad_enabled());
            });
            assert!(!is_grad_enabled());
        });

        assert!(is_grad_enabled());
    }

    #[test]
    fn test_no_grad_skips_recording() {
        clear_graph();
        let x = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let y = no_grad(|| x.scale(2.0).sum());
        assert_eq!(y.item(), 6.0);
        assert!(!y.requires_grad_enabled());
        assert!(get_grad(x.id()).is_none());
        clear_graph();
    }
}
