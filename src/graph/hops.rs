//! Hop-indexed feature construction.
//!
//! Repeatedly applies the propagation operator(s) to the raw node
//! features, stacking each diffusion step along a new hop axis. Hop 0 is
//! always the node's own feature vector; each step writes a fresh buffer
//! and never touches the previous hops. Runs once per graph; the result
//! is cached by the caller and reused across training iterations.

use super::norm::PropagationOperator;
use crate::autograd::Tensor;
use crate::error::{Result, TasarError};

/// Build the hop feature tensor for one graph.
///
/// - Undirected: `[h_0, h_1, ..., h_K]` → `[n, K + 1, d]`
/// - Directed: forward and reverse tracks interleaved per distance,
///   `[h_0, f_1, r_1, f_2, r_2, ...]` → `[n, 2K + 1, d]`
///
/// Propagation is pure linear diffusion (sparse x dense products), so
/// the result is exactly reproducible given the operator and `features`.
///
/// # Errors
///
/// Returns [`TasarError::NumericalError`] if any propagated value is
/// NaN or infinite, and [`TasarError::DimensionMismatch`] if `features`
/// does not have one row per node.
///
/// # Example
///
/// ```
/// use tasar::autograd::Tensor;
/// use tasar::graph::{hop_features, CircuitGraph, PropagationOperator};
///
/// let g = CircuitGraph::new(2, vec![[0, 1]], false).unwrap();
/// let op = PropagationOperator::build(&g);
/// let x = Tensor::new(&[1.0, 2.0], &[2, 1]);
/// let hops = hop_features(&x, &op, 1).unwrap();
/// assert_eq!(hops.shape(), &[2, 2, 1]);
/// // Hop 1 swaps the two features across the single edge.
/// assert_eq!(hops.data(), &[1.0, 2.0, 2.0, 1.0]);
/// ```
pub fn hop_features(
    features: &Tensor,
    operator: &PropagationOperator,
    num_hops: usize,
) -> Result<Tensor> {
    if features.ndim() != 2 {
        return Err(TasarError::DimensionMismatch {
            expected: "[nodes, features]".to_string(),
            actual: format!("{:?}", features.shape()),
        });
    }
    let (n, d) = (features.shape()[0], features.shape()[1]);

    let mut tracks: Vec<Tensor> = Vec::with_capacity(operator.seq_len(num_hops));
    tracks.push(features.detach());

    match operator {
        PropagationOperator::Undirected(op) => {
            check_rows(op.n(), n)?;
            let mut current = features.detach();
            for _ in 0..num_hops {
                current = op.matmul_dense(&current);
                tracks.push(current.clone());
            }
        }
        PropagationOperator::Directed { forward, reverse } => {
            check_rows(forward.n(), n)?;
            let mut fwd = features.detach();
            let mut rev = features.detach();
            for _ in 0..num_hops {
                fwd = forward.matmul_dense(&fwd);
                rev = reverse.matmul_dense(&rev);
                tracks.push(fwd.clone());
                tracks.push(rev.clone());
            }
        }
    }

    let seq = tracks.len();
    let mut data = vec![0.0f32; n * seq * d];
    for (hop, track) in tracks.iter().enumerate() {
        let td = track.data();
        for node in 0..n {
            let dst = (node * seq + hop) * d;
            data[dst..dst + d].copy_from_slice(&td[node * d..(node + 1) * d]);
        }
    }

    if !data.iter().all(|v| v.is_finite()) {
        return Err(TasarError::NumericalError {
            context: "hop feature propagation".to_string(),
        });
    }

    Ok(Tensor::new(&data, &[n, seq, d]))
}

fn check_rows(operator_n: usize, feature_rows: usize) -> Result<()> {
    if operator_n != feature_rows {
        return Err(TasarError::dimension_mismatch(
            "nodes",
            operator_n,
            feature_rows,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CircuitGraph;

    fn build(graph: &CircuitGraph) -> PropagationOperator {
        PropagationOperator::build(graph)
    }

    #[test]
    fn test_two_node_scenario() {
        // Edge (0 -> 1), undirected, K = 1, features [1, 2].
        // Hop-1 for node 0 is 2 (propagated from node 1), and 1 for node 1.
        let g = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        let x = Tensor::new(&[1.0, 2.0], &[2, 1]);
        let hops = hop_features(&x, &build(&g), 1).expect("hops");
        assert_eq!(hops.shape(), &[2, 2, 1]);
        assert_eq!(hops.data(), &[1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_edgeless_graph_zero_hops() {
        let g = CircuitGraph::new(3, vec![], false).expect("valid");
        let x = Tensor::new(&[1.0, 2.0, 3.0], &[3, 1]);
        let hops = hop_features(&x, &build(&g), 2).expect("hops");
        assert_eq!(hops.shape(), &[3, 3, 1]);
        for node in 0..3 {
            // Hop 0 is the raw feature.
            assert_eq!(hops.data()[node * 3], x.data()[node]);
            // Hops 1..K are exactly zero.
            assert_eq!(hops.data()[node * 3 + 1], 0.0);
            assert_eq!(hops.data()[node * 3 + 2], 0.0);
        }
    }

    #[test]
    fn test_hop_zero_slot_preserved() {
        let g = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        let x = Tensor::new(&[5.0, -3.0], &[2, 1]);
        let hops = hop_features(&x, &build(&g), 3).expect("hops");
        assert_eq!(hops.data()[0], 5.0);
        assert_eq!(hops.data()[4], -3.0);
    }

    #[test]
    fn test_directed_shape_and_order() {
        // Chain 0 -> 1 -> 2, K = 1: seq is [h0, f1, r1].
        let g = CircuitGraph::new(3, vec![[0, 1], [1, 2]], true).expect("valid");
        let x = Tensor::new(&[1.0, 10.0, 100.0], &[3, 1]);
        let hops = hop_features(&x, &build(&g), 1).expect("hops");
        assert_eq!(hops.shape(), &[3, 3, 1]);

        let at = |node: usize, hop: usize| hops.data()[node * 3 + hop];
        // Forward hop pulls from successors: node 0 sees node 1.
        assert_eq!(at(0, 1), 10.0);
        assert_eq!(at(1, 1), 100.0);
        assert_eq!(at(2, 1), 0.0);
        // Reverse hop pulls from predecessors: node 1 sees node 0.
        assert_eq!(at(0, 2), 0.0);
        assert_eq!(at(1, 2), 1.0);
        assert_eq!(at(2, 2), 10.0);
    }

    #[test]
    fn test_isolated_node_hops_are_zero() {
        let g = CircuitGraph::new(3, vec![[0, 1]], false).expect("valid");
        let x = Tensor::new(&[1.0, 2.0, 7.0], &[3, 1]);
        let hops = hop_features(&x, &build(&g), 4).expect("hops");
        let seq = 5;
        assert_eq!(hops.data()[2 * seq], 7.0);
        for hop in 1..seq {
            assert_eq!(hops.data()[2 * seq + hop], 0.0);
        }
    }

    #[test]
    fn test_empty_graph_empty_tensor() {
        let g = CircuitGraph::new(0, vec![], false).expect("valid");
        let x = Tensor::zeros(&[0, 4]);
        let hops = hop_features(&x, &build(&g), 2).expect("hops");
        assert_eq!(hops.shape(), &[0, 3, 4]);
        assert_eq!(hops.numel(), 0);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let g = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        let x = Tensor::new(&[1.0, f32::NAN], &[2, 1]);
        let err = hop_features(&x, &build(&g), 1).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_row_mismatch_rejected() {
        let g = CircuitGraph::new(3, vec![[0, 1]], false).expect("valid");
        let x = Tensor::zeros(&[2, 1]);
        assert!(hop_features(&x, &build(&g), 1).is_err());
    }

    #[test]
    fn test_k_zero_single_hop() {
        let g = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        let x = Tensor::new(&[1.0, 2.0], &[2, 1]);
        let hops = hop_features(&x, &build(&g), 0).expect("hops");
        assert_eq!(hops.shape(), &[2, 1, 1]);
        assert_eq!(hops.data(), x.data());
    }
}
