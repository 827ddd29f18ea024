//! Normalized propagation operators.
//!
//! Turns a raw edge list into the sparse operator(s) used for linear
//! feature diffusion:
//!
//! - undirected: one symmetric operator `D^-1/2 · A · D^-1/2` over the
//!   symmetrized adjacency;
//! - directed: a pair of own-degree-normalized operators `D^-1 · A` over
//!   the raw adjacency and its transpose.
//!
//! The two modes deliberately normalize differently. Gate fan-in and
//! fan-out carry distinct meaning in a circuit, so the directed branch
//! must not fold both directions into one symmetric kernel.
//!
//! Zero-degree nodes get a normalization factor of exactly 0 (never
//! NaN/Inf). No self-loops are added.

use super::csr::CsrMatrix;
use super::CircuitGraph;

/// Propagation operator(s) for one graph.
///
/// Immutable once built; owned by the graph it was built for and reused
/// for every hop-propagation step on that graph.
#[derive(Debug, Clone)]
pub enum PropagationOperator {
    /// Single symmetric operator for undirected diffusion.
    Undirected(CsrMatrix),
    /// Forward (out-edge) and reverse (in-edge) operators.
    Directed {
        /// `D_out^-1 · A`
        forward: CsrMatrix,
        /// `D_in^-1 · A^T`
        reverse: CsrMatrix,
    },
}

impl PropagationOperator {
    /// Build the operator(s) for a graph according to its `directed` flag.
    ///
    /// An empty graph (N = 0) yields empty operators and downstream
    /// propagation is a no-op.
    #[must_use]
    pub fn build(graph: &CircuitGraph) -> Self {
        if graph.directed() {
            let forward: Vec<[usize; 2]> = graph.edges().to_vec();
            let reverse: Vec<[usize; 2]> =
                graph.edges().iter().map(|&[s, t]| [t, s]).collect();
            Self::Directed {
                forward: degree_normalized(graph.num_nodes(), &forward),
                reverse: degree_normalized(graph.num_nodes(), &reverse),
            }
        } else {
            Self::Undirected(symmetric_normalized(graph.num_nodes(), graph.edges()))
        }
    }

    /// Hop-sequence length produced with `num_hops` diffusion steps.
    #[must_use]
    pub fn seq_len(&self, num_hops: usize) -> usize {
        match self {
            Self::Undirected(_) => num_hops + 1,
            Self::Directed { .. } => 2 * num_hops + 1,
        }
    }
}

/// Deduplicated, symmetrized edge set of a graph.
fn symmetrize(edges: &[[usize; 2]]) -> Vec<[usize; 2]> {
    let mut sym: Vec<[usize; 2]> = Vec::with_capacity(edges.len() * 2);
    for &[s, t] in edges {
        sym.push([s, t]);
        sym.push([t, s]);
    }
    sym.sort_unstable();
    sym.dedup();
    sym
}

/// Inverse with non-finite results clamped to zero.
///
/// Isolated nodes have degree 0; 0^-1 and 0^-1/2 must contribute nothing
/// rather than poison the operator with infinities.
fn clamped(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Symmetric normalization `D^-1/2 · A · D^-1/2` over the symmetrized
/// adjacency.
fn symmetric_normalized(num_nodes: usize, edges: &[[usize; 2]]) -> CsrMatrix {
    let sym = symmetrize(edges);

    let mut degree = vec![0.0f32; num_nodes];
    for &[s, _] in &sym {
        degree[s] += 1.0;
    }
    let d_inv_sqrt: Vec<f32> = degree.iter().map(|&d| clamped(d.powf(-0.5))).collect();

    let triplets: Vec<(usize, usize, f32)> = sym
        .iter()
        .map(|&[s, t]| (s, t, d_inv_sqrt[s] * d_inv_sqrt[t]))
        .collect();
    CsrMatrix::from_triplets(num_nodes, &triplets)
}

/// Own-degree normalization `D^-1 · A` over the given edge set.
fn degree_normalized(num_nodes: usize, edges: &[[usize; 2]]) -> CsrMatrix {
    let mut dedup: Vec<[usize; 2]> = edges.to_vec();
    dedup.sort_unstable();
    dedup.dedup();

    let mut degree = vec![0.0f32; num_nodes];
    for &[s, _] in &dedup {
        degree[s] += 1.0;
    }
    let d_inv: Vec<f32> = degree.iter().map(|&d| clamped(d.powi(-1))).collect();

    let triplets: Vec<(usize, usize, f32)> = dedup
        .iter()
        .map(|&[s, t]| (s, t, d_inv[s]))
        .collect();
    CsrMatrix::from_triplets(num_nodes, &triplets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_node_symmetric_operator() {
        // Single edge (0 -> 1), undirected: both degrees are 1 after
        // symmetrization, so both off-diagonals are exactly 1.
        let g = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        let op = PropagationOperator::build(&g);
        let PropagationOperator::Undirected(m) = op else {
            panic!("expected undirected operator");
        };
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(1, 0), 1.0);
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn test_undirected_operator_is_symmetric() {
        let g = CircuitGraph::new(
            5,
            vec![[0, 1], [1, 2], [2, 3], [3, 4], [0, 4], [1, 4]],
            false,
        )
        .expect("valid");
        let PropagationOperator::Undirected(m) = PropagationOperator::build(&g) else {
            panic!("expected undirected operator");
        };
        assert!(m.is_symmetric(1e-6));
    }

    #[test]
    fn test_symmetric_values_match_degrees() {
        // Path 0 - 1 - 2: deg = [1, 2, 1].
        // Entry (0, 1) = 1/sqrt(1 * 2) = 1/sqrt(2).
        let g = CircuitGraph::new(3, vec![[0, 1], [1, 2]], false).expect("valid");
        let PropagationOperator::Undirected(m) = PropagationOperator::build(&g) else {
            panic!("expected undirected operator");
        };
        let expected = 1.0 / 2.0f32.sqrt();
        assert!((m.get(0, 1) - expected).abs() < 1e-6);
        assert!((m.get(1, 0) - expected).abs() < 1e-6);
        assert!((m.get(1, 2) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let g1 = CircuitGraph::new(2, vec![[0, 1], [0, 1]], false).expect("valid");
        let g2 = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        let PropagationOperator::Undirected(m1) = PropagationOperator::build(&g1) else {
            panic!();
        };
        let PropagationOperator::Undirected(m2) = PropagationOperator::build(&g2) else {
            panic!();
        };
        assert_eq!(m1, m2);
    }

    #[test]
    fn test_isolated_node_rows_are_zero() {
        // Node 2 has no edges; its row and column stay empty, not NaN.
        let g = CircuitGraph::new(3, vec![[0, 1]], false).expect("valid");
        let PropagationOperator::Undirected(m) = PropagationOperator::build(&g) else {
            panic!();
        };
        for c in 0..3 {
            assert_eq!(m.get(2, c), 0.0);
            assert_eq!(m.get(c, 2), 0.0);
        }
    }

    #[test]
    fn test_directed_operators() {
        // Fan-out: 0 -> 1, 0 -> 2. Forward rows are out-degree-normalized.
        let g = CircuitGraph::new(3, vec![[0, 1], [0, 2]], true).expect("valid");
        let PropagationOperator::Directed { forward, reverse } = PropagationOperator::build(&g)
        else {
            panic!("expected directed operators");
        };
        assert!((forward.get(0, 1) - 0.5).abs() < 1e-6);
        assert!((forward.get(0, 2) - 0.5).abs() < 1e-6);
        // Reverse: edges 1 -> 0 and 2 -> 0, each from a degree-1 node.
        assert_eq!(reverse.get(1, 0), 1.0);
        assert_eq!(reverse.get(2, 0), 1.0);
        assert_eq!(reverse.get(0, 1), 0.0);
    }

    #[test]
    fn test_directed_not_symmetric_sandwich() {
        // A chain 0 -> 1 -> 2. The forward operator row for node 0 depends
        // only on node 0's own out-degree, not on node 1's.
        let g = CircuitGraph::new(3, vec![[0, 1], [1, 2]], true).expect("valid");
        let PropagationOperator::Directed { forward, .. } = PropagationOperator::build(&g)
        else {
            panic!();
        };
        assert_eq!(forward.get(0, 1), 1.0);
        assert_eq!(forward.get(1, 2), 1.0);
    }

    #[test]
    fn test_empty_graph_empty_operator() {
        let g = CircuitGraph::new(0, vec![], false).expect("valid");
        let PropagationOperator::Undirected(m) = PropagationOperator::build(&g) else {
            panic!();
        };
        assert_eq!(m.n(), 0);
        assert_eq!(m.nnz(), 0);
    }

    #[test]
    fn test_seq_len() {
        let g = CircuitGraph::new(2, vec![[0, 1]], false).expect("valid");
        assert_eq!(PropagationOperator::build(&g).seq_len(3), 4);
        let g = CircuitGraph::new(2, vec![[0, 1]], true).expect("valid");
        assert_eq!(PropagationOperator::build(&g).seq_len(3), 7);
    }
}
