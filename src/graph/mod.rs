//! Circuit graph representation and batching.
//!
//! A [`CircuitGraph`] is a validated directed edge list over `0..N` node
//! ids. Preprocessing turns it into a [`ProcessedGraph`] carrying the
//! hop-indexed feature tensor; several processed graphs stack into a
//! [`GraphBatch`] with a node→graph assignment for pooled training.

mod csr;
mod hops;
mod norm;

pub use csr::CsrMatrix;
pub use hops::hop_features;
pub use norm::PropagationOperator;

use crate::autograd::Tensor;
use crate::error::{Result, TasarError};

/// A directed graph of logic nodes.
///
/// Nodes are `0..num_nodes`; edges are (source, target) pairs. The
/// `directed` flag selects the normalization mode: undirected graphs get
/// one symmetric operator, directed graphs a forward/reverse pair.
///
/// # Example
///
/// ```
/// use tasar::graph::CircuitGraph;
///
/// let g = CircuitGraph::new(3, vec![[0, 1], [1, 2]], false).unwrap();
/// assert_eq!(g.num_nodes(), 3);
/// assert_eq!(g.num_edges(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CircuitGraph {
    num_nodes: usize,
    edges: Vec<[usize; 2]>,
    directed: bool,
}

impl CircuitGraph {
    /// Create a graph, validating that all edges reference existing nodes.
    ///
    /// # Errors
    ///
    /// Returns [`TasarError::MalformedGraph`] if an edge references a node
    /// id outside `0..num_nodes`.
    pub fn new(num_nodes: usize, edges: Vec<[usize; 2]>, directed: bool) -> Result<Self> {
        for &[src, dst] in &edges {
            if src >= num_nodes || dst >= num_nodes {
                return Err(TasarError::edge_out_of_range(src, dst, num_nodes));
            }
        }
        Ok(Self {
            num_nodes,
            edges,
            directed,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of edges.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Edge list as (source, target) pairs.
    #[must_use]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Whether the graph is treated as directed.
    #[must_use]
    pub fn directed(&self) -> bool {
        self.directed
    }

    /// Out-degree of each node over the raw (unsymmetrized) edges.
    #[must_use]
    pub fn out_degrees(&self) -> Vec<f32> {
        let mut degrees = vec![0.0f32; self.num_nodes];
        for &[src, _] in &self.edges {
            degrees[src] += 1.0;
        }
        degrees
    }
}

/// A graph whose hop features have been built and cached.
///
/// Construction runs once per distinct graph; the hop tensor is reused
/// unchanged across training epochs.
#[derive(Debug, Clone)]
pub struct ProcessedGraph {
    /// Hop-indexed features, shape `[num_nodes, seq_len, features]`
    hops: Tensor,
    /// Regression target (delay or area)
    target: f32,
}

impl ProcessedGraph {
    /// Build the hop tensor for a graph and attach its target value.
    ///
    /// `features` must be `[num_nodes, feature_dim]`.
    ///
    /// # Errors
    ///
    /// Propagates normalization and propagation failures; rejects graphs
    /// with zero nodes (they cannot contribute to pooled training).
    pub fn new(
        graph: &CircuitGraph,
        features: &Tensor,
        num_hops: usize,
        target: f32,
    ) -> Result<Self> {
        if graph.num_nodes() == 0 {
            return Err(TasarError::MalformedGraph {
                detail: "graph with zero nodes cannot be processed for training".to_string(),
            });
        }
        let operator = PropagationOperator::build(graph);
        let hops = hop_features(features, &operator, num_hops)?;
        Ok(Self { hops, target })
    }

    /// Hop tensor, shape `[num_nodes, seq_len, features]`.
    #[must_use]
    pub fn hops(&self) -> &Tensor {
        &self.hops
    }

    /// Number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.hops.shape()[0]
    }

    /// Hop-sequence length (K+1 undirected, 2K+1 directed).
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.hops.shape()[1]
    }

    /// Regression target.
    #[must_use]
    pub fn target(&self) -> f32 {
        self.target
    }
}

/// Several processed graphs stacked for one forward pass.
///
/// Node features of all member graphs are concatenated along the node
/// axis; `assignment[i]` maps node `i` to its graph index for pooling.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    /// Stacked hop tensors, `[total_nodes, seq_len, features]`
    hops: Tensor,
    /// Node → graph index
    assignment: Vec<usize>,
    /// Number of graphs in the batch
    num_graphs: usize,
    /// Per-graph regression targets, `[num_graphs, 1]`
    targets: Tensor,
}

impl GraphBatch {
    /// Stack processed graphs into one batch.
    ///
    /// # Errors
    ///
    /// Fails if the batch is empty or member graphs disagree on hop
    /// sequence length or feature width.
    pub fn from_graphs(graphs: &[&ProcessedGraph]) -> Result<Self> {
        let first = graphs.first().ok_or_else(|| {
            TasarError::Other("cannot build a batch from zero graphs".to_string())
        })?;
        let seq_len = first.seq_len();
        let features = first.hops().shape()[2];

        let mut data = Vec::new();
        let mut assignment = Vec::new();
        let mut targets = Vec::with_capacity(graphs.len());

        for (gi, g) in graphs.iter().enumerate() {
            if g.seq_len() != seq_len {
                return Err(TasarError::dimension_mismatch(
                    "hop sequence length",
                    seq_len,
                    g.seq_len(),
                ));
            }
            if g.hops().shape()[2] != features {
                return Err(TasarError::dimension_mismatch(
                    "feature width",
                    features,
                    g.hops().shape()[2],
                ));
            }
            data.extend_from_slice(g.hops().data());
            assignment.extend(std::iter::repeat(gi).take(g.num_nodes()));
            targets.push(g.target());
        }

        let total_nodes = assignment.len();
        Ok(Self {
            hops: Tensor::new(&data, &[total_nodes, seq_len, features]),
            assignment,
            num_graphs: graphs.len(),
            targets: Tensor::new(&targets, &[graphs.len(), 1]),
        })
    }

    /// Stacked hop tensor.
    #[must_use]
    pub fn hops(&self) -> &Tensor {
        &self.hops
    }

    /// Node → graph assignment.
    #[must_use]
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Number of graphs.
    #[must_use]
    pub fn num_graphs(&self) -> usize {
        self.num_graphs
    }

    /// Total node count across all member graphs.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.assignment.len()
    }

    /// Per-graph targets, shape `[num_graphs, 1]`.
    #[must_use]
    pub fn targets(&self) -> &Tensor {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> CircuitGraph {
        CircuitGraph::new(3, vec![[0, 1], [1, 2]], false).expect("valid graph")
    }

    #[test]
    fn test_graph_construction() {
        let g = line_graph();
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.num_edges(), 2);
        assert!(!g.directed());
    }

    #[test]
    fn test_graph_rejects_out_of_range_edge() {
        let err = CircuitGraph::new(2, vec![[0, 5]], true).unwrap_err();
        assert!(err.to_string().contains("malformed graph"));
    }

    #[test]
    fn test_out_degrees() {
        let g = CircuitGraph::new(3, vec![[0, 1], [0, 2], [1, 2]], true).expect("valid");
        assert_eq!(g.out_degrees(), vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_processed_graph_shapes() {
        let g = line_graph();
        let x = Tensor::new(&[1.0, 2.0, 3.0], &[3, 1]);
        let p = ProcessedGraph::new(&g, &x, 2, 0.5).expect("processed");
        assert_eq!(p.hops().shape(), &[3, 3, 1]);
        assert_eq!(p.num_nodes(), 3);
        assert_eq!(p.seq_len(), 3);
        assert!((p.target() - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_processed_graph_rejects_empty() {
        let g = CircuitGraph::new(0, vec![], false).expect("empty graph is valid");
        let x = Tensor::zeros(&[0, 1]);
        assert!(ProcessedGraph::new(&g, &x, 2, 0.0).is_err());
    }

    #[test]
    fn test_batch_stacks_graphs() {
        let g = line_graph();
        let x = Tensor::new(&[1.0, 2.0, 3.0], &[3, 1]);
        let p1 = ProcessedGraph::new(&g, &x, 1, 0.1).expect("p1");
        let g2 = CircuitGraph::new(2, vec![[0, 1]], false).expect("g2");
        let x2 = Tensor::new(&[4.0, 5.0], &[2, 1]);
        let p2 = ProcessedGraph::new(&g2, &x2, 1, 0.2).expect("p2");

        let batch = GraphBatch::from_graphs(&[&p1, &p2]).expect("batch");
        assert_eq!(batch.num_graphs(), 2);
        assert_eq!(batch.total_nodes(), 5);
        assert_eq!(batch.assignment(), &[0, 0, 0, 1, 1]);
        assert_eq!(batch.hops().shape(), &[5, 2, 1]);
        assert_eq!(batch.targets().shape(), &[2, 1]);
    }

    #[test]
    fn test_batch_rejects_mismatched_hops() {
        let g = line_graph();
        let x = Tensor::new(&[1.0, 2.0, 3.0], &[3, 1]);
        let p1 = ProcessedGraph::new(&g, &x, 1, 0.1).expect("p1");
        let p2 = ProcessedGraph::new(&g, &x, 2, 0.2).expect("p2");
        assert!(GraphBatch::from_graphs(&[&p1, &p2]).is_err());
    }

    #[test]
    fn test_batch_rejects_empty_list() {
        assert!(GraphBatch::from_graphs(&[]).is_err());
    }
}
