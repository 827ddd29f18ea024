//! Graph pooling and the regression head.
//!
//! Node embeddings are aggregated per graph by concatenated mean and max
//! pooling, then mapped through fully-connected layers to one scalar per
//! graph.

use std::sync::Arc;

use crate::autograd::grad_fn::{SegmentMaxBackward, SegmentMeanBackward};
use crate::autograd::{track, Tensor};
use crate::nn::{Linear, Module};

/// Per-graph mean pooling of node embeddings.
///
/// `x` is `[nodes, features]`; `assignment[i]` is the graph index of node
/// `i`. Every graph must own at least one node (batch construction
/// rejects empty graphs).
#[must_use]
pub fn segment_mean(x: &Tensor, assignment: &[usize], num_graphs: usize) -> Tensor {
    assert_eq!(x.ndim(), 2, "segment_mean() expects [nodes, features]");
    assert_eq!(
        x.shape()[0],
        assignment.len(),
        "segment_mean() needs one assignment per node"
    );
    let d = x.shape()[1];
    let xd = x.data();

    let mut counts = vec![0.0f32; num_graphs];
    let mut sums = vec![0.0f32; num_graphs * d];
    for (i, &g) in assignment.iter().enumerate() {
        counts[g] += 1.0;
        for f in 0..d {
            sums[g * d + f] += xd[i * d + f];
        }
    }
    for g in 0..num_graphs {
        assert!(counts[g] > 0.0, "graph {g} has no nodes");
        for f in 0..d {
            sums[g * d + f] /= counts[g];
        }
    }

    let mut result = Tensor::new(&sums, &[num_graphs, d]);
    track(
        &mut result,
        Arc::new(SegmentMeanBackward {
            assignment: assignment.to_vec(),
            counts,
            features: d,
        }),
        &[x],
    );
    result
}

/// Per-graph max pooling of node embeddings.
///
/// The backward pass routes each gradient entry to the node that
/// produced the maximum for that (graph, feature) slot.
#[must_use]
pub fn segment_max(x: &Tensor, assignment: &[usize], num_graphs: usize) -> Tensor {
    assert_eq!(x.ndim(), 2, "segment_max() expects [nodes, features]");
    assert_eq!(
        x.shape()[0],
        assignment.len(),
        "segment_max() needs one assignment per node"
    );
    let d = x.shape()[1];
    let xd = x.data();

    let mut maxima = vec![f32::NEG_INFINITY; num_graphs * d];
    let mut argmax = vec![usize::MAX; num_graphs * d];
    for (i, &g) in assignment.iter().enumerate() {
        for f in 0..d {
            let v = xd[i * d + f];
            if v > maxima[g * d + f] {
                maxima[g * d + f] = v;
                argmax[g * d + f] = i;
            }
        }
    }
    assert!(
        argmax.iter().all(|&n| n != usize::MAX),
        "every graph must own at least one node"
    );

    let mut result = Tensor::new(&maxima, &[num_graphs, d]);
    track(
        &mut result,
        Arc::new(SegmentMaxBackward {
            argmax,
            num_nodes: assignment.len(),
            features: d,
        }),
        &[x],
    );
    result
}

/// Fully-connected regression head over pooled graph embeddings.
///
/// Input is the `[graphs, 2 * embed]` mean‖max concatenation; layers
/// apply ReLU between them and the final layer emits one scalar.
pub struct RegressionHead {
    layers: Vec<Linear>,
}

impl RegressionHead {
    /// Create a head with `num_layers` linear layers.
    ///
    /// `num_layers` counts the input layer and the final scalar layer;
    /// values below 2 are clamped to 2.
    #[must_use]
    pub fn new(in_features: usize, hidden: usize, num_layers: usize, seed: Option<u64>) -> Self {
        let num_layers = num_layers.max(2);
        let sub_seed = |offset: u64| seed.map(|s| s.wrapping_add(offset));

        let mut layers = Vec::with_capacity(num_layers);
        layers.push(Linear::with_seed(in_features, hidden, sub_seed(1)));
        for i in 1..num_layers - 1 {
            layers.push(Linear::with_seed(hidden, hidden, sub_seed(1 + i as u64)));
        }
        layers.push(Linear::with_seed(hidden, 1, sub_seed(num_layers as u64)));

        Self { layers }
    }

    /// Number of linear layers.
    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Module for RegressionHead {
    fn forward(&self, input: &Tensor) -> Tensor {
        let last = self.layers.len() - 1;
        let mut x = input.clone();
        for layer in &self.layers[..last] {
            x = layer.forward(&x).relu();
        }
        self.layers[last].forward(&x)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(Module::parameters).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers
            .iter_mut()
            .flat_map(Module::parameters_mut)
            .collect()
    }
}

impl std::fmt::Debug for RegressionHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegressionHead")
            .field("num_layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}
