//! Hop mixing blocks and the hop encoder.
//!
//! The encoder projects the raw hop tensor into the embedding width,
//! pushes it through a stack of gated attention blocks that mix
//! information across hops, then collapses the hop sequence into one
//! embedding per node with learned hop-importance pooling.
//!
//! The pooling keeps the node's own (hop-0) vector at coefficient 1 and
//! adds a softmax-weighted sum of the neighbor hops: for circuit timing
//! and area, a node's own logic function dominates while neighborhood
//! context is an additive correction whose per-hop importance is learned.

use super::attention::HopAttention;
use crate::autograd::Tensor;
use crate::nn::{Dropout, LayerNorm, Linear, Module};

/// One gated hop-mixing block.
///
/// ```text
/// y = dropout(relu(LayerNorm(gate(x) * attention(x, x, x))))
/// ```
///
/// The gate is a learned linear map of the block input, applied
/// element-wise to the attention output.
pub struct HopMixingBlock {
    attention: HopAttention,
    gate: Linear,
    norm: LayerNorm,
    dropout: Dropout,
    training: bool,
}

impl HopMixingBlock {
    /// Create a block at the given embedding width.
    #[must_use]
    pub fn new(
        embed_dim: usize,
        num_heads: usize,
        dropout: f32,
        attn_dropout: f32,
        seed: Option<u64>,
    ) -> Self {
        let sub_seed = |offset: u64| seed.map(|s| s.wrapping_add(offset));
        Self {
            attention: HopAttention::new(embed_dim, num_heads, attn_dropout, sub_seed(10)),
            gate: Linear::with_seed(embed_dim, embed_dim, sub_seed(20)),
            norm: LayerNorm::new(embed_dim),
            dropout: match seed {
                Some(s) => Dropout::with_seed(dropout, s.wrapping_add(30)),
                None => Dropout::new(dropout),
            },
            training: true,
        }
    }
}

impl Module for HopMixingBlock {
    fn forward(&self, input: &Tensor) -> Tensor {
        let (attn_out, _) = self.attention.forward_self(input);
        let gated = self.gate.forward(input).mul(&attn_out);
        let normed = self.norm.forward(&gated);
        self.dropout.forward(&normed.relu())
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.attention.parameters();
        params.extend(self.gate.parameters());
        params.extend(self.norm.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.attention.parameters_mut();
        params.extend(self.gate.parameters_mut());
        params.extend(self.norm.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.training = true;
        self.attention.train();
        self.dropout.train();
    }

    fn eval(&mut self) {
        self.training = false;
        self.attention.eval();
        self.dropout.eval();
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for HopMixingBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HopMixingBlock")
            .field("attention", &self.attention)
            .finish_non_exhaustive()
    }
}

/// Input projection, mixing stack and hop-importance pooling.
///
/// Maps `[nodes, hops, in_features]` to one embedding per node,
/// `[nodes, embed_dim]`, plus the neighbor-hop weights used by pooling.
pub struct HopEncoder {
    input_proj: Linear,
    blocks: Vec<HopMixingBlock>,
    /// Scores a (self ‖ neighbor-hop) pair with a single scalar.
    hop_scorer: Linear,
    embed_dim: usize,
    training: bool,
}

impl HopEncoder {
    /// Create an encoder with `num_layers` mixing blocks.
    #[must_use]
    pub fn new(
        in_features: usize,
        embed_dim: usize,
        num_heads: usize,
        num_layers: usize,
        dropout: f32,
        attn_dropout: f32,
        seed: Option<u64>,
    ) -> Self {
        let sub_seed = |offset: u64| seed.map(|s| s.wrapping_add(offset));
        let blocks = (0..num_layers)
            .map(|i| {
                HopMixingBlock::new(
                    embed_dim,
                    num_heads,
                    dropout,
                    attn_dropout,
                    sub_seed(100 * (i as u64 + 1)),
                )
            })
            .collect();

        Self {
            input_proj: Linear::with_seed(in_features, embed_dim, sub_seed(1)),
            blocks,
            hop_scorer: Linear::with_seed(2 * embed_dim, 1, sub_seed(2)),
            embed_dim,
            training: true,
        }
    }

    /// Embedding width.
    #[must_use]
    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    /// Encode a hop tensor into per-node embeddings.
    ///
    /// Returns `(embeddings, hop_weights)`:
    /// - `embeddings`: `[nodes, embed_dim]`
    /// - `hop_weights`: `[nodes, hops - 1]`, detached; softmax-normalized
    ///   neighbor-hop importance (rows sum to 1).
    #[must_use]
    pub fn encode(&self, hops: &Tensor) -> (Tensor, Tensor) {
        assert_eq!(hops.ndim(), 3, "HopEncoder expects [nodes, hops, features]");
        let (nodes, seq) = (hops.shape()[0], hops.shape()[1]);

        let mut x = self.input_proj.forward(hops);
        for block in &self.blocks {
            x = block.forward(&x);
        }

        // Hop pooling: self vector at coefficient 1, neighbor hops
        // softmax-weighted. The same path handles seq == 1: the neighbor
        // set is empty and the weighted sum contributes nothing.
        let neighbors = seq - 1;
        let self_track = x.narrow1(0, 1);
        let neighbor_track = x.narrow1(1, neighbors);

        let broadcast_self = self_track.repeat1(neighbors);
        let scores = self
            .hop_scorer
            .forward(&broadcast_self.concat_last(&neighbor_track));
        let weights = scores
            .view(&[nodes, neighbors])
            .softmax_last()
            .view(&[nodes, neighbors, 1]);

        let weighted = neighbor_track.mul(&weights.expand_last(self.embed_dim));
        let pooled = self_track
            .view(&[nodes, self.embed_dim])
            .add(&weighted.sum1());

        (pooled, weights.view(&[nodes, neighbors]).detach())
    }
}

impl Module for HopEncoder {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.encode(input).0
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.input_proj.parameters();
        for block in &self.blocks {
            params.extend(block.parameters());
        }
        params.extend(self.hop_scorer.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.input_proj.parameters_mut();
        for block in &mut self.blocks {
            params.extend(block.parameters_mut());
        }
        params.extend(self.hop_scorer.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.training = true;
        for block in &mut self.blocks {
            block.train();
        }
    }

    fn eval(&mut self) {
        self.training = false;
        for block in &mut self.blocks {
            block.eval();
        }
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for HopEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HopEncoder")
            .field("embed_dim", &self.embed_dim)
            .field("num_blocks", &self.blocks.len())
            .finish_non_exhaustive()
    }
}
