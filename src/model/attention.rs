//! Multi-head self-attention over the hop axis.
//!
//! The hop sequence plays the role the token sequence plays in a
//! transformer: attention mixes information between a node's hop-0
//! feature and its increasingly diffused neighborhood summaries, with the
//! node axis as the batch axis. All nodes and graphs share one set of
//! projection weights.
//!
//! # References
//!
//! - Vaswani, A., et al. (2017). Attention is all you need. `NeurIPS`.
//! - Deng, C., et al. (2024). Less is More: Hop-Wise Graph Attention for
//!   Scalable and Generalizable Learning on Circuits. DAC.

use crate::autograd::Tensor;
use crate::nn::{Dropout, Linear, Module};

/// Multi-head scaled dot-product self-attention across hops.
///
/// Input and output are `[nodes, hops, embed]`. Queries, keys and values
/// are projections of the same hop sequence; scores are scaled by
/// `1/sqrt(head_dim)`; the scaling is part of the numerical contract,
/// not a tunable.
pub struct HopAttention {
    embed_dim: usize,
    num_heads: usize,
    head_dim: usize,

    /// Query projection
    q_proj: Linear,
    /// Key projection
    k_proj: Linear,
    /// Value projection
    v_proj: Linear,
    /// Output projection
    out_proj: Linear,

    /// Dropout on attention probabilities
    attn_dropout: Dropout,

    training: bool,
}

impl HopAttention {
    /// Create a new hop-attention layer.
    ///
    /// # Panics
    ///
    /// Panics if `embed_dim` is not divisible by `num_heads`. Model
    /// construction validates this earlier and reports it as a
    /// configuration error.
    #[must_use]
    pub fn new(embed_dim: usize, num_heads: usize, attn_dropout: f32, seed: Option<u64>) -> Self {
        assert!(
            embed_dim % num_heads == 0,
            "embed_dim ({embed_dim}) must be divisible by num_heads ({num_heads})"
        );

        let sub_seed = |offset: u64| seed.map(|s| s.wrapping_add(offset));

        Self {
            embed_dim,
            num_heads,
            head_dim: embed_dim / num_heads,
            q_proj: Linear::with_seed(embed_dim, embed_dim, sub_seed(1)),
            k_proj: Linear::with_seed(embed_dim, embed_dim, sub_seed(2)),
            v_proj: Linear::with_seed(embed_dim, embed_dim, sub_seed(3)),
            out_proj: Linear::with_seed(embed_dim, embed_dim, sub_seed(4)),
            attn_dropout: match seed {
                Some(s) => Dropout::with_seed(attn_dropout, s.wrapping_add(5)),
                None => Dropout::new(attn_dropout),
            },
            training: true,
        }
    }

    /// Embedding width.
    #[must_use]
    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    /// Number of attention heads.
    #[must_use]
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Self-attention over the hop axis.
    ///
    /// Returns `(output, attention_probs)` where the probabilities have
    /// shape `[nodes * heads, hops, hops]` and each row sums to 1.
    #[must_use]
    pub fn forward_self(&self, x: &Tensor) -> (Tensor, Tensor) {
        assert_eq!(x.ndim(), 3, "HopAttention expects [nodes, hops, embed]");

        let q = self.q_proj.forward(x).split_heads(self.num_heads);
        let k = self.k_proj.forward(x).split_heads(self.num_heads);
        let v = self.v_proj.forward(x).split_heads(self.num_heads);

        // softmax(Q K^T / sqrt(d_head)) V, batched per (node, head)
        let scale = 1.0 / (self.head_dim as f32).sqrt();
        let scores = q.bmm(&k.transpose_last()).scale(scale);
        let probs = scores.softmax_last();
        let probs_dropped = self.attn_dropout.forward(&probs);

        let context = probs_dropped.bmm(&v).merge_heads(self.num_heads);
        let output = self.out_proj.forward(&context);

        (output, probs)
    }
}

impl Module for HopAttention {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.forward_self(input).0
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.q_proj.parameters();
        params.extend(self.k_proj.parameters());
        params.extend(self.v_proj.parameters());
        params.extend(self.out_proj.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.q_proj.parameters_mut();
        params.extend(self.k_proj.parameters_mut());
        params.extend(self.v_proj.parameters_mut());
        params.extend(self.out_proj.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.training = true;
        self.attn_dropout.train();
    }

    fn eval(&mut self) {
        self.training = false;
        self.attn_dropout.eval();
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for HopAttention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HopAttention")
            .field("embed_dim", &self.embed_dim)
            .field("num_heads", &self.num_heads)
            .field("head_dim", &self.head_dim)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attention_preserves_shape() {
        let mut attn = HopAttention::new(8, 2, 0.0, Some(3));
        attn.eval();
        let x = Tensor::ones(&[5, 4, 8]);
        let (y, probs) = attn.forward_self(&x);
        assert_eq!(y.shape(), &[5, 4, 8]);
        assert_eq!(probs.shape(), &[10, 4, 4]);
    }

    #[test]
    fn test_attention_probs_rows_sum_to_one() {
        let mut attn = HopAttention::new(4, 2, 0.0, Some(9));
        attn.eval();
        let x = Tensor::new(
            &(0..24).map(|i| (i as f32) * 0.1).collect::<Vec<_>>(),
            &[2, 3, 4],
        );
        let (_, probs) = attn.forward_self(&x);
        let hops = 3;
        for row in 0..probs.numel() / hops {
            let sum: f32 = probs.data()[row * hops..(row + 1) * hops].iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row {row} sums to {sum}");
        }
    }

    #[test]
    fn test_single_hop_same_code_path() {
        // K = 0 gives a hop sequence of length 1; attention over a single
        // position degenerates to a linear self-transform without any
        // special-casing.
        let mut attn = HopAttention::new(4, 2, 0.0, Some(11));
        attn.eval();
        let x = Tensor::ones(&[3, 1, 4]);
        let (y, probs) = attn.forward_self(&x);
        assert_eq!(y.shape(), &[3, 1, 4]);
        assert!(probs.data().iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_attention_deterministic_in_eval() {
        let mut attn = HopAttention::new(8, 4, 0.5, Some(21));
        attn.eval();
        let x = Tensor::new(
            &(0..32).map(|i| (i as f32) * 0.25 - 4.0).collect::<Vec<_>>(),
            &[2, 2, 8],
        );
        let (y1, _) = attn.forward_self(&x);
        let (y2, _) = attn.forward_self(&x);
        assert_eq!(y1.data(), y2.data());
    }

    #[test]
    fn test_attention_parameter_count() {
        let attn = HopAttention::new(8, 2, 0.0, Some(1));
        // Four projections of 8x8 weight + 8 bias each.
        assert_eq!(attn.num_parameters(), 4 * (64 + 8));
    }

    #[test]
    #[should_panic(expected = "must be divisible")]
    fn test_attention_rejects_indivisible_heads() {
        let _ = HopAttention::new(6, 4, 0.0, None);
    }
}
