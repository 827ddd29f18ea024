//! The hop-attention QoR prediction model.
//!
//! [`QorPredictor`] wires the pieces together: hop encoder (input
//! projection, mixing stack, hop pooling), graph pooling and the
//! regression head. One forward pass maps a [`GraphBatch`] to one scalar
//! prediction per graph.
//!
//! # Example
//!
//! ```
//! use tasar::autograd::Tensor;
//! use tasar::graph::{CircuitGraph, GraphBatch, ProcessedGraph};
//! use tasar::model::{PredictorConfig, QorPredictor};
//! use tasar::nn::Module;
//!
//! let config = PredictorConfig {
//!     in_features: 2,
//!     embed_dim: 8,
//!     num_heads: 2,
//!     num_layers: 1,
//!     num_hops: 2,
//!     directed: false,
//!     seed: Some(42),
//!     ..PredictorConfig::default()
//! };
//! let mut model = QorPredictor::new(&config).unwrap();
//! model.eval();
//!
//! let graph = CircuitGraph::new(3, vec![[0, 1], [1, 2]], false).unwrap();
//! let x = Tensor::new(&[1.0, 0.0, 0.5, 0.5, 0.0, 1.0], &[3, 2]);
//! let processed = ProcessedGraph::new(&graph, &x, 2, 0.7).unwrap();
//! let batch = GraphBatch::from_graphs(&[&processed]).unwrap();
//!
//! let pred = model.forward(&batch);
//! assert_eq!(pred.shape(), &[1, 1]);
//! ```

mod attention;
mod block;
mod readout;

pub use attention::HopAttention;
pub use block::{HopEncoder, HopMixingBlock};
pub use readout::{segment_max, segment_mean, RegressionHead};

use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;
use crate::error::{Result, TasarError};
use crate::graph::GraphBatch;
use crate::nn::Module;

/// Hyperparameters for [`QorPredictor`], supplied before construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Raw per-node feature width (D0)
    pub in_features: usize,
    /// Embedding width inside the mixing stack
    pub embed_dim: usize,
    /// Attention heads per block
    pub num_heads: usize,
    /// Number of mixing blocks
    pub num_layers: usize,
    /// Diffusion steps (K); hop sequence is K+1 long, 2K+1 when directed
    pub num_hops: usize,
    /// Whether graphs are treated as directed
    pub directed: bool,
    /// Feature dropout after each block
    pub dropout: f32,
    /// Dropout on attention probabilities
    pub attn_dropout: f32,
    /// Hidden width of the regression head
    pub fc_hidden: usize,
    /// Linear layers in the regression head (including the final scalar)
    pub num_fc_layers: usize,
    /// Seed for weight initialization and dropout masks
    pub seed: Option<u64>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            in_features: 1,
            embed_dim: 128,
            num_heads: 8,
            num_layers: 1,
            num_hops: 5,
            directed: false,
            dropout: 0.5,
            attn_dropout: 0.0,
            fc_hidden: 256,
            num_fc_layers: 2,
            seed: None,
        }
    }
}

impl PredictorConfig {
    /// Validate hyperparameter constraints.
    ///
    /// # Errors
    ///
    /// Returns [`TasarError::InvalidHyperparameter`] for the first
    /// violated constraint.
    pub fn validate(&self) -> Result<()> {
        fn fail(param: &str, value: String, constraint: &str) -> Result<()> {
            Err(TasarError::InvalidHyperparameter {
                param: param.to_string(),
                value,
                constraint: constraint.to_string(),
            })
        }

        if self.in_features == 0 {
            return fail("in_features", "0".to_string(), "> 0");
        }
        if self.embed_dim == 0 {
            return fail("embed_dim", "0".to_string(), "> 0");
        }
        if self.num_heads == 0 {
            return fail("num_heads", "0".to_string(), "> 0");
        }
        if self.embed_dim % self.num_heads != 0 {
            return fail(
                "embed_dim",
                format!("{}", self.embed_dim),
                "divisible by num_heads",
            );
        }
        if self.num_layers == 0 {
            return fail("num_layers", "0".to_string(), "> 0");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail("dropout", format!("{}", self.dropout), "[0, 1)");
        }
        if !(0.0..1.0).contains(&self.attn_dropout) {
            return fail("attn_dropout", format!("{}", self.attn_dropout), "[0, 1)");
        }
        if self.fc_hidden == 0 {
            return fail("fc_hidden", "0".to_string(), "> 0");
        }
        if self.num_fc_layers < 2 {
            return fail("num_fc_layers", format!("{}", self.num_fc_layers), ">= 2");
        }
        Ok(())
    }

    /// Hop-sequence length implied by this configuration.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        if self.directed {
            2 * self.num_hops + 1
        } else {
            self.num_hops + 1
        }
    }
}

/// End-to-end QoR prediction model.
///
/// Data flow per batch: hop tensor → [`HopEncoder`] → per-node
/// embeddings → mean‖max graph pooling → [`RegressionHead`] → one scalar
/// per graph.
pub struct QorPredictor {
    config: PredictorConfig,
    encoder: HopEncoder,
    head: RegressionHead,
    training: bool,
}

impl QorPredictor {
    /// Build a model from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any parameter is allocated if
    /// the hyperparameters are inconsistent.
    pub fn new(config: &PredictorConfig) -> Result<Self> {
        config.validate()?;

        let encoder = HopEncoder::new(
            config.in_features,
            config.embed_dim,
            config.num_heads,
            config.num_layers,
            config.dropout,
            config.attn_dropout,
            config.seed,
        );
        let head = RegressionHead::new(
            2 * config.embed_dim,
            config.fc_hidden,
            config.num_fc_layers,
            config.seed.map(|s| s.wrapping_add(9000)),
        );

        Ok(Self {
            config: config.clone(),
            encoder,
            head,
            training: true,
        })
    }

    /// The configuration this model was built with.
    #[must_use]
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Check a batch against the configuration before training starts.
    ///
    /// # Errors
    ///
    /// Returns a dimension mismatch if the batch's feature width or hop
    /// sequence length disagrees with the configuration.
    pub fn check_batch(&self, batch: &GraphBatch) -> Result<()> {
        let width = batch.hops().shape()[2];
        if width != self.config.in_features {
            return Err(TasarError::dimension_mismatch(
                "in_features",
                self.config.in_features,
                width,
            ));
        }
        let seq = batch.hops().shape()[1];
        if seq != self.config.seq_len() {
            return Err(TasarError::dimension_mismatch(
                "hop sequence length",
                self.config.seq_len(),
                seq,
            ));
        }
        Ok(())
    }

    /// Predict one scalar per graph: `[num_graphs, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if the batch shape disagrees with the configuration; use
    /// [`QorPredictor::check_batch`] to report this as an error before
    /// training.
    #[must_use]
    pub fn forward(&self, batch: &GraphBatch) -> Tensor {
        self.forward_with_attention(batch).0
    }

    /// Predict and also return the neighbor-hop attention weights,
    /// `[total_nodes, seq_len - 1]`, for diagnostic inspection.
    #[must_use]
    pub fn forward_with_attention(&self, batch: &GraphBatch) -> (Tensor, Tensor) {
        self.check_batch(batch)
            .unwrap_or_else(|e| panic!("batch incompatible with model configuration: {e}"));

        let (node_emb, hop_weights) = self.encoder.encode(batch.hops());

        let mean = segment_mean(&node_emb, batch.assignment(), batch.num_graphs());
        let max = segment_max(&node_emb, batch.assignment(), batch.num_graphs());
        let graph_emb = mean.concat_last(&max);

        (self.head.forward(&graph_emb), hop_weights)
    }
}

impl Module for QorPredictor {
    fn forward(&self, _input: &Tensor) -> Tensor {
        unimplemented!("QorPredictor consumes a GraphBatch; call QorPredictor::forward(batch)")
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.encoder.parameters();
        params.extend(self.head.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.head.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.training = true;
        self.encoder.train();
    }

    fn eval(&mut self) {
        self.training = false;
        self.encoder.eval();
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for QorPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QorPredictor")
            .field("config", &self.config)
            .field("num_parameters", &self.num_parameters())
            .finish_non_exhaustive()
    }
}
