//! Tasar: hop-wise graph attention for circuit QoR prediction in pure Rust.
//!
//! Tasar predicts a scalar physical-design quality metric (delay or
//! area) for a logic circuit represented as a directed graph. Per-node
//! features are diffused over the graph into a hop-indexed sequence,
//! mixed across hops by a stack of gated attention blocks, pooled into
//! one embedding per node with learned hop importance, then aggregated
//! per graph and regressed to a single scalar.
//!
//! # Quick Start
//!
//! ```
//! use tasar::prelude::*;
//!
//! // A 3-gate circuit with 2 features per node.
//! let graph = CircuitGraph::new(3, vec![[0, 1], [1, 2]], false).unwrap();
//! let features = Tensor::new(&[1.0, 0.0, 0.5, 0.5, 0.0, 1.0], &[3, 2]);
//!
//! // Preprocess once: build the normalized operator and hop features.
//! let processed = ProcessedGraph::new(&graph, &features, 2, 0.7).unwrap();
//! let batch = GraphBatch::from_graphs(&[&processed]).unwrap();
//!
//! // Build the model and predict.
//! let config = PredictorConfig {
//!     in_features: 2,
//!     embed_dim: 8,
//!     num_heads: 2,
//!     num_layers: 1,
//!     num_hops: 2,
//!     seed: Some(42),
//!     ..PredictorConfig::default()
//! };
//! let mut model = QorPredictor::new(&config).unwrap();
//! model.eval();
//! let prediction = model.forward(&batch);
//! assert_eq!(prediction.shape(), &[1, 1]);
//! ```
//!
//! # Modules
//!
//! - [`graph`]: circuit graphs, normalized propagation operators, hop
//!   feature construction, batching
//! - [`model`]: hop attention, mixing blocks, hop pooling, graph pooling
//!   and the regression head
//! - [`autograd`]: tape-based reverse-mode automatic differentiation
//! - [`nn`]: layers, initialization, losses and optimizers
//! - [`train`]: per-epoch training and evaluation passes
//! - [`serialize`]: parameter checkpoints (`SafeTensors` layout)
//! - [`error`]: crate-wide error type

pub mod autograd;
pub mod error;
pub mod graph;
pub mod model;
pub mod nn;
pub mod prelude;
pub mod serialize;
pub mod train;
