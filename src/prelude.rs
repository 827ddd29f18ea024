//! Convenience re-exports for common usage.
//!
//! ```
//! use tasar::prelude::*;
//! ```

pub use crate::autograd::Tensor;
pub use crate::error::{Result, TasarError};
pub use crate::graph::{hop_features, CircuitGraph, GraphBatch, ProcessedGraph, PropagationOperator};
pub use crate::model::{PredictorConfig, QorPredictor};
pub use crate::nn::loss::MSELoss;
pub use crate::nn::{Adam, Module, Optimizer};
pub use crate::serialize::{load_model, save_model};
pub use crate::train::{evaluate, train_epoch, RunningMean};
