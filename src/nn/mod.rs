//! Neural network building blocks.
//!
//! The module is organized around the [`Module`] trait, which defines the
//! interface for all layers:
//!
//! - **Layers**: [`Linear`]
//! - **Normalization**: [`LayerNorm`]
//! - **Regularization**: [`Dropout`]
//! - **Initialization**: [`init`]
//! - **Losses**: [`loss`]
//! - **Optimizers**: [`optim`]
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style,
//!   high-performance deep learning library. `NeurIPS`.

mod dropout;
pub mod init;
mod linear;
pub mod loss;
mod module;
mod norm;
pub mod optim;

pub use dropout::Dropout;
pub use linear::Linear;
pub use module::Module;
pub use norm::LayerNorm;
pub use optim::{Adam, Optimizer, SGD};
