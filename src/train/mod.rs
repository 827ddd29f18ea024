//! Training-step support consumed by the external epoch driver.
//!
//! The driver owns run length, early stopping and checkpoint selection;
//! this module supplies the per-epoch mechanics: a loss-weighted running
//! mean, one gradient pass over a set of batches, and a no-grad
//! evaluation pass.

use crate::autograd::{clear_graph, no_grad};
use crate::error::{Result, TasarError};
use crate::graph::GraphBatch;
use crate::model::QorPredictor;
use crate::nn::loss::{mse, MSELoss};
use crate::nn::{Adam, Module};

/// Sample-weighted running average.
///
/// Instantiated fresh per training or evaluation pass; carries no global
/// state.
///
/// # Example
///
/// ```
/// use tasar::train::RunningMean;
///
/// let mut avg = RunningMean::new();
/// avg.update(2.0, 3);
/// avg.update(10.0, 1);
/// assert!((avg.mean() - 4.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` observed over `n` samples.
    pub fn update(&mut self, value: f32, n: usize) {
        self.sum += f64::from(value) * n as f64;
        self.count += n;
    }

    /// Current mean, 0 if nothing was recorded.
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }

    /// Number of samples recorded.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Run one training pass over `batches` and return the mean loss.
///
/// Each batch: forward, MSE loss against the batch targets, backward,
/// one Adam step; the autograd tape is cleared after every step. The
/// returned loss is weighted by graphs per batch.
///
/// # Errors
///
/// - Batch/configuration mismatch is reported before any step is taken.
/// - A non-finite loss aborts the pass with
///   [`TasarError::ConvergenceFailure`]; retrying is the driver's policy
///   decision, not handled here.
pub fn train_epoch(
    model: &mut QorPredictor,
    batches: &[GraphBatch],
    optimizer: &mut Adam,
) -> Result<f32> {
    for batch in batches {
        model.check_batch(batch)?;
    }

    model.train();
    let criterion = MSELoss::new();
    let mut epoch_loss = RunningMean::new();

    for (step, batch) in batches.iter().enumerate() {
        let pred = model.forward(batch);
        let loss = criterion.forward(&pred, batch.targets());
        let loss_val = loss.item();

        if !loss_val.is_finite() {
            clear_graph();
            return Err(TasarError::ConvergenceFailure {
                steps: step,
                last_loss: f64::from(epoch_loss.mean()),
            });
        }

        loss.backward();
        let mut params = model.parameters_mut();
        optimizer.step_with_params(&mut params);
        clear_graph();

        epoch_loss.update(loss_val, batch.num_graphs());
    }

    Ok(epoch_loss.mean())
}

/// Evaluate mean squared error over `batches` without gradients.
///
/// Dropout is disabled (`eval` mode) and nothing is recorded to the
/// autograd tape, so two calls on the same inputs produce identical
/// results.
///
/// # Errors
///
/// Reports batch/configuration mismatches.
pub fn evaluate(model: &mut QorPredictor, batches: &[GraphBatch]) -> Result<f32> {
    for batch in batches {
        model.check_batch(batch)?;
    }

    model.eval();
    let mut total = RunningMean::new();

    no_grad(|| {
        for batch in batches {
            let pred = model.forward(batch);
            let err = mse(pred.data(), batch.targets().data());
            total.update(err, batch.num_graphs());
        }
    });

    Ok(total.mean())
}
