use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use log::trace;

use crate::autograd::is_recomputing;
use crate::error::MinetError;
use crate::nn::init::constant;
use crate::nn::module::{Layer, Module};
use crate::nn::Parameter;
use crate::ops::norm::{batch_norm_op, BatchNormMode};
use crate::tensor::Tensor;

/// Running estimates used in evaluation mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    pub mean: Vec<f32>,
    pub var: Vec<f32>,
    pub num_batches_tracked: u64,
}

/// Batch normalization over the channels of an NCHW input.
///
/// In training mode the batch statistics normalize the input and are folded into
/// the running estimates with `momentum`. The fold is skipped while a
/// checkpointed segment is being replayed, so each forward call counts once.
#[derive(Debug)]
pub struct BatchNorm2d {
    weight: Parameter,
    bias: Parameter,
    running: RwLock<RunningStats>,
    training: AtomicBool,
    num_features: usize,
    momentum: f32,
    eps: f32,
}

impl BatchNorm2d {
    /// γ = 1, β = 0, running mean 0, running var 1, training mode.
    pub fn new(num_features: usize, momentum: f32, eps: f32) -> Result<Self, MinetError> {
        if num_features == 0 {
            return Err(MinetError::InvalidConfiguration(
                "BatchNorm2d needs at least one feature".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&momentum) || eps <= 0.0 {
            return Err(MinetError::InvalidConfiguration(format!(
                "BatchNorm2d momentum must be in [0, 1] and eps positive (got {momentum}, {eps})"
            )));
        }
        Ok(BatchNorm2d {
            weight: Parameter::new(constant(&[num_features], 1.0)?, Some("weight".to_string())),
            bias: Parameter::new(constant(&[num_features], 0.0)?, Some("bias".to_string())),
            running: RwLock::new(RunningStats {
                mean: vec![0.0; num_features],
                var: vec![1.0; num_features],
                num_batches_tracked: 0,
            }),
            training: AtomicBool::new(true),
            num_features,
            momentum,
            eps,
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    /// Snapshot of the running estimates.
    pub fn running_stats(&self) -> RunningStats {
        self.running.read().expect("RwLock poisoned").clone()
    }
}

impl Module for BatchNorm2d {
    fn local_parameters(&self) -> Vec<(String, &Parameter)> {
        vec![
            ("weight".to_string(), &self.weight),
            ("bias".to_string(), &self.bias),
        ]
    }

    fn set_training(&self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }
}

impl Layer for BatchNorm2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        if !self.is_training() {
            let running = self.running.read().expect("RwLock poisoned");
            let mode = BatchNormMode::Eval {
                running_mean: &running.mean,
                running_var: &running.var,
            };
            return batch_norm_op(input, &self.weight, &self.bias, mode, self.eps).map(|(y, _)| y);
        }

        let (output, stats) =
            batch_norm_op(input, &self.weight, &self.bias, BatchNormMode::Train, self.eps)?;
        if let Some(stats) = stats {
            if is_recomputing() {
                trace!("BatchNorm2d: replay, running statistics left unchanged");
            } else {
                let unbiased = stats.unbiased_var();
                let m = self.momentum;
                let mut running = self.running.write().expect("RwLock poisoned");
                for c in 0..self.num_features {
                    running.mean[c] = (1.0 - m) * running.mean[c] + m * stats.mean[c];
                    running.var[c] = (1.0 - m) * running.var[c] + m * unbiased[c];
                }
                running.num_batches_tracked += 1;
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
#[path = "batch_norm_test.rs"]
mod tests;
