use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::{grad_if, should_record};
use crate::tensor::Tensor;

/// Which statistics normalize the input.
#[derive(Debug, Clone, Copy)]
pub enum BatchNormMode<'a> {
    /// Per-channel statistics of the current batch.
    Train,
    /// Stored running statistics, treated as constants by the backward pass.
    Eval {
        running_mean: &'a [f32],
        running_var: &'a [f32],
    },
}

/// Per-channel statistics of a batch, reported in training mode.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub mean: Vec<f32>,
    /// Biased variance (divided by `count`).
    pub var: Vec<f32>,
    /// Number of values reduced per channel: `N * H * W`.
    pub count: usize,
}

impl BatchStats {
    /// Variance with Bessel's correction, as used for running estimates.
    pub fn unbiased_var(&self) -> Vec<f32> {
        if self.count < 2 {
            return self.var.clone();
        }
        let factor = self.count as f32 / (self.count - 1) as f32;
        self.var.iter().map(|v| v * factor).collect()
    }
}

/// Batch normalization over the channel dimension of an NCHW tensor:
/// `y = weight * (x - mean) / sqrt(var + eps) + bias`.
///
/// Returns the output and, in [`BatchNormMode::Train`], the batch statistics.
/// Statistics are accumulated in f64.
pub fn batch_norm_op(
    input: &Tensor,
    weight: &Tensor,
    bias: &Tensor,
    mode: BatchNormMode<'_>,
    eps: f32,
) -> Result<(Tensor, Option<BatchStats>), MinetError> {
    let [batch, channels, h, w] = input.dims4("batch_norm")?;
    for (name, param) in [("weight", weight), ("bias", bias)] {
        if param.shape() != [channels] {
            return Err(MinetError::ShapeMismatch {
                expected: vec![channels],
                actual: param.shape(),
                operation: format!("batch_norm ({name})"),
            });
        }
    }
    let spatial = h * w;
    let count = batch * spatial;
    let x = input.buffer();

    let (mean, var, stats) = match mode {
        BatchNormMode::Train => {
            let (mean, var) = channel_stats(&x, batch, channels, spatial);
            let stats = BatchStats {
                mean: mean.clone(),
                var: var.clone(),
                count,
            };
            (mean, var, Some(stats))
        }
        BatchNormMode::Eval {
            running_mean,
            running_var,
        } => {
            if running_mean.len() != channels || running_var.len() != channels {
                return Err(MinetError::ChannelMismatch {
                    operation: "batch_norm (running stats)".to_string(),
                    expected: channels,
                    actual: running_mean.len().min(running_var.len()),
                });
            }
            (running_mean.to_vec(), running_var.to_vec(), None)
        }
    };
    let inv_std: Vec<f32> = var.iter().map(|v| 1.0 / (v + eps).sqrt()).collect();

    let gamma = weight.buffer();
    let beta = bias.buffer();
    let mut output = vec![0.0f32; x.len()];
    for n in 0..batch {
        for c in 0..channels {
            let offset = (n * channels + c) * spatial;
            let scale = gamma[c] * inv_std[c];
            let shift = beta[c] - mean[c] * scale;
            for (o, &v) in output[offset..offset + spatial]
                .iter_mut()
                .zip(&x[offset..offset + spatial])
            {
                *o = v * scale + shift;
            }
        }
    }

    let result = Tensor::new(output, input.shape())?;
    if should_record(&[input, weight, bias]) {
        let grad_fn = BatchNormBackward {
            input: input.clone(),
            weight: weight.clone(),
            bias: bias.clone(),
            mean,
            inv_std,
            training: stats.is_some(),
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok((result, stats))
}

fn channel_stats(x: &[f32], batch: usize, channels: usize, spatial: usize) -> (Vec<f32>, Vec<f32>) {
    let count = (batch * spatial).max(1) as f64;
    let mut mean = vec![0.0f32; channels];
    let mut var = vec![0.0f32; channels];
    for c in 0..channels {
        let mut sum = 0.0f64;
        for n in 0..batch {
            let offset = (n * channels + c) * spatial;
            sum += x[offset..offset + spatial].iter().map(|&v| f64::from(v)).sum::<f64>();
        }
        let m = sum / count;
        let mut sq = 0.0f64;
        for n in 0..batch {
            let offset = (n * channels + c) * spatial;
            sq += x[offset..offset + spatial]
                .iter()
                .map(|&v| (f64::from(v) - m).powi(2))
                .sum::<f64>();
        }
        mean[c] = m as f32;
        var[c] = (sq / count) as f32;
    }
    (mean, var)
}

#[derive(Debug)]
struct BatchNormBackward {
    input: Tensor,
    weight: Tensor,
    bias: Tensor,
    mean: Vec<f32>,
    inv_std: Vec<f32>,
    training: bool,
}

/// Per-channel sums needed by every gradient: `Σ dy` and `Σ dy * x̂`.
struct ChannelSums {
    grad: Vec<f64>,
    grad_xhat: Vec<f64>,
}

impl BatchNormBackward {
    fn geometry(&self) -> (usize, usize, usize) {
        let shape = self.input.shape();
        (shape[0], shape[1], shape[2] * shape[3])
    }

    fn channel_sums(&self, x: &[f32], dy: &[f32]) -> ChannelSums {
        let (batch, channels, spatial) = self.geometry();
        let mut sums = ChannelSums {
            grad: vec![0.0; channels],
            grad_xhat: vec![0.0; channels],
        };
        for n in 0..batch {
            for c in 0..channels {
                let offset = (n * channels + c) * spatial;
                for i in offset..offset + spatial {
                    let xhat = (x[i] - self.mean[c]) * self.inv_std[c];
                    sums.grad[c] += f64::from(dy[i]);
                    sums.grad_xhat[c] += f64::from(dy[i]) * f64::from(xhat);
                }
            }
        }
        sums
    }

    fn grad_input(&self, x: &[f32], dy: &[f32], sums: &ChannelSums) -> Result<Tensor, MinetError> {
        let (batch, channels, spatial) = self.geometry();
        let gamma = self.weight.buffer();
        let count = (batch * spatial) as f64;
        let mut dx = vec![0.0f32; x.len()];
        for n in 0..batch {
            for c in 0..channels {
                let offset = (n * channels + c) * spatial;
                let scale = f64::from(gamma[c]) * f64::from(self.inv_std[c]);
                for i in offset..offset + spatial {
                    dx[i] = if self.training {
                        // dx = γ/σ · (dy - mean(dy) - x̂ · mean(dy · x̂))
                        let xhat = f64::from((x[i] - self.mean[c]) * self.inv_std[c]);
                        (scale
                            * (f64::from(dy[i])
                                - sums.grad[c] / count
                                - xhat * sums.grad_xhat[c] / count)) as f32
                    } else {
                        (scale * f64::from(dy[i])) as f32
                    };
                }
            }
        }
        Tensor::new(dx, self.input.shape())
    }
}

impl BackwardOp for BatchNormBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let dy = single_grad(grad_outputs, "BatchNormBackward")?.buffer();
        let x = self.input.buffer();
        let sums = self.channel_sums(&x, &dy);
        let channels = self.mean.len();
        let to_tensor = |values: &[f64]| {
            Tensor::new(values.iter().map(|&v| v as f32).collect(), vec![channels])
        };
        Ok(vec![
            grad_if(&self.input, || self.grad_input(&x, &dy, &sums))?,
            grad_if(&self.weight, || to_tensor(&sums.grad_xhat))?,
            grad_if(&self.bias, || to_tensor(&sums.grad))?,
        ])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone(), self.weight.clone(), self.bias.clone()]
    }
}

impl Tensor {
    /// Batch normalization of an NCHW tensor. See [`batch_norm_op`].
    pub fn batch_norm(
        &self,
        weight: &Tensor,
        bias: &Tensor,
        mode: BatchNormMode<'_>,
        eps: f32,
    ) -> Result<(Tensor, Option<BatchStats>), MinetError> {
        batch_norm_op(self, weight, bias, mode, eps)
    }
}

#[cfg(test)]
#[path = "batch_norm_test.rs"]
mod tests;
