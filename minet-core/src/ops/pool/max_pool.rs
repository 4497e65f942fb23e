use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::pool::pool_geometry;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Max pooling with a square `kernel` window.
///
/// Ties resolve to the first maximum in row-major window order, which is where
/// the backward pass routes the gradient.
pub fn max_pool2d_op(input: &Tensor, kernel: usize, stride: usize) -> Result<Tensor, MinetError> {
    let ([n, c, h, w], out_h, out_w) = pool_geometry(input, kernel, stride, "max_pool2d")?;
    let x = input.buffer();
    let out_len = n * c * out_h * out_w;
    let mut output = Vec::with_capacity(out_len);
    // Flat input index of each selected element.
    let mut argmax = Vec::with_capacity(out_len);
    for (p, plane) in x.chunks(h * w).enumerate() {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut best = f32::NEG_INFINITY;
                let mut best_idx = (oy * stride) * w + ox * stride;
                for ky in 0..kernel {
                    for kx in 0..kernel {
                        let idx = (oy * stride + ky) * w + ox * stride + kx;
                        if plane[idx] > best {
                            best = plane[idx];
                            best_idx = idx;
                        }
                    }
                }
                output.push(plane[best_idx]);
                argmax.push(p * h * w + best_idx);
            }
        }
    }
    let result = Tensor::new(output, vec![n, c, out_h, out_w])?;
    if should_record(&[input]) {
        let grad_fn = MaxPool2dBackward {
            input: input.clone(),
            argmax,
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

#[derive(Debug)]
struct MaxPool2dBackward {
    input: Tensor,
    argmax: Vec<usize>,
}

impl BackwardOp for MaxPool2dBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let dy = single_grad(grad_outputs, "MaxPool2dBackward")?.buffer();
        let mut dx = vec![0.0f32; self.input.numel()];
        for (&idx, &g) in self.argmax.iter().zip(dy.iter()) {
            dx[idx] += g;
        }
        Ok(vec![Some(Tensor::new(dx, self.input.shape())?)])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone()]
    }
}

impl Tensor {
    /// Max pooling. See [`max_pool2d_op`].
    pub fn max_pool2d(&self, kernel: usize, stride: usize) -> Result<Tensor, MinetError> {
        max_pool2d_op(self, kernel, stride)
    }
}

#[cfg(test)]
#[path = "max_pool_test.rs"]
mod tests;
