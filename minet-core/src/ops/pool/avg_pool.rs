use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::pool::pool_geometry;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Average pooling with a square `kernel` window.
pub fn avg_pool2d_op(input: &Tensor, kernel: usize, stride: usize) -> Result<Tensor, MinetError> {
    let ([n, c, h, w], out_h, out_w) = pool_geometry(input, kernel, stride, "avg_pool2d")?;
    let x = input.buffer();
    let norm = 1.0 / (kernel * kernel) as f32;
    let mut output = Vec::with_capacity(n * c * out_h * out_w);
    for plane in x.chunks(h * w) {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut acc = 0.0f32;
                for ky in 0..kernel {
                    let row = (oy * stride + ky) * w + ox * stride;
                    acc += plane[row..row + kernel].iter().sum::<f32>();
                }
                output.push(acc * norm);
            }
        }
    }
    let result = Tensor::new(output, vec![n, c, out_h, out_w])?;
    if should_record(&[input]) {
        let grad_fn = AvgPool2dBackward {
            input: input.clone(),
            kernel,
            stride,
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

#[derive(Debug)]
struct AvgPool2dBackward {
    input: Tensor,
    kernel: usize,
    stride: usize,
}

impl BackwardOp for AvgPool2dBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let grad = single_grad(grad_outputs, "AvgPool2dBackward")?;
        let [_, _, out_h, out_w] = grad.dims4("AvgPool2dBackward")?;
        let shape = self.input.shape();
        let (h, w) = (shape[2], shape[3]);
        let norm = 1.0 / (self.kernel * self.kernel) as f32;
        let dy = grad.buffer();
        let mut dx = vec![0.0f32; self.input.numel()];
        for (dx_plane, dy_plane) in dx.chunks_mut(h * w).zip(dy.chunks(out_h * out_w)) {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let share = dy_plane[oy * out_w + ox] * norm;
                    for ky in 0..self.kernel {
                        let row = (oy * self.stride + ky) * w + ox * self.stride;
                        for v in &mut dx_plane[row..row + self.kernel] {
                            *v += share;
                        }
                    }
                }
            }
        }
        Ok(vec![Some(Tensor::new(dx, shape)?)])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone()]
    }
}

impl Tensor {
    /// Average pooling. See [`avg_pool2d_op`].
    pub fn avg_pool2d(&self, kernel: usize, stride: usize) -> Result<Tensor, MinetError> {
        avg_pool2d_op(self, kernel, stride)
    }
}

#[cfg(test)]
#[path = "avg_pool_test.rs"]
mod tests;
