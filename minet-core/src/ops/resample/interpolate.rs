use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Source taps of one output coordinate along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    lo: usize,
    hi: usize,
    w_lo: f32,
    w_hi: f32,
}

/// Half-pixel mapping (`align_corners = false`): `src = (dst + 0.5) * in / out - 0.5`,
/// clamped at 0, with the upper neighbour clamped at the last index.
fn axis_taps(in_size: usize, out_size: usize) -> Vec<Tap> {
    let scale = in_size as f32 / out_size as f32;
    (0..out_size)
        .map(|dst| {
            let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
            let lo = (src.floor() as usize).min(in_size - 1);
            let hi = if lo < in_size - 1 { lo + 1 } else { lo };
            let w_hi = src - lo as f32;
            Tap {
                lo,
                hi,
                w_lo: 1.0 - w_hi,
                w_hi,
            }
        })
        .collect()
}

/// Bilinearly resizes the spatial dimensions of an NCHW tensor to `out_h × out_w`.
pub fn interpolate_bilinear_op(
    input: &Tensor,
    out_h: usize,
    out_w: usize,
) -> Result<Tensor, MinetError> {
    let [n, c, h, w] = input.dims4("interpolate_bilinear")?;
    if h == 0 || w == 0 || out_h == 0 || out_w == 0 {
        return Err(MinetError::InvalidInputShape {
            shape: input.shape(),
            reason: format!("cannot resize to or from an empty plane (target {out_h}x{out_w})"),
        });
    }
    let rows = axis_taps(h, out_h);
    let cols = axis_taps(w, out_w);
    let x = input.buffer();
    let mut output = Vec::with_capacity(n * c * out_h * out_w);
    for plane in x.chunks(h * w) {
        for ty in &rows {
            let (top, bottom) = (&plane[ty.lo * w..(ty.lo + 1) * w], &plane[ty.hi * w..(ty.hi + 1) * w]);
            for tx in &cols {
                let upper = top[tx.lo] * tx.w_lo + top[tx.hi] * tx.w_hi;
                let lower = bottom[tx.lo] * tx.w_lo + bottom[tx.hi] * tx.w_hi;
                output.push(upper * ty.w_lo + lower * ty.w_hi);
            }
        }
    }
    let result = Tensor::new(output, vec![n, c, out_h, out_w])?;
    if should_record(&[input]) {
        let grad_fn = InterpolateBilinearBackward {
            input: input.clone(),
            rows,
            cols,
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

#[derive(Debug)]
struct InterpolateBilinearBackward {
    input: Tensor,
    rows: Vec<Tap>,
    cols: Vec<Tap>,
}

impl BackwardOp for InterpolateBilinearBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let dy = single_grad(grad_outputs, "InterpolateBilinearBackward")?.buffer();
        let shape = self.input.shape();
        let w = shape[3];
        let plane_len = shape[2] * w;
        let out_plane_len = self.rows.len() * self.cols.len();
        let mut dx = vec![0.0f32; self.input.numel()];
        for (dx_plane, dy_plane) in dx.chunks_mut(plane_len).zip(dy.chunks(out_plane_len)) {
            for (oy, ty) in self.rows.iter().enumerate() {
                for (ox, tx) in self.cols.iter().enumerate() {
                    let g = dy_plane[oy * self.cols.len() + ox];
                    dx_plane[ty.lo * w + tx.lo] += g * ty.w_lo * tx.w_lo;
                    dx_plane[ty.lo * w + tx.hi] += g * ty.w_lo * tx.w_hi;
                    dx_plane[ty.hi * w + tx.lo] += g * ty.w_hi * tx.w_lo;
                    dx_plane[ty.hi * w + tx.hi] += g * ty.w_hi * tx.w_hi;
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
    /// Bilinear resize with half-pixel centers. See [`interpolate_bilinear_op`].
    pub fn interpolate_bilinear(&self, out_h: usize, out_w: usize) -> Result<Tensor, MinetError> {
        interpolate_bilinear_op(self, out_h, out_w)
    }
}

#[cfg(test)]
#[path = "interpolate_test.rs"]
mod tests;
