use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::conv::im2col::{col2im, im2col};
use crate::ops::linalg::{gemm, gemm_a_bt, gemm_at_b};
use crate::ops::{grad_if, should_record};
use crate::tensor::Tensor;

/// Sizes of one convolution, shared by the forward and backward kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dGeometry {
    pub in_channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride: usize,
    pub padding: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl Conv2dGeometry {
    /// Rows of the unfolded column matrix: `C * kh * kw`.
    pub fn patch_len(&self) -> usize {
        self.in_channels * self.kernel_h * self.kernel_w
    }

    /// Input row read by output row `oy` through kernel row `ki`, if not padding.
    #[inline]
    pub(crate) fn source_row(&self, oy: usize, ki: usize) -> Option<usize> {
        (oy * self.stride + ki)
            .checked_sub(self.padding)
            .filter(|&iy| iy < self.in_h)
    }

    #[inline]
    pub(crate) fn source_col(&self, ox: usize, kj: usize) -> Option<usize> {
        (ox * self.stride + kj)
            .checked_sub(self.padding)
            .filter(|&ix| ix < self.in_w)
    }
}

/// Validates the operands of a convolution and derives its geometry.
fn conv2d_geometry(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: usize,
    padding: usize,
) -> Result<(usize, usize, Conv2dGeometry), MinetError> {
    let [batch, in_channels, in_h, in_w] = input.dims4("conv2d")?;
    let [out_channels, weight_in, kernel_h, kernel_w] = weight.dims4("conv2d (weight)")?;
    if weight_in != in_channels {
        return Err(MinetError::ChannelMismatch {
            operation: "conv2d".to_string(),
            expected: weight_in,
            actual: in_channels,
        });
    }
    if let Some(bias) = bias {
        if bias.shape() != [out_channels] {
            return Err(MinetError::ShapeMismatch {
                expected: vec![out_channels],
                actual: bias.shape(),
                operation: "conv2d (bias)".to_string(),
            });
        }
    }
    if stride == 0 {
        return Err(MinetError::InvalidConfiguration(
            "conv2d stride must be positive".to_string(),
        ));
    }
    if in_h + 2 * padding < kernel_h || in_w + 2 * padding < kernel_w {
        return Err(MinetError::InvalidInputShape {
            shape: input.shape(),
            reason: format!("padded input is smaller than the {kernel_h}x{kernel_w} kernel"),
        });
    }
    let geometry = Conv2dGeometry {
        in_channels,
        in_h,
        in_w,
        kernel_h,
        kernel_w,
        stride,
        padding,
        out_h: (in_h + 2 * padding - kernel_h) / stride + 1,
        out_w: (in_w + 2 * padding - kernel_w) / stride + 1,
    };
    Ok((batch, out_channels, geometry))
}

/// 2D cross-correlation over an NCHW input.
///
/// # Arguments
/// * `input`: `[N, C_in, H, W]`
/// * `weight`: `[C_out, C_in, kh, kw]`
/// * `bias`: optional `[C_out]`
/// * `stride`, `padding`: applied equally to both spatial dimensions.
///
/// Each image is unfolded with im2col and multiplied by the flattened weight.
pub fn conv2d_op(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: usize,
    padding: usize,
) -> Result<Tensor, MinetError> {
    let (batch, out_channels, g) = conv2d_geometry(input, weight, bias, stride, padding)?;
    let spatial = g.out_h * g.out_w;
    let image_len = g.in_channels * g.in_h * g.in_w;

    let input_buffer = input.buffer();
    let weight_buffer = weight.buffer();
    let bias_values = bias.map(|b| b.buffer());

    let mut output = vec![0.0f32; batch * out_channels * spatial];
    for b in 0..batch {
        let cols = im2col(&input_buffer[b * image_len..(b + 1) * image_len], &g);
        let out_image = &mut output[b * out_channels * spatial..(b + 1) * out_channels * spatial];
        if let Some(bias_values) = &bias_values {
            for (plane, &bias_c) in out_image.chunks_mut(spatial).zip(bias_values.iter()) {
                plane.fill(bias_c);
            }
        }
        gemm(out_channels, g.patch_len(), spatial, &weight_buffer, &cols, out_image);
    }

    let result = Tensor::new(output, vec![batch, out_channels, g.out_h, g.out_w])?;
    let mut recorded = vec![input, weight];
    recorded.extend(bias);
    if should_record(&recorded) {
        let grad_fn = Conv2dBackward {
            input: input.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            batch,
            out_channels,
            geometry: g,
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

#[derive(Debug)]
struct Conv2dBackward {
    input: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    batch: usize,
    out_channels: usize,
    geometry: Conv2dGeometry,
}

impl Conv2dBackward {
    fn grad_input(&self, grad: &[f32]) -> Result<Tensor, MinetError> {
        let g = &self.geometry;
        let spatial = g.out_h * g.out_w;
        let image_len = g.in_channels * g.in_h * g.in_w;
        let weight = self.weight.buffer();
        let mut grad_input = vec![0.0f32; self.batch * image_len];
        let mut grad_cols = vec![0.0f32; g.patch_len() * spatial];
        for b in 0..self.batch {
            grad_cols.fill(0.0);
            let grad_b = &grad[b * self.out_channels * spatial..(b + 1) * self.out_channels * spatial];
            // dcols = Wᵀ · dY
            gemm_at_b(g.patch_len(), self.out_channels, spatial, &weight, grad_b, &mut grad_cols);
            col2im(&grad_cols, g, &mut grad_input[b * image_len..(b + 1) * image_len]);
        }
        Tensor::new(grad_input, self.input.shape())
    }

    fn grad_weight(&self, grad: &[f32]) -> Result<Tensor, MinetError> {
        let g = &self.geometry;
        let spatial = g.out_h * g.out_w;
        let image_len = g.in_channels * g.in_h * g.in_w;
        let input = self.input.buffer();
        let mut grad_weight = vec![0.0f32; self.out_channels * g.patch_len()];
        for b in 0..self.batch {
            // Columns are rebuilt rather than saved from the forward pass.
            let cols = im2col(&input[b * image_len..(b + 1) * image_len], g);
            let grad_b = &grad[b * self.out_channels * spatial..(b + 1) * self.out_channels * spatial];
            // dW += dY · colsᵀ
            gemm_a_bt(self.out_channels, spatial, g.patch_len(), grad_b, &cols, &mut grad_weight);
        }
        Tensor::new(grad_weight, self.weight.shape())
    }

    fn grad_bias(&self, grad: &[f32]) -> Result<Tensor, MinetError> {
        let spatial = self.geometry.out_h * self.geometry.out_w;
        let mut grad_bias = vec![0.0f32; self.out_channels];
        for (i, plane) in grad.chunks(spatial).enumerate() {
            grad_bias[i % self.out_channels] += plane.iter().sum::<f32>();
        }
        Tensor::new(grad_bias, vec![self.out_channels])
    }
}

impl BackwardOp for Conv2dBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let grad = single_grad(grad_outputs, "Conv2dBackward")?.buffer();
        let mut grads = vec![
            grad_if(&self.input, || self.grad_input(&grad))?,
            grad_if(&self.weight, || self.grad_weight(&grad))?,
        ];
        if let Some(bias) = &self.bias {
            grads.push(grad_if(bias, || self.grad_bias(&grad))?);
        }
        Ok(grads)
    }

    fn inputs(&self) -> Vec<Tensor> {
        let mut inputs = vec![self.input.clone(), self.weight.clone()];
        inputs.extend(self.bias.clone());
        inputs
    }
}

impl Tensor {
    /// 2D convolution with `self` as the NCHW input. See [`conv2d_op`].
    pub fn conv2d(
        &self,
        weight: &Tensor,
        bias: Option<&Tensor>,
        stride: usize,
        padding: usize,
    ) -> Result<Tensor, MinetError> {
        conv2d_op(self, weight, bias, stride, padding)
    }
}

#[cfg(test)]
#[path = "conv2d_test.rs"]
mod tests;
