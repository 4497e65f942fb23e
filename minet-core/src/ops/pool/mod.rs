//! Spatial pooling over NCHW tensors, without padding.

pub mod avg_pool;
pub mod max_pool;

pub use avg_pool::avg_pool2d_op;
pub use max_pool::max_pool2d_op;

use crate::error::MinetError;
use crate::tensor::Tensor;

/// `[n, c, h, w]` of the input and `(out_h, out_w)` for a `kernel`/`stride` window.
pub(crate) fn pool_geometry(
    input: &Tensor,
    kernel: usize,
    stride: usize,
    operation: &str,
) -> Result<([usize; 4], usize, usize), MinetError> {
    let dims = input.dims4(operation)?;
    if kernel == 0 || stride == 0 {
        return Err(MinetError::InvalidConfiguration(format!(
            "{operation}: kernel and stride must be positive (kernel {kernel}, stride {stride})"
        )));
    }
    let [_, _, h, w] = dims;
    if h < kernel || w < kernel {
        return Err(MinetError::InvalidInputShape {
            shape: dims.to_vec(),
            reason: format!("{operation}: spatial size is smaller than the {kernel}x{kernel} window"),
        });
    }
    Ok((dims, (h - kernel) / stride + 1, (w - kernel) / stride + 1))
}
