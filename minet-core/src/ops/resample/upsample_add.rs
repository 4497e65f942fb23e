use crate::error::MinetError;
use crate::ops::arithmetic::add_op;
use crate::ops::resample::interpolate_bilinear_op;
use crate::tensor::Tensor;

/// Resizes `coarse` to the spatial size of `fine` and adds the two.
///
/// The result has `fine`'s shape. Batch and channel counts must already agree;
/// nothing is broadcast. When both maps have the same size the resize is skipped.
pub fn upsample_add_op(coarse: &Tensor, fine: &Tensor) -> Result<Tensor, MinetError> {
    let [cn, cc, ch, cw] = coarse.dims4("upsample_add (coarse)")?;
    let [fn_, fc, fh, fw] = fine.dims4("upsample_add (fine)")?;
    if cn != fn_ {
        return Err(MinetError::ShapeMismatch {
            expected: fine.shape(),
            actual: coarse.shape(),
            operation: "upsample_add (batch)".to_string(),
        });
    }
    if cc != fc {
        return Err(MinetError::ChannelMismatch {
            operation: "upsample_add".to_string(),
            expected: fc,
            actual: cc,
        });
    }
    if (ch, cw) == (fh, fw) {
        return add_op(coarse, fine);
    }
    let resized = interpolate_bilinear_op(coarse, fh, fw)?;
    add_op(&resized, fine)
}

impl Tensor {
    /// Upsample-then-add fusion with `self` as the coarse map. See [`upsample_add_op`].
    pub fn upsample_add(&self, fine: &Tensor) -> Result<Tensor, MinetError> {
        upsample_add_op(self, fine)
    }
}
