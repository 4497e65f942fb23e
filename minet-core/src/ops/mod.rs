//! # Tensor Operations Module (`ops`)
//!
//! Operations are grouped by family. Each one follows the same pattern:
//!
//! - an `xxx_op` function computes the forward result and, when the graph is being
//!   recorded, stores an `XxxBackward` node in the output's `grad_fn`;
//! - the `XxxBackward` struct implements [`BackwardOp`](crate::autograd::BackwardOp)
//!   with the context it saved from the forward pass;
//! - a method on [`Tensor`] forwards to the `_op` function.
//!
//! All operations work on contiguous row-major f32 data. Feature-map operations
//! expect NCHW tensors.

pub mod activation;
pub mod arithmetic;
pub mod conv;
pub mod linalg;
pub mod norm;
pub mod pool;
pub mod reduction;
pub mod resample;

use crate::autograd::is_grad_enabled;
use crate::error::MinetError;
use crate::tensor::Tensor;

/// True if an op on `inputs` must record a `grad_fn` node.
pub(crate) fn should_record(inputs: &[&Tensor]) -> bool {
    is_grad_enabled() && inputs.iter().any(|t| t.requires_grad())
}

/// Returns `Some(grad)` only for inputs that take gradients.
pub(crate) fn grad_if(
    input: &Tensor,
    grad: impl FnOnce() -> Result<Tensor, MinetError>,
) -> Result<Option<Tensor>, MinetError> {
    if input.requires_grad() {
        grad().map(Some)
    } else {
        Ok(None)
    }
}
