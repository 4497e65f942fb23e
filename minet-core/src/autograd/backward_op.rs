use std::fmt::Debug;
use std::sync::Arc;

use crate::error::MinetError;
use crate::tensor::Tensor;

/// Defines the interface for the backward pass of a differentiable operation.
///
/// Any operation that creates a non-leaf `Tensor` stores an implementation of this
/// trait in the output's `grad_fn`. Most ops have a single output; the checkpoint
/// node is the exception and reports its arity through [`BackwardOp::num_outputs`].
///
/// The `Debug + Send + Sync` bounds let nodes live inside `Arc<RwLock<TensorData>>`.
pub trait BackwardOp: Debug + Send + Sync {
    /// Computes the gradients of the operation's inputs, given the gradients of its outputs.
    ///
    /// # Arguments
    /// * `grad_outputs`: one slot per output. A slot is `None` when no gradient
    ///   reached that output; the engine guarantees at least one slot is `Some`.
    ///
    /// # Returns
    /// One entry per tensor returned by [`BackwardOp::inputs`], in the same order.
    /// `None` means "no gradient for this input" (it does not require grad, or it
    /// did not take part in the computation).
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError>;

    /// Returns the input tensors that participated in the forward operation.
    ///
    /// Holding these handles is what keeps forward activations alive until the
    /// backward pass; checkpointed segments keep only their boundary inputs here.
    fn inputs(&self) -> Vec<Tensor>;

    /// Number of tensors produced by the forward operation.
    fn num_outputs(&self) -> usize {
        1
    }
}

/// Returns the gradient of a single-output node.
pub(crate) fn single_grad<'a>(
    grad_outputs: &'a [Option<Tensor>],
    operation: &str,
) -> Result<&'a Tensor, MinetError> {
    match grad_outputs {
        [Some(grad)] => Ok(grad),
        _ => Err(MinetError::BackwardError(format!(
            "{operation}: expected exactly one output gradient, got {} slots",
            grad_outputs.len()
        ))),
    }
}

/// Links `output` to `grad_fn` as its `index`-th output.
pub(crate) fn attach_grad_fn(output: &Tensor, grad_fn: Arc<dyn BackwardOp>, index: usize) {
    let mut guard = output.write_data();
    guard.requires_grad = true;
    guard.grad_fn = Some(grad_fn);
    guard.output_index = index;
}
