use std::sync::Arc;

use log::warn;

use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::arithmetic::add::add_values;
use crate::tensor::{ones, Tensor};
use crate::tensor_data::TensorData;

impl Tensor {
    /// Checks if this tensor requires gradient computation.
    pub fn requires_grad(&self) -> bool {
        self.read_data().requires_grad
    }

    /// Sets the `requires_grad` flag for this tensor.
    pub fn set_requires_grad(&self, requires_grad: bool) -> Result<(), MinetError> {
        let mut guard = self.write_data();
        if guard.grad_fn.is_some() {
            warn!("set_requires_grad on a non-leaf tensor; gradients will not accumulate here. Did you mean to use .detach()?");
        }
        guard.requires_grad = requires_grad;
        if !requires_grad {
            guard.grad = None;
        }
        Ok(())
    }

    /// Returns a clone of the gradient tensor, if it exists.
    pub fn grad(&self) -> Option<Tensor> {
        self.read_data().grad.clone()
    }

    /// Clears the gradient tensor associated with this tensor.
    pub fn clear_grad(&self) {
        self.write_data().grad = None;
    }

    /// Returns the node that produced this tensor, if any.
    pub fn grad_fn(&self) -> Option<Arc<dyn BackwardOp>> {
        self.read_data().grad_fn.clone()
    }

    /// A leaf is a tensor not produced by a recorded operation.
    pub fn is_leaf(&self) -> bool {
        self.read_data().grad_fn.is_none()
    }

    /// Returns a new leaf sharing this tensor's buffer, cut from the graph.
    pub fn detach(&self) -> Tensor {
        let guard = self.read_data();
        Tensor::from_tensor_data(TensorData::from_buffer(
            Arc::clone(guard.buffer()),
            guard.shape.clone(),
        ))
    }

    /// Accumulates `grad_to_add` into this tensor's `grad` field.
    pub fn acc_grad(&self, grad_to_add: Tensor) -> Result<(), MinetError> {
        let expected_shape = self.shape();
        if grad_to_add.shape() != expected_shape {
            return Err(MinetError::ShapeMismatch {
                expected: expected_shape,
                actual: grad_to_add.shape(),
                operation: "acc_grad".to_string(),
            });
        }
        let existing = self.write_data().grad.take();
        let new_grad = match existing {
            Some(existing_grad) => add_values(&existing_grad, &grad_to_add, "acc_grad")?,
            None => grad_to_add,
        };
        self.write_data().grad = Some(new_grad);
        Ok(())
    }

    /// Performs the backward pass starting from this tensor.
    ///
    /// # Arguments
    /// * `gradient`: gradient of the final objective with respect to `self`. If
    ///   `None`, it defaults to ones, which is only allowed for scalar-like tensors.
    ///
    /// # Errors
    /// * `BackwardNonScalar` if `gradient` is `None` and `self` has more than one element.
    /// * `ShapeMismatch` if `gradient` does not have `self`'s shape.
    /// * Any error raised by a `BackwardOp`, including checkpoint replays.
    pub fn backward(&self, gradient: Option<Tensor>) -> Result<(), MinetError> {
        if !self.requires_grad() {
            warn!("backward() called on a tensor that does not require grad; nothing to do");
            return Ok(());
        }
        let grad_init = match gradient {
            Some(g) => {
                if g.shape() != self.shape() {
                    return Err(MinetError::ShapeMismatch {
                        expected: self.shape(),
                        actual: g.shape(),
                        operation: "backward (initial gradient)".to_string(),
                    });
                }
                g
            }
            None => {
                if self.numel() != 1 {
                    return Err(MinetError::BackwardNonScalar);
                }
                ones(&self.shape())?
            }
        };
        crate::autograd::backward(&[(self.clone(), grad_init)])
    }
}

#[cfg(test)]
#[path = "autograd_methods_test.rs"]
mod tests;
