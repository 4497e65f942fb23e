// minet-core/src/ops/arithmetic/add.rs

use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Element-wise sum of two tensors of identical shape, without graph recording.
///
/// Used for gradient accumulation.
pub(crate) fn add_values(a: &Tensor, b: &Tensor, operation: &str) -> Result<Tensor, MinetError> {
    let a_guard = a.read_data();
    let b_guard = b.read_data();
    if a_guard.shape != b_guard.shape {
        return Err(MinetError::ShapeMismatch {
            expected: a_guard.shape.clone(),
            actual: b_guard.shape.clone(),
            operation: operation.to_string(),
        });
    }
    let data: Vec<f32> = a_guard
        .buffer()
        .iter()
        .zip(b_guard.buffer().iter())
        .map(|(&x, &y)| x + y)
        .collect();
    let shape = a_guard.shape.clone();
    drop(a_guard);
    drop(b_guard);
    Tensor::new(data, shape)
}

/// Element-wise addition of two tensors with the same shape.
///
/// Shapes must match exactly: fused feature maps are never broadcast.
pub fn add_op(a: &Tensor, b: &Tensor) -> Result<Tensor, MinetError> {
    let result = add_values(a, b, "add")?;
    if should_record(&[a, b]) {
        let grad_fn = AddBackward {
            input_a: a.clone(),
            input_b: b.clone(),
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

/// Backward operation for addition: the upstream gradient flows unchanged to both inputs.
#[derive(Debug)]
struct AddBackward {
    input_a: Tensor,
    input_b: Tensor,
}

impl BackwardOp for AddBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let grad = single_grad(grad_outputs, "AddBackward")?;
        Ok(vec![Some(grad.clone()), Some(grad.clone())])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input_a.clone(), self.input_b.clone()]
    }
}

impl Tensor {
    /// Element-wise addition. See [`add_op`].
    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, other: &Tensor) -> Result<Tensor, MinetError> {
        add_op(self, other)
    }
}

#[cfg(test)]
#[path = "add_test.rs"]
mod tests;
