use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Applies ReLU(x) = max(0, x) element-wise.
pub fn relu_op(input: &Tensor) -> Result<Tensor, MinetError> {
    let (data, shape) = {
        let guard = input.read_data();
        let data: Vec<f32> = guard.buffer().iter().map(|&x| x.max(0.0)).collect();
        (data, guard.shape.clone())
    };
    let result = Tensor::new(data, shape)?;
    if should_record(&[input]) {
        attach_grad_fn(&result, Arc::new(ReluBackward { input: input.clone() }), 0);
    }
    Ok(result)
}

#[derive(Debug)]
struct ReluBackward {
    input: Tensor,
}

impl BackwardOp for ReluBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let grad = single_grad(grad_outputs, "ReluBackward")?;
        let input_buffer = self.input.buffer();
        let grad_buffer = grad.buffer();
        // grad = upstream * (input > 0)
        let data: Vec<f32> = input_buffer
            .iter()
            .zip(grad_buffer.iter())
            .map(|(&x, &g)| if x > 0.0 { g } else { 0.0 })
            .collect();
        Ok(vec![Some(Tensor::new(data, self.input.shape())?)])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone()]
    }
}

impl Tensor {
    /// Applies the Rectified Linear Unit element-wise. See [`relu_op`].
    pub fn relu(&self) -> Result<Tensor, MinetError> {
        relu_op(self)
    }
}
