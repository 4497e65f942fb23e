use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::buffer::Buffer;
use crate::error::MinetError;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Numerically stable logistic function.
#[inline]
fn stable_sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Applies sigmoid(x) = 1 / (1 + exp(-x)) element-wise.
pub fn sigmoid_op(input: &Tensor) -> Result<Tensor, MinetError> {
    let (data, shape) = {
        let guard = input.read_data();
        let data: Vec<f32> = guard.buffer().iter().map(|&x| stable_sigmoid(x)).collect();
        (data, guard.shape.clone())
    };
    let result = Tensor::new(data, shape)?;
    if should_record(&[input]) {
        // Saving the output buffer, not the output tensor, avoids a reference cycle
        // between the tensor and its own grad_fn.
        let grad_fn = SigmoidBackward {
            input: input.clone(),
            output: result.buffer(),
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

#[derive(Debug)]
struct SigmoidBackward {
    input: Tensor,
    output: Arc<Buffer>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let grad = single_grad(grad_outputs, "SigmoidBackward")?;
        let grad_buffer = grad.buffer();
        let data: Vec<f32> = self
            .output
            .iter()
            .zip(grad_buffer.iter())
            .map(|(&y, &g)| g * y * (1.0 - y))
            .collect();
        Ok(vec![Some(Tensor::new(data, self.input.shape())?)])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone()]
    }
}

impl Tensor {
    /// Applies the logistic sigmoid element-wise. See [`sigmoid_op`].
    pub fn sigmoid(&self) -> Result<Tensor, MinetError> {
        sigmoid_op(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::grad_check::check_grad;
    use crate::utils::testing::{check_tensor_near, create_test_tensor, create_test_tensor_with_grad};

    #[test]
    fn test_sigmoid_forward_values() -> Result<(), MinetError> {
        let t = create_test_tensor(vec![0.0, 2.0, -2.0], vec![3]);
        let y = t.sigmoid()?;
        check_tensor_near(&y, &[3], &[0.5, 0.880_797, 0.119_203], 1e-5);
        Ok(())
    }

    #[test]
    fn test_sigmoid_stable_for_large_magnitudes() -> Result<(), MinetError> {
        let t = create_test_tensor(vec![-100.0, 100.0], vec![2]);
        let y = t.sigmoid()?.get_f32_data()?;
        assert!(y.iter().all(|v| v.is_finite()));
        assert!(y[0] >= 0.0 && y[0] < 1e-30);
        assert!((y[1] - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_sigmoid_grad_check() {
        let x = create_test_tensor_with_grad(vec![-1.5, -0.2, 0.0, 0.4, 1.1, 3.0], vec![2, 3]);
        let output_grad = create_test_tensor(vec![1.0, -0.5, 2.0, 0.3, -1.2, 0.8], vec![2, 3]);
        check_grad(|inputs| sigmoid_op(&inputs[0]), &[x], &output_grad, 1e-2, 1e-3)
            .unwrap_or_else(|e| panic!("sigmoid grad check failed: {e}"));
    }
}
