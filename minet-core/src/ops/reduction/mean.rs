use std::sync::Arc;

use crate::autograd::backward_op::attach_grad_fn;
use crate::error::MinetError;
use crate::ops::reduction::sum::FillBackward;
use crate::ops::should_record;
use crate::tensor::Tensor;

/// Mean of all elements as a scalar tensor of shape `[]`.
///
/// Returns `InvalidInputShape` for an empty tensor.
pub fn mean_op(input: &Tensor) -> Result<Tensor, MinetError> {
    let (mean, numel) = {
        let guard = input.read_data();
        let numel = guard.numel();
        if numel == 0 {
            return Err(MinetError::InvalidInputShape {
                shape: guard.shape.clone(),
                reason: "mean of an empty tensor".to_string(),
            });
        }
        let total: f64 = guard.buffer().iter().map(|&x| f64::from(x)).sum();
        ((total / numel as f64) as f32, numel)
    };
    let result = Tensor::new(vec![mean], vec![])?;
    if should_record(&[input]) {
        let grad_fn = FillBackward {
            input: input.clone(),
            scale: 1.0 / numel as f32,
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

impl Tensor {
    /// Mean of all elements as a scalar. See [`mean_op`].
    pub fn mean(&self) -> Result<Tensor, MinetError> {
        mean_op(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{check_tensor_near, create_test_tensor, create_test_tensor_with_grad};

    #[test]
    fn test_mean_forward_and_backward() -> Result<(), MinetError> {
        let t = create_test_tensor_with_grad(vec![1.0, 2.0, 3.0, 6.0], vec![4]);
        let m = t.mean()?;
        assert_eq!(m.item()?, 3.0);
        m.backward(None)?;
        check_tensor_near(&t.grad().unwrap(), &[4], &[0.25; 4], 1e-7);
        Ok(())
    }

    #[test]
    fn test_mean_empty_fails() {
        let t = create_test_tensor(vec![], vec![0, 3]);
        assert!(matches!(t.mean(), Err(MinetError::InvalidInputShape { .. })));
    }
}
