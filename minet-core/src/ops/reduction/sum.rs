use std::sync::Arc;

use crate::autograd::backward_op::{attach_grad_fn, single_grad};
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::should_record;
use crate::tensor::{full, Tensor};

/// Sums all elements into a scalar tensor of shape `[]`.
pub fn sum_op(input: &Tensor) -> Result<Tensor, MinetError> {
    let total = {
        let guard = input.read_data();
        // f64 accumulation keeps large feature maps stable.
        guard.buffer().iter().map(|&x| f64::from(x)).sum::<f64>() as f32
    };
    let result = Tensor::new(vec![total], vec![])?;
    if should_record(&[input]) {
        let grad_fn = FillBackward {
            input: input.clone(),
            scale: 1.0,
        };
        attach_grad_fn(&result, Arc::new(grad_fn), 0);
    }
    Ok(result)
}

/// Backward of a full reduction: broadcasts `scale * upstream` to the input shape.
#[derive(Debug)]
pub(crate) struct FillBackward {
    pub(crate) input: Tensor,
    pub(crate) scale: f32,
}

impl BackwardOp for FillBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        let upstream = single_grad(grad_outputs, "FillBackward")?.item()?;
        Ok(vec![Some(full(&self.input.shape(), upstream * self.scale)?)])
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone()]
    }
}

impl Tensor {
    /// Sum of all elements as a scalar. See [`sum_op`].
    pub fn sum(&self) -> Result<Tensor, MinetError> {
        sum_op(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{check_tensor_near, create_test_tensor_with_grad};

    #[test]
    fn test_sum_forward_and_backward() -> Result<(), MinetError> {
        let t = create_test_tensor_with_grad(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let s = t.sum()?;
        assert_eq!(s.shape(), Vec::<usize>::new());
        assert_eq!(s.item()?, 21.0);
        s.backward(None)?;
        check_tensor_near(&t.grad().unwrap(), &[2, 3], &[1.0; 6], 1e-7);
        Ok(())
    }
}
