use super::*;
use crate::autograd::grad_check::check_grad;
use crate::utils::testing::{check_tensor_near, create_test_tensor, create_test_tensor_with_grad};

#[test]
fn test_add_tensors_ok() -> Result<(), MinetError> {
    let t1 = create_test_tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    let t2 = create_test_tensor(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]);
    let result = add_op(&t1, &t2)?;
    check_tensor_near(&result, &[2, 2], &[6.0, 8.0, 10.0, 12.0], 1e-6);
    assert!(!result.requires_grad());
    Ok(())
}

#[test]
fn test_add_shape_mismatch_is_not_broadcast() {
    let t1 = create_test_tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    let t2 = create_test_tensor(vec![1.0, 2.0], vec![1, 2]);
    match add_op(&t1, &t2) {
        Err(MinetError::ShapeMismatch { operation, .. }) => assert_eq!(operation, "add"),
        other => panic!("Expected ShapeMismatch, got {:?}", other),
    }
}

#[test]
fn test_add_backward_accumulates_shared_input() -> Result<(), MinetError> {
    // y = x + x => dy/dx = 2
    let x = create_test_tensor_with_grad(vec![1.0, -1.0, 0.5], vec![3]);
    let y = x.add(&x)?;
    y.backward(Some(create_test_tensor(vec![1.0, 2.0, 3.0], vec![3])))?;
    let grad = x.grad().expect("x should have a gradient");
    check_tensor_near(&grad, &[3], &[2.0, 4.0, 6.0], 1e-6);
    Ok(())
}

#[test]
fn test_add_grad_check() {
    let a = create_test_tensor_with_grad(vec![0.3, -1.2, 2.0, 0.7], vec![2, 2]);
    let b = create_test_tensor_with_grad(vec![1.5, 0.1, -0.4, 0.9], vec![2, 2]);
    let output_grad = create_test_tensor(vec![0.5, -1.0, 2.0, 1.0], vec![2, 2]);
    check_grad(|inputs| add_op(&inputs[0], &inputs[1]), &[a, b], &output_grad, 1e-2, 1e-3)
        .unwrap_or_else(|e| panic!("add grad check failed: {e}"));
}
