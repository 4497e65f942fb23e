use crate::tensor::Tensor;

/// Checks if two tensors are approximately equal (shape and data within tolerance).
/// Panics if shapes differ or data differs significantly.
pub fn check_tensor_near(
    actual: &Tensor,
    expected_shape: &[usize],
    expected_data: &[f32],
    tolerance: f32,
) {
    assert_eq!(actual.shape(), expected_shape, "Shape mismatch");

    let actual_data_vec = actual
        .get_f32_data()
        .expect("Failed to get data in check_tensor_near");

    assert_eq!(
        actual_data_vec.len(),
        expected_data.len(),
        "Data length mismatch"
    );

    for (i, (a, e)) in actual_data_vec.iter().zip(expected_data.iter()).enumerate() {
        let diff = (*a - *e).abs();
        if diff > tolerance {
            panic!(
                "Data mismatch at index {}: actual={:?}, expected={:?}, diff={:?}, tolerance={:?}",
                i, a, e, diff, tolerance
            );
        }
    }
}

/// Asserts that two gradients agree within `abs_tol + rel_tol * |expected|` per element.
///
/// Checkpointed and standard backward passes sum the same terms in a different
/// order, so their gradients agree only up to f32 rounding.
pub fn check_grads_close(actual: &Tensor, expected: &Tensor, abs_tol: f32, rel_tol: f32) {
    assert_eq!(actual.shape(), expected.shape(), "Gradient shape mismatch");
    let a = actual.get_f32_data().expect("Failed to read actual gradient");
    let e = expected.get_f32_data().expect("Failed to read expected gradient");
    for (i, (x, y)) in a.iter().zip(e.iter()).enumerate() {
        let bound = abs_tol + rel_tol * y.abs();
        assert!(
            (x - y).abs() <= bound,
            "Gradient mismatch at index {i}: actual={x:?}, expected={y:?}, bound={bound:?}"
        );
    }
}

/// Helper to create a simple f32 tensor for testing purposes.
pub fn create_test_tensor(data: Vec<f32>, shape: Vec<usize>) -> Tensor {
    Tensor::new(data, shape).expect("Failed to create test tensor")
}

/// Helper to create a simple f32 tensor that requires gradient for testing.
pub fn create_test_tensor_with_grad(data: Vec<f32>, shape: Vec<usize>) -> Tensor {
    let tensor = Tensor::new(data, shape).expect("Failed to create test tensor with grad");
    tensor.write_data().requires_grad = true;
    tensor
}
