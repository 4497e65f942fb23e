use super::*;
use crate::autograd::grad_check::check_grad;
use crate::utils::testing::{check_tensor_near, create_test_tensor, create_test_tensor_with_grad};

fn affine(channels: usize) -> (Tensor, Tensor) {
    (
        create_test_tensor(vec![1.0; channels], vec![channels]),
        create_test_tensor(vec![0.0; channels], vec![channels]),
    )
}

#[test]
fn test_batch_norm_train_normalizes_each_channel() -> Result<(), MinetError> {
    // Channel 0: [1, 3] -> mean 2, var 1. Channel 1: [10, 10] -> mean 10, var 0.
    let input = create_test_tensor(vec![1.0, 10.0, 3.0, 10.0], vec![2, 2, 1, 1]);
    let (weight, bias) = affine(2);
    let (output, stats) = batch_norm_op(&input, &weight, &bias, BatchNormMode::Train, 0.0)?;
    let stats = stats.expect("training mode reports statistics");
    assert_eq!(stats.mean, vec![2.0, 10.0]);
    assert_eq!(stats.var, vec![1.0, 0.0]);
    assert_eq!(stats.count, 2);
    assert_eq!(stats.unbiased_var(), vec![2.0, 0.0]);
    // Zero variance with eps 0 gives 0 * inf for channel 1; check channel 0 only.
    let data = output.get_f32_data()?;
    assert_eq!((data[0], data[2]), (-1.0, 1.0));
    Ok(())
}

#[test]
fn test_batch_norm_affine_parameters() -> Result<(), MinetError> {
    let input = create_test_tensor(vec![1.0, 3.0], vec![1, 1, 1, 2]);
    let weight = create_test_tensor(vec![2.0], vec![1]);
    let bias = create_test_tensor(vec![0.5], vec![1]);
    let (output, _) = input.batch_norm(&weight, &bias, BatchNormMode::Train, 0.0)?;
    check_tensor_near(&output, &[1, 1, 1, 2], &[-1.5, 2.5], 1e-6);
    Ok(())
}

#[test]
fn test_batch_norm_eval_uses_running_stats() -> Result<(), MinetError> {
    let input = create_test_tensor(vec![5.0, 7.0], vec![1, 1, 1, 2]);
    let (weight, bias) = affine(1);
    let mode = BatchNormMode::Eval {
        running_mean: &[5.0],
        running_var: &[4.0],
    };
    let (output, stats) = batch_norm_op(&input, &weight, &bias, mode, 0.0)?;
    assert!(stats.is_none());
    check_tensor_near(&output, &[1, 1, 1, 2], &[0.0, 1.0], 1e-6);
    Ok(())
}

#[test]
fn test_batch_norm_eval_checks_stat_length() {
    let input = create_test_tensor(vec![0.0; 4], vec![1, 2, 1, 2]);
    let (weight, bias) = affine(2);
    let mode = BatchNormMode::Eval {
        running_mean: &[0.0],
        running_var: &[1.0],
    };
    assert!(matches!(
        batch_norm_op(&input, &weight, &bias, mode, 1e-5),
        Err(MinetError::ChannelMismatch { .. })
    ));
}

#[test]
fn test_batch_norm_weight_shape_checked() {
    let input = create_test_tensor(vec![0.0; 4], vec![1, 2, 1, 2]);
    let (weight, bias) = affine(3);
    assert!(matches!(
        batch_norm_op(&input, &weight, &bias, BatchNormMode::Train, 1e-5),
        Err(MinetError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_batch_norm_train_grad_check() {
    let data: Vec<f32> = (0..2 * 2 * 3 * 3).map(|i| ((i * 7 % 11) as f32) * 0.3 - 1.2).collect();
    let input = create_test_tensor_with_grad(data, vec![2, 2, 3, 3]);
    let weight = create_test_tensor_with_grad(vec![1.5, -0.7], vec![2]);
    let bias = create_test_tensor_with_grad(vec![0.2, 0.4], vec![2]);
    let output_grad_data: Vec<f32> = (0..36).map(|i| ((i * 5 % 13) as f32) * 0.1 - 0.6).collect();
    let output_grad = create_test_tensor(output_grad_data, vec![2, 2, 3, 3]);
    check_grad(
        |inputs| {
            batch_norm_op(&inputs[0], &inputs[1], &inputs[2], BatchNormMode::Train, 1e-5)
                .map(|(out, _)| out)
        },
        &[input, weight, bias],
        &output_grad,
        1e-2,
        2e-2,
    )
    .unwrap_or_else(|e| panic!("batch_norm grad check failed: {e}"));
}

#[test]
fn test_batch_norm_eval_grad_check() {
    let data: Vec<f32> = (0..12).map(|i| (i as f32 * 0.9).cos()).collect();
    let input = create_test_tensor_with_grad(data, vec![1, 3, 2, 2]);
    let weight = create_test_tensor_with_grad(vec![0.5, 1.0, 2.0], vec![3]);
    let bias = create_test_tensor_with_grad(vec![0.0, 0.1, -0.1], vec![3]);
    let output_grad = create_test_tensor((0..12).map(|i| i as f32 * 0.1).collect(), vec![1, 3, 2, 2]);
    let running_mean = [0.1f32, -0.2, 0.3];
    let running_var = [1.0f32, 0.5, 2.0];
    check_grad(
        |inputs| {
            let mode = BatchNormMode::Eval {
                running_mean: &running_mean,
                running_var: &running_var,
            };
            batch_norm_op(&inputs[0], &inputs[1], &inputs[2], mode, 1e-5).map(|(out, _)| out)
        },
        &[input, weight, bias],
        &output_grad,
        1e-2,
        1e-2,
    )
    .unwrap_or_else(|e| panic!("eval batch_norm grad check failed: {e}"));
}
