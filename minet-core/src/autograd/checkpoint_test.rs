use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::memory;
use crate::utils::testing::{check_grads_close, create_test_tensor, create_test_tensor_with_grad};

/// relu(x + w) followed by sigmoid, with `w` captured like a layer parameter.
fn shifted_sigmoid_segment(weight: Tensor) -> Segment {
    Segment::new("shifted_sigmoid", 1, 1, move |inputs| {
        let shifted = inputs[0].add(&weight)?.relu()?;
        Ok(vec![shifted.sigmoid()?])
    })
}

#[test]
fn test_checkpoint_matches_direct_call() -> Result<(), MinetError> {
    let weight = create_test_tensor_with_grad(vec![0.5, -1.0, 0.25, 2.0], vec![4]);
    let segment = shifted_sigmoid_segment(weight.clone());

    let x_direct = create_test_tensor_with_grad(vec![1.0, 0.3, -2.0, 0.7], vec![4]);
    let direct = segment.call(&[x_direct.clone()])?;
    direct[0].sum()?.backward(None)?;
    let w_grad_direct = weight.grad().expect("direct weight grad");
    weight.clear_grad();

    let x_ckpt = create_test_tensor_with_grad(vec![1.0, 0.3, -2.0, 0.7], vec![4]);
    let ckpt = checkpoint(&segment, &[x_ckpt.clone()])?;
    assert_eq!(ckpt[0].get_f32_data()?, direct[0].get_f32_data()?);
    ckpt[0].sum()?.backward(None)?;

    let w_grad_ckpt = weight.grad().expect("checkpointed weight grad");
    check_grads_close(&w_grad_ckpt, &w_grad_direct, 1e-6, 1e-5);
    check_grads_close(
        &x_ckpt.grad().expect("checkpointed input grad"),
        &x_direct.grad().expect("direct input grad"),
        1e-6,
        1e-5,
    );
    Ok(())
}

#[test]
fn test_checkpoint_without_grad_inputs_is_plain() -> Result<(), MinetError> {
    let weight = create_test_tensor_with_grad(vec![0.5, -1.0], vec![2]);
    let segment = shifted_sigmoid_segment(weight);
    let x = create_test_tensor(vec![1.0, 2.0], vec![2]);
    let out = checkpoint(&segment, &[x])?;
    // Differentiability is inferred from the inputs only.
    assert!(!out[0].requires_grad());
    assert!(out[0].grad_fn().is_none());
    Ok(())
}

#[test]
fn test_checkpoint_under_no_grad_is_plain() -> Result<(), MinetError> {
    let segment = Segment::new("relu", 1, 1, |inputs| Ok(vec![inputs[0].relu()?]));
    let x = create_test_tensor_with_grad(vec![1.0, -1.0], vec![2]);
    let _guard = NoGradGuard::new();
    let out = checkpoint(&segment, &[x])?;
    assert!(out[0].grad_fn().is_none());
    Ok(())
}

#[test]
fn test_checkpoint_outputs_share_one_node() -> Result<(), MinetError> {
    let segment = Segment::new("split", 1, 2, |inputs| {
        Ok(vec![inputs[0].relu()?, inputs[0].sigmoid()?])
    });
    let x = create_test_tensor_with_grad(vec![1.0, -1.0], vec![2]);
    let out = checkpoint(&segment, &[x])?;
    let a = out[0].grad_fn().expect("first output node");
    let b = out[1].grad_fn().expect("second output node");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.num_outputs(), 2);
    assert_eq!(out[1].read_data().output_index, 1);
    Ok(())
}

#[test]
fn test_checkpoint_unused_output_gets_no_gradient() -> Result<(), MinetError> {
    let segment = Segment::new("split", 1, 2, |inputs| {
        Ok(vec![inputs[0].relu()?, inputs[0].sigmoid()?])
    });
    let x = create_test_tensor_with_grad(vec![1.0, -1.0], vec![2]);
    let out = checkpoint(&segment, &[x.clone()])?;
    // Only the relu branch reaches the loss.
    out[0].sum()?.backward(None)?;
    let grad = x.grad().expect("input grad");
    assert_eq!(grad.get_f32_data()?, vec![1.0, 0.0]);
    Ok(())
}

#[test]
fn test_checkpoint_replays_with_recompute_flag() -> Result<(), MinetError> {
    let calls = Arc::new(AtomicUsize::new(0));
    let saw_recompute = Arc::new(AtomicBool::new(false));
    let segment = {
        let calls = Arc::clone(&calls);
        let saw_recompute = Arc::clone(&saw_recompute);
        Segment::new("probe", 1, 1, move |inputs| {
            calls.fetch_add(1, Ordering::SeqCst);
            if crate::autograd::is_recomputing() {
                saw_recompute.store(true, Ordering::SeqCst);
            }
            Ok(vec![inputs[0].relu()?])
        })
    };
    let x = create_test_tensor_with_grad(vec![1.0, 2.0], vec![2]);
    let out = checkpoint(&segment, &[x])?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!saw_recompute.load(Ordering::SeqCst));

    out[0].sum()?.backward(None)?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(saw_recompute.load(Ordering::SeqCst));
    assert!(!crate::autograd::is_recomputing());
    Ok(())
}

#[test]
fn test_checkpoint_frees_intermediates() -> Result<(), MinetError> {
    let chain = Segment::new("chain", 1, 1, |inputs| {
        let a = inputs[0].relu()?;
        let b = a.sigmoid()?;
        let c = b.relu()?;
        Ok(vec![c.sigmoid()?])
    });
    let x = create_test_tensor_with_grad(vec![0.5; 1024], vec![1024]);
    let base = memory::live_bytes();

    let direct = chain.call(&[x.clone()])?;
    let direct_held = memory::live_bytes() - base;
    drop(direct);

    let ckpt = checkpoint(&chain, &[x])?;
    let ckpt_held = memory::live_bytes() - base;
    drop(ckpt);

    assert_eq!(direct_held, 4 * 1024 * 4);
    assert_eq!(ckpt_held, 1024 * 4);
    Ok(())
}

#[test]
fn test_segment_arity_is_checked() {
    let segment = Segment::new("pair", 2, 1, |inputs| Ok(vec![inputs[0].clone()]));
    let x = create_test_tensor(vec![1.0], vec![1]);
    match segment.call(&[x.clone()]) {
        Err(MinetError::SegmentArity { direction, expected, actual, .. }) => {
            assert_eq!(direction, "inputs");
            assert_eq!((expected, actual), (2, 1));
        }
        other => panic!("expected SegmentArity, got {other:?}"),
    }

    let bad_outputs = Segment::new("bad", 1, 2, |inputs| Ok(vec![inputs[0].clone()]));
    assert!(matches!(
        checkpoint(&bad_outputs, &[x]),
        Err(MinetError::SegmentArity { direction: "outputs", .. })
    ));
}

#[test]
fn test_replay_error_aborts_backward() -> Result<(), MinetError> {
    let calls = Arc::new(AtomicUsize::new(0));
    let segment = {
        let calls = Arc::clone(&calls);
        Segment::new("flaky", 1, 1, move |inputs| {
            if calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(MinetError::InternalError("replay failed".to_string()));
            }
            Ok(vec![inputs[0].relu()?])
        })
    };
    let x = create_test_tensor_with_grad(vec![1.0], vec![1]);
    let out = checkpoint(&segment, &[x.clone()])?;
    let result = out[0].sum()?.backward(None);
    assert_eq!(
        result,
        Err(MinetError::InternalError("replay failed".to_string()))
    );
    assert!(x.grad().is_none());
    Ok(())
}

#[test]
fn test_segment_returning_captured_parameter() -> Result<(), MinetError> {
    let weight = create_test_tensor_with_grad(vec![3.0], vec![1]);
    let segment = {
        let weight = weight.clone();
        Segment::new("passthrough", 1, 2, move |inputs| {
            Ok(vec![inputs[0].relu()?, weight.clone()])
        })
    };
    let x = create_test_tensor_with_grad(vec![2.0], vec![1]);
    let out = checkpoint(&segment, &[x])?;
    // The parameter itself must stay a leaf.
    assert!(weight.is_leaf());
    out[0].add(&out[1])?.sum()?.backward(None)?;
    assert_eq!(weight.grad().expect("weight grad").get_f32_data()?, vec![1.0]);
    Ok(())
}

#[test]
fn test_carrier_segment_requires_carrier() {
    let segment = Segment::new("stem", 2, 1, |inputs| Ok(vec![inputs[0].relu()?])).with_gradient_carrier();
    let image = create_test_tensor(vec![1.0], vec![1]);
    assert_eq!(
        segment.call(&[image]),
        Err(MinetError::MissingGradientCarrier {
            segment: "stem".to_string()
        })
    );
}

#[test]
fn test_carrier_makes_parameters_trainable() -> Result<(), MinetError> {
    let weight = create_test_tensor_with_grad(vec![0.5, 0.5], vec![2]);
    let segment = {
        let weight = weight.clone();
        Segment::new("stem", 2, 1, move |inputs| Ok(vec![inputs[0].add(&weight)?]))
            .with_gradient_carrier()
    };
    let image = create_test_tensor(vec![1.0, 2.0], vec![2]);
    let carrier = create_test_tensor_with_grad(vec![1.0], vec![1]);

    let out = checkpoint(&segment, &[image, carrier.clone()])?;
    out[0].sum()?.backward(None)?;
    assert_eq!(weight.grad().expect("weight grad").get_f32_data()?, vec![1.0, 1.0]);
    // The carrier is not part of the computation.
    assert!(carrier.grad().is_none());
    Ok(())
}
