use std::sync::Arc;

use minet_core::autograd::{checkpoint, Segment};
use minet_core::nn::{BasicConv2d, Conv2dOptions, Layer, Module};
use minet_core::utils::testing::check_grads_close;
use minet_core::{memory, MinetError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

mod common;
use common::{init_logger, seeded_input};

fn conv_chain(seed: u64) -> Result<Vec<Arc<BasicConv2d>>, MinetError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let widths = [(2, 4), (4, 4), (4, 3)];
    widths
        .iter()
        .map(|&(i, o)| {
            BasicConv2d::new(i, o, 3, Conv2dOptions::same(3), 0.1, 1e-5, &mut rng).map(Arc::new)
        })
        .collect()
}

fn chain_segments(chain: &[Arc<BasicConv2d>]) -> Vec<Segment> {
    chain
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            let layer = Arc::clone(layer);
            Segment::new(format!("block{i}"), 1, 1, move |inputs: &[Tensor]| {
                Ok(vec![layer.forward(&inputs[0])?])
            })
        })
        .collect()
}

fn run_direct(chain: &[Arc<BasicConv2d>], x: &Tensor) -> Result<Tensor, MinetError> {
    let mut h = x.clone();
    for layer in chain {
        h = layer.forward(&h)?;
    }
    h.sigmoid()
}

fn run_checkpointed(segments: &[Segment], x: &Tensor) -> Result<Tensor, MinetError> {
    let mut h = x.clone();
    for segment in segments {
        h = checkpoint(segment, &[h])?.remove(0);
    }
    h.sigmoid()
}

#[test]
fn test_checkpointed_conv_chain_matches_direct() -> Result<(), MinetError> {
    init_logger();
    let chain = conv_chain(21)?;
    let segments = chain_segments(&chain);

    let x_direct = seeded_input(&[2, 2, 8, 8], 4);
    x_direct.set_requires_grad(true)?;
    let direct = run_direct(&chain, &x_direct)?;
    direct.mean()?.backward(None)?;
    let direct_grads: Vec<Tensor> = chain
        .iter()
        .flat_map(|layer| layer.parameters())
        .map(|p| p.grad().expect("direct parameter grad"))
        .collect();
    chain.iter().for_each(|layer| layer.zero_grad());

    let x_ckpt = seeded_input(&[2, 2, 8, 8], 4);
    x_ckpt.set_requires_grad(true)?;
    let ckpt = run_checkpointed(&segments, &x_ckpt)?;
    assert_eq!(ckpt.get_f32_data()?, direct.get_f32_data()?);
    ckpt.mean()?.backward(None)?;

    let params: Vec<_> = chain.iter().flat_map(|layer| layer.parameters()).collect();
    assert_eq!(params.len(), direct_grads.len());
    for (param, expected) in params.iter().zip(&direct_grads) {
        let actual = param.grad().expect("checkpointed parameter grad");
        check_grads_close(&actual, expected, 1e-5, 1e-4);
    }
    check_grads_close(
        &x_ckpt.grad().expect("checkpointed input grad"),
        &x_direct.grad().expect("direct input grad"),
        1e-5,
        1e-4,
    );
    Ok(())
}

#[test]
fn test_replay_does_not_touch_running_stats() -> Result<(), MinetError> {
    init_logger();
    let chain = conv_chain(5)?;
    let segments = chain_segments(&chain);
    let x = seeded_input(&[1, 2, 4, 4], 9);
    x.set_requires_grad(true)?;

    let out = run_checkpointed(&segments, &x)?;
    let stats_after_forward: Vec<_> = chain
        .iter()
        .map(|layer| running_mean(layer))
        .collect();
    out.sum()?.backward(None)?;
    let stats_after_backward: Vec<_> = chain
        .iter()
        .map(|layer| running_mean(layer))
        .collect();
    assert_eq!(stats_after_forward, stats_after_backward);
    Ok(())
}

fn running_mean(layer: &BasicConv2d) -> Vec<f32> {
    layer.bn().running_stats().mean
}

#[test]
fn test_checkpointed_chain_lowers_peak_memory() -> Result<(), MinetError> {
    init_logger();
    let chain = conv_chain(8)?;
    let segments = chain_segments(&chain);

    let measure = |checkpointed: bool| -> Result<usize, MinetError> {
        let x = seeded_input(&[1, 2, 16, 16], 1);
        x.set_requires_grad(true)?;
        memory::reset_peak();
        let out = if checkpointed {
            run_checkpointed(&segments, &x)?
        } else {
            run_direct(&chain, &x)?
        };
        out.sum()?.backward(None)?;
        chain.iter().for_each(|layer| layer.zero_grad());
        Ok(memory::peak_bytes())
    };

    let standard = measure(false)?;
    let checkpointed = measure(true)?;
    assert!(
        checkpointed <= standard,
        "checkpointed peak {checkpointed} exceeds standard peak {standard}"
    );
    Ok(())
}
