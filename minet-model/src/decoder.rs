use minet_core::nn::{BasicConv2d, Conv2dOptions, Layer, Module};
use minet_core::{MinetError, Tensor};
use rand::rngs::StdRng;

use crate::sim::Sim;

/// One top-down decoding step.
///
/// The coarser decoder output (if any) is upsampled and added to the lateral
/// transformed feature, the sum is refined by `SIM(f) + f`, and a 3x3
/// conv-BN-ReLU projects it to the stage's output width.
#[derive(Debug)]
pub struct DecoderStage {
    sim: Sim,
    upconv: BasicConv2d,
}

impl DecoderStage {
    pub fn new(
        in_channels: usize,
        sim_low_channels: usize,
        out_channels: usize,
        bn_momentum: f32,
        bn_eps: f32,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        Ok(DecoderStage {
            sim: Sim::new(in_channels, sim_low_channels, bn_momentum, bn_eps, rng)?,
            upconv: BasicConv2d::new(
                in_channels,
                out_channels,
                3,
                Conv2dOptions::same(3),
                bn_momentum,
                bn_eps,
                rng,
            )?,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.sim.channels()
    }

    pub fn out_channels(&self) -> usize {
        self.upconv.out_channels()
    }

    pub fn forward(&self, lateral: &Tensor, coarser: Option<&Tensor>) -> Result<Tensor, MinetError> {
        let fused = match coarser {
            Some(coarser) => coarser.upsample_add(lateral)?,
            None => lateral.clone(),
        };
        let refined = self.sim.forward(&fused)?.add(&fused)?;
        self.upconv.forward(&refined)
    }
}

impl Module for DecoderStage {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        vec![
            ("sim".to_string(), &self.sim as &dyn Module),
            ("upconv".to_string(), &self.upconv as &dyn Module),
        ]
    }
}
