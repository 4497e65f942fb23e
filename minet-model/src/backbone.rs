use std::sync::Arc;

use log::debug;
use minet_core::nn::{BasicConv2d, Conv2dOptions, Layer, Module};
use minet_core::{MinetError, Tensor};
use rand::rngs::StdRng;

use crate::NUM_LEVELS;

/// Number of 3x3 convolutions in each VGG16 stage.
const VGG16_DEPTHS: [usize; NUM_LEVELS] = [2, 2, 3, 3, 3];

/// A five-stage encoder producing a feature pyramid at strides 1, 2, 4, 8, 16.
///
/// Each stage is exposed as its own [`Layer`] so that it can run as an
/// independent checkpoint segment.
pub trait Backbone: Module {
    fn in_channels(&self) -> usize;

    /// Output width of each stage, finest first.
    fn out_channels(&self) -> [usize; NUM_LEVELS];

    /// Shared handles to the stages, finest first. Stage `i + 1` consumes the
    /// output of stage `i`.
    fn stages(&self) -> [Arc<dyn Layer>; NUM_LEVELS];

    /// The backbone as a module node, for tree traversal by its owner.
    fn as_module(&self) -> &dyn Module;
}

/// One VGG16 stage: an optional 2x2 max-pool followed by conv-BN-ReLU units.
#[derive(Debug)]
pub struct VggStage {
    pool: bool,
    convs: Vec<(String, BasicConv2d)>,
}

impl VggStage {
    fn new(
        index: usize,
        in_channels: usize,
        out_channels: usize,
        bn: (f32, f32),
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        let mut convs = Vec::with_capacity(VGG16_DEPTHS[index]);
        let mut channels = in_channels;
        for j in 0..VGG16_DEPTHS[index] {
            let options = Conv2dOptions::same(3);
            let conv = BasicConv2d::new(channels, out_channels, 3, options, bn.0, bn.1, rng)?;
            convs.push((format!("conv{}_{}", index + 1, j + 1), conv));
            channels = out_channels;
        }
        Ok(VggStage {
            pool: index > 0,
            convs,
        })
    }

    pub fn out_channels(&self) -> usize {
        self.convs
            .last()
            .map(|(_, conv)| conv.out_channels())
            .unwrap_or_default()
    }
}

impl Module for VggStage {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        self.convs
            .iter()
            .map(|(name, conv)| (name.clone(), conv as &dyn Module))
            .collect()
    }
}

impl Layer for VggStage {
    fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        let mut x = if self.pool {
            input.max_pool2d(2, 2)?
        } else {
            input.clone()
        };
        for (_, conv) in &self.convs {
            x = conv.forward(&x)?;
        }
        Ok(x)
    }
}

/// VGG16 with batch normalization, split after each pooling boundary.
#[derive(Debug)]
pub struct Vgg16Backbone {
    in_channels: usize,
    stages: [Arc<VggStage>; NUM_LEVELS],
}

impl Vgg16Backbone {
    /// Builds the encoder with the given stage widths (VGG16 uses 64/128/256/512/512).
    pub fn new(
        in_channels: usize,
        widths: [usize; NUM_LEVELS],
        bn_momentum: f32,
        bn_eps: f32,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        let mut stages = Vec::with_capacity(NUM_LEVELS);
        let mut channels = in_channels;
        for (i, &width) in widths.iter().enumerate() {
            stages.push(Arc::new(VggStage::new(i, channels, width, (bn_momentum, bn_eps), rng)?));
            channels = width;
        }
        let stages: [Arc<VggStage>; NUM_LEVELS] = stages
            .try_into()
            .map_err(|_| MinetError::InternalError("VGG16 stage count".to_string()))?;
        debug!("Vgg16Backbone: stage widths {widths:?}");
        Ok(Vgg16Backbone { in_channels, stages })
    }
}

impl Module for Vgg16Backbone {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, stage)| (format!("encoder{}", 1 << i), stage.as_ref() as &dyn Module))
            .collect()
    }
}

impl Backbone for Vgg16Backbone {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> [usize; NUM_LEVELS] {
        let mut widths = [0; NUM_LEVELS];
        for (w, stage) in widths.iter_mut().zip(&self.stages) {
            *w = stage.out_channels();
        }
        widths
    }

    fn stages(&self) -> [Arc<dyn Layer>; NUM_LEVELS] {
        self.stages.clone().map(|stage| stage as Arc<dyn Layer>)
    }

    fn as_module(&self) -> &dyn Module {
        self
    }
}
