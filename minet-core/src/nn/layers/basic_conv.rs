use rand::rngs::StdRng;

use crate::error::MinetError;
use crate::nn::layers::{BatchNorm2d, Conv2d, Conv2dOptions};
use crate::nn::module::{Layer, Module};
use crate::tensor::Tensor;

/// `relu(bn(conv(x)))`, the standard convolution unit of the network.
#[derive(Debug)]
pub struct BasicConv2d {
    conv: Conv2d,
    bn: BatchNorm2d,
}

impl BasicConv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        options: Conv2dOptions,
        bn_momentum: f32,
        bn_eps: f32,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        Ok(BasicConv2d {
            conv: Conv2d::new(in_channels, out_channels, kernel_size, options, rng)?,
            bn: BatchNorm2d::new(out_channels, bn_momentum, bn_eps)?,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.conv.in_channels()
    }

    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    pub fn bn(&self) -> &BatchNorm2d {
        &self.bn
    }
}

impl Module for BasicConv2d {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        vec![
            ("conv".to_string(), &self.conv as &dyn Module),
            ("bn".to_string(), &self.bn as &dyn Module),
        ]
    }
}

impl Layer for BasicConv2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        self.bn.forward(&self.conv.forward(input)?)?.relu()
    }
}
