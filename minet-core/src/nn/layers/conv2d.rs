use rand::rngs::StdRng;

use crate::error::MinetError;
use crate::nn::init::{fan_in, kaiming_uniform, uniform_bias};
use crate::nn::module::{Layer, Module};
use crate::nn::Parameter;
use crate::ops::conv::conv2d_op;
use crate::tensor::Tensor;

/// Stride, padding and bias of a [`Conv2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dOptions {
    pub stride: usize,
    pub padding: usize,
    pub bias: bool,
}

impl Conv2dOptions {
    /// Stride 1 with "same" padding for an odd kernel.
    pub fn same(kernel_size: usize) -> Self {
        Conv2dOptions {
            stride: 1,
            padding: kernel_size / 2,
            bias: true,
        }
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }
}

/// 2D convolution layer with a square kernel.
#[derive(Debug)]
pub struct Conv2d {
    weight: Parameter,
    bias: Option<Parameter>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    options: Conv2dOptions,
}

impl Conv2d {
    /// Creates a layer whose weight is drawn with Kaiming-uniform (`a = sqrt(5)`)
    /// and whose bias, if any, with `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        options: Conv2dOptions,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        if in_channels == 0 || out_channels == 0 || kernel_size == 0 || options.stride == 0 {
            return Err(MinetError::InvalidConfiguration(format!(
                "Conv2d({in_channels}, {out_channels}, kernel {kernel_size}, stride {}) has a zero dimension",
                options.stride
            )));
        }
        let shape = [out_channels, in_channels, kernel_size, kernel_size];
        let weight = Parameter::new(
            kaiming_uniform(&shape, 5f32.sqrt(), rng)?,
            Some("weight".to_string()),
        );
        let bias = if options.bias {
            let tensor = uniform_bias(&[out_channels], fan_in(&shape), rng)?;
            Some(Parameter::new(tensor, Some("bias".to_string())))
        } else {
            None
        };
        Ok(Conv2d {
            weight,
            bias,
            in_channels,
            out_channels,
            kernel_size,
            options,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }
}

impl Module for Conv2d {
    fn local_parameters(&self) -> Vec<(String, &Parameter)> {
        let mut params = vec![("weight".to_string(), &self.weight)];
        if let Some(bias) = &self.bias {
            params.push(("bias".to_string(), bias));
        }
        params
    }
}

impl Layer for Conv2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        conv2d_op(
            input,
            &self.weight,
            self.bias.as_ref().map(Parameter::tensor),
            self.options.stride,
            self.options.padding,
        )
    }
}
