// src/nn/layers/mod.rs

pub mod basic_conv;
pub mod batch_norm;
pub mod conv2d;

pub use basic_conv::BasicConv2d;
pub use batch_norm::BatchNorm2d;
pub use conv2d::{Conv2d, Conv2dOptions};
