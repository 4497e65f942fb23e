// src/nn/mod.rs

pub mod init;
pub mod layers;
pub mod module;
pub mod parameter;

pub use layers::{BasicConv2d, BatchNorm2d, Conv2d, Conv2dOptions};
pub use module::{Layer, Module};
pub use parameter::Parameter;
