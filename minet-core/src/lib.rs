//! Minimal f32 CPU tensor engine with reverse-mode autograd and activation
//! checkpointing, plus the layers needed to assemble convolutional networks.

pub mod autograd;
pub mod buffer;
pub mod error;
pub mod memory;
pub mod nn;
pub mod ops;
pub mod tensor;
pub mod tensor_data;
pub mod utils;

pub use error::MinetError;
pub use tensor::Tensor;
