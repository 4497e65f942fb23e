//! LightMINet: a VGG16 encoder, a light multi-scale aggregation stage and a
//! top-down decoder of scale-interaction modules, producing a one-channel
//! saliency probability map.
//!
//! The network can run a standard forward pass or a gradient-checkpointed one
//! that keeps only segment boundaries alive and recomputes the rest during
//! backward.

pub mod backbone;
pub mod config;
pub mod decoder;
pub mod network;
pub mod segments;
pub mod sim;
pub mod transform;

pub use backbone::{Backbone, Vgg16Backbone};
pub use config::LightMINetConfig;
pub use network::LightMINet;

/// Number of pyramid levels (strides 1, 2, 4, 8, 16).
pub const NUM_LEVELS: usize = 5;
