//! Spatial resampling of NCHW feature maps.

pub mod interpolate;
pub mod upsample_add;

pub use interpolate::interpolate_bilinear_op;
pub use upsample_add::upsample_add_op;
