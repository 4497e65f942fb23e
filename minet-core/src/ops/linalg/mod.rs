//! Dense matrix kernels over row-major slices.
//!
//! These are the building blocks of the convolution op; they do not record
//! autograd nodes themselves.

pub mod gemm;

pub(crate) use gemm::{gemm, gemm_a_bt, gemm_at_b};
