// src/tensor/create.rs

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::MinetError;
use crate::tensor::Tensor;

/// Creates a tensor filled with `value`.
pub fn full(shape: &[usize], value: f32) -> Result<Tensor, MinetError> {
    let numel: usize = shape.iter().product();
    Tensor::new(vec![value; numel], shape.to_vec())
}

/// Creates a tensor filled with zeros.
pub fn zeros(shape: &[usize]) -> Result<Tensor, MinetError> {
    full(shape, 0.0)
}

/// Creates a tensor filled with ones.
pub fn ones(shape: &[usize]) -> Result<Tensor, MinetError> {
    full(shape, 1.0)
}

/// Creates a zero tensor with the same shape as `other`.
pub fn zeros_like(other: &Tensor) -> Result<Tensor, MinetError> {
    zeros(&other.shape())
}

/// Samples a tensor from the standard normal distribution.
pub fn randn(shape: &[usize], rng: &mut StdRng) -> Result<Tensor, MinetError> {
    let normal = Normal::new(0.0f32, 1.0f32)
        .map_err(|e| MinetError::InternalError(format!("normal distribution: {e}")))?;
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| normal.sample(rng)).collect();
    Tensor::new(data, shape.to_vec())
}

/// Samples a tensor uniformly from `[low, high)`.
pub fn uniform(shape: &[usize], low: f32, high: f32, rng: &mut StdRng) -> Result<Tensor, MinetError> {
    if !(low < high) {
        return Err(MinetError::InvalidConfiguration(format!(
            "uniform bounds must satisfy low < high, got [{low}, {high})"
        )));
    }
    let dist = Uniform::new(low, high);
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| dist.sample(rng)).collect();
    Tensor::new(data, shape.to_vec())
}

#[cfg(test)]
#[path = "create_test.rs"]
mod tests;
