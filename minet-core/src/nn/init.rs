//! Parameter initialisers. All randomness comes from a caller-provided
//! `StdRng` so that a model built from a seed is reproducible.

use rand::rngs::StdRng;

use crate::error::MinetError;
use crate::tensor::{full, uniform, Tensor};

/// Fan-in of a conv weight `[out, in, kh, kw]` (or any `[out, ...]` weight).
pub fn fan_in(shape: &[usize]) -> usize {
    shape.iter().skip(1).product::<usize>().max(1)
}

/// Kaiming (He) uniform initialisation for a leaky-ReLU slope `a`:
/// `U(-bound, bound)` with `bound = sqrt(2 / (1 + a²)) * sqrt(3 / fan_in)`.
pub fn kaiming_uniform(shape: &[usize], a: f32, rng: &mut StdRng) -> Result<Tensor, MinetError> {
    let gain = (2.0 / (1.0 + a * a)).sqrt();
    let bound = gain * (3.0 / fan_in(shape) as f32).sqrt();
    uniform(shape, -bound, bound, rng)
}

/// Bias initialisation `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
pub fn uniform_bias(shape: &[usize], fan_in: usize, rng: &mut StdRng) -> Result<Tensor, MinetError> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    uniform(shape, -bound, bound, rng)
}

pub fn constant(shape: &[usize], value: f32) -> Result<Tensor, MinetError> {
    full(shape, value)
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests;
