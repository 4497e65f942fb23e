//! Finite-difference gradient checking.

use approx::relative_eq;
use thiserror::Error;

use crate::autograd::NoGradGuard;
use crate::error::MinetError;
use crate::tensor::Tensor;

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Gradient check failed for input {input_index}, element {element_index}: analytical {analytical_grad:?} != numerical {numerical_grad:?} (difference {difference:?})")]
    GradientMismatch {
        input_index: usize,
        element_index: usize,
        analytical_grad: f64,
        numerical_grad: f64,
        difference: f64,
    },
    #[error("Forward function execution failed during gradient check: {0}")]
    ForwardPassError(MinetError),
    #[error("Backward pass execution failed during gradient check: {0}")]
    BackwardPassError(MinetError),
    #[error("Tensor error during intermediate calculation: {0}")]
    TensorError(MinetError),
    #[error("Input tensor {input_index} requires grad but has no gradient after backward pass.")]
    MissingAnalyticalGrad { input_index: usize },
    #[error("Numerical gradient is NaN or infinite for input {input_index}, element {element_index}")]
    NumericalGradNaNOrInfinite {
        input_index: usize,
        element_index: usize,
    },
    #[error("Gradient check input tensor must be a leaf node (no grad_fn). Input index: {input_index}")]
    InputNotLeaf { input_index: usize },
    #[error("Function did not propagate requires_grad correctly.")]
    RequiresGradPropagationError,
}

impl From<MinetError> for GradCheckError {
    fn from(err: MinetError) -> Self {
        GradCheckError::TensorError(err)
    }
}

/// Checks analytical gradients against central finite differences.
///
/// The scalar objective is `sum(func(inputs) * output_grad)`, evaluated in f64.
/// An element fails only if it is off both in absolute terms and relative to
/// the analytical value.
pub fn check_grad<F>(
    func: F,
    inputs: &[Tensor],
    output_grad: &Tensor,
    epsilon: f64,
    tolerance: f64,
) -> Result<(), GradCheckError>
where
    F: Fn(&[Tensor]) -> Result<Tensor, MinetError>,
{
    for (i, input) in inputs.iter().enumerate() {
        if input.requires_grad() && !input.is_leaf() {
            return Err(GradCheckError::InputNotLeaf { input_index: i });
        }
        input.clear_grad();
    }

    let output = func(inputs).map_err(GradCheckError::ForwardPassError)?;
    if inputs.iter().any(|t| t.requires_grad()) && !output.requires_grad() {
        return Err(GradCheckError::RequiresGradPropagationError);
    }
    if output.requires_grad() {
        output
            .backward(Some(output_grad.clone()))
            .map_err(GradCheckError::BackwardPassError)?;
    }
    let weights = output_grad.get_f32_data()?;

    for (i, original_input) in inputs.iter().enumerate() {
        if !original_input.requires_grad() {
            continue;
        }
        let analytical = original_input
            .grad()
            .ok_or(GradCheckError::MissingAnalyticalGrad { input_index: i })?
            .get_f32_data()?;
        let original_data = original_input.get_f32_data()?;

        for elem_idx in 0..original_data.len() {
            let objective_at = |delta: f64| -> Result<f64, GradCheckError> {
                let mut perturbed = original_data.clone();
                perturbed[elem_idx] = (f64::from(perturbed[elem_idx]) + delta) as f32;
                let mut trial_inputs = inputs.to_vec();
                trial_inputs[i] = Tensor::new(perturbed, original_input.shape())?;
                let _no_grad = NoGradGuard::new();
                let out = func(&trial_inputs).map_err(GradCheckError::ForwardPassError)?;
                weighted_sum(&out, &weights)
            };
            let loss_plus = objective_at(epsilon)?;
            let loss_minus = objective_at(-epsilon)?;
            let numerical_grad = (loss_plus - loss_minus) / (2.0 * epsilon);
            if !numerical_grad.is_finite() {
                return Err(GradCheckError::NumericalGradNaNOrInfinite {
                    input_index: i,
                    element_index: elem_idx,
                });
            }

            let analytical_grad = f64::from(analytical[elem_idx]);
            let difference = (analytical_grad - numerical_grad).abs();
            let close = difference <= tolerance
                || relative_eq!(analytical_grad, numerical_grad, max_relative = tolerance);
            if !close {
                return Err(GradCheckError::GradientMismatch {
                    input_index: i,
                    element_index: elem_idx,
                    analytical_grad,
                    numerical_grad,
                    difference,
                });
            }
        }
    }
    Ok(())
}

fn weighted_sum(output: &Tensor, weights: &[f32]) -> Result<f64, GradCheckError> {
    let values = output.get_f32_data()?;
    if values.len() != weights.len() {
        return Err(GradCheckError::TensorError(MinetError::ShapeMismatch {
            expected: vec![weights.len()],
            actual: output.shape(),
            operation: "check_grad (objective)".to_string(),
        }));
    }
    Ok(values
        .iter()
        .zip(weights)
        .map(|(&v, &w)| f64::from(v) * f64::from(w))
        .sum())
}
