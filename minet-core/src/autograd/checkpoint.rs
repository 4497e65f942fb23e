//! Activation checkpointing.
//!
//! A [`Segment`] is a pure function from a fixed number of tensors to a fixed
//! number of tensors. [`checkpoint`] runs it without recording its internal graph
//! and stores only the segment inputs. When the backward pass reaches the
//! segment, it is replayed with grad enabled and differentiated locally.

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::autograd::backward_op::attach_grad_fn;
use crate::autograd::grad_mode::RecomputeGuard;
use crate::autograd::{graph, is_grad_enabled, BackwardOp, EnableGradGuard, NoGradGuard};
use crate::error::MinetError;
use crate::tensor::Tensor;

/// Body of a segment. Must be deterministic: the replay has to produce the
/// same values as the original run.
pub type SegmentFn = dyn Fn(&[Tensor]) -> Result<Vec<Tensor>, MinetError> + Send + Sync;

/// A named, recomputable unit of a forward pass with fixed arity.
#[derive(Clone)]
pub struct Segment {
    name: String,
    num_inputs: usize,
    num_outputs: usize,
    takes_carrier: bool,
    run: Arc<SegmentFn>,
}

impl Segment {
    pub fn new<F>(name: impl Into<String>, num_inputs: usize, num_outputs: usize, run: F) -> Self
    where
        F: Fn(&[Tensor]) -> Result<Vec<Tensor>, MinetError> + Send + Sync + 'static,
    {
        Segment {
            name: name.into(),
            num_inputs,
            num_outputs,
            takes_carrier: false,
            run: Arc::new(run),
        }
    }

    /// Declares the last input a gradient carrier: a tensor that requires grad
    /// but takes no part in the computation. Its only role is to make
    /// [`checkpoint`] treat the segment as differentiable when the real inputs
    /// do not require grad, so that the segment's parameters still get
    /// gradients. `num_inputs` includes the carrier.
    pub fn with_gradient_carrier(mut self) -> Self {
        self.takes_carrier = true;
        self
    }

    pub fn takes_carrier(&self) -> bool {
        self.takes_carrier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Runs the segment body directly, recording whatever graph the current
    /// grad mode allows. Both the input and the output arity are checked.
    ///
    /// A carrier segment called without its carrier fails with
    /// `MissingGradientCarrier`.
    pub fn call(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, MinetError> {
        if self.takes_carrier && inputs.len() + 1 == self.num_inputs {
            return Err(MinetError::MissingGradientCarrier {
                segment: self.name.clone(),
            });
        }
        if inputs.len() != self.num_inputs {
            return Err(self.arity_error("inputs", self.num_inputs, inputs.len()));
        }
        let outputs = (self.run)(inputs)?;
        if outputs.len() != self.num_outputs {
            return Err(self.arity_error("outputs", self.num_outputs, outputs.len()));
        }
        Ok(outputs)
    }

    fn arity_error(&self, direction: &'static str, expected: usize, actual: usize) -> MinetError {
        MinetError::SegmentArity {
            segment: self.name.clone(),
            direction,
            expected,
            actual,
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("num_inputs", &self.num_inputs)
            .field("num_outputs", &self.num_outputs)
            .field("takes_carrier", &self.takes_carrier)
            .finish()
    }
}

/// Runs `segment` on `inputs` without keeping its intermediate activations.
///
/// The segment is differentiable if grad mode is enabled and at least one input
/// requires grad. In that case every output is linked to a single
/// `CheckpointBackward` node that holds the inputs and nothing else. Otherwise
/// the outputs are plain tensors without history, even if parameters inside the
/// segment require grad.
pub fn checkpoint(segment: &Segment, inputs: &[Tensor]) -> Result<Vec<Tensor>, MinetError> {
    let differentiable = is_grad_enabled() && inputs.iter().any(|t| t.requires_grad());
    debug!(
        "checkpoint: running segment '{}' (differentiable: {differentiable})",
        segment.name
    );

    let detached: Vec<Tensor> = inputs.iter().map(Tensor::detach).collect();
    let outputs = {
        let _no_grad = NoGradGuard::new();
        segment.call(&detached)?
    };
    drop(detached);

    // Outputs may alias inputs or captured parameters; detach so the node is
    // attached to fresh handles only.
    let outputs: Vec<Tensor> = outputs.iter().map(Tensor::detach).collect();
    if !differentiable {
        return Ok(outputs);
    }

    let node: Arc<dyn BackwardOp> = Arc::new(CheckpointBackward {
        segment: segment.clone(),
        inputs: inputs.to_vec(),
    });
    for (index, output) in outputs.iter().enumerate() {
        attach_grad_fn(output, Arc::clone(&node), index);
    }
    Ok(outputs)
}

/// Multi-output node standing for a whole checkpointed segment.
struct CheckpointBackward {
    segment: Segment,
    inputs: Vec<Tensor>,
}

impl fmt::Debug for CheckpointBackward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointBackward")
            .field("segment", &self.segment.name)
            .field("num_inputs", &self.inputs.len())
            .finish()
    }
}

impl BackwardOp for CheckpointBackward {
    fn backward(&self, grad_outputs: &[Option<Tensor>]) -> Result<Vec<Option<Tensor>>, MinetError> {
        debug!("checkpoint: replaying segment '{}'", self.segment.name);
        let mut replay_inputs = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let replay = input.detach();
            if input.requires_grad() {
                replay.set_requires_grad(true)?;
            }
            replay_inputs.push(replay);
        }

        let outputs = {
            let _grad = EnableGradGuard::new();
            let _recompute = RecomputeGuard::new();
            self.segment.call(&replay_inputs)?
        };
        if outputs.len() != grad_outputs.len() {
            return Err(MinetError::BackwardError(format!(
                "segment '{}' replay produced {} outputs, node expects {}",
                self.segment.name,
                outputs.len(),
                grad_outputs.len()
            )));
        }

        let roots: Vec<(Tensor, Tensor)> = outputs
            .iter()
            .zip(grad_outputs)
            .filter_map(|(output, grad)| grad.as_ref().map(|g| (output.clone(), g.clone())))
            .collect();
        graph::backward(&roots)?;

        Ok(replay_inputs
            .iter()
            .zip(&self.inputs)
            .map(|(replay, original)| {
                if original.requires_grad() {
                    replay.grad()
                } else {
                    None
                }
            })
            .collect())
    }

    fn inputs(&self) -> Vec<Tensor> {
        self.inputs.clone()
    }

    fn num_outputs(&self) -> usize {
        self.segment.num_outputs
    }
}

#[cfg(test)]
#[path = "checkpoint_test.rs"]
mod tests;
