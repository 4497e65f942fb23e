//! Reverse-mode automatic differentiation.
//!
//! Every differentiable op stores a [`BackwardOp`] node in its output's
//! `grad_fn`. [`backward`] walks those nodes in reverse topological order and
//! accumulates gradients on leaf tensors. [`checkpoint`] wraps a [`Segment`]
//! so that its intermediate activations are dropped after the forward pass and
//! recomputed when the backward pass reaches it.

pub mod backward_op;
pub mod checkpoint;
pub mod grad_check;
pub mod grad_mode;
pub mod graph;

pub use backward_op::BackwardOp;
pub use checkpoint::{checkpoint, Segment};
pub use grad_mode::{is_grad_enabled, is_recomputing, EnableGradGuard, NoGradGuard};
pub use graph::backward;
