//! Backward pass over the graph of `grad_fn` nodes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::autograd::grad_mode::NoGradGuard;
use crate::autograd::BackwardOp;
use crate::error::MinetError;
use crate::ops::arithmetic::add::add_values;
use crate::tensor::Tensor;

/// Identity of a graph node: the address of its `grad_fn` allocation.
///
/// Valid for as long as the node is kept alive, which the sorted node list
/// guarantees for the duration of one backward pass.
pub(crate) type NodeId = usize;

pub(crate) fn node_id(node: &Arc<dyn BackwardOp>) -> NodeId {
    Arc::as_ptr(node) as *const () as usize
}

/// Recursively builds a topological order of the nodes reachable from `node`.
/// Producers are pushed before their consumers.
fn build_topo(
    node: &Arc<dyn BackwardOp>,
    visited: &mut HashSet<NodeId>,
    sorted: &mut Vec<Arc<dyn BackwardOp>>,
) {
    if !visited.insert(node_id(node)) {
        return;
    }
    for input in node.inputs() {
        if let Some(parent) = input.grad_fn() {
            build_topo(&parent, visited, sorted);
        }
    }
    sorted.push(Arc::clone(node));
}

/// Gradients waiting for a node, one slot per node output.
type Pending = HashMap<NodeId, Vec<Option<Tensor>>>;

/// Sends `grad` to whatever produced `tensor`: the pending slot of its
/// `grad_fn`, or the `grad` field if `tensor` is a leaf.
fn route_gradient(tensor: &Tensor, grad: Tensor, pending: &mut Pending) -> Result<(), MinetError> {
    if grad.shape() != tensor.shape() {
        return Err(MinetError::ShapeMismatch {
            expected: tensor.shape(),
            actual: grad.shape(),
            operation: "backward (gradient routing)".to_string(),
        });
    }
    let (grad_fn, index) = {
        let guard = tensor.read_data();
        (guard.grad_fn.clone(), guard.output_index)
    };
    match grad_fn {
        Some(node) => {
            let slots = pending
                .entry(node_id(&node))
                .or_insert_with(|| vec![None; node.num_outputs()]);
            let slot = slots.get_mut(index).ok_or_else(|| {
                MinetError::InternalError(format!(
                    "output index {index} out of range for node {node:?}"
                ))
            })?;
            let merged = match slot.take() {
                Some(existing) => add_values(&existing, &grad, "backward (accumulate)")?,
                None => grad,
            };
            *slot = Some(merged);
            Ok(())
        }
        None => tensor.acc_grad(grad),
    }
}

/// Runs the backward pass from several roots at once.
///
/// Each root is a `(tensor, gradient)` pair, the gradient having the tensor's
/// shape. Roots that do not require grad are skipped. Leaf gradients accumulate
/// into their `grad` field; intermediate gradients are dropped as soon as the
/// node that consumes them has run.
///
/// `BackwardOp::backward` is called with graph recording disabled. A node that
/// needs a graph of its own (a checkpoint replay) re-enables it locally.
pub fn backward(roots: &[(Tensor, Tensor)]) -> Result<(), MinetError> {
    let _no_grad = NoGradGuard::new();

    let mut pending: Pending = HashMap::new();
    let mut root_nodes = Vec::new();
    for (tensor, grad) in roots {
        if !tensor.requires_grad() {
            continue;
        }
        route_gradient(tensor, grad.clone(), &mut pending)?;
        if let Some(node) = tensor.grad_fn() {
            root_nodes.push(node);
        }
    }

    let mut visited = HashSet::new();
    let mut sorted = Vec::new();
    for node in &root_nodes {
        build_topo(node, &mut visited, &mut sorted);
    }

    for node in sorted.iter().rev() {
        let Some(grad_outputs) = pending.remove(&node_id(node)) else {
            continue;
        };
        let input_grads = node.backward(&grad_outputs)?;
        let inputs = node.inputs();
        if input_grads.len() != inputs.len() {
            return Err(MinetError::BackwardError(format!(
                "BackwardOp returned {} gradients, but expected {} (for op: {:?})",
                input_grads.len(),
                inputs.len(),
                node
            )));
        }
        for (input, grad) in inputs.iter().zip(input_grads) {
            if let Some(grad) = grad {
                if input.requires_grad() {
                    route_gradient(input, grad, &mut pending)?;
                }
            }
        }
    }
    Ok(())
}
