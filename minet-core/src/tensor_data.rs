use std::sync::Arc;

use crate::autograd::BackwardOp;
use crate::buffer::Buffer;
use crate::error::MinetError;
use crate::tensor::Tensor;

/// Internal storage and metadata for a Tensor.
///
/// Wrapped in `Arc<RwLock<TensorData>>` by [`Tensor`] so that autograd metadata
/// (`grad`, `grad_fn`) can be updated through shared handles.
#[derive(Debug)]
pub struct TensorData {
    /// Row-major f32 storage. Shared with detached views.
    pub(crate) buffer: Arc<Buffer>,
    pub(crate) shape: Vec<usize>,

    /// If true, operations involving this tensor are recorded in the graph.
    pub(crate) requires_grad: bool,
    /// Gradient accumulated by `backward()`. Only populated on leaves.
    pub(crate) grad: Option<Tensor>,
    /// Node that produced this tensor. `None` for leaves.
    pub(crate) grad_fn: Option<Arc<dyn BackwardOp>>,
    /// Which output of `grad_fn` this tensor is (non-zero only for multi-output nodes).
    pub(crate) output_index: usize,
}

impl TensorData {
    /// Creates a leaf `TensorData` that owns `data_vec`.
    ///
    /// # Errors
    /// Returns `MinetError::TensorCreationError` if the length of `data_vec` does not match
    /// the number of elements implied by `shape`.
    pub fn new(data_vec: Vec<f32>, shape: Vec<usize>) -> Result<Self, MinetError> {
        let numel: usize = shape.iter().product();
        let data_len = data_vec.len();
        if data_len != numel {
            return Err(MinetError::TensorCreationError { data_len, shape });
        }
        Ok(Self::from_buffer(Arc::new(Buffer::new(data_vec)), shape))
    }

    /// Creates a leaf view over an existing buffer. No data is copied.
    pub(crate) fn from_buffer(buffer: Arc<Buffer>, shape: Vec<usize>) -> Self {
        TensorData {
            buffer,
            shape,
            requires_grad: false,
            grad: None,
            grad_fn: None,
            output_index: 0,
        }
    }

    pub(crate) fn numel(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }
}
