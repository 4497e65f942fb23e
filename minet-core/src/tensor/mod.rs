// src/tensor/mod.rs

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::buffer::Buffer;
use crate::error::MinetError;
use crate::tensor_data::TensorData;

mod autograd_methods;
pub mod create;

pub use create::{full, ones, randn, uniform, zeros, zeros_like};

/// A multi-dimensional f32 array living on the CPU.
///
/// `Tensor` is a cheap handle over `Arc<RwLock<TensorData>>`:
/// 1.  **Shared Ownership:** clones point to the same data and autograd node.
/// 2.  **Interior Mutability:** `requires_grad`, `grad` and `grad_fn` can be
///     updated through `&Tensor`, which the backward pass relies on.
///
/// Feature maps use the NCHW layout `[batch, channels, height, width]`.
pub struct Tensor {
    pub(crate) data: Arc<RwLock<TensorData>>,
}

impl Tensor {
    /// Creates a new leaf tensor from row-major data.
    pub fn new(data_vec: Vec<f32>, shape: Vec<usize>) -> Result<Self, MinetError> {
        let tensor_data = TensorData::new(data_vec, shape)?;
        Ok(Self::from_tensor_data(tensor_data))
    }

    pub(crate) fn from_tensor_data(tensor_data: TensorData) -> Self {
        Tensor {
            data: Arc::new(RwLock::new(tensor_data)),
        }
    }

    /// Returns a clone of the tensor's shape.
    pub fn shape(&self) -> Vec<usize> {
        self.read_data().shape.clone()
    }

    pub fn rank(&self) -> usize {
        self.read_data().shape.len()
    }

    pub fn numel(&self) -> usize {
        self.read_data().numel()
    }

    /// Returns the shape as `[n, c, h, w]`, or a `RankMismatch` if the tensor is not 4D.
    pub fn dims4(&self, operation: &str) -> Result<[usize; 4], MinetError> {
        let shape = self.shape();
        match shape.as_slice() {
            &[n, c, h, w] => Ok([n, c, h, w]),
            _ => Err(MinetError::RankMismatch {
                expected: 4,
                actual: shape.len(),
                operation: operation.to_string(),
            }),
        }
    }

    /// Acquires a read lock on the tensor's data.
    /// Panics if the RwLock is poisoned.
    pub fn read_data(&self) -> std::sync::RwLockReadGuard<'_, TensorData> {
        self.data.read().expect("RwLock poisoned")
    }

    /// Acquires a write lock on the tensor's data.
    /// Panics if the RwLock is poisoned.
    pub fn write_data(&self) -> std::sync::RwLockWriteGuard<'_, TensorData> {
        self.data.write().expect("RwLock poisoned")
    }

    /// Returns a shared handle to the underlying buffer.
    pub(crate) fn buffer(&self) -> Arc<Buffer> {
        Arc::clone(self.read_data().buffer())
    }

    /// Copies the tensor data out as a `Vec<f32>`.
    pub fn get_f32_data(&self) -> Result<Vec<f32>, MinetError> {
        Ok(self.read_data().buffer().as_slice().to_vec())
    }

    /// Returns the single value of a scalar-like tensor.
    pub fn item(&self) -> Result<f32, MinetError> {
        let guard = self.read_data();
        if guard.numel() != 1 {
            return Err(MinetError::ShapeMismatch {
                expected: vec![],
                actual: guard.shape.clone(),
                operation: "item".to_string(),
            });
        }
        Ok(guard.buffer()[0])
    }

    /// Returns true if both handles point to the same tensor node.
    pub fn same_node(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Clone for Tensor {
    /// Clones the handle (bumps the `Arc` count); data is shared.
    fn clone(&self) -> Self {
        Tensor {
            data: Arc::clone(&self.data),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let td = self.read_data();
        f.debug_struct("Tensor")
            .field("shape", &td.shape)
            .field("buffer", &td.buffer)
            .field("requires_grad", &td.requires_grad)
            .field("grad_defined", &td.grad.is_some())
            .field("grad_fn_defined", &td.grad_fn.is_some())
            .finish()
    }
}

/// Equality compares shape and values, not node identity. Use
/// [`Tensor::same_node`] for identity.
impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        if self.same_node(other) {
            return true;
        }
        let a = self.read_data();
        let b = other.read_data();
        a.shape == b.shape && a.buffer().as_slice() == b.buffer().as_slice()
    }
}
