use std::fmt;
use std::ops::Deref;

use crate::tensor::Tensor;

/// A tensor that a module learns. Always a leaf with `requires_grad = true`.
#[derive(Clone)]
pub struct Parameter {
    tensor: Tensor,
    name: Option<String>,
}

impl Parameter {
    /// Wraps `tensor`, detaching it from any graph and enabling gradient tracking.
    pub fn new(tensor: Tensor, name: Option<String>) -> Self {
        let tensor = if tensor.is_leaf() { tensor } else { tensor.detach() };
        tensor.write_data().requires_grad = true;
        Parameter { tensor, name }
    }

    pub fn new_unnamed(tensor: Tensor) -> Self {
        Self::new(tensor, None)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The underlying tensor handle (shares data and gradient with the parameter).
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn into_inner(self) -> Tensor {
        self.tensor
    }
}

impl Deref for Parameter {
    type Target = Tensor;

    fn deref(&self) -> &Tensor {
        &self.tensor
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("shape", &self.tensor.shape())
            .field("grad_defined", &self.tensor.grad().is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "parameter_test.rs"]
mod tests;
