use crate::error::MinetError;
use crate::nn::Parameter;
use crate::tensor::Tensor;

/// The base trait for all neural network modules (layers, blocks, whole networks).
///
/// Covers what every module supports regardless of how many tensors it consumes:
/// parameter and child traversal, train/eval switching and gradient reset.
/// Single-input modules also implement [`Layer`].
pub trait Module: std::fmt::Debug + Send + Sync {
    /// Parameters owned directly by this module, not by its children.
    fn local_parameters(&self) -> Vec<(String, &Parameter)> {
        Vec::new()
    }

    /// Direct child modules with the field names they are stored under.
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        Vec::new()
    }

    /// Returns a vector of direct child `Module`s.
    fn children(&self) -> Vec<&dyn Module> {
        self.named_children().into_iter().map(|(_, m)| m).collect()
    }

    /// All parameters of the module tree with hierarchical names
    /// (e.g. `"sim16.h2h_0.conv.weight"`), local parameters first.
    fn named_parameters(&self) -> Vec<(String, &Parameter)> {
        let mut params = self.local_parameters();
        for (child_name, child) in self.named_children() {
            params.extend(
                child
                    .named_parameters()
                    .into_iter()
                    .map(|(name, p)| (format!("{child_name}.{name}"), p)),
            );
        }
        params
    }

    /// Returns a vector of all learnable parameters of the module tree.
    fn parameters(&self) -> Vec<&Parameter> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }

    /// Switches training-dependent behaviour (batch statistics) for the whole tree.
    fn set_training(&self, training: bool) {
        for child in self.children() {
            child.set_training(training);
        }
    }

    /// Clears the accumulated gradient of every parameter.
    fn zero_grad(&self) {
        for param in self.parameters() {
            param.clear_grad();
        }
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }
}

/// A module mapping one tensor to one tensor.
pub trait Layer: Module {
    /// Performs a forward pass of the module.
    fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{ones, zeros};

    #[derive(Debug)]
    struct Leaf {
        weight: Parameter,
    }

    impl Module for Leaf {
        fn local_parameters(&self) -> Vec<(String, &Parameter)> {
            vec![("weight".to_string(), &self.weight)]
        }
    }

    impl Layer for Leaf {
        fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
            input.add(&self.weight)
        }
    }

    #[derive(Debug)]
    struct Pair {
        first: Leaf,
        second: Leaf,
    }

    impl Module for Pair {
        fn named_children(&self) -> Vec<(String, &dyn Module)> {
            vec![
                ("first".to_string(), &self.first as &dyn Module),
                ("second".to_string(), &self.second as &dyn Module),
            ]
        }
    }

    fn leaf(len: usize) -> Leaf {
        Leaf {
            weight: Parameter::new_unnamed(zeros(&[len]).unwrap()),
        }
    }

    #[test]
    fn test_named_parameters_are_hierarchical() {
        let pair = Pair {
            first: leaf(2),
            second: leaf(3),
        };
        let names: Vec<String> = pair.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["first.weight", "second.weight"]);
        assert_eq!(pair.children().len(), 2);
        assert_eq!(pair.num_parameters(), 5);
    }

    #[test]
    fn test_zero_grad_clears_all() -> Result<(), MinetError> {
        let pair = Pair {
            first: leaf(2),
            second: leaf(2),
        };
        let x = ones(&[2])?;
        let y = pair.second.forward(&pair.first.forward(&x)?)?;
        y.sum()?.backward(None)?;
        assert!(pair.parameters().iter().all(|p| p.grad().is_some()));
        pair.zero_grad();
        assert!(pair.parameters().iter().all(|p| p.grad().is_none()));
        Ok(())
    }
}
