//! Core traits for demstat
//!
//! The inference crate works against [`LogDensityModel`] rather than a
//! concrete model type, so samplers and optimizers stay decoupled from the
//! regression model they run on.

use crate::Result;

/// A differentiable negative log-density.
///
/// Implementors expose the NLL and its analytic gradient in the model's
/// natural (unbounded) parameterization.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names, in the same order as the parameter vector.
    fn parameter_names(&self) -> Vec<String>;

    /// Default starting point for optimizers and samplers.
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood (up to an additive constant).
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of the NLL.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl LogDensityModel for Quadratic {
        fn dim(&self) -> usize {
            1
        }
        fn parameter_names(&self) -> Vec<String> {
            vec!["x".to_string()]
        }
        fn parameter_init(&self) -> Vec<f64> {
            vec![0.0]
        }
        fn nll(&self, params: &[f64]) -> Result<f64> {
            Ok(0.5 * params[0] * params[0])
        }
        fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![params[0]])
        }
    }

    #[test]
    fn test_quadratic_model() {
        let m = Quadratic;
        assert_eq!(m.dim(), 1);
        assert_eq!(m.nll(&[2.0]).unwrap(), 2.0);
        assert_eq!(m.grad_nll(&[2.0]).unwrap(), vec![2.0]);
    }
}
