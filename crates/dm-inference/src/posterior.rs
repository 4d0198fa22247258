//! Posterior distribution for Bayesian inference.
//!
//! Wraps a [`LogDensityModel`] and adds per-parameter priors. All model
//! parameters are unbounded, so the sampler works directly in parameter
//! space; the potential energy is the penalized NLL.

use dm_core::traits::LogDensityModel;
use dm_core::{Error, Result};

/// Prior distribution for a single parameter.
#[derive(Debug, Clone)]
pub enum Prior {
    /// Flat (improper) prior — contributes 0 to the log-posterior.
    Flat,
    /// Normal prior: `log p(theta) = -0.5 * ((theta - center) / width)^2 + const`.
    Normal {
        /// Center of the Gaussian prior.
        center: f64,
        /// Width (standard deviation) of the Gaussian prior.
        width: f64,
    },
}

impl Prior {
    /// Weakly informative default for the dementia model: `Normal(0, 5)` on
    /// the intercept, `Normal(0, 2.5)` on each coefficient.
    pub fn weakly_informative(dim: usize) -> Vec<Prior> {
        let mut priors = Vec::with_capacity(dim);
        priors.push(Prior::Normal { center: 0.0, width: 5.0 });
        for _ in 1..dim {
            priors.push(Prior::Normal { center: 0.0, width: 2.5 });
        }
        priors
    }

    /// Flat priors for every parameter (posterior mode == MLE).
    pub fn flat(dim: usize) -> Vec<Prior> {
        vec![Prior::Flat; dim]
    }
}

/// Posterior combining a model likelihood with per-parameter priors.
///
/// `potential(theta) = model.nll(theta) - sum_i log p_i(theta_i)`
pub struct Posterior<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
    priors: Vec<Prior>,
}

impl<'a, M: LogDensityModel + ?Sized> Posterior<'a, M> {
    /// Create a posterior with flat priors.
    pub fn new(model: &'a M) -> Self {
        let priors = Prior::flat(model.dim());
        Self { model, priors }
    }

    /// Set priors (one per parameter).
    pub fn with_priors(mut self, priors: Vec<Prior>) -> Result<Self> {
        if priors.len() != self.model.dim() {
            return Err(Error::Validation(format!(
                "expected {} priors, got {}",
                self.model.dim(),
                priors.len()
            )));
        }
        for (i, p) in priors.iter().enumerate() {
            if let Prior::Normal { width, .. } = p {
                if !width.is_finite() || *width <= 0.0 {
                    return Err(Error::Validation(format!(
                        "prior width for parameter {} must be finite and > 0, got {}",
                        i, width
                    )));
                }
            }
        }
        self.priors = priors;
        Ok(self)
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    /// Reference to the underlying model.
    pub fn model(&self) -> &M {
        self.model
    }

    /// Priors, one per parameter.
    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    /// Potential energy: `nll(theta) + prior penalty` (negative log-posterior
    /// up to an additive constant).
    pub fn potential(&self, theta: &[f64]) -> Result<f64> {
        let mut u = self.model.nll(theta)?;
        for (i, prior) in self.priors.iter().enumerate() {
            if let Prior::Normal { center, width } = prior {
                let pull = (theta[i] - center) / width;
                u += 0.5 * pull * pull;
            }
        }
        Ok(u)
    }

    /// Gradient of the potential.
    pub fn grad_potential(&self, theta: &[f64]) -> Result<Vec<f64>> {
        let mut g = self.model.grad_nll(theta)?;
        for (i, prior) in self.priors.iter().enumerate() {
            if let Prior::Normal { center, width } = prior {
                g[i] += (theta[i] - center) / (width * width);
            }
        }
        Ok(g)
    }

    /// Diagonal ridge the priors add to the Hessian of the potential:
    /// `1 / width^2` for Normal priors, 0 for flat.
    pub fn prior_hessian_diag(&self) -> Vec<f64> {
        self.priors
            .iter()
            .map(|p| match p {
                Prior::Flat => 0.0,
                Prior::Normal { width, .. } => 1.0 / (width * width),
            })
            .collect()
    }
}
