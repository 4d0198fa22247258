//! Posterior-mode (MAP) fit via damped Newton iteration.
//!
//! The logistic posterior is log-concave (Gaussian or flat priors), so
//! Newton with step halving converges quickly from the origin. The mode is
//! used both as a standalone fit (with flat priors it is the MLE) and as the
//! initialization point for NUTS chains.

use crate::model::LogisticModel;
use crate::posterior::Posterior;
use dm_core::traits::LogDensityModel;
use dm_core::types::FitResult;
use dm_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Configuration for the Newton mode fit.
#[derive(Debug, Clone)]
pub struct NewtonConfig {
    /// Maximum Newton iterations.
    pub max_iter: usize,
    /// Convergence threshold on the gradient infinity norm.
    pub grad_tol: f64,
    /// Maximum step halvings per iteration.
    pub max_halvings: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self { max_iter: 100, grad_tol: 1e-8, max_halvings: 30 }
    }
}

/// Penalized Hessian at `theta`: model Hessian plus the diagonal prior
/// contribution.
fn penalized_hessian(
    model: &LogisticModel,
    posterior: &Posterior<'_, LogisticModel>,
    theta: &[f64],
) -> Result<DMatrix<f64>> {
    let dim = model.dim();
    let h_model = model.hessian_nll(theta)?;
    let h_prior = posterior.prior_hessian_diag();

    let mut h = DMatrix::from_row_slice(dim, dim, &h_model);
    for i in 0..dim {
        h[(i, i)] += h_prior[i];
    }
    Ok(h)
}

/// Find the posterior mode of a logistic model with the given priors.
///
/// Standard errors are the square roots of the diagonal of the inverse
/// penalized Hessian at the mode. With flat priors this is the usual
/// observed-information MLE fit.
pub fn fit_mode(posterior: &Posterior<'_, LogisticModel>, config: &NewtonConfig) -> Result<FitResult> {
    let model = posterior.model();
    let dim = model.dim();

    let mut theta = model.parameter_init();
    let mut potential = posterior.potential(&theta)?;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 0..config.max_iter {
        n_iter = iter + 1;

        let grad = posterior.grad_potential(&theta)?;
        let grad_inf = grad.iter().fold(0.0f64, |a, &g| a.max(g.abs()));
        if grad_inf < config.grad_tol {
            converged = true;
            n_iter = iter;
            break;
        }

        let h = penalized_hessian(model, posterior, &theta)?;
        let g = DVector::from_column_slice(&grad);
        let lu = h.lu();
        let direction = lu.solve(&g).ok_or_else(|| {
            Error::Computation("singular Hessian in Newton iteration".to_string())
        })?;

        // Step halving until the penalized NLL decreases.
        let mut step = 1.0;
        let mut accepted = false;
        for _ in 0..config.max_halvings {
            let candidate: Vec<f64> =
                theta.iter().zip(direction.iter()).map(|(&t, &d)| t - step * d).collect();
            match posterior.potential(&candidate) {
                Ok(p) if p.is_finite() && p < potential => {
                    theta = candidate;
                    potential = p;
                    accepted = true;
                    break;
                }
                _ => step *= 0.5,
            }
        }
        if !accepted {
            // No descent possible; the gradient check next loop decides
            // whether we are at the mode or stuck.
            let grad = posterior.grad_potential(&theta)?;
            let grad_inf = grad.iter().fold(0.0f64, |a, &g| a.max(g.abs()));
            converged = grad_inf < config.grad_tol.max(1e-6);
            break;
        }
    }

    if !converged {
        let grad = posterior.grad_potential(&theta)?;
        let grad_inf = grad.iter().fold(0.0f64, |a, &g| a.max(g.abs()));
        converged = grad_inf < config.grad_tol;
    }

    let h = penalized_hessian(model, posterior, &theta)?;
    let std_errors = match h.clone().try_inverse() {
        Some(h_inv) => (0..dim).map(|i| h_inv[(i, i)].max(0.0).sqrt()).collect(),
        None => vec![f64::NAN; dim],
    };

    let nll = model.nll(&theta)?;
    tracing::info!(n_iter, nll, converged, "mode fit complete");

    Ok(FitResult { parameters: theta, std_errors, nll, converged, n_iterations: n_iter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::Prior;

    struct Fixture {
        model: LogisticModel,
        beta_hat: Vec<f64>,
        nll_at_hat: f64,
    }

    fn load_fixture() -> Fixture {
        let json = include_str!("../../../tests/fixtures/logistic_small.json");
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        let x: Vec<Vec<f64>> = serde_json::from_value(v["x"].clone()).unwrap();
        let y: Vec<u8> = v["y"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| if e.as_f64().unwrap() >= 0.5 { 1u8 } else { 0u8 })
            .collect();
        let beta_hat: Vec<f64> = serde_json::from_value(v["beta_hat"].clone()).unwrap();
        let nll_at_hat = v["nll_at_hat"].as_f64().unwrap();
        let model =
            LogisticModel::new(x, y, vec!["x1".to_string(), "x2".to_string()]).unwrap();
        Fixture { model, beta_hat, nll_at_hat }
    }

    #[test]
    fn test_flat_prior_mode_matches_mle() {
        let f = load_fixture();
        let post = Posterior::new(&f.model).with_priors(Prior::flat(3)).unwrap();
        let fit = fit_mode(&post, &NewtonConfig::default()).unwrap();

        assert!(fit.converged, "Newton should converge on the fixture");
        for (i, (&est, &expect)) in fit.parameters.iter().zip(&f.beta_hat).enumerate() {
            assert!(
                (est - expect).abs() < 1e-6,
                "param {}: got {}, expected {}",
                i,
                est,
                expect
            );
        }
        assert!((fit.nll - f.nll_at_hat).abs() < 1e-8);
    }

    #[test]
    fn test_flat_prior_std_errors_finite() {
        let f = load_fixture();
        let post = Posterior::new(&f.model).with_priors(Prior::flat(3)).unwrap();
        let fit = fit_mode(&post, &NewtonConfig::default()).unwrap();

        assert_eq!(fit.std_errors.len(), 3);
        for (i, &se) in fit.std_errors.iter().enumerate() {
            assert!(se.is_finite() && se > 0.0, "std error {} should be positive: {}", i, se);
        }
    }

    #[test]
    fn test_gaussian_prior_shrinks_toward_zero() {
        let f = load_fixture();
        let flat = Posterior::new(&f.model).with_priors(Prior::flat(3)).unwrap();
        let tight = Posterior::new(&f.model)
            .with_priors(vec![
                Prior::Normal { center: 0.0, width: 1.0 },
                Prior::Normal { center: 0.0, width: 1.0 },
                Prior::Normal { center: 0.0, width: 1.0 },
            ])
            .unwrap();

        let mle = fit_mode(&flat, &NewtonConfig::default()).unwrap();
        let map = fit_mode(&tight, &NewtonConfig::default()).unwrap();

        // The fixture's x1 coefficient is large; a unit-width prior must
        // pull it in noticeably.
        assert!(
            map.parameters[1].abs() < mle.parameters[1].abs(),
            "MAP {} should shrink below MLE {}",
            map.parameters[1],
            mle.parameters[1]
        );
    }

    #[test]
    fn test_weakly_informative_prior_near_mle() {
        let f = load_fixture();
        let post =
            Posterior::new(&f.model).with_priors(Prior::weakly_informative(3)).unwrap();
        let fit = fit_mode(&post, &NewtonConfig::default()).unwrap();

        assert!(fit.converged);
        // Wide priors should barely move the intercept.
        assert!((fit.parameters[0] - f.beta_hat[0]).abs() < 0.25);
    }
}
