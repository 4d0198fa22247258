//! Bernoulli logistic regression with logit link.
//!
//! Implements [`dm_core::traits::LogDensityModel`], so the model can be used
//! with the Newton posterior-mode fit and with `sample_nuts` /
//! `sample_nuts_multichain`.

use dm_core::math::{log1pexp, sigmoid};
use dm_core::traits::LogDensityModel;
use dm_core::{Error, Result};

/// Dense row-major design matrix.
#[derive(Debug, Clone)]
struct DenseX {
    n: usize,
    p: usize,
    data: Vec<f64>, // length n*p, row-major
}

impl DenseX {
    fn from_rows(x: Vec<Vec<f64>>) -> Result<Self> {
        let n = x.len();
        let p = x.first().map(|r| r.len()).unwrap_or(0);
        if n == 0 || p == 0 {
            return Err(Error::Validation("X must be non-empty (n>0, p>0)".to_string()));
        }
        let mut data = Vec::with_capacity(n * p);
        for (i, row) in x.into_iter().enumerate() {
            if row.len() != p {
                return Err(Error::Validation(format!(
                    "X must be rectangular: row {} has len {}, expected {}",
                    i,
                    row.len(),
                    p
                )));
            }
            for v in row {
                if !v.is_finite() {
                    return Err(Error::Validation("X must contain only finite values".to_string()));
                }
                data.push(v);
            }
        }
        Ok(Self { n, p, data })
    }

    #[inline]
    fn row(&self, i: usize) -> &[f64] {
        let start = i * self.p;
        &self.data[start..start + self.p]
    }
}

#[inline]
fn row_dot(x_row: &[f64], beta: &[f64]) -> f64 {
    debug_assert_eq!(x_row.len(), beta.len());
    x_row.iter().zip(beta).map(|(&x, &b)| x * b).sum()
}

/// Logistic regression (Bernoulli) with logit link and intercept.
///
/// Model: `y_i ~ Bernoulli(sigmoid(eta_i))`, `eta_i = b0 + X_i * beta`.
///
/// NLL: `sum_i log(1 + exp(eta_i)) - y_i * eta_i`
#[derive(Debug, Clone)]
pub struct LogisticModel {
    x: DenseX,
    y: Vec<u8>, // 0/1
    predictor_names: Vec<String>,
}

impl LogisticModel {
    /// Create a logistic model from row-wise `X`, binary `y` and predictor names.
    pub fn new(x: Vec<Vec<f64>>, y: Vec<u8>, predictor_names: Vec<String>) -> Result<Self> {
        let x = DenseX::from_rows(x)?;
        if y.len() != x.n {
            return Err(Error::Validation(format!(
                "y has wrong length: expected n={}, got {}",
                x.n,
                y.len()
            )));
        }
        if y.iter().any(|&v| v != 0 && v != 1) {
            return Err(Error::Validation("y must contain only 0/1 values".to_string()));
        }
        if predictor_names.len() != x.p {
            return Err(Error::Validation(format!(
                "expected {} predictor names, got {}",
                x.p,
                predictor_names.len()
            )));
        }
        Ok(Self { x, y, predictor_names })
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.x.n
    }

    /// Number of predictors (excluding the intercept).
    pub fn n_predictors(&self) -> usize {
        self.x.p
    }

    #[inline]
    fn eta(&self, i: usize, params: &[f64]) -> f64 {
        let (b0, beta) = params.split_first().expect("dim >= 1");
        *b0 + row_dot(self.x.row(i), beta)
    }

    fn check_params(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.dim() {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                self.dim(),
                params.len()
            )));
        }
        if params.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("params must contain only finite values".to_string()));
        }
        Ok(())
    }

    /// Observed-information Hessian of the NLL (row-major, dim x dim):
    /// `H = Z^T W Z` with `Z = [1 | X]` and `W = diag(mu_i (1 - mu_i))`.
    pub fn hessian_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.check_params(params)?;
        let d = self.dim();
        let mut h = vec![0.0; d * d];
        for i in 0..self.x.n {
            let mu = sigmoid(self.eta(i, params));
            let w = mu * (1.0 - mu);
            let row = self.x.row(i);
            // Intercept column first.
            h[0] += w;
            for a in 0..self.x.p {
                let za = row[a];
                h[a + 1] += w * za;
                h[(a + 1) * d] += w * za;
                for b in 0..self.x.p {
                    h[(a + 1) * d + (b + 1)] += w * za * row[b];
                }
            }
        }
        Ok(h)
    }
}

impl LogDensityModel for LogisticModel {
    fn dim(&self) -> usize {
        self.x.p + 1
    }

    fn parameter_names(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.dim());
        out.push("intercept".to_string());
        out.extend(self.predictor_names.iter().cloned());
        out
    }

    fn parameter_init(&self) -> Vec<f64> {
        vec![0.0; self.dim()]
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        self.check_params(params)?;
        let mut nll = 0.0;
        for i in 0..self.x.n {
            let eta = self.eta(i, params);
            nll += log1pexp(eta) - (self.y[i] as f64) * eta;
        }
        Ok(nll)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.check_params(params)?;
        let mut grad = vec![0.0; self.dim()];
        for i in 0..self.x.n {
            let mu = sigmoid(self.eta(i, params));
            let err = mu - (self.y[i] as f64);
            grad[0] += err;
            let row = self.x.row(i);
            for j in 0..self.x.p {
                grad[1 + j] += err * row[j];
            }
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    pub(crate) struct Fixture {
        pub kind: String,
        pub include_intercept: bool,
        pub x: Vec<Vec<f64>>,
        pub y: Vec<f64>,
        pub beta_hat: Vec<f64>,
        pub nll_at_hat: f64,
    }

    pub(crate) fn load_fixture() -> Fixture {
        let json = include_str!("../../../tests/fixtures/logistic_small.json");
        serde_json::from_str(json).unwrap()
    }

    pub(crate) fn fixture_model(fx: &Fixture) -> LogisticModel {
        let y: Vec<u8> = fx.y.iter().map(|&v| if v >= 0.5 { 1u8 } else { 0u8 }).collect();
        let names: Vec<String> = (1..=fx.x[0].len()).map(|j| format!("x{}", j)).collect();
        LogisticModel::new(fx.x.clone(), y, names).unwrap()
    }

    fn inf_norm(v: &[f64]) -> f64 {
        v.iter().map(|x| x.abs()).fold(0.0, f64::max)
    }

    #[test]
    fn test_fixture_contract_shapes() {
        let fx = load_fixture();
        assert_eq!(fx.kind, "logistic");
        assert!(fx.include_intercept);
        assert_eq!(fx.x.len(), fx.y.len());
        assert_eq!(fx.beta_hat.len(), fx.x[0].len() + 1);
    }

    #[test]
    fn test_nll_and_grad_at_fixture_hat() {
        let fx = load_fixture();
        let m = fixture_model(&fx);
        let nll = m.nll(&fx.beta_hat).unwrap();
        assert!((nll - fx.nll_at_hat).abs() < 1e-6, "nll {} vs {}", nll, fx.nll_at_hat);
        let g = m.grad_nll(&fx.beta_hat).unwrap();
        assert!(inf_norm(&g) < 1e-6, "grad inf-norm too large: {}", inf_norm(&g));
    }

    #[test]
    fn test_grad_vs_finite_diff() {
        let fx = load_fixture();
        let m = fixture_model(&fx);
        let theta = vec![0.3, -0.7, 0.4];
        let grad = m.grad_nll(&theta).unwrap();
        let eps = 1e-6;
        for i in 0..theta.len() {
            let mut tp = theta.clone();
            tp[i] += eps;
            let mut tm = theta.clone();
            tm[i] -= eps;
            let fd = (m.nll(&tp).unwrap() - m.nll(&tm).unwrap()) / (2.0 * eps);
            let diff = (grad[i] - fd).abs();
            assert!(diff / grad[i].abs().max(1.0) < 1e-5, "grad[{}]: {} vs fd {}", i, grad[i], fd);
        }
    }

    #[test]
    fn test_hessian_vs_finite_diff_of_grad() {
        let fx = load_fixture();
        let m = fixture_model(&fx);
        let theta = vec![0.1, 0.5, -0.2];
        let h = m.hessian_nll(&theta).unwrap();
        let d = theta.len();
        let eps = 1e-6;
        for i in 0..d {
            let mut tp = theta.clone();
            tp[i] += eps;
            let mut tm = theta.clone();
            tm[i] -= eps;
            let gp = m.grad_nll(&tp).unwrap();
            let gm = m.grad_nll(&tm).unwrap();
            for j in 0..d {
                let fd = (gp[j] - gm[j]) / (2.0 * eps);
                let diff = (h[i * d + j] - fd).abs();
                assert!(
                    diff / h[i * d + j].abs().max(1.0) < 1e-4,
                    "H[{},{}]: {} vs fd {}",
                    i,
                    j,
                    h[i * d + j],
                    fd
                );
            }
        }
    }

    #[test]
    fn test_rejects_non_binary_response() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![0u8, 2u8];
        assert!(LogisticModel::new(x, y, vec!["x1".to_string()]).is_err());
    }

    #[test]
    fn test_rejects_ragged_design() {
        let x = vec![vec![1.0, 2.0], vec![3.0]];
        let y = vec![0u8, 1u8];
        assert!(LogisticModel::new(x, y, vec!["a".into(), "b".into()]).is_err());
    }

    #[test]
    fn test_parameter_names_order() {
        let fx = load_fixture();
        let m = fixture_model(&fx);
        assert_eq!(m.parameter_names(), vec!["intercept", "x1", "x2"]);
    }
}
