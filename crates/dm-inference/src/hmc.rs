//! Hamiltonian Monte Carlo building blocks: phase-space state and the
//! leapfrog integrator with a diagonal metric.
//!
//! The NUTS sampler in [`crate::nuts`] builds on top of this. The dementia
//! model has a handful of unbounded, roughly unit-scale parameters, so a
//! diagonal inverse mass matrix is sufficient.

use crate::posterior::Posterior;
use dm_core::traits::LogDensityModel;
use dm_core::Result;

/// HMC phase-space state: position + momentum + cached potential/gradient.
#[derive(Debug, Clone)]
pub struct HmcState {
    /// Position in parameter space.
    pub q: Vec<f64>,
    /// Momentum.
    pub p: Vec<f64>,
    /// Potential energy: penalized NLL at `q`.
    pub potential: f64,
    /// Gradient of the potential at `q`.
    pub grad_potential: Vec<f64>,
}

impl HmcState {
    /// Kinetic energy: `0.5 * p^T M^{-1} p` with diagonal `M^{-1}`.
    pub fn kinetic_energy(&self, inv_mass: &[f64]) -> f64 {
        0.5 * self
            .p
            .iter()
            .zip(inv_mass.iter())
            .map(|(&pi, &mi)| pi * pi * mi)
            .sum::<f64>()
    }

    /// Total Hamiltonian: `H = U(q) + K(p)`.
    pub fn hamiltonian(&self, inv_mass: &[f64]) -> f64 {
        self.potential + self.kinetic_energy(inv_mass)
    }
}

/// Leapfrog integrator over a [`Posterior`] with a diagonal metric.
pub struct LeapfrogIntegrator<'a, 'b, M: LogDensityModel + ?Sized> {
    posterior: &'a Posterior<'b, M>,
    step_size: f64,
    inv_mass: Vec<f64>,
}

impl<'a, 'b, M: LogDensityModel + ?Sized> LeapfrogIntegrator<'a, 'b, M> {
    /// Create a new integrator.
    pub fn new(posterior: &'a Posterior<'b, M>, step_size: f64, inv_mass: Vec<f64>) -> Self {
        Self { posterior, step_size, inv_mass }
    }

    /// Current step size.
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Diagonal of the inverse mass matrix.
    pub fn inv_mass(&self) -> &[f64] {
        &self.inv_mass
    }

    /// Initialize a state at position `q` (momentum zeroed).
    pub fn init_state(&self, q: Vec<f64>) -> Result<HmcState> {
        let potential = self.posterior.potential(&q)?;
        let grad_potential = self.posterior.grad_potential(&q)?;
        let p = vec![0.0; q.len()];
        Ok(HmcState { q, p, potential, grad_potential })
    }

    /// One leapfrog step with the configured step size.
    pub fn step(&self, state: &mut HmcState) -> Result<()> {
        self.step_with_eps(state, self.step_size)
    }

    /// One leapfrog step forward (`direction > 0`) or backward.
    pub fn step_dir(&self, state: &mut HmcState, direction: i32) -> Result<()> {
        let eps = if direction >= 0 { self.step_size } else { -self.step_size };
        self.step_with_eps(state, eps)
    }

    /// One leapfrog step with an explicit (possibly negative) step size.
    pub fn step_with_eps(&self, state: &mut HmcState, eps: f64) -> Result<()> {
        let n = state.q.len();

        // Half step for momentum.
        for i in 0..n {
            state.p[i] -= 0.5 * eps * state.grad_potential[i];
        }
        // Full step for position: dq/dt = M^{-1} p.
        for i in 0..n {
            state.q[i] += eps * self.inv_mass[i] * state.p[i];
        }
        // Refresh potential and gradient at the new position.
        state.potential = self.posterior.potential(&state.q)?;
        state.grad_potential = self.posterior.grad_potential(&state.q)?;
        // Half step for momentum.
        for i in 0..n {
            state.p[i] -= 0.5 * eps * state.grad_potential[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogisticModel;
    use crate::posterior::Prior;

    fn tiny_posterior_model() -> LogisticModel {
        let x = vec![vec![-1.2], vec![-0.4], vec![0.3], vec![0.9], vec![1.5]];
        let y = vec![0u8, 0, 1, 1, 1];
        LogisticModel::new(x, y, vec!["x1".to_string()]).unwrap()
    }

    #[test]
    fn test_leapfrog_is_reversible() {
        let m = tiny_posterior_model();
        let post = Posterior::new(&m).with_priors(Prior::weakly_informative(2)).unwrap();
        let integ = LeapfrogIntegrator::new(&post, 0.1, vec![1.0, 1.0]);

        let mut state = integ.init_state(vec![0.2, -0.3]).unwrap();
        state.p = vec![0.7, -0.4];
        let q0 = state.q.clone();

        for _ in 0..10 {
            integ.step_dir(&mut state, 1).unwrap();
        }
        // Negate momentum and integrate back.
        for p in &mut state.p {
            *p = -*p;
        }
        for _ in 0..10 {
            integ.step_dir(&mut state, 1).unwrap();
        }

        for (a, b) in state.q.iter().zip(q0.iter()) {
            assert!((a - b).abs() < 1e-9, "leapfrog not reversible: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_energy_error_small_for_small_steps() {
        let m = tiny_posterior_model();
        let post = Posterior::new(&m).with_priors(Prior::weakly_informative(2)).unwrap();
        let inv_mass = vec![1.0, 1.0];
        let integ = LeapfrogIntegrator::new(&post, 0.01, inv_mass.clone());

        let mut state = integ.init_state(vec![0.0, 0.0]).unwrap();
        state.p = vec![1.0, -1.0];
        let h0 = state.hamiltonian(&inv_mass);

        for _ in 0..100 {
            integ.step(&mut state).unwrap();
        }
        let h1 = state.hamiltonian(&inv_mass);
        assert!((h1 - h0).abs() < 1e-2, "energy drift too large: {} -> {}", h0, h1);
    }

    #[test]
    fn test_kinetic_energy_respects_inv_mass() {
        let state = HmcState {
            q: vec![0.0, 0.0],
            p: vec![2.0, 3.0],
            potential: 0.0,
            grad_potential: vec![0.0, 0.0],
        };
        // K = 0.5 * (4*0.5 + 9*2.0) = 10.0
        let k = state.kinetic_energy(&[0.5, 2.0]);
        assert!((k - 10.0).abs() < 1e-12);
    }
}
