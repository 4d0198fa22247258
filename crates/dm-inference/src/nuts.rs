//! No-U-Turn Sampler (NUTS).
//!
//! Implements NUTS with tree doubling and the no-U-turn criterion, using the
//! slice-based variant: proposals are selected uniformly among states that
//! fall inside the slice. Since all model parameters are unbounded, sampling
//! happens directly in parameter space.

use crate::adapt::{find_reasonable_step_size, WindowedAdaptation};
use crate::chain::Chain;
use crate::hmc::{HmcState, LeapfrogIntegrator};
use crate::posterior::Posterior;
use dm_core::traits::LogDensityModel;
use dm_core::Result;
use rand::Rng;

/// NUTS sampler configuration.
#[derive(Debug, Clone)]
pub struct NutsConfig {
    /// Maximum tree depth (default 10).
    pub max_treedepth: usize,
    /// Target acceptance probability (default 0.8).
    pub target_accept: f64,
    /// Stddev of Gaussian jitter added to the initial position.
    ///
    /// Avoids identical starting states across chains when an explicit
    /// `init` is shared.
    pub init_jitter: f64,
    /// Optional starting point (e.g. the Newton posterior mode). Falls back
    /// to `model.parameter_init()` when unset.
    pub init: Option<Vec<f64>>,
}

impl Default for NutsConfig {
    fn default() -> Self {
        Self { max_treedepth: 10, target_accept: 0.8, init_jitter: 0.1, init: None }
    }
}

/// Maximum energy error before declaring divergence.
const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// Result of one NUTS transition.
pub(crate) struct NutsTransition {
    pub q: Vec<f64>,
    pub potential: f64,
    pub grad_potential: Vec<f64>,
    pub depth: usize,
    pub divergent: bool,
    pub accept_prob: f64,
    pub energy: f64,
    pub n_leapfrog: usize,
}

/// Internal tree node for NUTS tree-building.
struct NutsTree {
    q_left: Vec<f64>,
    p_left: Vec<f64>,
    grad_left: Vec<f64>,
    q_right: Vec<f64>,
    p_right: Vec<f64>,
    grad_right: Vec<f64>,
    q_proposal: Vec<f64>,
    potential_proposal: f64,
    grad_proposal: Vec<f64>,
    log_sum_weight: f64,
    depth: usize,
    n_leapfrog: usize,
    divergent: bool,
    turning: bool,
    sum_accept_prob: f64,
}

/// Check the no-U-turn criterion on the span `dq = q_right - q_left`.
fn is_turning(dq: &[f64], p_left: &[f64], p_right: &[f64], inv_mass: &[f64]) -> bool {
    let dot_left: f64 =
        dq.iter().zip(p_left.iter()).zip(inv_mass.iter()).map(|((&d, &p), &m)| d * p * m).sum();
    let dot_right: f64 =
        dq.iter().zip(p_right.iter()).zip(inv_mass.iter()).map(|((&d, &p), &m)| d * p * m).sum();
    dot_left < 0.0 || dot_right < 0.0
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

/// Build a single-node tree (one leapfrog step).
fn build_leaf<M: LogDensityModel + ?Sized>(
    integrator: &LeapfrogIntegrator<'_, '_, M>,
    state: &HmcState,
    direction: i32,
    log_u: f64,
    h0: f64,
    inv_mass: &[f64],
) -> Result<NutsTree> {
    let mut new_state = state.clone();
    integrator.step_dir(&mut new_state, direction)?;

    let h = new_state.hamiltonian(inv_mass);
    let energy_error = h - h0;
    let divergent = energy_error.abs() > DIVERGENCE_THRESHOLD;

    // Slice: keep only states with log_u <= log p(q,p), where log p = -H.
    let in_slice = log_u <= -h;
    let log_weight = if in_slice { 0.0 } else { f64::NEG_INFINITY };

    let accept_prob = (-energy_error).exp().min(1.0);

    Ok(NutsTree {
        q_left: new_state.q.clone(),
        p_left: new_state.p.clone(),
        grad_left: new_state.grad_potential.clone(),
        q_right: new_state.q.clone(),
        p_right: new_state.p.clone(),
        grad_right: new_state.grad_potential.clone(),
        q_proposal: new_state.q,
        potential_proposal: new_state.potential,
        grad_proposal: new_state.grad_potential,
        log_sum_weight: log_weight,
        depth: 0,
        n_leapfrog: 1,
        divergent,
        turning: false,
        sum_accept_prob: accept_prob,
    })
}

/// Recursively build a balanced binary tree of the given depth.
#[allow(clippy::too_many_arguments)]
fn build_tree<M: LogDensityModel + ?Sized>(
    integrator: &LeapfrogIntegrator<'_, '_, M>,
    state: &HmcState,
    depth: usize,
    direction: i32,
    log_u: f64,
    h0: f64,
    inv_mass: &[f64],
    rng: &mut impl Rng,
) -> Result<NutsTree> {
    if depth == 0 {
        return build_leaf(integrator, state, direction, log_u, h0, inv_mass);
    }

    let mut inner = build_tree(integrator, state, depth - 1, direction, log_u, h0, inv_mass, rng)?;
    if inner.divergent || inner.turning {
        return Ok(inner);
    }

    // Continue from the moving edge of the first half-tree.
    let edge_state = if direction > 0 {
        HmcState {
            q: inner.q_right.clone(),
            p: inner.p_right.clone(),
            potential: 0.0, // not used for tree building
            grad_potential: inner.grad_right.clone(),
        }
    } else {
        HmcState {
            q: inner.q_left.clone(),
            p: inner.p_left.clone(),
            potential: 0.0,
            grad_potential: inner.grad_left.clone(),
        }
    };

    let outer =
        build_tree(integrator, &edge_state, depth - 1, direction, log_u, h0, inv_mass, rng)?;

    // Merge: accept the outer proposal with probability proportional to its weight.
    let new_log_sum_weight = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
    let accept_outer = (outer.log_sum_weight - new_log_sum_weight).exp();
    let u: f64 = rng.random();
    if u < accept_outer {
        inner.q_proposal = outer.q_proposal;
        inner.potential_proposal = outer.potential_proposal;
        inner.grad_proposal = outer.grad_proposal;
    }

    inner.log_sum_weight = new_log_sum_weight;
    inner.n_leapfrog += outer.n_leapfrog;
    inner.sum_accept_prob += outer.sum_accept_prob;
    inner.divergent = inner.divergent || outer.divergent;

    if direction > 0 {
        inner.q_right = outer.q_right;
        inner.p_right = outer.p_right;
        inner.grad_right = outer.grad_right;
    } else {
        inner.q_left = outer.q_left;
        inner.p_left = outer.p_left;
        inner.grad_left = outer.grad_left;
    }

    let dq: Vec<f64> =
        inner.q_right.iter().zip(inner.q_left.iter()).map(|(&r, &l)| r - l).collect();
    inner.turning =
        inner.turning || outer.turning || is_turning(&dq, &inner.p_left, &inner.p_right, inv_mass);

    inner.depth = depth;
    Ok(inner)
}

/// Run one NUTS transition from the given state.
pub(crate) fn nuts_transition<M: LogDensityModel + ?Sized>(
    integrator: &LeapfrogIntegrator<'_, '_, M>,
    current: &HmcState,
    max_treedepth: usize,
    inv_mass: &[f64],
    rng: &mut impl Rng,
) -> Result<NutsTransition> {
    use rand_distr::{Distribution, Normal};

    let n = current.q.len();
    let normal = Normal::new(0.0, 1.0).expect("unit normal is valid");

    // Sample momentum ~ N(0, M).
    let mut state = current.clone();
    for i in 0..n {
        let sigma = (1.0 / inv_mass[i]).sqrt();
        state.p[i] = sigma * normal.sample(rng);
    }

    let h0 = state.hamiltonian(inv_mass);
    // Slice variable: u ~ Uniform(0, exp(-H0)), so log_u = ln(rand()) - H0.
    let log_u: f64 = rng.random::<f64>().ln() - h0;

    let mut tree = NutsTree {
        q_left: state.q.clone(),
        p_left: state.p.clone(),
        grad_left: state.grad_potential.clone(),
        q_right: state.q.clone(),
        p_right: state.p.clone(),
        grad_right: state.grad_potential.clone(),
        q_proposal: state.q.clone(),
        potential_proposal: state.potential,
        grad_proposal: state.grad_potential.clone(),
        log_sum_weight: 0.0, // log(1)
        depth: 0,
        n_leapfrog: 0,
        divergent: false,
        turning: false,
        sum_accept_prob: 0.0,
    };

    // Tree depth is 0-based (Stan convention): depth=0 is one leapfrog step.
    let mut depth: usize = 0;
    let mut depth_reached: usize = 0;

    while depth <= max_treedepth {
        depth_reached = depth;
        let direction: i32 = if rng.random::<bool>() { 1 } else { -1 };

        let edge_state = if direction > 0 {
            HmcState {
                q: tree.q_right.clone(),
                p: tree.p_right.clone(),
                potential: 0.0,
                grad_potential: tree.grad_right.clone(),
            }
        } else {
            HmcState {
                q: tree.q_left.clone(),
                p: tree.p_left.clone(),
                potential: 0.0,
                grad_potential: tree.grad_left.clone(),
            }
        };

        let subtree =
            build_tree(integrator, &edge_state, depth, direction, log_u, h0, inv_mass, rng)?;

        let new_log_sum_weight = log_sum_exp(tree.log_sum_weight, subtree.log_sum_weight);
        let accept_subtree = (subtree.log_sum_weight - new_log_sum_weight).exp();
        let u: f64 = rng.random();
        if u < accept_subtree {
            tree.q_proposal = subtree.q_proposal;
            tree.potential_proposal = subtree.potential_proposal;
            tree.grad_proposal = subtree.grad_proposal;
        }

        tree.log_sum_weight = new_log_sum_weight;
        tree.n_leapfrog += subtree.n_leapfrog;
        tree.sum_accept_prob += subtree.sum_accept_prob;
        tree.divergent = tree.divergent || subtree.divergent;
        tree.turning = tree.turning || subtree.turning;

        if direction > 0 {
            tree.q_right = subtree.q_right;
            tree.p_right = subtree.p_right;
            tree.grad_right = subtree.grad_right;
        } else {
            tree.q_left = subtree.q_left;
            tree.p_left = subtree.p_left;
            tree.grad_left = subtree.grad_left;
        }

        let dq: Vec<f64> =
            tree.q_right.iter().zip(tree.q_left.iter()).map(|(&r, &l)| r - l).collect();
        if is_turning(&dq, &tree.p_left, &tree.p_right, inv_mass) {
            tree.turning = true;
            break;
        }
        if tree.divergent || tree.turning {
            break;
        }

        depth += 1;
    }

    let n_total = tree.n_leapfrog.max(1) as f64;
    let accept_prob = tree.sum_accept_prob / n_total;

    Ok(NutsTransition {
        q: tree.q_proposal,
        potential: tree.potential_proposal,
        grad_potential: tree.grad_proposal,
        depth: depth_reached,
        divergent: tree.divergent,
        accept_prob,
        energy: h0,
        n_leapfrog: tree.n_leapfrog,
    })
}

/// Run NUTS sampling against a [`Posterior`].
///
/// Returns one raw chain: post-warmup draws plus per-draw diagnostics
/// (divergences, tree depths, acceptance probabilities, energies).
pub fn sample_nuts<M: LogDensityModel + ?Sized>(
    posterior: &Posterior<'_, M>,
    n_warmup: usize,
    n_samples: usize,
    seed: u64,
    config: NutsConfig,
) -> Result<Chain> {
    use rand::SeedableRng;

    let dim = posterior.dim();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let theta_init = match &config.init {
        Some(init) => {
            if init.len() != dim {
                return Err(dm_core::Error::Validation(format!(
                    "init has wrong length: expected {}, got {}",
                    dim,
                    init.len()
                )));
            }
            init.clone()
        }
        None => posterior.model().parameter_init(),
    };

    let q_init: Vec<f64> = if config.init_jitter > 0.0 {
        use rand_distr::{Distribution, Normal};
        let normal = Normal::new(0.0, config.init_jitter).map_err(|e| {
            dm_core::Error::Validation(format!("invalid init_jitter: {}", e))
        })?;
        theta_init.iter().map(|&t| t + normal.sample(&mut rng)).collect()
    } else {
        theta_init
    };

    let inv_mass = vec![1.0; dim];
    let init_eps = find_reasonable_step_size(posterior, &q_init, &inv_mass);

    let mut adaptation = WindowedAdaptation::new(dim, n_warmup, config.target_accept, init_eps);
    let integrator = LeapfrogIntegrator::new(posterior, init_eps, inv_mass);
    let mut state = integrator.init_state(q_init)?;

    // Warmup.
    for i in 0..n_warmup {
        let eps = adaptation.step_size();
        let inv_m = adaptation.inv_mass_diag().to_vec();
        let warmup_integrator = LeapfrogIntegrator::new(posterior, eps, inv_m.clone());

        let transition =
            nuts_transition(&warmup_integrator, &state, config.max_treedepth, &inv_m, &mut rng)?;

        state.q = transition.q;
        state.potential = transition.potential;
        state.grad_potential = transition.grad_potential;

        adaptation.update(i, &state.q, transition.accept_prob);
    }

    // Sampling with fixed adapted parameters.
    let final_eps = adaptation.adapted_step_size();
    let final_inv_mass = adaptation.inv_mass_diag().to_vec();
    let sample_integrator = LeapfrogIntegrator::new(posterior, final_eps, final_inv_mass.clone());

    let mut draws = Vec::with_capacity(n_samples);
    let mut divergences = Vec::with_capacity(n_samples);
    let mut tree_depths = Vec::with_capacity(n_samples);
    let mut accept_probs = Vec::with_capacity(n_samples);
    let mut energies = Vec::with_capacity(n_samples);
    let mut n_leapfrog_total = 0usize;

    for _ in 0..n_samples {
        let transition = nuts_transition(
            &sample_integrator,
            &state,
            config.max_treedepth,
            &final_inv_mass,
            &mut rng,
        )?;

        state.q = transition.q;
        state.potential = transition.potential;
        state.grad_potential = transition.grad_potential;

        draws.push(state.q.clone());
        divergences.push(transition.divergent);
        tree_depths.push(transition.depth);
        accept_probs.push(transition.accept_prob);
        energies.push(transition.energy);
        n_leapfrog_total += transition.n_leapfrog;
    }

    tracing::debug!(
        seed,
        step_size = final_eps,
        n_leapfrog_total,
        divergences = divergences.iter().filter(|&&d| d).count(),
        "chain complete"
    );

    let mass_diag: Vec<f64> = final_inv_mass.iter().map(|&m| 1.0 / m).collect();

    Ok(Chain {
        draws,
        divergences,
        tree_depths,
        accept_probs,
        energies,
        max_treedepth: config.max_treedepth,
        step_size: final_eps,
        mass_diag,
    })
}
