//! Flow-equation integrator.
//!
//! Evolves a Hamiltonian under `dH/dl = [eta(H), H]` while accumulating
//! the unitary `dU/dl = eta * U` connecting the original basis to the
//! (quasi-)diagonal one. The off-diagonality of `H` is monitored at every
//! step; the loop ends in one of the [`Termination`] states, all of which
//! are returned to the caller together with the best-effort state.

use itertools::Itertools;
use ndarray::{ self as nd, linalg::general_mat_mul };
use num_traits::Float;
use crate::{
    contract::{
        check_square,
        check_rank4,
        commutator,
        commutator_into,
        commutator_42,
        commutator_24,
        normal_order_42,
        normal_order_24,
        normal_order_44,
    },
    dynamics::Modes,
    error::FlowResult,
    generator::{
        generator_into,
        generator_int,
        offdiag_norm,
        offdiag_norm_int,
    },
    unitary,
};

/// Step size, budget, and stopping policy for a flow run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FlowParams {
    /// Flow-parameter step size. Must be positive and finite.
    pub dl: f64,
    /// Maximum number of steps before giving up.
    pub steps: usize,
    /// Off-diagonality threshold below which the flow is converged.
    pub tol: f64,
    /// Number of consecutive steps with growing off-diagonality before the
    /// run is declared divergent.
    pub patience: usize,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self { dl: 1e-3, steps: 100_000, tol: 1e-8, patience: 5 }
    }
}

/// How a flow run ended.
///
/// Only [`Self::Converged`] guarantees that the diagonal approximation is
/// valid for downstream observable reconstruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The off-diagonality measure passed below tolerance.
    Converged,
    /// The off-diagonality measure grew over enough consecutive steps to
    /// rule out convergence; usually a sign that `dl` is too large for the
    /// spectral width.
    Diverged {
        /// Step at which divergence was declared.
        step: usize,
    },
    /// A non-finite value appeared; the state was rolled back to the last
    /// step at which all entries were finite.
    Unstable {
        /// Step whose result was discarded.
        step: usize,
    },
    /// The step budget ran out before the tolerance was reached.
    BudgetExhausted,
}

impl Termination {
    /// Whether the flow reached its fixed point.
    pub fn is_converged(&self) -> bool { matches!(self, Self::Converged) }
}

/// Result of a single-particle flow run.
///
/// Both arrays are read-only from here on: the flowed (quasi-diagonal)
/// Hamiltonian and the accumulated transformation satisfying
/// `U H_original U^T ≈ H` up to the residual off-diagonality and
/// integration error.
#[derive(Clone, Debug)]
pub struct Flowed {
    /// Flowed Hamiltonian.
    pub h: nd::Array2<f64>,
    /// Accumulated (approximately orthogonal) transformation.
    pub u: nd::Array2<f64>,
    /// Final value of the flow parameter.
    pub l: f64,
    /// Number of steps actually taken.
    pub steps: usize,
    /// Final off-diagonality measure.
    pub offdiag: f64,
    /// Terminal state of the run.
    pub termination: Termination,
    /// Off-diagonality after every step, starting with the input value.
    pub offdiag_trace: Vec<f64>,
}

impl Flowed {
    /// Package the flowed diagonal and transformation for observable
    /// evolution.
    ///
    /// The energies are meaningful only up to the residual off-diagonality;
    /// check [`Self::termination`] before trusting downstream dynamics.
    pub fn modes(&self) -> Modes {
        Modes {
            energies: self.h.diag().to_owned(),
            transform: self.u.clone(),
        }
    }

    /// Diagonal of the flowed Hamiltonian in ascending order, for direct
    /// comparison against eigensolver output.
    pub fn sorted_energies(&self) -> Vec<f64> {
        self.h.diag().iter().copied()
            .sorted_by(f64::total_cmp)
            .collect()
    }

    /// Maximum absolute deviation of `U H_original U^T` from the flowed
    /// Hamiltonian.
    pub fn reconstruction_residual(&self, h_original: &nd::ArrayView2<f64>)
        -> FlowResult<f64>
    {
        unitary::reconstruction_residual(
            &self.u.view(), h_original, &self.h.view())
    }

    /// Maximum absolute deviation of `U U^T` from the identity.
    pub fn unitarity_deviation(&self) -> FlowResult<f64> {
        unitary::unitarity_deviation(&self.u.view())
    }
}

/// A single-step advance rule for the coupled `(H, U)` system.
///
/// Implementations must advance both arrays in place using the same
/// generator, leaving the generator/accumulator contracts untouched so
/// that schemes are interchangeable in [`flow_with`].
pub trait Scheme {
    /// Advance `(H, U)` by one step of size `dl`.
    fn step(
        &mut self,
        h: &mut nd::Array2<f64>,
        u: &mut nd::Array2<f64>,
        dl: f64,
    );
}

/// Explicit forward-Euler stepping with all intermediates preallocated
/// once and reused across the step loop.
#[derive(Clone, Debug)]
pub struct Euler {
    h0: nd::Array2<f64>,
    eta: nd::Array2<f64>,
    dh: nd::Array2<f64>,
    du: nd::Array2<f64>,
}

impl Euler {
    /// Allocate buffers for linear dimension `m`.
    pub fn new(m: usize) -> Self {
        Self {
            h0: nd::Array2::zeros((m, m)),
            eta: nd::Array2::zeros((m, m)),
            dh: nd::Array2::zeros((m, m)),
            du: nd::Array2::zeros((m, m)),
        }
    }
}

impl Scheme for Euler {
    fn step(
        &mut self,
        h: &mut nd::Array2<f64>,
        u: &mut nd::Array2<f64>,
        dl: f64,
    ) {
        generator_into(&h.view(), &mut self.h0, &mut self.eta);
        commutator_into(&self.eta.view(), &h.view(), &mut self.dh);
        general_mat_mul(1.0, &self.eta, u, 0.0, &mut self.du);
        h.scaled_add(dl, &self.dh);
        u.scaled_add(dl, &self.du);
    }
}

/// Classic fourth-order Runge-Kutta stepping, recomputing the generator
/// at every substep.
#[derive(Copy, Clone, Debug, Default)]
pub struct Rk4;

impl Rk4 {
    fn rhs(h: &nd::Array2<f64>, u: &nd::Array2<f64>)
        -> (nd::Array2<f64>, nd::Array2<f64>)
    {
        let m = h.nrows();
        let mut h0: nd::Array2<f64> = nd::Array2::zeros((m, m));
        let mut eta: nd::Array2<f64> = nd::Array2::zeros((m, m));
        generator_into(&h.view(), &mut h0, &mut eta);
        let mut dh: nd::Array2<f64> = nd::Array2::zeros((m, m));
        commutator_into(&eta.view(), &h.view(), &mut dh);
        let du = eta.dot(u);
        (dh, du)
    }
}

impl Scheme for Rk4 {
    fn step(
        &mut self,
        h: &mut nd::Array2<f64>,
        u: &mut nd::Array2<f64>,
        dl: f64,
    ) {
        let (k1h, k1u) = Self::rhs(h, u);
        let (k2h, k2u) = Self::rhs(
            &(&*h + &(&k1h * (dl / 2.0))), &(&*u + &(&k1u * (dl / 2.0))));
        let (k3h, k3u) = Self::rhs(
            &(&*h + &(&k2h * (dl / 2.0))), &(&*u + &(&k2u * (dl / 2.0))));
        let (k4h, k4u) = Self::rhs(
            &(&*h + &(&k3h * dl)), &(&*u + &(&k3u * dl)));
        *h += &((k1h + k2h * 2.0 + k3h * 2.0 + k4h) * (dl / 6.0));
        *u += &((k1u + k2u * 2.0 + k3u * 2.0 + k4u) * (dl / 6.0));
    }
}

fn all_finite<F, D>(a: &nd::Array<F, D>) -> bool
where
    F: Float,
    D: nd::Dimension,
{
    a.iter().all(|x| x.is_finite())
}

/// Run the flow with the default forward-Euler scheme.
pub fn flow(h_init: &nd::ArrayView2<f64>, params: &FlowParams)
    -> FlowResult<Flowed>
{
    let m = check_square(h_init, "flow")?;
    flow_with(h_init, params, &mut Euler::new(m))
}

/// Run the flow with a caller-supplied stepping scheme.
///
/// Stops at convergence (`offdiag <= tol`), detected divergence, a
/// non-finite state (rolled back by one step), or budget exhaustion; the
/// resulting [`Flowed`] always carries the last valid state and the full
/// off-diagonality trace.
///
/// *Panics* if `dl` is not positive and finite.
pub fn flow_with<S>(
    h_init: &nd::ArrayView2<f64>,
    params: &FlowParams,
    scheme: &mut S,
) -> FlowResult<Flowed>
where S: Scheme
{
    let m = check_square(h_init, "flow")?;
    if !(params.dl > 0.0 && params.dl.is_finite()) {
        panic!("flow: step size must be positive and finite");
    }
    let mut h: nd::Array2<f64> = h_init.to_owned();
    let mut u: nd::Array2<f64> = nd::Array2::eye(m);
    let mut h_prev: nd::Array2<f64> = h.clone();
    let mut u_prev: nd::Array2<f64> = u.clone();
    let mut offdiag = offdiag_norm(h_init);
    let mut trace: Vec<f64> = Vec::with_capacity(params.steps + 1);
    trace.push(offdiag);
    let mut termination = Termination::BudgetExhausted;
    let mut growing: usize = 0;
    let mut steps_taken: usize = 0;
    if offdiag <= params.tol {
        termination = Termination::Converged;
    } else {
        for k in 0..params.steps {
            h_prev.assign(&h);
            u_prev.assign(&u);
            scheme.step(&mut h, &mut u, params.dl);
            let off = offdiag_norm(&h.view());
            if !off.is_finite() || !all_finite(&h) || !all_finite(&u) {
                h.assign(&h_prev);
                u.assign(&u_prev);
                termination = Termination::Unstable { step: k };
                break;
            }
            steps_taken = k + 1;
            trace.push(off);
            if off <= params.tol {
                offdiag = off;
                termination = Termination::Converged;
                break;
            }
            if off > offdiag {
                growing += 1;
                if growing >= params.patience.max(1) {
                    offdiag = off;
                    termination = Termination::Diverged { step: k };
                    break;
                }
            } else {
                growing = 0;
            }
            offdiag = off;
        }
    }
    Ok(Flowed {
        h,
        u,
        l: steps_taken as f64 * params.dl,
        steps: steps_taken,
        offdiag,
        termination,
        offdiag_trace: trace,
    })
}

/// Result of an interacting flow run.
///
/// No transformation is accumulated in the interacting case; the flowed
/// tensors themselves are the output (the diagonal of `h2` gives the
/// single-particle energies of the conserved densities, the
/// density-density part of `h4` their mutual interactions).
#[derive(Clone, Debug)]
pub struct FlowedInt {
    /// Flowed quadratic Hamiltonian.
    pub h2: nd::Array2<f64>,
    /// Flowed quartic (interaction) tensor.
    pub h4: nd::Array4<f64>,
    /// Final value of the flow parameter.
    pub l: f64,
    /// Number of steps actually taken.
    pub steps: usize,
    /// Final combined off-diagonality measure.
    pub offdiag: f64,
    /// Terminal state of the run.
    pub termination: Termination,
    /// Combined off-diagonality after every step, starting with the input
    /// value.
    pub offdiag_trace: Vec<f64>,
}

/// Run the interacting flow on the pair `(H2, H4)` with forward-Euler
/// stepping.
///
/// The truncated flow keeps the quadratic and quartic sectors:
/// ```text
/// dH2/dl = [eta2, H2]            (+ two-point corrections)
/// dH4/dl = [eta4, H2] + [eta2, H4]  (+ two-point corrections)
/// ```
/// When a reference occupation `state` is supplied, the rank-6 terms
/// generated by `[eta4, H4]` are folded back into the kept sectors via
/// their normal-ordered two-point contractions; otherwise they are
/// dropped entirely.
pub fn flow_int(
    h2_init: &nd::ArrayView2<f64>,
    h4_init: &nd::ArrayView4<f64>,
    params: &FlowParams,
    state: Option<&nd::ArrayView1<f64>>,
) -> FlowResult<FlowedInt>
{
    let m = check_square(h2_init, "flow_int")?;
    check_rank4(h4_init, m, "flow_int")?;
    if !(params.dl > 0.0 && params.dl.is_finite()) {
        panic!("flow_int: step size must be positive and finite");
    }
    let mut h2: nd::Array2<f64> = h2_init.to_owned();
    let mut h4: nd::Array4<f64> = h4_init.to_owned();
    let mut h2_prev = h2.clone();
    let mut h4_prev = h4.clone();
    let mut offdiag = offdiag_norm_int(&h2.view(), &h4.view());
    let mut trace: Vec<f64> = Vec::with_capacity(params.steps + 1);
    trace.push(offdiag);
    let mut termination = Termination::BudgetExhausted;
    let mut growing: usize = 0;
    let mut steps_taken: usize = 0;
    if offdiag <= params.tol {
        termination = Termination::Converged;
    } else {
        for k in 0..params.steps {
            h2_prev.assign(&h2);
            h4_prev.assign(&h4);
            let (eta2, eta4) = generator_int(&h2.view(), &h4.view())?;
            let mut dh2 = commutator(&eta2.view(), &h2.view())?;
            let mut dh4 = commutator_42(&eta4.view(), &h2.view())?;
            dh4 += &commutator_24(&eta2.view(), &h4.view())?;
            if let Some(occ) = state {
                dh2 += &normal_order_42(&eta4.view(), &h2.view(), occ)?;
                dh2 += &normal_order_24(&eta2.view(), &h4.view(), occ)?;
                dh4 += &normal_order_44(&eta4.view(), &h4.view(), occ)?;
            }
            h2.scaled_add(params.dl, &dh2);
            h4.scaled_add(params.dl, &dh4);
            let off = offdiag_norm_int(&h2.view(), &h4.view());
            if !off.is_finite() || !all_finite(&h2) || !all_finite(&h4) {
                h2.assign(&h2_prev);
                h4.assign(&h4_prev);
                termination = Termination::Unstable { step: k };
                break;
            }
            steps_taken = k + 1;
            trace.push(off);
            if off <= params.tol {
                offdiag = off;
                termination = Termination::Converged;
                break;
            }
            if off > offdiag {
                growing += 1;
                if growing >= params.patience.max(1) {
                    offdiag = off;
                    termination = Termination::Diverged { step: k };
                    break;
                }
            } else {
                growing = 0;
            }
            offdiag = off;
        }
    }
    Ok(FlowedInt {
        h2,
        h4,
        l: steps_taken as f64 * params.dl,
        steps: steps_taken,
        offdiag,
        termination,
        offdiag_trace: trace,
    })
}
