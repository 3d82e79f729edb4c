//! Time-dependent expectation values computed in the diagonal basis.
//!
//! Once a flow has converged (or a direct diagonalization has been done),
//! time evolution is trivial in the diagonal basis: each mode only picks
//! up a phase. Observables in the site basis are obtained by rotating the
//! phases back with the stored transformation, avoiding any
//! exponentiation of the original Hamiltonian. All outputs are ordered
//! `(time, value)` sequences, deterministic for fixed inputs.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::error::{ FlowError, FlowResult };

/// A diagonalized single-particle Hamiltonian: mode energies together
/// with the orthogonal map from the site basis to the mode basis.
///
/// Row `a` of `transform` holds the site amplitudes of mode `a`, so that
/// `transform · H · transform^T ≈ diag(energies)`. Produced by either a
/// converged flow ([`Flowed::modes`][crate::flow::Flowed::modes]) or the
/// reference path ([`Reference::modes`][crate::ed::Reference::modes]).
#[derive(Clone, Debug, PartialEq)]
pub struct Modes {
    /// Mode energies.
    pub energies: nd::Array1<f64>,
    /// Orthogonal site-to-mode transformation, one mode per row.
    pub transform: nd::Array2<f64>,
}

impl Modes {
    /// Number of sites/modes.
    pub fn len(&self) -> usize { self.energies.len() }

    /// Whether the system is empty.
    pub fn is_empty(&self) -> bool { self.energies.is_empty() }

    fn check(&self) -> FlowResult<usize> {
        let n = self.energies.len();
        if n == 0 {
            return Err(FlowError::EmptySystem("Modes"));
        }
        if self.transform.dim() != (n, n) {
            return Err(FlowError::ShapeMismatch {
                context: "Modes",
                expected: vec![n, n],
                found: self.transform.shape().to_vec(),
            });
        }
        Ok(n)
    }

    /// Single-particle propagator at time `t`:
    /// `M_ij(t) = Σ_a T_ai exp(-i e_a t) T_aj`.
    fn propagator(&self, t: f64) -> nd::Array2<C64> {
        let w: nd::Array2<C64> = self.transform.mapv(C64::from);
        let mut phased = w.clone();
        phased.axis_iter_mut(nd::Axis(0))
            .zip(self.energies.iter())
            .for_each(|(mut row, e)| {
                let ph = (-C64::i() * *e * t).exp();
                row.iter_mut().for_each(|x| { *x *= ph; });
            });
        w.t().dot(&phased)
    }
}

/// The even-index occupation pattern (a Néel-like product state), the
/// conventional initial state for imbalance dynamics.
pub fn neel_sites(n: usize) -> Vec<usize> {
    (0..n).step_by(2).collect()
}

fn check_sites(occupied: &[usize], n: usize) -> FlowResult<()> {
    for &site in occupied {
        if site >= n {
            return Err(FlowError::SiteOutOfRange { site, n });
        }
    }
    Ok(())
}

/// Site-resolved occupations at each requested time, for the product
/// initial state with the given sites occupied.
///
/// `n_i(t) = Σ_{j in occupied} |M_ij(t)|^2` with `M` the single-particle
/// propagator in the diagonal basis.
pub fn occupations(
    modes: &Modes,
    occupied: &[usize],
    times: &nd::Array1<f64>,
) -> FlowResult<Vec<(f64, nd::Array1<f64>)>>
{
    let n = modes.check()?;
    check_sites(occupied, n)?;
    let mut out: Vec<(f64, nd::Array1<f64>)>
        = Vec::with_capacity(times.len());
    for &t in times.iter() {
        let prop = modes.propagator(t);
        let occ: nd::Array1<f64>
            = (0..n)
            .map(|i| {
                occupied.iter()
                    .map(|&j| prop[[i, j]].norm_sqr())
                    .sum()
            })
            .collect();
        out.push((t, occ));
    }
    Ok(out)
}

/// Occupation dynamics of a single site.
pub fn occupation(
    modes: &Modes,
    site: usize,
    occupied: &[usize],
    times: &nd::Array1<f64>,
) -> FlowResult<Vec<(f64, f64)>>
{
    let n = modes.check()?;
    if site >= n {
        return Err(FlowError::SiteOutOfRange { site, n });
    }
    let occ = occupations(modes, occupied, times)?;
    Ok(occ.into_iter().map(|(t, ni)| (t, ni[site])).collect())
}

/// Imbalance dynamics: the normalized alternating-sign sum of site
/// occupations,
/// `I(t) = Σ_i (-1)^i n_i(t) / Σ_i n_i(t)`.
///
/// With occupation on the even sites ([`neel_sites`]), `I(0) = 1`; decay
/// toward zero signals thermalization, a persistent plateau signals
/// localization.
pub fn imbalance(
    modes: &Modes,
    occupied: &[usize],
    times: &nd::Array1<f64>,
) -> FlowResult<Vec<(f64, f64)>>
{
    if occupied.is_empty() {
        return Err(FlowError::EmptySystem("imbalance: occupied sites"));
    }
    let occ = occupations(modes, occupied, times)?;
    Ok(
        occ.into_iter()
            .map(|(t, ni)| {
                let signed: f64
                    = ni.iter().enumerate()
                    .map(|(i, x)| if i % 2 == 0 { *x } else { -*x })
                    .sum();
                let total: f64 = ni.sum();
                (t, signed / total)
            })
            .collect()
    )
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use ndarray as nd;
    use super::*;

    // two decoupled sites: the transform is the identity and nothing
    // moves, whatever the energies
    fn trivial_modes() -> Modes {
        Modes {
            energies: nd::arr1(&[0.7, -0.3]),
            transform: nd::Array2::eye(2),
        }
    }

    // symmetric two-site hopping J = 1: modes (1, ±1)/sqrt(2) with
    // energies ±1, giving Rabi oscillation n_0(t) = cos^2(t)
    fn hopping_modes() -> Modes {
        let s = 1.0 / 2.0_f64.sqrt();
        Modes {
            energies: nd::arr1(&[1.0, -1.0]),
            transform: nd::arr2(&[[s, s], [s, -s]]),
        }
    }

    #[test]
    fn initial_occupations_match_the_product_state() {
        let times = nd::arr1(&[0.0]);
        let occ = occupations(&hopping_modes(), &[0], &times).unwrap();
        assert_eq!(occ.len(), 1);
        assert_abs_diff_eq!(occ[0].1[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(occ[0].1[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn decoupled_sites_are_stationary() {
        let times = nd::arr1(&[0.0, 1.3, 7.7]);
        let occ = occupations(&trivial_modes(), &[0], &times).unwrap();
        for (_, ni) in occ {
            assert_abs_diff_eq!(ni[0], 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(ni[1], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn two_site_hopping_oscillates() {
        let times: nd::Array1<f64> = nd::arr1(&[0.0, 0.5, 1.0, 2.0]);
        let occ = occupation(&hopping_modes(), 0, &[0], &times).unwrap();
        for (t, n0) in occ {
            assert_abs_diff_eq!(n0, t.cos().powi(2), epsilon = 1e-12);
        }
    }

    #[test]
    fn total_occupation_is_conserved() {
        let times = nd::arr1(&[0.0, 0.9, 3.1]);
        let occ = occupations(&hopping_modes(), &[0], &times).unwrap();
        for (_, ni) in occ {
            assert_abs_diff_eq!(ni.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn imbalance_starts_at_unity_for_neel_occupation() {
        let times = nd::arr1(&[0.0]);
        let sites = neel_sites(2);
        let imb = imbalance(&hopping_modes(), &sites, &times).unwrap();
        assert_abs_diff_eq!(imb[0].1, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn site_out_of_range_is_rejected() {
        let times = nd::arr1(&[0.0]);
        assert!(occupation(&hopping_modes(), 5, &[0], &times).is_err());
        assert!(occupations(&hopping_modes(), &[3], &times).is_err());
    }
}
