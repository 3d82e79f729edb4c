//! Hamiltonian builders for the disordered spinless-fermion chain.

use ndarray as nd;
use rand::{ Rng, distributions::{ Distribution, Uniform } };
use crate::error::{ FlowError, FlowResult };

/// Physical parameters for a single disorder realization of the chain:
/// on-site energies, nearest-neighbor hopping `J`, and nearest-neighbor
/// density-density interaction strength.
#[derive(Clone, Debug, PartialEq)]
pub struct DisorderedChain {
    disorder: nd::Array1<f64>,
    hopping: f64,
    interaction: f64,
}

impl DisorderedChain {
    /// Create a realization with an explicit on-site disorder vector.
    pub fn new(
        disorder: nd::Array1<f64>,
        hopping: f64,
        interaction: f64,
    ) -> FlowResult<Self>
    {
        if disorder.is_empty() {
            return Err(FlowError::EmptySystem("DisorderedChain"));
        }
        Ok(Self { disorder, hopping, interaction })
    }

    /// Sample a realization with on-site energies drawn uniformly from
    /// `[-w, w]`.
    ///
    /// The generator is caller-supplied so that realizations are
    /// reproducible from a seeded generator and independent runs can use
    /// independent streams.
    pub fn sample<R>(
        n: usize,
        w: f64,
        hopping: f64,
        interaction: f64,
        rng: &mut R,
    ) -> FlowResult<Self>
    where R: Rng + ?Sized
    {
        if n == 0 {
            return Err(FlowError::EmptySystem("DisorderedChain"));
        }
        let dist = Uniform::new_inclusive(-w, w);
        let disorder: nd::Array1<f64>
            = (0..n).map(|_| dist.sample(rng)).collect();
        Ok(Self { disorder, hopping, interaction })
    }

    /// Number of sites.
    pub fn len(&self) -> usize { self.disorder.len() }

    /// Whether the chain has no sites.
    pub fn is_empty(&self) -> bool { self.disorder.is_empty() }

    /// On-site energies.
    pub fn disorder(&self) -> &nd::Array1<f64> { &self.disorder }

    /// Hopping amplitude.
    pub fn hopping(&self) -> f64 { self.hopping }

    /// Interaction strength.
    pub fn interaction(&self) -> f64 { self.interaction }

    /// Build the single-particle Hamiltonian: on-site energies on the
    /// diagonal, hopping on the first off-diagonals (open boundaries).
    pub fn h2(&self) -> nd::Array2<f64> {
        let n = self.len();
        let mut h: nd::Array2<f64>
            = nd::Array2::from_diag(&self.disorder);
        for i in 0..n - 1 {
            h[[i, i + 1]] = self.hopping;
            h[[i + 1, i]] = self.hopping;
        }
        h
    }

    /// Build the rank-4 interaction tensor: nearest-neighbor
    /// density-density coupling, split symmetrically across the two
    /// index-pair orderings so each bond carries `interaction` in total.
    pub fn h4(&self) -> nd::Array4<f64> {
        let n = self.len();
        let mut h: nd::Array4<f64> = nd::Array4::zeros((n, n, n, n));
        for i in 0..n - 1 {
            h[[i, i, i + 1, i + 1]] = self.interaction / 2.0;
            h[[i + 1, i + 1, i, i]] = self.interaction / 2.0;
        }
        h
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use ndarray as nd;
    use rand::SeedableRng;
    use super::*;

    #[test]
    fn single_particle_matrix_has_chain_structure() {
        let chain = DisorderedChain::new(
            nd::arr1(&[0.5, -0.25, 1.0]), 1.0, 0.0).unwrap();
        let h = chain.h2();
        assert_eq!(h.dim(), (3, 3));
        assert_abs_diff_eq!(h[[0, 0]], 0.5);
        assert_abs_diff_eq!(h[[1, 1]], -0.25);
        assert_abs_diff_eq!(h[[0, 1]], 1.0);
        assert_abs_diff_eq!(h[[1, 0]], 1.0);
        assert_abs_diff_eq!(h[[0, 2]], 0.0);
        // symmetric
        for ((i, j), x) in h.indexed_iter() {
            assert_abs_diff_eq!(*x, h[[j, i]]);
        }
    }

    #[test]
    fn interaction_tensor_couples_neighboring_densities() {
        let chain = DisorderedChain::new(
            nd::arr1(&[0.0, 0.0, 0.0]), 1.0, 0.8).unwrap();
        let h4 = chain.h4();
        assert_abs_diff_eq!(h4[[0, 0, 1, 1]], 0.4);
        assert_abs_diff_eq!(h4[[1, 1, 0, 0]], 0.4);
        assert_abs_diff_eq!(h4[[0, 0, 2, 2]], 0.0);
        let total: f64 = h4.sum();
        assert_abs_diff_eq!(total, 2.0 * 0.8, epsilon = 1e-15);
    }

    #[test]
    fn sampled_disorder_is_bounded_and_reproducible() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(12);
        let a = DisorderedChain::sample(16, 5.0, 1.0, 0.1, &mut rng)
            .unwrap();
        assert!(a.disorder().iter().all(|x| x.abs() <= 5.0));
        let mut rng = rand::rngs::StdRng::seed_from_u64(12);
        let b = DisorderedChain::sample(16, 5.0, 1.0, 0.1, &mut rng)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert!(DisorderedChain::new(nd::arr1(&[]), 1.0, 0.0).is_err());
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        assert!(
            DisorderedChain::sample(0, 5.0, 1.0, 0.0, &mut rng).is_err());
    }
}
