//! Exact-diagonalization reference path.
//!
//! A converged flow and a direct diagonalization of the same Hamiltonian
//! must agree on spectra and on observable time series. The [`Reference`]
//! trait is the contract for that comparison; [`EighReference`] fulfills
//! it in-crate for the single-particle sector.

use ndarray as nd;
use ndarray_linalg::{ Eigh, UPLO };
use crate::{
    contract::check_square,
    dynamics::{ self, Modes },
    error::FlowResult,
};

/// Independent source of spectra and observable time series for the same
/// physical parameters as a flow run.
pub trait Reference {
    /// Eigenmode energies and transformation, in the same convention as
    /// the flow output: one mode per row of the transform, so that
    /// `T · H · Tᵗ` is diagonal.
    fn modes(&self, h: &nd::ArrayView2<f64>) -> FlowResult<Modes>;

    /// Eigenvalues in ascending order.
    fn eigenvalues(&self, h: &nd::ArrayView2<f64>)
        -> FlowResult<nd::Array1<f64>>
    {
        Ok(self.modes(h)?.energies)
    }

    /// Site occupation dynamics from an initial product state on
    /// `occupied`.
    fn occupations(
        &self,
        h: &nd::ArrayView2<f64>,
        occupied: &[usize],
        times: &nd::Array1<f64>,
    ) -> FlowResult<Vec<(f64, nd::Array1<f64>)>>
    {
        dynamics::occupations(&self.modes(h)?, occupied, times)
    }

    /// Density imbalance dynamics from an initial product state on
    /// `occupied`.
    fn imbalance(
        &self,
        h: &nd::ArrayView2<f64>,
        occupied: &[usize],
        times: &nd::Array1<f64>,
    ) -> FlowResult<Vec<(f64, f64)>>
    {
        dynamics::imbalance(&self.modes(h)?, occupied, times)
    }
}

/// Reference implementation backed by a dense symmetric eigensolver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EighReference;

impl Reference for EighReference {
    fn modes(&self, h: &nd::ArrayView2<f64>) -> FlowResult<Modes> {
        check_square(h, "EighReference")?;
        let (energies, vectors) = h.eigh(UPLO::Lower)?;
        // columns of `vectors` are eigenvectors; modes live on rows
        Ok(Modes { energies, transform: vectors.reversed_axes() })
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use ndarray as nd;
    use super::*;

    #[test]
    fn two_site_spectrum() {
        let h = nd::arr2(&[[0.5, 1.0], [1.0, -0.5]]);
        let e = EighReference.eigenvalues(&h.view()).unwrap();
        let x = 1.25_f64.sqrt();
        assert_abs_diff_eq!(e[0], -x, epsilon = 1e-12);
        assert_abs_diff_eq!(e[1],  x, epsilon = 1e-12);
    }

    #[test]
    fn modes_diagonalize_in_row_convention() {
        let h = nd::arr2(&[
            [ 1.3, -0.4,  0.0],
            [-0.4,  0.2,  0.7],
            [ 0.0,  0.7, -1.1],
        ]);
        let modes = EighReference.modes(&h.view()).unwrap();
        let t = &modes.transform;
        let d = t.dot(&h).dot(&t.t());
        for ((i, j), x) in d.indexed_iter() {
            let expected = if i == j { modes.energies[i] } else { 0.0 };
            assert_abs_diff_eq!(*x, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn diagonal_input_recovers_sorted_energies() {
        let h = nd::Array2::from_diag(&nd::arr1(&[0.9, -2.0, 0.3]));
        let e = EighReference.eigenvalues(&h.view()).unwrap();
        assert_abs_diff_eq!(e[0], -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e[1],  0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(e[2],  0.9, epsilon = 1e-12);
    }

    #[test]
    fn imbalance_starts_at_unity() {
        let h = nd::arr2(&[
            [ 0.2, 1.0,  0.0, 0.0],
            [ 1.0, -0.7, 1.0, 0.0],
            [ 0.0, 1.0,  0.4, 1.0],
            [ 0.0, 0.0,  1.0, 0.1],
        ]);
        let occ = dynamics::neel_sites(4);
        let times = nd::arr1(&[0.0]);
        let imb = EighReference.imbalance(&h.view(), &occ, &times).unwrap();
        assert_abs_diff_eq!(imb[0].1, 1.0, epsilon = 1e-12);
    }
}
