//! Construction of the canonical flow generator and the off-diagonality
//! measures that drive and terminate the flow.
//!
//! The canonical (Wegner) generator is the commutator of the diagonal part
//! of the flowing Hamiltonian with the off-diagonal remainder,
//! `eta = [H0, V]`. Since `[H0, H0] = 0` for diagonal `H0`, this equals
//! `[H0, H]`, which is the form computed here.

use ndarray as nd;
use crate::{
    contract::{
        check_square,
        check_rank4,
        commutator_into,
        commutator_42,
        commutator_24,
    },
    error::FlowResult,
};

/// Extract the diagonal part of a square matrix as a full (mostly zero)
/// matrix of the same shape.
pub fn diag_part(h: &nd::ArrayView2<f64>) -> FlowResult<nd::Array2<f64>> {
    let m = check_square(h, "diag_part")?;
    let mut h0: nd::Array2<f64> = nd::Array2::zeros((m, m));
    h0.diag_mut().assign(&h.diag());
    Ok(h0)
}

/// Extract the off-diagonal remainder `V = H - H0`.
pub fn offdiag_part(h: &nd::ArrayView2<f64>) -> FlowResult<nd::Array2<f64>> {
    check_square(h, "offdiag_part")?;
    let mut v = h.to_owned();
    v.diag_mut().fill(0.0);
    Ok(v)
}

/// Write the diagonal part of `h` into the preallocated buffer `h0`.
pub(crate) fn diag_part_into(
    h: &nd::ArrayView2<f64>,
    h0: &mut nd::Array2<f64>,
) {
    h0.fill(0.0);
    h0.diag_mut().assign(&h.diag());
}

/// Maximum absolute off-diagonal entry of `h`.
///
/// This is the scalar convergence/divergence signal monitored at every
/// flow step. Returns NaN if any off-diagonal entry is NaN.
pub fn offdiag_norm(h: &nd::ArrayView2<f64>) -> f64 {
    h.indexed_iter()
        .filter(|((i, j), _)| i != j)
        .map(|(_, x)| x.abs())
        .fold(0.0, f64::max)
}

/// Compute the canonical generator `eta = [H0, V]`.
///
/// Vanishes identically when `H` is already diagonal, making exact
/// diagonalization a fixed point of the flow.
pub fn generator(h: &nd::ArrayView2<f64>) -> FlowResult<nd::Array2<f64>> {
    let m = check_square(h, "generator")?;
    let h0 = diag_part(h)?;
    let mut eta: nd::Array2<f64> = nd::Array2::zeros((m, m));
    commutator_into(&h0.view(), h, &mut eta);
    Ok(eta)
}

/// Compute the canonical generator into a preallocated buffer, using a
/// second buffer for the diagonal part.
pub(crate) fn generator_into(
    h: &nd::ArrayView2<f64>,
    h0: &mut nd::Array2<f64>,
    eta: &mut nd::Array2<f64>,
) {
    diag_part_into(h, h0);
    commutator_into(&h0.view(), h, eta);
}

/// Whether a quartic index quadruple is "diagonal", i.e. commutes with
/// every number operator.
///
/// This holds exactly when the creation indices `{i, k}` match the
/// annihilation indices `{j, q}` as multisets: the density-density form
/// `h4[i, i, j, j]` and the exchange form `h4[i, j, j, i]`. Such entries
/// have vanishing flow rate once the quadratic sector is diagonal; they
/// are the interactions between the emergent conserved densities, not
/// off-diagonality to be decayed.
pub(crate) fn is_diag_quad(i: usize, j: usize, k: usize, q: usize) -> bool {
    (i == j && k == q) || (i == q && j == k)
}

/// Extract the "diagonal" part of an interaction tensor: all entries
/// pairing creation with annihilation indices (see [`is_diag_quad`]).
pub fn diag_part_int(h4: &nd::ArrayView4<f64>) -> nd::Array4<f64> {
    let mut h0: nd::Array4<f64> = nd::Array4::zeros(h4.raw_dim());
    h0.indexed_iter_mut()
        .filter(|((i, j, k, q), _)| is_diag_quad(*i, *j, *k, *q))
        .for_each(|((i, j, k, q), x)| *x = h4[[i, j, k, q]]);
    h0
}

/// Extract the non-index-paired remainder of an interaction tensor.
pub fn offdiag_part_int(h4: &nd::ArrayView4<f64>) -> nd::Array4<f64> {
    let mut v = h4.to_owned();
    v.indexed_iter_mut()
        .filter(|((i, j, k, q), _)| is_diag_quad(*i, *j, *k, *q))
        .for_each(|(_, x)| *x = 0.0);
    v
}

/// Combined off-diagonality of the quadratic and quartic sectors: the
/// maximum absolute entry outside the diagonal (rank 2) and index-paired
/// (rank 4) forms.
pub fn offdiag_norm_int(
    h2: &nd::ArrayView2<f64>,
    h4: &nd::ArrayView4<f64>,
) -> f64 {
    let quartic = h4.indexed_iter()
        .filter(|((i, j, k, q), _)| !is_diag_quad(*i, *j, *k, *q))
        .map(|(_, x)| x.abs())
        .fold(0.0, f64::max);
    offdiag_norm(h2).max(quartic)
}

/// Compute the generator for an interacting Hamiltonian `(H2, H4)`.
///
/// The quadratic part is the canonical `[H0_2, V2]`; the quartic part
/// collects the rank-4 commutators of the diagonal sectors with the
/// opposite-rank perturbations:
/// ```text
/// eta4 = [H0_4, V2] + [H0_2, V4]
/// ```
pub fn generator_int(
    h2: &nd::ArrayView2<f64>,
    h4: &nd::ArrayView4<f64>,
) -> FlowResult<(nd::Array2<f64>, nd::Array4<f64>)>
{
    let m = check_square(h2, "generator_int")?;
    check_rank4(h4, m, "generator_int")?;
    let eta2 = generator(h2)?;
    let h0_2 = diag_part(h2)?;
    let v2 = offdiag_part(h2)?;
    let h0_4 = diag_part_int(h4);
    let v4 = offdiag_part_int(h4);
    let mut eta4 = commutator_42(&h0_4.view(), &v2.view())?;
    eta4 += &commutator_24(&h0_2.view(), &v4.view())?;
    Ok((eta2, eta4))
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use ndarray as nd;
    use super::*;

    #[test]
    fn generator_vanishes_for_diagonal_input() {
        let h = nd::Array2::from_diag(&nd::arr1(&[1.0, -2.0, 0.5, 3.0]));
        let eta = generator(&h.view()).unwrap();
        assert!(eta.iter().all(|x| x.abs() < 1e-15));
    }

    #[test]
    fn generator_is_antisymmetric() {
        let h = nd::arr2(&[
            [ 2.0,  1.0,  0.0],
            [ 1.0, -1.0,  1.0],
            [ 0.0,  1.0,  0.5],
        ]);
        let eta = generator(&h.view()).unwrap();
        for ((i, j), x) in eta.indexed_iter() {
            assert_abs_diff_eq!(*x, -eta[[j, i]], epsilon = 1e-14);
        }
        // eta_ij = (h_ii - h_jj) h_ij for the canonical generator
        assert_abs_diff_eq!(eta[[0, 1]], (2.0 - -1.0) * 1.0, epsilon = 1e-14);
    }

    #[test]
    fn offdiag_norm_ignores_diagonal() {
        let h = nd::arr2(&[
            [100.0,  0.25],
            [ 0.25, -50.0],
        ]);
        assert_abs_diff_eq!(offdiag_norm(&h.view()), 0.25, epsilon = 1e-15);
    }

    #[test]
    fn interacting_generator_vanishes_at_fixed_point() {
        let h2 = nd::Array2::from_diag(&nd::arr1(&[1.0, 2.0, 3.0]));
        let mut h4: nd::Array4<f64> = nd::Array4::zeros((3, 3, 3, 3));
        h4[[0, 0, 1, 1]] = 0.5;
        h4[[1, 1, 0, 0]] = 0.5;
        let (eta2, eta4) = generator_int(&h2.view(), &h4.view()).unwrap();
        assert!(eta2.iter().all(|x| x.abs() < 1e-15));
        assert!(eta4.iter().all(|x| x.abs() < 1e-15));
    }

    #[test]
    fn offdiag_norm_int_sees_both_sectors() {
        let h2 = nd::Array2::from_diag(&nd::arr1(&[1.0, 2.0]));
        let mut h4: nd::Array4<f64> = nd::Array4::zeros((2, 2, 2, 2));
        h4[[0, 0, 1, 1]] = 9.0; // density-density: excluded
        h4[[0, 1, 0, 1]] = 0.125;
        assert_abs_diff_eq!(
            offdiag_norm_int(&h2.view(), &h4.view()),
            0.125,
            epsilon = 1e-15,
        );
    }
}
