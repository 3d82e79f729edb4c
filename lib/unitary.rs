//! Diagnostics on the accumulated flow transformation.
//!
//! The transformation produced by the integrator is only approximately
//! orthogonal; nothing enforces the property structurally, so it has to
//! be measured. Both diagnostics here shrink toward the numerical floor
//! as `dl` is reduced for a converged flow, and grow when the step size
//! is too large.

use ndarray::{ self as nd };
use crate::{
    contract::check_square,
    error::{ FlowError, FlowResult },
};

/// Conjugate `h` by `u`: compute `u h u^T`.
///
/// For the accumulated flow transformation applied to the original
/// Hamiltonian, this reproduces the flowed Hamiltonian up to integration
/// error.
pub fn reconstruct(u: &nd::ArrayView2<f64>, h: &nd::ArrayView2<f64>)
    -> FlowResult<nd::Array2<f64>>
{
    let m = check_square(u, "reconstruct")?;
    if h.dim() != (m, m) {
        return Err(FlowError::ShapeMismatch {
            context: "reconstruct",
            expected: vec![m, m],
            found: h.shape().to_vec(),
        });
    }
    Ok(u.dot(h).dot(&u.t()))
}

/// Maximum absolute entry of `u h_original u^T - h_flowed`.
pub fn reconstruction_residual(
    u: &nd::ArrayView2<f64>,
    h_original: &nd::ArrayView2<f64>,
    h_flowed: &nd::ArrayView2<f64>,
) -> FlowResult<f64>
{
    let m = check_square(u, "reconstruction_residual")?;
    if h_flowed.dim() != (m, m) {
        return Err(FlowError::ShapeMismatch {
            context: "reconstruction_residual",
            expected: vec![m, m],
            found: h_flowed.shape().to_vec(),
        });
    }
    let rec = reconstruct(u, h_original)?;
    Ok(
        rec.iter().zip(h_flowed.iter())
            .map(|(r, h)| (r - h).abs())
            .fold(0.0, f64::max)
    )
}

/// Maximum absolute entry of `u u^T - I`.
pub fn unitarity_deviation(u: &nd::ArrayView2<f64>) -> FlowResult<f64> {
    let m = check_square(u, "unitarity_deviation")?;
    let uut = u.dot(&u.t());
    let eye: nd::Array2<f64> = nd::Array2::eye(m);
    Ok(
        uut.iter().zip(eye.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    )
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use ndarray as nd;
    use super::*;

    #[test]
    fn identity_transform_is_exact() {
        let h = nd::arr2(&[[1.0, 0.5], [0.5, -1.0]]);
        let eye: nd::Array2<f64> = nd::Array2::eye(2);
        let rec = reconstruct(&eye.view(), &h.view()).unwrap();
        for (x, y) in rec.iter().zip(h.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-15);
        }
        assert_abs_diff_eq!(
            unitarity_deviation(&eye.view()).unwrap(), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(
            reconstruction_residual(&eye.view(), &h.view(), &h.view())
                .unwrap(),
            0.0,
            epsilon = 1e-15,
        );
    }

    #[test]
    fn rotation_preserves_orthogonality() {
        let th: f64 = 0.37;
        let u = nd::arr2(&[
            [th.cos(), -th.sin()],
            [th.sin(),  th.cos()],
        ]);
        assert!(unitarity_deviation(&u.view()).unwrap() < 1e-15);
        // conjugation by an exact rotation preserves the spectrum: check
        // the trace and determinant of the reconstruction
        let h = nd::arr2(&[[2.0, 1.0], [1.0, -2.0]]);
        let rec = reconstruct(&u.view(), &h.view()).unwrap();
        let tr = rec.diag().sum();
        let det = rec[[0, 0]] * rec[[1, 1]] - rec[[0, 1]] * rec[[1, 0]];
        assert_abs_diff_eq!(tr, 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(det, -5.0, epsilon = 1e-13);
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let u: nd::Array2<f64> = nd::Array2::eye(3);
        let h: nd::Array2<f64> = nd::Array2::zeros((2, 2));
        assert!(reconstruct(&u.view(), &h.view()).is_err());
    }
}
