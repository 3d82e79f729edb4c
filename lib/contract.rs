//! Dense contraction primitives used to build flow generators and
//! commutators.
//!
//! All routines here are pure functions of their array arguments. Shape
//! validation happens up front and is fatal; nothing is computed for
//! malformed inputs.

use ndarray::{ self as nd, linalg::general_mat_mul };
use crate::error::{ FlowError, FlowResult };

/// Check that a rank-2 array is square and non-empty, returning its linear
/// dimension.
pub fn check_square(a: &nd::ArrayView2<f64>, context: &'static str)
    -> FlowResult<usize>
{
    let (r, c) = a.dim();
    if r == 0 {
        return Err(FlowError::EmptySystem(context));
    }
    if r != c {
        return Err(FlowError::ShapeMismatch {
            context,
            expected: vec![r, r],
            found: vec![r, c],
        });
    }
    Ok(r)
}

/// Check that a rank-4 array has all dimensions equal to `m`.
pub fn check_rank4(a: &nd::ArrayView4<f64>, m: usize, context: &'static str)
    -> FlowResult<()>
{
    let (d0, d1, d2, d3) = a.dim();
    if [d0, d1, d2, d3] != [m; 4] {
        return Err(FlowError::ShapeMismatch {
            context,
            expected: vec![m; 4],
            found: vec![d0, d1, d2, d3],
        });
    }
    Ok(())
}

/// Compute the matrix commutator `[A, B] = A B - B A`.
pub fn commutator(a: &nd::ArrayView2<f64>, b: &nd::ArrayView2<f64>)
    -> FlowResult<nd::Array2<f64>>
{
    let m = check_square(a, "commutator")?;
    if b.dim() != (m, m) {
        return Err(FlowError::ShapeMismatch {
            context: "commutator",
            expected: vec![m, m],
            found: b.shape().to_vec(),
        });
    }
    let mut out: nd::Array2<f64> = nd::Array2::zeros((m, m));
    commutator_into(a, b, &mut out);
    Ok(out)
}

/// Compute `[A, B]` into a preallocated buffer, overwriting its contents.
///
/// Shapes are assumed to already be validated; used in the step loop where
/// the buffer is reused across every flow step.
pub(crate) fn commutator_into(
    a: &nd::ArrayView2<f64>,
    b: &nd::ArrayView2<f64>,
    out: &mut nd::Array2<f64>,
) {
    general_mat_mul(1.0, a, b, 0.0, out);
    general_mat_mul(-1.0, b, a, 1.0, out);
}

/// Contract index `leg` of the rank-4 tensor `a` against the matrix `b`.
///
/// This is the single contraction primitive underlying the rank-4
/// commutators: the summed index of `b` is its row for odd legs and its
/// column for even legs, matching the creation/annihilation structure of
/// the quartic Hamiltonian term. The new index from `b` takes the place of
/// the contracted leg.
///
/// *Panics* if `leg > 3`; shape mismatches are reported as errors.
pub fn contract_leg(
    a: &nd::ArrayView4<f64>,
    b: &nd::ArrayView2<f64>,
    leg: usize,
) -> FlowResult<nd::Array4<f64>>
{
    let m = check_square(b, "contract_leg")?;
    check_rank4(a, m, "contract_leg")?;
    if leg > 3 {
        panic!("contract_leg: leg index out of range");
    }
    let mut out: nd::Array4<f64> = nd::Array4::zeros(a.raw_dim());
    for ((i, j, k, q), c) in out.indexed_iter_mut() {
        let mut acc = 0.0;
        for l in 0..m {
            acc += match leg {
                0 => a[[l, j, k, q]] * b[[i, l]],
                1 => a[[i, l, k, q]] * b[[l, j]],
                2 => a[[i, j, l, q]] * b[[k, l]],
                _ => a[[i, j, k, l]] * b[[l, q]],
            };
        }
        *c = acc;
    }
    Ok(out)
}

/// Compute the commutator of a rank-4 tensor with a matrix, as a rank-4
/// tensor.
///
/// Equal to the signed sum of the four single-leg contractions, with odd
/// legs entering positively and even legs negatively:
/// ```text
/// C[ijkq] = Σ_l A[ijkl]B[lq] - A[ijlq]B[kl] + A[ilkq]B[lj] - A[ljkq]B[il]
/// ```
pub fn commutator_42(a: &nd::ArrayView4<f64>, b: &nd::ArrayView2<f64>)
    -> FlowResult<nd::Array4<f64>>
{
    let m = check_square(b, "commutator_42")?;
    check_rank4(a, m, "commutator_42")?;
    let mut out: nd::Array4<f64> = nd::Array4::zeros(a.raw_dim());
    for ((i, j, k, q), c) in out.indexed_iter_mut() {
        let mut acc = 0.0;
        for l in 0..m {
            acc += a[[i, j, k, l]] * b[[l, q]];
            acc -= a[[i, j, l, q]] * b[[k, l]];
            acc += a[[i, l, k, q]] * b[[l, j]];
            acc -= a[[l, j, k, q]] * b[[i, l]];
        }
        *c = acc;
    }
    Ok(out)
}

/// Compute the commutator of a matrix with a rank-4 tensor, as a rank-4
/// tensor.
///
/// `[B, A] = -[A, B]` with the argument order of [`commutator_42`]
/// flipped.
pub fn commutator_24(a: &nd::ArrayView2<f64>, b: &nd::ArrayView4<f64>)
    -> FlowResult<nd::Array4<f64>>
{
    let mut out = commutator_42(b, a)?;
    out.mapv_inplace(|x| -x);
    Ok(out)
}

/// Two-point (normal-ordering) contractions of a rank-4 tensor with a
/// matrix relative to a reference occupation `state`, producing a matrix.
///
/// Each term is weighted by the occupation difference of the contracted
/// pair; pairs with equal occupation do not contribute.
pub fn normal_order_42(
    a: &nd::ArrayView4<f64>,
    b: &nd::ArrayView2<f64>,
    state: &nd::ArrayView1<f64>,
) -> FlowResult<nd::Array2<f64>>
{
    let m = check_square(b, "normal_order_42")?;
    check_rank4(a, m, "normal_order_42")?;
    if state.len() != m {
        return Err(FlowError::ShapeMismatch {
            context: "normal_order_42",
            expected: vec![m],
            found: vec![state.len()],
        });
    }
    let mut out: nd::Array2<f64> = nd::Array2::zeros((m, m));
    for ((i, j), c) in out.indexed_iter_mut() {
        let mut acc = 0.0;
        for k in 0..m {
            for q in 0..m {
                let d = state[k] - state[q];
                if d == 0.0 { continue; }
                acc += (
                    a[[i, j, k, q]]
                    + a[[k, q, i, j]]
                    - a[[k, j, i, q]]
                    + a[[i, q, k, j]]
                ) * b[[q, k]] * d;
            }
        }
        *c = acc;
    }
    Ok(out)
}

/// [`normal_order_42`] with the matrix on the left.
pub fn normal_order_24(
    a: &nd::ArrayView2<f64>,
    b: &nd::ArrayView4<f64>,
    state: &nd::ArrayView1<f64>,
) -> FlowResult<nd::Array2<f64>>
{
    let mut out = normal_order_42(b, a, state)?;
    out.mapv_inplace(|x| -x);
    Ok(out)
}

/// Two-point (normal-ordering) contractions of two rank-4 tensors relative
/// to a reference occupation `state`, producing a rank-4 tensor.
///
/// The occupation-difference terms vanish for contracted pairs with equal
/// occupation; the occupation-sum terms always contribute.
pub fn normal_order_44(
    a: &nd::ArrayView4<f64>,
    b: &nd::ArrayView4<f64>,
    state: &nd::ArrayView1<f64>,
) -> FlowResult<nd::Array4<f64>>
{
    let m = state.len();
    if m == 0 {
        return Err(FlowError::EmptySystem("normal_order_44"));
    }
    check_rank4(a, m, "normal_order_44")?;
    check_rank4(b, m, "normal_order_44")?;
    let mut out: nd::Array4<f64> = nd::Array4::zeros(a.raw_dim());
    for ((i, j, k, q), c) in out.indexed_iter_mut() {
        let mut acc = 0.0;
        for l in 0..m {
            for p in 0..m {
                let diff = state[l] - state[p];
                let tot = state[l] + state[p];
                if diff != 0.0 {
                    let sym
                        = b[[p, l, k, q]] + b[[k, q, p, l]]
                        - b[[p, q, k, l]] + b[[k, l, p, q]];
                    acc += a[[i, j, l, p]] * sym * diff;
                    acc += a[[l, p, i, j]] * sym * diff;
                    acc -= a[[l, j, i, p]] * (
                        b[[p, l, k, q]] + b[[k, l, p, q]]
                        - b[[p, q, k, l]] + b[[k, q, p, l]]
                    ) * diff;
                    acc += a[[i, l, p, j]] * (
                        b[[k, p, l, q]] + b[[k, q, l, p]]
                        + b[[l, p, k, q]] - b[[l, q, k, p]]
                    ) * diff;
                }
                acc += a[[l, j, p, q]]
                    * (b[[i, p, k, l]] + b[[i, l, k, p]]) * tot;
                acc += a[[i, l, k, p]]
                    * (b[[p, j, l, q]] + b[[l, j, p, q]]) * tot;
            }
        }
        *c = acc;
    }
    Ok(out)
}
