//! Error types shared across the crate.
//!
//! Only structurally fatal conditions (incompatible array shapes, linear
//! algebra backend failures) are surfaced as `Err`s. Convergence-quality
//! problems encountered during a flow are not errors; they are reported
//! through [`Termination`][crate::flow::Termination] alongside the
//! best-effort result.

use thiserror::Error;

/// All fatal errors producible by the crate.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Arrays passed to a contraction or flow routine have incompatible
    /// ranks or dimensions.
    #[error("shape mismatch in {context}: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        /// Name of the routine that rejected its inputs.
        context: &'static str,
        /// Dimensions the routine required.
        expected: Vec<usize>,
        /// Dimensions it was given.
        found: Vec<usize>,
    },

    /// A Hamiltonian with zero linear dimension was supplied.
    #[error("{0}: empty system")]
    EmptySystem(&'static str),

    /// A site index fell outside the system.
    #[error("site index {site} out of range for system size {n}")]
    SiteOutOfRange {
        /// Offending index.
        site: usize,
        /// System size.
        n: usize,
    },

    /// Error from the linear algebra backend in the reference path.
    #[error("linalg error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
}

pub type FlowResult<T> = Result<T, FlowError>;
