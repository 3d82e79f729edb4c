#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Flow-equation diagonalization for disordered fermion chains.
//!
//! A Hamiltonian `H(l) = H0(l) + V(l)` is evolved in a fictitious flow
//! time `l` under `dH/dl = [η, H]` with the Wegner generator
//! `η = [H0, V]`, driving the off-diagonal part `V` to zero. The
//! accumulated unitary `U(l)` links the flowed frame back to the
//! original one, and the diagonalized endpoint feeds single-particle
//! observable dynamics (site occupations, density imbalance) that can be
//! checked against a direct eigensolver.

pub mod error;
pub mod contract;
pub mod generator;
pub mod flow;
pub mod unitary;
pub mod model;
pub mod dynamics;
pub mod ed;

pub use error::{ FlowError, FlowResult };
pub use generator::{ generator, offdiag_norm };
pub use flow::{ FlowParams, Scheme, Euler, Rk4, Flowed, FlowedInt,
    Termination, flow, flow_with, flow_int };
pub use unitary::{ reconstruct, reconstruction_residual,
    unitarity_deviation };
pub use model::DisorderedChain;
pub use dynamics::{ Modes, neel_sites, occupations, occupation,
    imbalance };
pub use ed::{ Reference, EighReference };
