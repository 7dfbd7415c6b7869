//! A proximal augmented-Lagrangian solver for convex quadratic programs
//!
//! ```text
//! minimize    (1/2) x^T H x + g^T x
//! subject to  A x = b
//!             l <= C x <= u
//! ```
//!
//! with `H` symmetric positive semidefinite. The outer loop ([`outer`])
//! drives a bound-constrained-Lagrangian schedule over the proximal and
//! penalty parameters `(rho, mu_eq, mu_in)`; the inner loop ([`inner`])
//! solves the resulting regularized KKT system to a target accuracy using
//! Newton steps with exact line searches ([`line_search`]) and a
//! factorization ([`ldlt`]) maintained incrementally under active-set
//! changes ([`active_set`]). Problem data is equilibrated with a Ruiz
//! scaling ([`precond`]) before any of this runs.
//!
//! [`solver::Solver`] is the entry point: `setup` loads data and builds the
//! first factorization, `solve` runs the outer loop, `update`/`warm_start`/
//! `update_proximal` let a caller reuse the factorization across repeated
//! solves of a slowly-changing problem.

pub mod active_set;
pub mod errors;
pub mod inner;
pub mod kkt;
pub mod ldlt;
pub mod line_search;
pub mod matrix;
pub mod model;
pub mod outer;
pub mod precond;
pub mod results;
pub mod scalar;
pub mod settings;
pub mod solver;

pub use errors::{Error, Result};
pub use matrix::{Backend, Dense};
#[cfg(feature = "sparse")]
pub use matrix::Sparse;
pub use model::{Dims, Model};
pub use results::{Info, Results, Status};
pub use scalar::Scalar;
pub use settings::{PrecondMode, Settings};
pub use solver::{QpData, Solver};
