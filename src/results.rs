//! The public outcome of a `solve()` call: the iterate, and bookkeeping
//! about how the outer loop got there.

use crate::outer::{OuterInfo, Status as OuterStatus};
use crate::scalar::Scalar;
use nalgebra::DVector;
use std::time::Duration;

/// Terminal state of a solve. Hard failures (dimension mismatches,
/// non-PSD `H`, a non-finite iterate) are reported as `Err` from
/// `Solver::solve` instead of a variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Solved,
    MaxIterReached,
}

impl From<OuterStatus> for Status {
    fn from(s: OuterStatus) -> Self {
        match s {
            OuterStatus::Solved => Status::Solved,
            OuterStatus::MaxIterReached => Status::MaxIterReached,
        }
    }
}

/// Diagnostics accompanying a solve: iteration counts, the final proximal
/// schedule, residuals at termination, and timings.
#[derive(Clone, Debug)]
pub struct Info<T: Scalar> {
    pub status: Status,
    pub outer_iters: usize,
    pub inner_iters: usize,
    pub mu_updates: usize,
    pub rho: T,
    pub mu_eq: T,
    pub mu_in: T,
    pub primal_residual: T,
    pub dual_residual: T,
    pub setup_time: Duration,
    pub solve_time: Duration,
}

impl<T: Scalar> Info<T> {
    pub(crate) fn from_outer(outer: OuterInfo<T>, setup_time: Duration, solve_time: Duration) -> Self {
        Self {
            status: outer.status.into(),
            outer_iters: outer.outer_iters,
            inner_iters: outer.inner_iters,
            mu_updates: outer.mu_updates,
            rho: outer.rho,
            mu_eq: outer.mu_eq,
            mu_in: outer.mu_in,
            primal_residual: outer.primal_residual,
            dual_residual: outer.dual_residual,
            setup_time,
            solve_time,
        }
    }
}

/// The primal and dual iterates, plus diagnostics, from a single `solve()`.
#[derive(Clone, Debug)]
pub struct Results<T: Scalar> {
    pub x: DVector<T>,
    pub y: DVector<T>,
    pub z: DVector<T>,
    pub info: Info<T>,
}
