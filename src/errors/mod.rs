use thiserror::Error;

/// Failure modes surfaced by the solver. Internal failures (`PivotFailure`,
/// `RefinementStall`) are recovered locally when possible; the rest are
/// reported to the caller with the best-so-far iterate still available.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("LDLT pivot failure at row {row} after {bumps} rho bumps")]
    PivotFailure { row: usize, bumps: u32 },
    #[error("iterative refinement did not converge after refactorization")]
    RefinementStall,
    #[error("H is not positive semidefinite (pivot at row {row} could not be regularized)")]
    NotPSD { row: usize },
    #[error("residual became non-finite (NaN or Inf) during solve")]
    NonFinite,
}

pub type Result<T> = std::result::Result<T, Error>;
