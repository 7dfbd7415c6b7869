//! Matrix-view abstraction.
//!
//! The only axis of polymorphism needed is dense vs sparse storage for
//! H, A and C: a small kernel trait with one dense and one sparse
//! implementation, not an open-ended hierarchy.

pub mod dense;
#[cfg(feature = "sparse")]
pub mod sparse;

use crate::scalar::Scalar;
use nalgebra::DVector;

/// The kernel set required from a linear-algebra backend: mat-vec and
/// transpose-vec products, row/column infinity norms, and in-place
/// diagonal (row/column) scaling.
pub trait QpMatrix<T: Scalar>: Clone + std::fmt::Debug {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;

    fn zeros(nrows: usize, ncols: usize) -> Self;

    /// `y <- alpha * self * x + beta * y`
    fn gemv(&self, alpha: T, x: &DVector<T>, beta: T, y: &mut DVector<T>);

    /// `y <- alpha * self^T * x + beta * y`
    fn gemv_t(&self, alpha: T, x: &DVector<T>, beta: T, y: &mut DVector<T>);

    /// `‖row i‖_∞`
    fn row_infty_norm(&self, i: usize) -> T;

    /// `‖col j‖_∞`
    fn col_infty_norm(&self, j: usize) -> T;

    /// `row i <- row i * s` (in place)
    fn scale_row(&mut self, i: usize, s: T);

    /// `col j <- col j * s` (in place)
    fn scale_col(&mut self, j: usize, s: T);

    fn get(&self, i: usize, j: usize) -> T;

    /// Dense copy of row `i`, used by the line search and active-set
    /// transitions which only ever need one row of C at a time.
    fn row_to_dense(&self, i: usize) -> DVector<T>;

    fn to_dense(&self) -> nalgebra::DMatrix<T>;

    /// Whether `self` and `other` share the same shape and nonzero pattern.
    /// Dense storage has no pattern to diverge, so shape alone decides it;
    /// sparse storage additionally compares column pointers and row
    /// indices. `update` uses this to decide whether it can overwrite a
    /// matrix's values in place or must leave it untouched.
    fn same_structure(&self, other: &Self) -> bool;
}

/// A symmetric matrix's row/column infinity norm combined the way the Ruiz
/// equilibration wants it: since H is symmetric, row i and column i carry
/// the same infinity norm, so the combination rule takes the full-column
/// norm of H (not just the upper triangle) regardless of storage.
/// Implemented once here and reused by both backends' `QpMatrix::col_infty_norm`.
pub(crate) fn sym_col_infty_norm<T: Scalar>(m: &impl QpMatrix<T>, j: usize) -> T {
    let mut best = T::zero();
    for i in 0..m.nrows() {
        best = best.max(m.get(i, j).abs());
    }
    best
}

/// Selects which matrix type backs H, A and C. `Dense` and `Sparse` are the
/// only two implementors.
pub trait Backend<T: Scalar>: Clone + std::fmt::Debug + 'static {
    type Mat: QpMatrix<T>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Dense;

impl<T: Scalar> Backend<T> for Dense {
    type Mat = nalgebra::DMatrix<T>;
}

#[cfg(feature = "sparse")]
#[derive(Clone, Copy, Debug, Default)]
pub struct Sparse;

#[cfg(feature = "sparse")]
impl<T: Scalar> Backend<T> for Sparse {
    type Mat = nalgebra_sparse::CscMatrix<T>;
}
