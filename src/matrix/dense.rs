use super::QpMatrix;
use crate::scalar::Scalar;
use nalgebra::{DMatrix, DVector};

impl<T: Scalar> QpMatrix<T> for DMatrix<T> {
    fn nrows(&self) -> usize {
        DMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        DMatrix::ncols(self)
    }

    fn zeros(nrows: usize, ncols: usize) -> Self {
        DMatrix::zeros(nrows, ncols)
    }

    fn gemv(&self, alpha: T, x: &DVector<T>, beta: T, y: &mut DVector<T>) {
        y.gemv(alpha, self, x, beta);
    }

    fn gemv_t(&self, alpha: T, x: &DVector<T>, beta: T, y: &mut DVector<T>) {
        y.gemv_tr(alpha, self, x, beta);
    }

    fn row_infty_norm(&self, i: usize) -> T {
        self.row(i).iter().fold(T::zero(), |acc, v| acc.max(v.abs()))
    }

    fn col_infty_norm(&self, j: usize) -> T {
        self.column(j).iter().fold(T::zero(), |acc, v| acc.max(v.abs()))
    }

    fn scale_row(&mut self, i: usize, s: T) {
        let mut row = self.row_mut(i);
        row *= s;
    }

    fn scale_col(&mut self, j: usize, s: T) {
        let mut col = self.column_mut(j);
        col *= s;
    }

    fn get(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }

    fn row_to_dense(&self, i: usize) -> DVector<T> {
        DVector::from_iterator(self.ncols(), self.row(i).iter().copied())
    }

    fn to_dense(&self) -> DMatrix<T> {
        self.clone()
    }

    fn same_structure(&self, other: &Self) -> bool {
        self.nrows() == other.nrows() && self.ncols() == other.ncols()
    }
}
