use super::QpMatrix;
use crate::scalar::Scalar;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};

impl<T: Scalar> QpMatrix<T> for CscMatrix<T> {
    fn nrows(&self) -> usize {
        CscMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        CscMatrix::ncols(self)
    }

    fn zeros(nrows: usize, ncols: usize) -> Self {
        CscMatrix::from(&CooMatrix::new(nrows, ncols))
    }

    fn gemv(&self, alpha: T, x: &DVector<T>, beta: T, y: &mut DVector<T>) {
        *y *= beta;
        for j in 0..self.ncols() {
            let col = self.col(j);
            let xj = x[j];
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                y[i] += alpha * v * xj;
            }
        }
    }

    fn gemv_t(&self, alpha: T, x: &DVector<T>, beta: T, y: &mut DVector<T>) {
        *y *= beta;
        for j in 0..self.ncols() {
            let col = self.col(j);
            let mut acc = T::zero();
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                acc += v * x[i];
            }
            y[j] += alpha * acc;
        }
    }

    fn row_infty_norm(&self, i: usize) -> T {
        let mut best = T::zero();
        for j in 0..self.ncols() {
            let col = self.col(j);
            if let Some(pos) = col.row_indices().iter().position(|&r| r == i) {
                best = best.max(col.values()[pos].abs());
            }
        }
        best
    }

    fn col_infty_norm(&self, j: usize) -> T {
        self.col(j)
            .values()
            .iter()
            .fold(T::zero(), |acc, v| acc.max(v.abs()))
    }

    fn scale_row(&mut self, i: usize, s: T) {
        for j in 0..self.ncols() {
            let mut col = self.col_mut(j);
            let row_indices = col.row_indices().to_vec();
            if let Some(pos) = row_indices.iter().position(|&r| r == i) {
                col.values_mut()[pos] *= s;
            }
        }
    }

    fn scale_col(&mut self, j: usize, s: T) {
        let mut col = self.col_mut(j);
        for v in col.values_mut() {
            *v *= s;
        }
    }

    fn get(&self, i: usize, j: usize) -> T {
        self.get_entry(i, j)
            .map(|e| e.into_value())
            .unwrap_or_else(T::zero)
    }

    fn row_to_dense(&self, i: usize) -> DVector<T> {
        DVector::from_iterator(self.ncols(), (0..self.ncols()).map(|j| self.get(i, j)))
    }

    fn to_dense(&self) -> DMatrix<T> {
        let mut out = DMatrix::zeros(self.nrows(), self.ncols());
        for j in 0..self.ncols() {
            let col = self.col(j);
            for (&i, &v) in col.row_indices().iter().zip(col.values()) {
                out[(i, j)] = v;
            }
        }
        out
    }

    fn same_structure(&self, other: &Self) -> bool {
        self.nrows() == other.nrows()
            && self.ncols() == other.ncols()
            && self.col_offsets() == other.col_offsets()
            && self.row_indices() == other.row_indices()
    }
}

/// Build a sparse matrix from (row, col, value) triplets, the format the
/// solver API accepts sparse matrices in.
pub fn from_triplets<T: Scalar>(
    nrows: usize,
    ncols: usize,
    triplets: &[(usize, usize, T)],
) -> CscMatrix<T> {
    let mut coo = CooMatrix::new(nrows, ncols);
    for &(i, j, v) in triplets {
        coo.push(i, j, v);
    }
    CscMatrix::from(&coo)
}
