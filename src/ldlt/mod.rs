//! Factor a symmetric indefinite matrix and maintain the factorization under
//! row/column insertion, deletion, and diagonal rank-one updates, without
//! refactoring the whole system from scratch on every active-set change.
//!
//! The factors are kept in a single arena sized to the largest KKT order
//! seen so far (`capacity`); `order` is a live cursor into that arena:
//! `insert_at` grows the cursor and `delete_at` shrinks it. `L` is unit
//! lower triangular, stored row-major; `D` is the diagonal.

use crate::errors::{Error, Result};
use crate::scalar::Scalar;
use nalgebra::{DMatrix, DVector};

#[derive(Clone, Debug)]
pub struct LdltFactors<T: Scalar> {
    capacity: usize,
    order: usize,
    /// Row-major, `capacity x capacity`; only the strict lower triangle
    /// (columns `0..=i-1` of row `i`, within `0..order`) is meaningful.
    l: Vec<T>,
    d: Vec<T>,
    pivot_eps: T,
}

fn default_pivot_eps<T: Scalar>() -> T {
    T::from_f64(1e-10).unwrap()
}

impl<T: Scalar> LdltFactors<T> {
    pub fn order(&self) -> usize {
        self.order
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        i * self.capacity + j
    }

    fn l_get(&self, i: usize, j: usize) -> T {
        if i == j {
            T::one()
        } else if j > i {
            T::zero()
        } else {
            self.l[self.idx(i, j)]
        }
    }

    fn l_set(&mut self, i: usize, j: usize, v: T) {
        let idx = self.idx(i, j);
        self.l[idx] = v;
    }

    /// Factor `k` (an `order x order` symmetric matrix, full storage) from
    /// scratch. Grows the arena if `k` is larger than the current capacity.
    pub fn factorize(k: &DMatrix<T>) -> Result<Self> {
        let n = k.nrows();
        let mut f = Self {
            capacity: n.max(1),
            order: n,
            l: vec![T::zero(); n.max(1) * n.max(1)],
            d: vec![T::zero(); n.max(1)],
            pivot_eps: default_pivot_eps::<T>(),
        };
        f.refactorize_from(k)?;
        Ok(f)
    }

    /// Recompute L, D in place from a full `order x order` matrix, reusing
    /// the arena if it is large enough (grows it otherwise).
    pub fn refactorize_from(&mut self, k: &DMatrix<T>) -> Result<()> {
        let n = k.nrows();
        if n > self.capacity {
            self.grow(n);
        }
        self.order = n;
        for i in 0..n {
            for j in 0..=i {
                self.l_set(i, j, T::zero());
            }
            self.d[i] = T::zero();
        }
        for j in 0..n {
            let mut acc = k[(j, j)];
            for p in 0..j {
                let ljp = self.l_get(j, p);
                acc -= ljp * ljp * self.d[p];
            }
            if acc.abs() < self.pivot_eps {
                return Err(Error::PivotFailure { row: j, bumps: 0 });
            }
            self.d[j] = acc;
            for i in (j + 1)..n {
                let mut acc = k[(i, j)];
                for p in 0..j {
                    acc -= self.l_get(i, p) * self.l_get(j, p) * self.d[p];
                }
                self.l_set(i, j, acc / self.d[j]);
            }
        }
        Ok(())
    }

    fn grow(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.max(self.capacity * 2).max(1);
        let mut new_l = vec![T::zero(); new_capacity * new_capacity];
        for i in 0..self.order {
            for j in 0..i {
                new_l[i * new_capacity + j] = self.l[self.idx(i, j)];
            }
        }
        let mut new_d = vec![T::zero(); new_capacity];
        new_d[..self.order].copy_from_slice(&self.d[..self.order]);
        self.l = new_l;
        self.d = new_d;
        self.capacity = new_capacity;
    }

    /// Solve `K w = v` in place via forward solve, diagonal solve, backward
    /// solve, overwriting `v` with `w`.
    pub fn solve_in_place(&self, v: &mut DVector<T>) {
        let n = self.order;
        // Forward: L y = v
        for i in 0..n {
            let mut acc = v[i];
            for j in 0..i {
                acc -= self.l_get(i, j) * v[j];
            }
            v[i] = acc;
        }
        // Diagonal: D z = y
        for i in 0..n {
            v[i] = v[i] / self.d[i];
        }
        // Backward: L^T w = z
        for i in (0..n).rev() {
            let mut acc = v[i];
            for j in (i + 1)..n {
                acc -= self.l_get(j, i) * v[j];
            }
            v[i] = acc;
        }
    }

    /// Append a row/column at the end of the current order (the only
    /// position the active-set changer ever inserts at: `n + n_eq + n_c`
    /// before `n_c` is incremented). `new_row_col` has length `order + 1`
    /// and holds the new column including its diagonal entry at the end.
    pub fn insert_at_end(&mut self, new_row_col: &DVector<T>) -> Result<()> {
        let n = self.order;
        assert_eq!(new_row_col.len(), n + 1);
        if n + 1 > self.capacity {
            self.grow(n + 1);
        }
        // Bordering update: solve L y = b (b = new_row_col[..n]), then
        // l = y / D elementwise, d_new = diag - sum(l_i * y_i).
        let mut y = DVector::<T>::zeros(n);
        for i in 0..n {
            let mut acc = new_row_col[i];
            for j in 0..i {
                acc -= self.l_get(i, j) * y[j];
            }
            y[i] = acc;
        }
        let mut d_new = new_row_col[n];
        for i in 0..n {
            let li = y[i] / self.d[i];
            d_new -= li * y[i];
            self.l_set(n, i, li);
        }
        if d_new.abs() < self.pivot_eps {
            return Err(Error::PivotFailure { row: n, bumps: 0 });
        }
        self.order = n + 1;
        self.d[n] = d_new;
        Ok(())
    }

    /// Insert at an arbitrary position (only used off the fast append path);
    /// materializes the augmented matrix and refactorizes. `new_row_col` is
    /// in the pre-insertion ordering (length `order`) plus the diagonal
    /// entry at the end (length `order + 1`).
    pub fn insert_at(&mut self, idx: usize, new_row_col: &DVector<T>) -> Result<()> {
        if idx == self.order {
            return self.insert_at_end(new_row_col);
        }
        let old = self.reconstructed_matrix();
        let n = self.order;
        // src(dst) maps a post-insertion index back to the pre-insertion one.
        let src = |dst: usize| -> Option<usize> {
            if dst == idx {
                None
            } else if dst < idx {
                Some(dst)
            } else {
                Some(dst - 1)
            }
        };
        let mut k = DMatrix::<T>::zeros(n + 1, n + 1);
        for dst_i in 0..(n + 1) {
            for dst_j in 0..(n + 1) {
                k[(dst_i, dst_j)] = match (src(dst_i), src(dst_j)) {
                    (Some(si), Some(sj)) => old[(si, sj)],
                    (Some(si), None) => new_row_col[si],
                    (None, Some(sj)) => new_row_col[sj],
                    (None, None) => new_row_col[n],
                };
            }
        }
        self.refactorize_from(&k)
    }

    /// `rank_one_update`, restricted to the trailing sub-block
    /// `start..order` (`v` is indexed from 0 at `start`). Leading rows/cols
    /// `0..start` are left untouched.
    fn rank_one_update_range(&mut self, start: usize, v: &[T], sigma: T) {
        let n = self.order;
        let mut w = v.to_vec();
        let mut alpha = sigma;
        for j in start..n {
            let d_old = self.d[j];
            let p = w[j - start];
            let d_new = d_old + alpha * p * p;
            self.d[j] = d_new;
            let beta = p * alpha / d_new;
            alpha *= d_old / d_new;
            for i in (j + 1)..n {
                let lij = self.l_get(i, j);
                w[i - start] -= p * lij;
                self.l_set(i, j, lij + beta * w[i - start]);
            }
        }
    }

    /// Remove row/column `idx`, shrinking `order` by one, without a full
    /// refactorization.
    ///
    /// L/D factor K sequentially: the trailing block `idx+1..n` already
    /// holds L, D for the Schur complement of K after eliminating column
    /// `idx`. Adding back `D[idx] * l_col * l_col^T` (a positive-sigma
    /// rank-one update, `l_col` being column `idx`'s sub-diagonal entries)
    /// un-eliminates exactly column `idx`'s contribution, leaving the
    /// trailing block factoring what it would if row/column `idx` had never
    /// existed. What remains is to shift rows/cols `idx+1..n` up/left by one
    /// to close the gap; rows/cols `0..idx` never depended on row `idx` and
    /// are untouched.
    pub fn delete_at(&mut self, idx: usize) -> Result<()> {
        let n = self.order;
        assert!(idx < n, "delete_at: index {idx} out of range for order {n}");
        if idx == n - 1 {
            self.order = n - 1;
            return Ok(());
        }

        let d_p = self.d[idx];
        let tail_len = n - idx - 1;
        let mut l_col = vec![T::zero(); tail_len];
        for (k, slot) in l_col.iter_mut().enumerate() {
            *slot = self.l_get(idx + 1 + k, idx);
        }

        self.rank_one_update_range(idx + 1, &l_col, d_p);

        for i in (idx + 1)..n {
            for j in 0..idx {
                let v = self.l_get(i, j);
                self.l_set(i - 1, j, v);
            }
            for j in (idx + 1)..i {
                let v = self.l_get(i, j);
                self.l_set(i - 1, j - 1, v);
            }
            self.d[i - 1] = self.d[i];
        }

        self.order = n - 1;
        Ok(())
    }

    /// Batch deletion; per the contract, process the largest index first so
    /// that earlier indices stay stable across the removals.
    pub fn delete_many(&mut self, indices: &[usize]) -> Result<()> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for idx in sorted {
            self.delete_at(idx)?;
        }
        Ok(())
    }

    /// `K <- K + sigma * v v^T`, realized directly on L/D (classic rank-one
    /// LDLᵀ update), used to retune the μ-dependent diagonal entries.
    pub fn rank_one_update(&mut self, v: &DVector<T>, sigma: T) {
        let n = self.order;
        let mut w = v.clone();
        let mut alpha = sigma;
        for j in 0..n {
            let d_old = self.d[j];
            let p = w[j];
            let d_new = d_old + alpha * p * p;
            self.d[j] = d_new;
            let beta = p * alpha / d_new;
            alpha *= d_old / d_new;
            for i in (j + 1)..n {
                let lij = self.l_get(i, j);
                w[i] -= p * lij;
                self.l_set(i, j, lij + beta * w[i]);
            }
        }
    }

    /// Materialize `L D L^T` for invariant checks (debug-only use per the
    /// contract, though nothing here gates it behind `cfg(debug_assertions)`
    /// since the cost is the caller's to pay).
    pub fn reconstructed_matrix(&self) -> DMatrix<T> {
        let n = self.order;
        let mut k = DMatrix::<T>::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let mut acc = T::zero();
                for p in 0..=j {
                    acc += self.l_get(i, p) * self.d[p] * self.l_get(j, p);
                }
                k[(i, j)] = acc;
                k[(j, i)] = acc;
            }
        }
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sym(n: usize, entries: &[(usize, usize, f64)]) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(n, n);
        for &(i, j, v) in entries {
            m[(i, j)] = v;
            m[(j, i)] = v;
        }
        m
    }

    #[test]
    fn factorize_reconstructs() {
        let k = sym(3, &[(0, 0, 4.0), (1, 1, 3.0), (2, 2, 5.0), (0, 1, 1.0), (1, 2, -1.0)]);
        let f = LdltFactors::<f64>::factorize(&k).unwrap();
        let r = f.reconstructed_matrix();
        assert_abs_diff_eq!(r, k, epsilon = 1e-9);
    }

    #[test]
    fn solve_matches_direct_inverse() {
        let k = sym(2, &[(0, 0, 4.0), (1, 1, 2.0), (0, 1, 1.0)]);
        let f = LdltFactors::<f64>::factorize(&k).unwrap();
        let mut v = DVector::from_vec(vec![1.0, 2.0]);
        let rhs = v.clone();
        f.solve_in_place(&mut v);
        let mut back = DVector::zeros(2);
        back.gemv(1.0, &k, &v, 0.0);
        assert_abs_diff_eq!(back, rhs, epsilon = 1e-9);
    }

    #[test]
    fn insert_then_delete_restores_original() {
        let k = sym(2, &[(0, 0, 4.0), (1, 1, 2.0), (0, 1, 1.0)]);
        let mut f = LdltFactors::<f64>::factorize(&k).unwrap();
        let new_col = DVector::from_vec(vec![0.5, -0.25, 6.0]);
        f.insert_at_end(&new_col).unwrap();
        f.delete_at(2).unwrap();
        let r = f.reconstructed_matrix();
        assert_abs_diff_eq!(r, k, epsilon = 1e-8);
    }

    #[test]
    fn delete_at_middle_matches_direct_deletion() {
        let k = sym(
            4,
            &[
                (0, 0, 4.0),
                (1, 1, 3.0),
                (2, 2, 5.0),
                (3, 3, 6.0),
                (0, 1, 1.0),
                (0, 2, 0.5),
                (1, 2, -1.0),
                (1, 3, 0.2),
                (2, 3, -0.3),
            ],
        );
        let mut f = LdltFactors::<f64>::factorize(&k).unwrap();
        f.delete_at(1).unwrap();

        let mut expect = DMatrix::zeros(3, 3);
        let keep = [0usize, 2, 3];
        for (dst_i, &si) in keep.iter().enumerate() {
            for (dst_j, &sj) in keep.iter().enumerate() {
                expect[(dst_i, dst_j)] = k[(si, sj)];
            }
        }
        assert_abs_diff_eq!(f.reconstructed_matrix(), expect, epsilon = 1e-8);
    }

    #[test]
    fn rank_one_update_matches_direct() {
        let k = sym(2, &[(0, 0, 4.0), (1, 1, 2.0), (0, 1, 1.0)]);
        let mut f = LdltFactors::<f64>::factorize(&k).unwrap();
        let v = DVector::from_vec(vec![1.0, -2.0]);
        let sigma = 0.3;
        f.rank_one_update(&v, sigma);
        let expect = k + v.clone() * v.transpose() * sigma;
        assert_abs_diff_eq!(f.reconstructed_matrix(), expect, epsilon = 1e-8);
    }
}
