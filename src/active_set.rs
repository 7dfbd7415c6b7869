//! The dynamic mapping between original inequality indices and their row
//! position inside the active block of the KKT factorization, kept in
//! lockstep with the LDLᵀ engine.

use crate::errors::Result;
use crate::ldlt::LdltFactors;
use crate::matrix::QpMatrix;
use crate::scalar::Scalar;
use nalgebra::DVector;

#[derive(Clone, Debug)]
pub struct ActiveSet {
    /// `bijection[i]` is the row position (within the inequality block) of
    /// original inequality `i`, valid when `bijection[i] < n_c`.
    bijection: Vec<usize>,
    n_c: usize,
    n_in: usize,
}

impl ActiveSet {
    pub fn new(n_in: usize) -> Self {
        Self {
            bijection: vec![n_in.saturating_sub(1); n_in],
            n_c: 0,
            n_in,
        }
    }

    pub fn n_c(&self) -> usize {
        self.n_c
    }

    pub fn is_active(&self, i: usize) -> bool {
        self.bijection[i] < self.n_c
    }

    /// Row position of `i` within the active inequality block, if active.
    pub fn row_of(&self, i: usize) -> Option<usize> {
        self.is_active(i).then(|| self.bijection[i])
    }

    /// Iterate original indices in the order they currently occupy the
    /// active block (position 0, 1, ..., n_c-1).
    pub fn active_indices_in_order(&self) -> Vec<usize> {
        let mut out = vec![0usize; self.n_c];
        for (i, &pos) in self.bijection.iter().enumerate() {
            if pos < self.n_c {
                out[pos] = i;
            }
        }
        out
    }

    /// Transition to `new_active`, issuing the matching LDLᵀ
    /// deletions/insertions. `n`, `n_eq` locate the inequality block inside
    /// the KKT ordering; `mu_in_inv` is `1/μ_in` used for the new diagonal
    /// entries.
    pub fn transition<T: Scalar>(
        &mut self,
        new_active: &[bool],
        ldlt: &mut LdltFactors<T>,
        c: &impl QpMatrix<T>,
        n: usize,
        n_eq: usize,
        mu_in_inv: T,
    ) -> Result<()> {
        debug_assert_eq!(new_active.len(), self.n_in);

        // 1. Deletions: active now, inactive in new_active.
        for i in 0..self.n_in {
            if self.is_active(i) && !new_active[i] {
                let pos = self.bijection[i];
                ldlt.delete_at(n + n_eq + pos)?;
                for j in 0..self.n_in {
                    if j != i && self.is_active(j) && self.bijection[j] > pos {
                        self.bijection[j] -= 1;
                    }
                }
                self.bijection[i] = self.n_in.saturating_sub(1);
                self.n_c -= 1;
            }
        }

        // 2. Insertions: inactive now, active in new_active.
        for i in 0..self.n_in {
            if new_active[i] && !self.is_active(i) {
                let row = c.row_to_dense(i);
                let mut new_col = DVector::<T>::zeros(n + n_eq + self.n_c + 1);
                for k in 0..n {
                    new_col[k] = row[k];
                }
                new_col[n + n_eq + self.n_c] = -mu_in_inv;
                ldlt.insert_at_end(&new_col)?;
                self.bijection[i] = self.n_c;
                self.n_c += 1;
            }
        }

        self.assert_invariants();
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn assert_invariants(&self) {
        let mut seen = vec![false; self.n_c];
        for (_i, &pos) in self.bijection.iter().enumerate() {
            if pos < self.n_c {
                assert!(!seen[pos], "active-set bijection invariant A violated");
                seen[pos] = true;
            }
        }
        assert!(seen.iter().all(|&b| b), "active-set bijection invariant A violated");
    }

    #[cfg(not(debug_assertions))]
    fn assert_invariants(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldlt::LdltFactors;
    use nalgebra::DMatrix;

    #[test]
    fn activate_then_deactivate_round_trips() {
        let n = 2;
        let n_eq = 0;
        let n_in = 2;
        let h = DMatrix::<f64>::identity(n, n);
        let mut ldlt = LdltFactors::<f64>::factorize(&h).unwrap();
        let c = DMatrix::from_row_slice(n_in, n, &[1.0, 0.0, 0.0, 1.0]);
        let mut asm = ActiveSet::new(n_in);

        asm.transition(&[true, false], &mut ldlt, &c, n, n_eq, 10.0)
            .unwrap();
        assert_eq!(asm.n_c(), 1);
        assert!(asm.is_active(0));
        assert!(!asm.is_active(1));

        asm.transition(&[false, false], &mut ldlt, &c, n, n_eq, 10.0)
            .unwrap();
        assert_eq!(asm.n_c(), 0);
        assert_eq!(ldlt.order(), n + n_eq);
    }
}
