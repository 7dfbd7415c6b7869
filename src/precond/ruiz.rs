//! Ruiz preconditioner: iterative row/column equilibration of
//! (H, A, C, g, b, l, u), plus the forward/inverse scaling operators the
//! rest of the solver uses to move between scaled and unscaled space.
//!
//! At each pass, `delta_k` is set from the combined infinity norms of H's
//! k-th row/column, A's k-th column and C's k-th column (for the primal
//! block), and from A/C's row norms (for the dual block); the pass stops
//! once `‖1 - delta‖_∞ ≤ eps` or `max_iter` passes have run. A scalar cost
//! rescale `γ` is folded in after each pass.

use crate::matrix::{sym_col_infty_norm, Backend, QpMatrix};
use crate::model::{Dims, Model, ScaledModel};
use crate::scalar::Scalar;
use nalgebra::DVector;

#[derive(Clone, Debug)]
pub struct RuizEquilibration<T: Scalar> {
    /// Length `n + n_eq + n_in`: `[0..n)` is D (primal), `[n..n+n_eq)` is
    /// E_eq, `[n+n_eq..)` is E_in.
    delta: DVector<T>,
    c: T,
    dims: Dims,
}

impl<T: Scalar> RuizEquilibration<T> {
    pub fn identity(dims: Dims) -> Self {
        Self {
            delta: DVector::from_element(dims.n + dims.n_eq + dims.n_in, T::one()),
            c: T::one(),
            dims,
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn c(&self) -> T {
        self.c
    }

    /// Run the equilibration on `model`, returning the scaling and the
    /// scaled copy of the model.
    pub fn compute<B: Backend<T>>(
        model: &Model<T, B>,
        eps: T,
        max_iter: usize,
    ) -> (Self, ScaledModel<T, B>) {
        let dims = model.dims;
        let (n, n_eq, n_in) = (dims.n, dims.n_eq, dims.n_in);
        let mut scaled = ScaledModel::from_model(model);
        let meps = T::machine_epsilon();

        let mut cumulative = DVector::<T>::from_element(n + n_eq + n_in, T::one());
        let mut c = T::one();
        let mut local = DVector::<T>::zeros(n + n_eq + n_in);
        let mut iter = 1usize;

        loop {
            let err = local
                .iter()
                .fold(T::zero(), |acc, &x| acc.max((T::one() - x).abs()));
            if err <= eps {
                break;
            }
            if iter > max_iter {
                break;
            }
            iter += 1;

            for k in 0..n {
                let h_norm = sym_col_infty_norm(&scaled.h, k);
                let a_norm = if n_eq > 0 {
                    scaled.a.col_infty_norm(k)
                } else {
                    T::zero()
                };
                let c_norm = if n_in > 0 {
                    scaled.c.col_infty_norm(k)
                } else {
                    T::zero()
                };
                let m = h_norm.max(a_norm).max(c_norm);
                local[k] = T::one() / (m.sqrt() + meps);
            }
            for k in 0..n_eq {
                local[n + k] = T::one() / (scaled.a.row_infty_norm(k).sqrt() + meps);
            }
            for k in 0..n_in {
                local[n + n_eq + k] = T::one() / (scaled.c.row_infty_norm(k).sqrt() + meps);
            }

            for k in 0..n {
                scaled.h.scale_row(k, local[k]);
            }
            for k in 0..n {
                scaled.h.scale_col(k, local[k]);
            }
            for k in 0..n_eq {
                scaled.a.scale_row(k, local[n + k]);
            }
            for k in 0..n {
                scaled.a.scale_col(k, local[k]);
            }
            for k in 0..n_in {
                scaled.c.scale_row(k, local[n + n_eq + k]);
            }
            for k in 0..n {
                scaled.c.scale_col(k, local[k]);
            }
            for i in 0..n {
                scaled.g[i] *= local[i];
            }
            for i in 0..n_eq {
                scaled.b[i] *= local[n + i];
            }
            for i in 0..n_in {
                scaled.l[i] *= local[n + n_eq + i];
                scaled.u[i] *= local[n + n_eq + i];
            }

            let g_norm = infty_norm(&scaled.g).max(T::one());
            let h_mean = if n > 0 {
                let sum = (0..n).fold(T::zero(), |acc, j| acc + scaled.h.col_infty_norm(j));
                sum / T::from_usize(n).unwrap()
            } else {
                T::zero()
            };
            let gamma = T::one() / g_norm.max(h_mean);
            for k in 0..n {
                scaled.h.scale_row(k, gamma);
            }
            for i in 0..n {
                scaled.g[i] *= gamma;
            }
            c *= gamma;

            cumulative.component_mul_assign(&local);
        }

        (Self { delta: cumulative, c, dims }, scaled)
    }

    fn primal(&self) -> &[T] {
        &self.delta.as_slice()[0..self.dims.n]
    }

    fn dual_eq(&self) -> &[T] {
        &self.delta.as_slice()[self.dims.n..self.dims.n + self.dims.n_eq]
    }

    fn dual_in(&self) -> &[T] {
        &self.delta.as_slice()[self.dims.n + self.dims.n_eq..]
    }

    pub fn scale_primal_in_place(&self, x: &mut DVector<T>) {
        for (xi, &d) in x.iter_mut().zip(self.primal()) {
            *xi = *xi / d;
        }
    }

    pub fn unscale_primal_in_place(&self, x: &mut DVector<T>) {
        for (xi, &d) in x.iter_mut().zip(self.primal()) {
            *xi = *xi * d;
        }
    }

    pub fn scale_dual_eq_in_place(&self, y: &mut DVector<T>) {
        for (yi, &e) in y.iter_mut().zip(self.dual_eq()) {
            *yi = *yi / e * self.c;
        }
    }

    pub fn unscale_dual_eq_in_place(&self, y: &mut DVector<T>) {
        for (yi, &e) in y.iter_mut().zip(self.dual_eq()) {
            *yi = *yi * e / self.c;
        }
    }

    pub fn scale_dual_in_place(&self, z: &mut DVector<T>) {
        for (zi, &e) in z.iter_mut().zip(self.dual_in()) {
            *zi = *zi / e * self.c;
        }
    }

    pub fn unscale_dual_in_place(&self, z: &mut DVector<T>) {
        for (zi, &e) in z.iter_mut().zip(self.dual_in()) {
            *zi = *zi * e / self.c;
        }
    }

    pub fn scale_primal_residual_eq_in_place(&self, r: &mut DVector<T>) {
        for (ri, &e) in r.iter_mut().zip(self.dual_eq()) {
            *ri = *ri * e;
        }
    }

    pub fn unscale_primal_residual_eq_in_place(&self, r: &mut DVector<T>) {
        for (ri, &e) in r.iter_mut().zip(self.dual_eq()) {
            *ri = *ri / e;
        }
    }

    pub fn scale_primal_residual_in_in_place(&self, r: &mut DVector<T>) {
        for (ri, &e) in r.iter_mut().zip(self.dual_in()) {
            *ri = *ri * e;
        }
    }

    pub fn unscale_primal_residual_in_in_place(&self, r: &mut DVector<T>) {
        for (ri, &e) in r.iter_mut().zip(self.dual_in()) {
            *ri = *ri / e;
        }
    }

    pub fn scale_dual_residual_in_place(&self, r: &mut DVector<T>) {
        for (ri, &d) in r.iter_mut().zip(self.primal()) {
            *ri = *ri * d * self.c;
        }
    }

    pub fn unscale_dual_residual_in_place(&self, r: &mut DVector<T>) {
        for (ri, &d) in r.iter_mut().zip(self.primal()) {
            *ri = *ri / (d * self.c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Dense;
    use approx::assert_abs_diff_eq;

    #[test]
    fn scale_unscale_primal_round_trips() {
        let dims = Dims::new(3, 0, 0);
        let model = Model::<f64, Dense>::zeros(dims);
        let (eq, _scaled) = RuizEquilibration::compute(&model, 1e-3, 20);
        let mut x = DVector::from_vec(vec![1.0, -2.0, 3.5]);
        let original = x.clone();
        eq.scale_primal_in_place(&mut x);
        eq.unscale_primal_in_place(&mut x);
        assert_abs_diff_eq!(x, original, epsilon = 1e-12);
    }
}
