//! KKT assembly and iterative refinement.
//!
//! The regularized KKT is
//!
//! ```text
//! [ H + rho I      A^T          C_A^T      ]
//! [ A             -1/mu_eq I    0          ]
//! [ C_A            0           -1/mu_in I  ]
//! ```
//!
//! where `C_A` is the currently active rows of C in bijection order.

use crate::active_set::ActiveSet;
use crate::errors::{Error, Result};
use crate::matrix::{Backend, QpMatrix};
use crate::model::ScaledModel;
use crate::scalar::Scalar;
use nalgebra::DMatrix;
use nalgebra::DVector;

/// Number of times `refactorize` will bump rho x10 and retry after a pivot
/// failure before giving up and surfacing `NotPSD`.
const MAX_RHO_BUMPS: u32 = 3;

fn infty_norm<T: Scalar>(v: &DVector<T>) -> T {
    v.iter().fold(T::zero(), |acc, &x| acc.max(x.abs()))
}

/// Build the full regularized KKT matrix, in dense form, from the scaled
/// model, the current active set and proximal parameters.
pub fn assemble_kkt<T: Scalar, B: Backend<T>>(
    model: &ScaledModel<T, B>,
    active_set: &ActiveSet,
    rho: T,
    mu_eq_inv: T,
    mu_in_inv: T,
) -> DMatrix<T> {
    let n = model.dims.n;
    let n_eq = model.dims.n_eq;
    let n_c = active_set.n_c();
    let order = n + n_eq + n_c;
    let mut k = DMatrix::<T>::zeros(order, order);

    let h_dense = model.h.to_dense();
    for i in 0..n {
        for j in 0..n {
            k[(i, j)] = h_dense[(i, j)];
        }
        k[(i, i)] += rho;
    }

    let a_dense = model.a.to_dense();
    for i in 0..n_eq {
        for j in 0..n {
            k[(n + i, j)] = a_dense[(i, j)];
            k[(j, n + i)] = a_dense[(i, j)];
        }
        k[(n + i, n + i)] = -mu_eq_inv;
    }

    for (row_pos, &orig_i) in active_set.active_indices_in_order().iter().enumerate() {
        let c_row = model.c.row_to_dense(orig_i);
        for j in 0..n {
            k[(n + n_eq + row_pos, j)] = c_row[j];
            k[(j, n + n_eq + row_pos)] = c_row[j];
        }
        k[(n + n_eq + row_pos, n + n_eq + row_pos)] = -mu_in_inv;
    }

    k
}

/// Solve `K dw = rhs` using the maintained LDLᵀ factorization, refining the
/// solution against the explicit dense `K` until the residual drops below
/// `eps` or `nb_iterative_refinement` refinement steps have run. Returns the
/// solution and the residual infinity norm actually reached; fails with
/// `NonFinite` the moment a solve or residual produces a NaN/Inf entry
/// rather than letting it propagate silently through the outer loop.
pub fn iterative_solve_with_permut_fact<T: Scalar>(
    ldlt: &crate::ldlt::LdltFactors<T>,
    kkt: &DMatrix<T>,
    rhs: &DVector<T>,
    eps: T,
    nb_iterative_refinement: usize,
) -> Result<(DVector<T>, T)> {
    let mut dw = rhs.clone();
    ldlt.solve_in_place(&mut dw);
    if !dw.iter().all(|v| v.is_finite()) {
        return Err(Error::NonFinite);
    }

    let mut r = rhs.clone();
    r.gemv(-T::one(), kkt, &dw, T::one());
    let mut err = infty_norm(&r);

    let mut iters = 0;
    while err > eps && iters < nb_iterative_refinement {
        let mut delta = r.clone();
        ldlt.solve_in_place(&mut delta);
        if !delta.iter().all(|v| v.is_finite()) {
            return Err(Error::NonFinite);
        }
        dw += &delta;

        r = rhs.clone();
        r.gemv(-T::one(), kkt, &dw, T::one());
        err = infty_norm(&r);
        if !err.is_finite() {
            return Err(Error::NonFinite);
        }
        iters += 1;
    }

    Ok((dw, err))
}

/// Rebuild the KKT from scratch at `rho_new` and refactor, bumping rho x10
/// and retrying up to [`MAX_RHO_BUMPS`] times if the factorization hits a
/// pivot that can't be regularized, before giving up with `NotPSD`. Returns
/// the assembled KKT and the rho it was actually factored at (equal to
/// `rho_new` unless a bump happened).
pub fn refactorize<T: Scalar, B: Backend<T>>(
    ldlt: &mut crate::ldlt::LdltFactors<T>,
    model: &ScaledModel<T, B>,
    active_set: &ActiveSet,
    rho_new: T,
    mu_eq_inv: T,
    mu_in_inv: T,
) -> Result<(DMatrix<T>, T)> {
    let mut rho = rho_new;
    let mut bumps = 0u32;
    loop {
        let k = assemble_kkt(model, active_set, rho, mu_eq_inv, mu_in_inv);
        match ldlt.refactorize_from(&k) {
            Ok(()) => return Ok((k, rho)),
            Err(Error::PivotFailure { row, .. }) => {
                if bumps >= MAX_RHO_BUMPS {
                    return Err(Error::NotPSD { row });
                }
                bumps += 1;
                rho = rho * T::from_f64(10.0).unwrap();
                log::warn!(
                    "KKT pivot failure at row {row}, bumping rho to {rho:?} (attempt {bumps}/{MAX_RHO_BUMPS})"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retune the equality- and active-inequality-block diagonals for a change
/// in (μ_eq, μ_in) via rank-one updates, avoiding a full refactor.
pub fn mu_update<T: Scalar>(
    ldlt: &mut crate::ldlt::LdltFactors<T>,
    n: usize,
    n_eq: usize,
    n_c: usize,
    mu_eq_inv_old: T,
    mu_eq_inv_new: T,
    mu_in_inv_old: T,
    mu_in_inv_new: T,
) {
    let order = ldlt.order();
    let sigma_eq = mu_eq_inv_old - mu_eq_inv_new;
    for i in 0..n_eq {
        let mut e = DVector::<T>::zeros(order);
        e[n + i] = T::one();
        ldlt.rank_one_update(&e, sigma_eq);
    }
    let sigma_in = mu_in_inv_old - mu_in_inv_new;
    for i in 0..n_c {
        let mut e = DVector::<T>::zeros(order);
        e[n + n_eq + i] = T::one();
        ldlt.rank_one_update(&e, sigma_in);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active_set::ActiveSet;
    use crate::ldlt::LdltFactors;
    use crate::matrix::Dense;
    use crate::model::{Dims, Model};
    use approx::assert_abs_diff_eq;

    #[test]
    fn solve_matches_direct_for_unconstrained() {
        let dims = Dims::new(2, 0, 0);
        let mut model = Model::<f64, Dense>::zeros(dims);
        model.h = nalgebra::DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 2.0]);
        model.g = DVector::from_vec(vec![1.0, 1.0]);
        let scaled = crate::model::ScaledModel::from_model(&model);

        let active_set = ActiveSet::new(0);
        let rho = 1e-6;
        let k = assemble_kkt(&scaled, &active_set, rho, 0.0, 0.0);
        let ldlt = LdltFactors::<f64>::factorize(&k).unwrap();
        let rhs = -scaled.g.clone();
        let (dw, err) = iterative_solve_with_permut_fact(&ldlt, &k, &rhs, 1e-12, 5).unwrap();
        assert!(err < 1e-9);
        assert_abs_diff_eq!(dw[0], -0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(dw[1], -0.5, epsilon = 1e-6);
    }
}
