//! The proximal inner solver: given a fixed `(rho, mu_eq, mu_in)` and a
//! proximal center `(x_e, y_e, z_e)`, drive `(x, y, z)` to the saddle point
//! of the regularized Lagrangian. Two branches share the same Newton step
//! machinery: `initial_guess_step` takes one step with an exact line search
//! over the KKT merit (cheap, works well near a good active-set guess),
//! `correction_guess_solve` iterates full Newton steps with an exact
//! augmented-Lagrangian line search until the projected gradient is small
//! (robust, used whenever the active-set guess is unreliable).

use crate::active_set::ActiveSet;
use crate::errors::Result;
use crate::kkt::{assemble_kkt, iterative_solve_with_permut_fact};
use crate::ldlt::LdltFactors;
use crate::line_search::correction::{correction_guess_line_search, CorrectionGuessData};
use crate::line_search::initial_guess::{initial_guess_line_search, InitialGuessData};
use crate::matrix::{Backend, QpMatrix};
use crate::model::ScaledModel;
use crate::scalar::Scalar;
use crate::settings::Settings;
use nalgebra::DVector;

/// One Newton step of the active-set Lagrangian system, built from the
/// current guess of which inequalities are active (`z != 0`). Returns the
/// step `(dx, dy, dz)`, `dz` already expanded back to the full n_in length
/// (zero on inactive rows).
#[allow(clippy::too_many_arguments)]
fn newton_step<T: Scalar, B: Backend<T>>(
    scaled: &ScaledModel<T, B>,
    active_set: &mut ActiveSet,
    ldlt: &mut LdltFactors<T>,
    x: &DVector<T>,
    y: &DVector<T>,
    z: &DVector<T>,
    rho: T,
    mu_eq_inv: T,
    mu_in_inv: T,
    eps: T,
    nb_iterative_refinement: usize,
) -> Result<(DVector<T>, DVector<T>, DVector<T>)> {
    let n = scaled.dims.n;
    let n_eq = scaled.dims.n_eq;
    let n_in = scaled.dims.n_in;

    let new_active: Vec<bool> = (0..n_in).map(|i| z[i] != T::zero()).collect();
    active_set.transition(&new_active, ldlt, &scaled.c, n, n_eq, mu_in_inv)?;

    let kkt = assemble_kkt(scaled, active_set, rho, mu_eq_inv, mu_in_inv);
    let order = n + n_eq + active_set.n_c();

    let mut dual = DVector::<T>::zeros(n);
    scaled.h.gemv(T::one(), x, T::zero(), &mut dual);
    dual += &scaled.g;
    scaled.a.gemv_t(T::one(), y, T::one(), &mut dual);
    for i in 0..n_in {
        if z[i] != T::zero() {
            dual.axpy(z[i], &scaled.c.row_to_dense(i), T::one());
        }
    }

    let mut eq_res = DVector::<T>::zeros(n_eq);
    scaled.a.gemv(T::one(), x, T::zero(), &mut eq_res);
    eq_res -= &scaled.b;

    let mut rhs = DVector::<T>::zeros(order);
    for i in 0..n {
        rhs[i] = -dual[i];
    }
    for i in 0..n_eq {
        rhs[n + i] = -eq_res[i];
    }
    for (row_pos, &orig_i) in active_set.active_indices_in_order().iter().enumerate() {
        let c_row = scaled.c.row_to_dense(orig_i);
        let cx = c_row.dot(x);
        let bound = if z[orig_i] > T::zero() {
            scaled.u[orig_i]
        } else {
            scaled.l[orig_i]
        };
        rhs[n + n_eq + row_pos] = -(cx - bound);
    }

    let (dw, err) = iterative_solve_with_permut_fact(ldlt, &kkt, &rhs, eps, nb_iterative_refinement)?;
    let dw = if err > eps {
        log::warn!("iterative refinement stalled at residual {err:?} (eps {eps:?}), refactorizing and retrying once");
        ldlt.refactorize_from(&kkt)?;
        let (dw2, err2) = iterative_solve_with_permut_fact(ldlt, &kkt, &rhs, eps, nb_iterative_refinement)?;
        if err2 > eps {
            return Err(crate::errors::Error::RefinementStall);
        }
        dw2
    } else {
        dw
    };

    let dx = DVector::from_iterator(n, (0..n).map(|i| dw[i]));
    let dy = DVector::from_iterator(n_eq, (0..n_eq).map(|i| dw[n + i]));
    let mut dz = DVector::<T>::zeros(n_in);
    for (row_pos, &orig_i) in active_set.active_indices_in_order().iter().enumerate() {
        dz[orig_i] = dw[n + n_eq + row_pos];
    }
    for i in 0..n_in {
        if z[i] == T::zero() {
            dz[i] = -z[i];
        }
    }
    Ok((dx, dy, dz))
}

/// One initial-guess step: a single Newton step from `(x_e, y_e, z_e)`
/// followed by an exact line search, returning the infinity norm of the
/// saddle-point residual at the new iterate.
#[allow(clippy::too_many_arguments)]
pub fn initial_guess_step<T: Scalar, B: Backend<T>>(
    scaled: &ScaledModel<T, B>,
    active_set: &mut ActiveSet,
    ldlt: &mut LdltFactors<T>,
    x: &mut DVector<T>,
    y: &mut DVector<T>,
    z: &mut DVector<T>,
    xe: &DVector<T>,
    ye: &DVector<T>,
    ze: &DVector<T>,
    rho: T,
    mu_eq_inv: T,
    mu_in_inv: T,
    eps_in: T,
    settings: &Settings<T>,
) -> Result<T> {
    let n_in = scaled.dims.n_in;

    let (dx, dy, dz) = newton_step(
        scaled,
        active_set,
        ldlt,
        x,
        y,
        z,
        rho,
        mu_eq_inv,
        mu_in_inv,
        eps_in,
        settings.nb_iterative_refinement,
    )?;

    let mut alpha = T::one();
    if n_in > 0 {
        let mut c_rows = Vec::with_capacity(n_in);
        let mut cdx = DVector::<T>::zeros(n_in);
        let mut residual_in_z_u = DVector::<T>::zeros(n_in);
        let mut residual_in_z_l = DVector::<T>::zeros(n_in);
        for i in 0..n_in {
            let row = scaled.c.row_to_dense(i);
            let cx = row.dot(x);
            cdx[i] = row.dot(&dx);
            residual_in_z_u[i] = cx - scaled.u[i] + z[i] * mu_in_inv;
            residual_in_z_l[i] = cx - scaled.l[i] + z[i] * mu_in_inv;
            c_rows.push(row);
        }

        let mut dual_for_eq = DVector::<T>::zeros(scaled.dims.n);
        scaled.h.gemv(T::one(), x, T::zero(), &mut dual_for_eq);
        dual_for_eq += &scaled.g;
        dual_for_eq.axpy(rho, &(x.clone() - xe), T::one());
        scaled.a.gemv_t(T::one(), y, T::one(), &mut dual_for_eq);

        let mut d_dual_for_eq = DVector::<T>::zeros(scaled.dims.n);
        scaled.h.gemv(T::one(), &dx, T::zero(), &mut d_dual_for_eq);
        d_dual_for_eq.axpy(rho, &dx, T::one());
        scaled.a.gemv_t(T::one(), &dy, T::one(), &mut d_dual_for_eq);

        let mut primal_residual_eq = DVector::<T>::zeros(scaled.dims.n_eq);
        scaled.a.gemv(T::one(), x, T::zero(), &mut primal_residual_eq);
        primal_residual_eq -= &scaled.b;
        primal_residual_eq.axpy(-mu_eq_inv, &(y.clone() - ye), T::one());

        let mut d_primal_residual_eq = DVector::<T>::zeros(scaled.dims.n_eq);
        scaled.a.gemv(T::one(), &dx, T::zero(), &mut d_primal_residual_eq);
        d_primal_residual_eq.axpy(-mu_eq_inv, &dy, T::one());

        let data = InitialGuessData {
            c_rows,
            cdx,
            residual_in_z_u,
            residual_in_z_l,
            z_e: ze.clone(),
            dz: dz.clone(),
            dual_for_eq,
            d_dual_for_eq,
            primal_residual_eq,
            d_primal_residual_eq,
            mu_in_inv,
        };
        alpha = initial_guess_line_search(&data, settings.line_search_max_alpha);
    }

    *x += &dx * alpha;
    *y += &dy * alpha;
    for i in 0..n_in {
        let raw = z[i] + dz[i] * alpha;
        let cx = scaled.c.row_to_dense(i).dot(x);
        let su = cx - scaled.u[i] + ze[i] * mu_in_inv;
        let sl = cx - scaled.l[i] + ze[i] * mu_in_inv;
        z[i] = if su >= T::zero() {
            raw.max(T::zero())
        } else if sl <= T::zero() {
            raw.min(T::zero())
        } else {
            raw
        };
    }

    Ok(saddle_point_residual(scaled, x, y, z, xe, rho))
}

/// `‖H x + g + rho (x - x_e) + A^T y + C^T z‖_∞`, plus the complementarity
/// slack for the active rows, per the usual saddle-point error measure.
fn saddle_point_residual<T: Scalar, B: Backend<T>>(
    scaled: &ScaledModel<T, B>,
    x: &DVector<T>,
    y: &DVector<T>,
    z: &DVector<T>,
    xe: &DVector<T>,
    rho: T,
) -> T {
    let n = scaled.dims.n;
    let mut dual = DVector::<T>::zeros(n);
    scaled.h.gemv(T::one(), x, T::zero(), &mut dual);
    dual += &scaled.g;
    dual.axpy(rho, &(x.clone() - xe), T::one());
    scaled.a.gemv_t(T::one(), y, T::one(), &mut dual);
    scaled.c.gemv_t(T::one(), z, T::one(), &mut dual);
    let mut err = dual.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));

    for i in 0..scaled.dims.n_in {
        let cx = scaled.c.row_to_dense(i).dot(x);
        if z[i] > T::zero() {
            let slack = cx - scaled.u[i];
            err = err.max(slack.abs());
        } else if z[i] < T::zero() {
            let slack = cx - scaled.l[i];
            err = err.max(slack.abs());
        } else {
            err = err.max((cx - scaled.u[i]).max(T::zero()));
            err = err.max((cx - scaled.l[i]).min(T::zero()).abs());
        }
    }
    err
}

/// Full Newton iteration with an exact augmented-Lagrangian line search,
/// run until the projected-gradient stationarity error drops below
/// `eps_int * (1 + scale)` or `settings.max_iter_in` steps have run.
#[allow(clippy::too_many_arguments)]
pub fn correction_guess_solve<T: Scalar, B: Backend<T>>(
    scaled: &ScaledModel<T, B>,
    active_set: &mut ActiveSet,
    ldlt: &mut LdltFactors<T>,
    x: &mut DVector<T>,
    y: &mut DVector<T>,
    z: &mut DVector<T>,
    xe: &DVector<T>,
    ye: &DVector<T>,
    ze: &DVector<T>,
    rho: T,
    mu_eq: T,
    mu_in: T,
    mu_eq_inv: T,
    mu_in_inv: T,
    eps_int: T,
    settings: &Settings<T>,
) -> Result<(T, usize)> {
    let n = scaled.dims.n;
    let n_in = scaled.dims.n_in;
    let mut err_in = T::from_f64(1e6).unwrap();
    let mut iters_run = 0usize;

    for _iter in 0..settings.max_iter_in {
        iters_run += 1;
        let (dx, dy, _dz) = newton_step(
            scaled,
            active_set,
            ldlt,
            x,
            y,
            z,
            rho,
            mu_eq_inv,
            mu_in_inv,
            eps_int,
            settings.nb_iterative_refinement,
        )?;

        let mut hdx = DVector::<T>::zeros(n);
        scaled.h.gemv(T::one(), &dx, T::zero(), &mut hdx);
        let mut adx = DVector::<T>::zeros(scaled.dims.n_eq);
        scaled.a.gemv(T::one(), &dx, T::zero(), &mut adx);
        let mut cdx = DVector::<T>::zeros(n_in);
        scaled.c.gemv(T::one(), &dx, T::zero(), &mut cdx);

        let mut alpha = T::one();
        if n_in > 0 {
            let mut residual_in_y = DVector::<T>::zeros(scaled.dims.n_eq);
            scaled.a.gemv(T::one(), x, T::zero(), &mut residual_in_y);
            residual_in_y -= &scaled.b;
            residual_in_y.axpy(mu_eq_inv, ye, T::one());

            let mut residual_in_z_u = DVector::<T>::zeros(n_in);
            let mut residual_in_z_l = DVector::<T>::zeros(n_in);
            for i in 0..n_in {
                let cx = scaled.c.row_to_dense(i).dot(x);
                residual_in_z_u[i] = cx - scaled.u[i] + ze[i] * mu_in_inv;
                residual_in_z_l[i] = cx - scaled.l[i] + ze[i] * mu_in_inv;
            }

            let data = CorrectionGuessData {
                x: x.clone(),
                xe: xe.clone(),
                dx: dx.clone(),
                g: scaled.g.clone(),
                hdx: hdx.clone(),
                adx: adx.clone(),
                cdx: cdx.clone(),
                residual_in_y,
                residual_in_z_u,
                residual_in_z_l,
                mu_eq,
                mu_in,
                rho,
            };
            alpha = correction_guess_line_search(&data);
        }

        let step_size = (&dx * alpha).iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));
        if step_size < T::from_f64(1e-11).unwrap() {
            break;
        }

        *x += &dx * alpha;
        for i in 0..n_in {
            let cx = scaled.c.row_to_dense(i).dot(x);
            let su = cx - scaled.u[i] + ze[i] * mu_in_inv;
            let sl = cx - scaled.l[i] + ze[i] * mu_in_inv;
            z[i] = mu_in * (su.max(T::zero()) + sl.min(T::zero()));
        }
        *y = &(&residual_for_y(scaled, x) * mu_eq) + ye;

        let mut hx = DVector::<T>::zeros(n);
        scaled.h.gemv(T::one(), x, T::zero(), &mut hx);
        let mut aty = DVector::<T>::zeros(n);
        scaled.a.gemv_t(T::one(), y, T::zero(), &mut aty);
        let mut ctz = DVector::<T>::zeros(n);
        scaled.c.gemv_t(T::one(), z, T::zero(), &mut ctz);

        let mut grad = hx.clone();
        grad += &scaled.g;
        grad += &aty;
        grad += &ctz;
        grad.axpy(rho, &(x.clone() - xe), T::one());
        err_in = grad.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));

        let hx_norm = hx.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));
        let aty_norm = aty.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));
        let ctz_norm = ctz.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));
        let g_norm = scaled.g.iter().fold(T::zero(), |acc, &v| acc.max(v.abs()));
        let scale = T::one() + hx_norm + aty_norm + ctz_norm + g_norm;
        if err_in <= eps_int * scale {
            break;
        }
    }
    Ok((err_in, iters_run))
}

fn residual_for_y<T: Scalar, B: Backend<T>>(scaled: &ScaledModel<T, B>, x: &DVector<T>) -> DVector<T> {
    let mut r = DVector::<T>::zeros(scaled.dims.n_eq);
    scaled.a.gemv(T::one(), x, T::zero(), &mut r);
    r -= &scaled.b;
    r
}
