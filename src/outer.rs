//! The bound-constrained-Lagrangian outer loop: drives the proximal
//! parameter `rho` and the equality/inequality penalty parameters
//! `(mu_eq, mu_in)` while the inner solver ([`crate::inner`]) drives
//! `(x, y, z)` to the saddle point of the current regularized Lagrangian.
//!
//! Feasibility is judged in the caller's original (unscaled) units: scaled
//! quantities never leave the KKT machinery, so every residual here is
//! computed from a transiently-unscaled copy of `(x, y, z)` against the
//! original `Model`.

use crate::active_set::ActiveSet;
use crate::errors::Result;
use crate::inner::{correction_guess_solve, initial_guess_step};
use crate::kkt::{mu_update, refactorize};
use crate::ldlt::LdltFactors;
use crate::matrix::{Backend, QpMatrix};
use crate::model::Model;
use crate::model::ScaledModel;
use crate::precond::RuizEquilibration;
use crate::scalar::Scalar;
use crate::settings::Settings;
use nalgebra::DVector;

/// Outcome of the outer loop: whether it converged, and the work it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Solved,
    MaxIterReached,
}

/// Iteration counters and final residuals, reported back to the caller.
#[derive(Clone, Debug)]
pub struct OuterInfo<T: Scalar> {
    pub status: Status,
    pub outer_iters: usize,
    pub inner_iters: usize,
    pub mu_updates: usize,
    pub rho: T,
    pub mu_eq: T,
    pub mu_in: T,
    pub primal_residual: T,
    pub dual_residual: T,
}

fn infty_norm<T: Scalar>(v: &DVector<T>) -> T {
    v.iter().fold(T::zero(), |acc, &x| acc.max(x.abs()))
}

fn max4<T: Scalar>(a: T, b: T, c: T, d: T) -> T {
    a.max(b).max(c).max(d)
}

/// `(||Ax - b||_inf, ||Ax||_inf)` and the one-sided inequality violation,
/// combined with the equality residual via max into a single primal lhs/rhs
/// pair, all in the caller's original units.
fn primal_residual<T: Scalar, B: Backend<T>>(model: &Model<T, B>, x: &DVector<T>) -> (T, T) {
    let n_eq = model.dims.n_eq;
    let n_in = model.dims.n_in;

    let mut ax = DVector::<T>::zeros(n_eq);
    model.a.gemv(T::one(), x, T::zero(), &mut ax);
    let eq_res = &ax - &model.b;
    let eq_lhs = infty_norm(&eq_res);
    let eq_rhs = infty_norm(&ax);

    let mut cx = DVector::<T>::zeros(n_in);
    model.c.gemv(T::one(), x, T::zero(), &mut cx);
    let mut in_u = DVector::<T>::zeros(n_in);
    let mut in_l = DVector::<T>::zeros(n_in);
    for i in 0..n_in {
        in_u[i] = (cx[i] - model.u[i]).max(T::zero());
        in_l[i] = (cx[i] - model.l[i]).min(T::zero());
    }
    let in_lhs = infty_norm(&in_u).max(infty_norm(&in_l));
    let in_rhs = infty_norm(&cx);

    (eq_lhs.max(in_lhs), eq_rhs.max(in_rhs))
}

/// `||H x + g + A^T y + C^T z||_inf` and its three rhs norms
/// `(||Hx||_inf, ||A^T y||_inf, ||C^T z||_inf)`, in original units.
fn dual_residual<T: Scalar, B: Backend<T>>(
    model: &Model<T, B>,
    x: &DVector<T>,
    y: &DVector<T>,
    z: &DVector<T>,
) -> (T, T, T, T) {
    let n = model.dims.n;
    let mut hx = DVector::<T>::zeros(n);
    model.h.gemv(T::one(), x, T::zero(), &mut hx);
    let mut aty = DVector::<T>::zeros(n);
    model.a.gemv_t(T::one(), y, T::zero(), &mut aty);
    let mut ctz = DVector::<T>::zeros(n);
    model.c.gemv_t(T::one(), z, T::zero(), &mut ctz);

    let mut dual = hx.clone();
    dual += &model.g;
    dual += &aty;
    dual += &ctz;

    (infty_norm(&dual), infty_norm(&hx), infty_norm(&aty), infty_norm(&ctz))
}

/// Run the bound-constrained-Lagrangian outer loop to convergence or
/// `settings.max_iter`. `(x, y, z)` are the scaled warm start on entry; on
/// return they hold the unscaled solution, whatever the outcome. `ldlt`
/// must already hold a valid factorization of the KKT at
/// `(rho0, mu_eq_inv0, mu_in_inv0)` for the given `active_set`.
#[allow(clippy::too_many_arguments)]
pub fn run<T: Scalar, B: Backend<T>>(
    model: &Model<T, B>,
    scaled: &ScaledModel<T, B>,
    precond: &RuizEquilibration<T>,
    settings: &Settings<T>,
    active_set: &mut ActiveSet,
    ldlt: &mut LdltFactors<T>,
    x: &mut DVector<T>,
    y: &mut DVector<T>,
    z: &mut DVector<T>,
    rho0: T,
    mu_eq_inv0: T,
    mu_in_inv0: T,
) -> Result<OuterInfo<T>> {
    let n_in = scaled.dims.n_in;

    let rhs1_eq = infty_norm(&model.b);
    let rhs1_in_u = infty_norm(&model.u);
    let rhs1_in_l = infty_norm(&model.l);
    let rhs_g = infty_norm(&model.g);

    let mut rho = rho0;
    let mut mu_eq_inv = mu_eq_inv0;
    let mut mu_in_inv = mu_in_inv0;
    let mut mu_eq = T::one() / mu_eq_inv;
    let mut mu_in = T::one() / mu_in_inv;

    let eta_ext_init = T::from_f64(0.1).unwrap().powf(settings.alpha_bcl);
    let mut eta_ext = eta_ext_init;
    let mut eta_in = T::one();

    let mut n_mu_updates = 0usize;
    let mut n_tot = 0usize;
    let mut prev_primal_lhs = T::from_f64(1e30).unwrap();
    let mut prev_dual_lhs = T::from_f64(1e30).unwrap();

    for iter in 0..settings.max_iter {
        let mut x_u = x.clone();
        precond.unscale_primal_in_place(&mut x_u);
        let mut y_u = y.clone();
        precond.unscale_dual_eq_in_place(&mut y_u);
        let mut z_u = z.clone();
        precond.unscale_dual_in_place(&mut z_u);

        let (primal_lhs, primal_rhs0) = primal_residual(model, &x_u);
        let (dual_lhs, dual_rhs0, dual_rhs1, dual_rhs3) = dual_residual(model, &x_u, &y_u, &z_u);

        let primal_ok =
            primal_lhs <= settings.eps_abs + settings.eps_rel * max4(primal_rhs0, rhs1_eq, rhs1_in_u, rhs1_in_l);
        let dual_ok = dual_lhs <= settings.eps_abs + settings.eps_rel * max4(dual_rhs0, dual_rhs1, dual_rhs3, rhs_g);

        if primal_ok && dual_ok {
            *x = x_u;
            *y = y_u;
            *z = z_u;
            return Ok(OuterInfo {
                status: Status::Solved,
                outer_iters: iter + 1,
                inner_iters: n_tot,
                mu_updates: n_mu_updates,
                rho,
                mu_eq,
                mu_in,
                primal_residual: primal_lhs,
                dual_residual: dual_lhs,
            });
        }

        if primal_ok && !dual_ok && rho > settings.refactor_rho_threshold {
            let rho_new = settings.refactor_rho_threshold;
            let (_, rho_used) = refactorize(ldlt, scaled, active_set, rho_new, mu_eq_inv, mu_in_inv)?;
            rho = rho_used;
        }

        let xe = x.clone();
        let ye = y.clone();
        let ze = z.clone();

        let do_initial_guess = primal_lhs < settings.eps_ig || n_in == 0;
        let mut err_in = T::zero();

        if do_initial_guess {
            err_in = initial_guess_step(
                scaled, active_set, ldlt, x, y, z, &xe, &ye, &ze, rho, mu_eq_inv, mu_in_inv, eta_in, settings,
            )?;
            n_tot += 1;
        }

        let needs_correction = if do_initial_guess {
            n_in != 0 && err_in >= eta_in
        } else {
            n_in != 0
        };

        if needs_correction {
            let (err, iters) = correction_guess_solve(
                scaled, active_set, ldlt, x, y, z, &xe, &ye, &ze, rho, mu_eq, mu_in, mu_eq_inv, mu_in_inv, eta_in,
                settings,
            )?;
            n_tot += iters;
            let _ = err;
        }

        let mut x_u2 = x.clone();
        precond.unscale_primal_in_place(&mut x_u2);
        let (primal_lhs_new, _) = primal_residual(model, &x_u2);

        if primal_lhs_new <= eta_ext {
            eta_ext = eta_ext * mu_in_inv.powf(settings.beta_bcl);
            eta_in = (eta_in * mu_in_inv).max(settings.eps_in_min);
        } else {
            *y = ye;
            *z = ze;

            let mu_eq_inv_new = (mu_eq_inv / settings.mu_update_factor).min(settings.mu_max_eq);
            let mu_in_inv_new = (mu_in_inv / settings.mu_update_factor).min(settings.mu_max_in);
            if mu_eq_inv_new != mu_eq_inv || mu_in_inv_new != mu_in_inv {
                n_mu_updates += 1;
            }
            mu_update(
                ldlt,
                scaled.dims.n,
                scaled.dims.n_eq,
                active_set.n_c(),
                mu_eq_inv,
                mu_eq_inv_new,
                mu_in_inv,
                mu_in_inv_new,
            );
            mu_eq_inv = mu_eq_inv_new;
            mu_in_inv = mu_in_inv_new;
            mu_eq = T::one() / mu_eq_inv;
            mu_in = T::one() / mu_in_inv;

            eta_ext = eta_ext_init * mu_in_inv.powf(settings.alpha_bcl);
            eta_in = mu_in_inv.max(settings.eps_in_min);
        }

        let mut y_u2 = y.clone();
        precond.unscale_dual_eq_in_place(&mut y_u2);
        let mut z_u2 = z.clone();
        precond.unscale_dual_in_place(&mut z_u2);
        let (dual_lhs_new, _, _, _) = dual_residual(model, &x_u2, &y_u2, &z_u2);

        if primal_lhs_new >= prev_primal_lhs && dual_lhs_new >= prev_dual_lhs && mu_in >= T::from_f64(1e5).unwrap() {
            log::debug!("cold restart at outer iteration {iter}: residuals stalled with mu_in = {mu_in:?}");
            let mu_eq_inv_cold = T::one() / settings.cold_reset_mu_eq;
            let mu_in_inv_cold = T::one() / settings.cold_reset_mu_in;
            mu_update(
                ldlt,
                scaled.dims.n,
                scaled.dims.n_eq,
                active_set.n_c(),
                mu_eq_inv,
                mu_eq_inv_cold,
                mu_in_inv,
                mu_in_inv_cold,
            );
            mu_eq_inv = mu_eq_inv_cold;
            mu_in_inv = mu_in_inv_cold;
            mu_eq = settings.cold_reset_mu_eq;
            mu_in = settings.cold_reset_mu_in;
        }

        prev_primal_lhs = primal_lhs_new;
        prev_dual_lhs = dual_lhs_new;
    }

    precond.unscale_primal_in_place(x);
    precond.unscale_dual_eq_in_place(y);
    precond.unscale_dual_in_place(z);
    Ok(OuterInfo {
        status: Status::MaxIterReached,
        outer_iters: settings.max_iter,
        inner_iters: n_tot,
        mu_updates: n_mu_updates,
        rho,
        mu_eq,
        mu_in,
        primal_residual: prev_primal_lhs,
        dual_residual: prev_dual_lhs,
    })
}
