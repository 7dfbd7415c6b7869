//! The public solver handle: owns the problem data, the Ruiz scaling, and
//! the maintained LDLᵀ/active-set state across repeated `setup`/`update`/
//! `solve` cycles, so warm-starting and proximal retuning never pay for a
//! fresh factorization unless the active set actually changes.

use crate::active_set::ActiveSet;
use crate::errors::{Error, Result};
use crate::kkt::{mu_update, refactorize};
use crate::ldlt::LdltFactors;
use crate::matrix::{Backend, QpMatrix};
use crate::model::{Dims, Model, ScaledModel};
use crate::outer::run as run_outer;
use crate::precond::RuizEquilibration;
use crate::results::{Info, Results};
use crate::scalar::Scalar;
use crate::settings::{PrecondMode, Settings};
use nalgebra::DVector;
use std::time::Instant;

/// Optional problem data for `setup`/`update`: any field left `None` is
/// treated as zero of the declared shape, matching `Model::zeros`.
#[derive(Clone, Debug)]
pub struct QpData<T: Scalar, B: Backend<T>> {
    pub h: Option<B::Mat>,
    pub g: Option<DVector<T>>,
    pub a: Option<B::Mat>,
    pub b: Option<DVector<T>>,
    pub c: Option<B::Mat>,
    pub l: Option<DVector<T>>,
    pub u: Option<DVector<T>>,
}

impl<T: Scalar, B: Backend<T>> Default for QpData<T, B> {
    fn default() -> Self {
        Self {
            h: None,
            g: None,
            a: None,
            b: None,
            c: None,
            l: None,
            u: None,
        }
    }
}

impl<T: Scalar, B: Backend<T>> QpData<T, B> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A reusable QP solver for a fixed `(n, n_eq, n_in)` problem shape.
pub struct Solver<T: Scalar, B: Backend<T>> {
    pub settings: Settings<T>,
    model: Model<T, B>,
    scaled: ScaledModel<T, B>,
    precond: RuizEquilibration<T>,
    active_set: ActiveSet,
    ldlt: LdltFactors<T>,
    x: DVector<T>,
    y: DVector<T>,
    z: DVector<T>,
    rho0: T,
    mu_eq_inv0: T,
    mu_in_inv0: T,
    setup_time: std::time::Duration,
    is_setup: bool,
}

fn apply_data<T: Scalar, B: Backend<T>>(model: &mut Model<T, B>, data: QpData<T, B>) {
    if let Some(h) = data.h {
        model.h = h;
    }
    if let Some(g) = data.g {
        model.g = g;
    }
    if let Some(a) = data.a {
        model.a = a;
    }
    if let Some(b) = data.b {
        model.b = b;
    }
    if let Some(c) = data.c {
        model.c = c;
    }
    if let Some(l) = data.l {
        model.l = l;
    }
    if let Some(u) = data.u {
        model.u = u;
    }
}

impl<T: Scalar, B: Backend<T>> Solver<T, B> {
    pub fn new(dims: Dims, settings: Settings<T>) -> Self {
        let model = Model::zeros(dims);
        let precond = RuizEquilibration::identity(dims);
        let scaled = ScaledModel::from_model(&model);
        let active_set = ActiveSet::new(dims.n_in);
        let order = dims.n + dims.n_eq;
        let ldlt = LdltFactors::factorize(&nalgebra::DMatrix::<T>::identity(order.max(1), order.max(1)))
            .expect("identity matrix always factorizes");
        Self {
            settings,
            model,
            scaled,
            precond,
            active_set,
            ldlt,
            x: DVector::zeros(dims.n),
            y: DVector::zeros(dims.n_eq),
            z: DVector::zeros(dims.n_in),
            rho0: T::from_f64(1e-6).unwrap(),
            mu_eq_inv0: T::from_f64(1e-3).unwrap(),
            mu_in_inv0: T::from_f64(1e-1).unwrap(),
            setup_time: std::time::Duration::ZERO,
            is_setup: false,
        }
    }

    pub fn dims(&self) -> Dims {
        self.model.dims
    }

    /// Load problem data and (re)run the preconditioner, building the first
    /// KKT factorization at `(rho, mu_eq, mu_in) = (1e-6, 1e3, 1e1)`.
    pub fn setup(&mut self, data: QpData<T, B>, precond_mode: PrecondMode) -> Result<()> {
        let start = Instant::now();
        apply_data(&mut self.model, data);
        self.model.validate()?;

        match precond_mode {
            PrecondMode::Execute => {
                let (precond, scaled) =
                    RuizEquilibration::compute(&self.model, self.settings.ruiz_eps, self.settings.ruiz_max_iter);
                self.precond = precond;
                self.scaled = scaled;
            }
            PrecondMode::Identity => {
                self.precond = RuizEquilibration::identity(self.model.dims);
                self.scaled = ScaledModel::from_model(&self.model);
            }
            PrecondMode::Keep => {
                self.scaled = ScaledModel::from_model(&self.model);
            }
        }

        self.active_set = ActiveSet::new(self.model.dims.n_in);
        let (_, rho_used) = refactorize(
            &mut self.ldlt,
            &self.scaled,
            &self.active_set,
            self.rho0,
            self.mu_eq_inv0,
            self.mu_in_inv0,
        )?;
        self.rho0 = rho_used;

        self.x = DVector::zeros(self.model.dims.n);
        self.y = DVector::zeros(self.model.dims.n_eq);
        self.z = DVector::zeros(self.model.dims.n_in);

        self.is_setup = true;
        self.setup_time = start.elapsed();
        Ok(())
    }

    /// Update problem data in place. `g`, `b`, `l`, `u` are always
    /// overwritten when present. `h`, `a`, `c` are overwritten only if their
    /// nonzero structure matches the matrix already held (dense matrices
    /// always match on matching shape; sparse matrices must also keep the
    /// same sparsity pattern) — on a mismatch the old matrix is kept and a
    /// warning is logged, rather than guessing at a reshape. Reuses the
    /// active set and refactors the held KKT from the new values, instead
    /// of rebuilding from scratch the way `setup` does.
    pub fn update(&mut self, data: QpData<T, B>, precond_mode: PrecondMode) -> Result<()> {
        if !self.is_setup {
            return Err(Error::DimensionMismatch {
                what: "update called before setup",
                expected: 1,
                got: 0,
            });
        }

        let QpData { h, g, a, b, c, l, u } = data;

        if let Some(h) = h {
            if self.model.h.same_structure(&h) {
                self.model.h = h;
            } else {
                log::warn!("update: H nonzero structure differs from setup, leaving H unchanged");
            }
        }
        if let Some(a) = a {
            if self.model.a.same_structure(&a) {
                self.model.a = a;
            } else {
                log::warn!("update: A nonzero structure differs from setup, leaving A unchanged");
            }
        }
        if let Some(c) = c {
            if self.model.c.same_structure(&c) {
                self.model.c = c;
            } else {
                log::warn!("update: C nonzero structure differs from setup, leaving C unchanged");
            }
        }
        if let Some(g) = g {
            self.model.g = g;
        }
        if let Some(b) = b {
            self.model.b = b;
        }
        if let Some(l) = l {
            self.model.l = l;
        }
        if let Some(u) = u {
            self.model.u = u;
        }
        self.model.validate()?;

        // Carry the current iterate across a rescale: it's held in scaled
        // space, which a recomputed Ruiz scaling would otherwise silently
        // invalidate.
        let mut x_u = self.x.clone();
        self.precond.unscale_primal_in_place(&mut x_u);
        let mut y_u = self.y.clone();
        self.precond.unscale_dual_eq_in_place(&mut y_u);
        let mut z_u = self.z.clone();
        self.precond.unscale_dual_in_place(&mut z_u);

        match precond_mode {
            PrecondMode::Execute => {
                let (precond, scaled) =
                    RuizEquilibration::compute(&self.model, self.settings.ruiz_eps, self.settings.ruiz_max_iter);
                self.precond = precond;
                self.scaled = scaled;
            }
            PrecondMode::Identity => {
                self.precond = RuizEquilibration::identity(self.model.dims);
                self.scaled = ScaledModel::from_model(&self.model);
            }
            PrecondMode::Keep => {
                self.scaled = ScaledModel::from_model(&self.model);
            }
        }

        self.precond.scale_primal_in_place(&mut x_u);
        self.x = x_u;
        self.precond.scale_dual_eq_in_place(&mut y_u);
        self.y = y_u;
        self.precond.scale_dual_in_place(&mut z_u);
        self.z = z_u;

        let (_, rho_used) = refactorize(
            &mut self.ldlt,
            &self.scaled,
            &self.active_set,
            self.rho0,
            self.mu_eq_inv0,
            self.mu_in_inv0,
        )?;
        self.rho0 = rho_used;
        Ok(())
    }

    /// Override the proximal/penalty parameters the next `solve()` starts
    /// from (the outer loop always restarts its own BCL schedule from
    /// these at the beginning of the run). Mu changes are applied to the
    /// held factorization via rank-one updates; a rho change needs a full
    /// refactor since it touches every primal diagonal entry.
    pub fn update_proximal(&mut self, rho: Option<T>, mu_eq: Option<T>, mu_in: Option<T>) -> Result<()> {
        let mu_eq_inv_new = mu_eq.map(|m| T::one() / m).unwrap_or(self.mu_eq_inv0);
        let mu_in_inv_new = mu_in.map(|m| T::one() / m).unwrap_or(self.mu_in_inv0);

        if let Some(rho_new) = rho {
            self.mu_eq_inv0 = mu_eq_inv_new;
            self.mu_in_inv0 = mu_in_inv_new;
            let (_, rho_used) = refactorize(
                &mut self.ldlt,
                &self.scaled,
                &self.active_set,
                rho_new,
                self.mu_eq_inv0,
                self.mu_in_inv0,
            )?;
            self.rho0 = rho_used;
        } else if mu_eq_inv_new != self.mu_eq_inv0 || mu_in_inv_new != self.mu_in_inv0 {
            mu_update(
                &mut self.ldlt,
                self.scaled.dims.n,
                self.scaled.dims.n_eq,
                self.active_set.n_c(),
                self.mu_eq_inv0,
                mu_eq_inv_new,
                self.mu_in_inv0,
                mu_in_inv_new,
            );
            self.mu_eq_inv0 = mu_eq_inv_new;
            self.mu_in_inv0 = mu_in_inv_new;
        }
        Ok(())
    }

    /// Seed `(x, y, z)` for the next `solve()`, in the caller's original
    /// (unscaled) units. Any field left `None` keeps the current iterate.
    pub fn warm_start(&mut self, x: Option<DVector<T>>, y: Option<DVector<T>>, z: Option<DVector<T>>) {
        if let Some(mut x) = x {
            self.precond.scale_primal_in_place(&mut x);
            self.x = x;
        }
        if let Some(mut y) = y {
            self.precond.scale_dual_eq_in_place(&mut y);
            self.y = y;
        }
        if let Some(mut z) = z {
            self.precond.scale_dual_in_place(&mut z);
            self.z = z;
        }
    }

    /// Reset the iterate and statistics, keeping the problem data and
    /// factorization structure so the next `solve()` starts cold but
    /// doesn't need `setup()` called again.
    pub fn cleanup(&mut self) -> Result<()> {
        self.x = DVector::zeros(self.model.dims.n);
        self.y = DVector::zeros(self.model.dims.n_eq);
        self.z = DVector::zeros(self.model.dims.n_in);
        self.active_set = ActiveSet::new(self.model.dims.n_in);
        let (_, rho_used) = refactorize(
            &mut self.ldlt,
            &self.scaled,
            &self.active_set,
            self.rho0,
            self.mu_eq_inv0,
            self.mu_in_inv0,
        )?;
        self.rho0 = rho_used;
        Ok(())
    }

    /// Run the outer BCL loop to convergence (or `settings.max_iter`).
    pub fn solve(&mut self) -> Result<Results<T>> {
        if !self.is_setup {
            return Err(Error::DimensionMismatch {
                what: "solve called before setup",
                expected: 1,
                got: 0,
            });
        }
        let start = Instant::now();
        let outer_info = run_outer(
            &self.model,
            &self.scaled,
            &self.precond,
            &self.settings,
            &mut self.active_set,
            &mut self.ldlt,
            &mut self.x,
            &mut self.y,
            &mut self.z,
            self.rho0,
            self.mu_eq_inv0,
            self.mu_in_inv0,
        )?;
        let solve_time = start.elapsed();

        log::debug!(
            "solve finished: status={:?} outer_iters={} inner_iters={} mu_updates={}",
            outer_info.status,
            outer_info.outer_iters,
            outer_info.inner_iters,
            outer_info.mu_updates,
        );

        let x_unscaled = self.x.clone();
        let y_unscaled = self.y.clone();
        let z_unscaled = self.z.clone();

        let info = Info::from_outer(outer_info, self.setup_time, solve_time);

        self.precond.scale_primal_in_place(&mut self.x);
        self.precond.scale_dual_eq_in_place(&mut self.y);
        self.precond.scale_dual_in_place(&mut self.z);

        Ok(Results {
            x: x_unscaled,
            y: y_unscaled,
            z: z_unscaled,
            info,
        })
    }
}
