//! Tolerances, iteration caps, proximal schedule constants, cold-restart
//! thresholds. All configuration, no runtime state.

use crate::scalar::Scalar;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings<T: Scalar> {
    pub eps_abs: T,
    pub eps_rel: T,
    pub eps_in_min: T,

    pub max_iter: usize,
    pub max_iter_in: usize,
    pub nb_iterative_refinement: usize,

    pub alpha_bcl: T,
    pub beta_bcl: T,
    pub mu_update_factor: T,
    pub mu_max_eq: T,
    pub mu_max_in: T,

    pub refactor_dual_feasibility_threshold: T,
    pub refactor_rho_threshold: T,
    pub cold_reset_mu_eq: T,
    pub cold_reset_mu_in: T,

    /// Below this primal feasibility the inner solver takes the
    /// initial-guess branch instead of the correction-guess branch.
    pub eps_ig: T,

    /// Ruiz equilibration tolerance and iteration cap.
    pub ruiz_eps: T,
    pub ruiz_max_iter: usize,

    /// Node-list cutoff for the line searches, guards against spurious
    /// roots blowing up to near-infinite step lengths.
    pub line_search_max_alpha: T,

    pub verbose: bool,
}

impl<T: Scalar> Default for Settings<T> {
    fn default() -> Self {
        let f = T::from_f64;
        Self {
            eps_abs: f(1e-9).unwrap(),
            eps_rel: T::zero(),
            eps_in_min: f(1e-9).unwrap(),

            max_iter: 200,
            max_iter_in: 1500,
            nb_iterative_refinement: 10,

            alpha_bcl: f(0.1).unwrap(),
            beta_bcl: f(0.9).unwrap(),
            mu_update_factor: f(0.1).unwrap(),
            mu_max_eq: f(1e9).unwrap(),
            mu_max_in: f(1e8).unwrap(),

            refactor_dual_feasibility_threshold: f(1e-2).unwrap(),
            refactor_rho_threshold: f(1e-7).unwrap(),
            cold_reset_mu_eq: f(1.0 / 1.1).unwrap(),
            cold_reset_mu_in: f(1.0 / 1.1).unwrap(),

            eps_ig: f(1e-2).unwrap(),

            ruiz_eps: f(1e-3).unwrap(),
            ruiz_max_iter: 20,

            line_search_max_alpha: f(1e6).unwrap(),

            verbose: false,
        }
    }
}

/// Whether, and how, to (re)run the preconditioner on `setup`/`update`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrecondMode {
    /// Recompute the Ruiz scaling from the current matrices.
    #[default]
    Execute,
    /// Use the identity scaling (no preconditioning).
    Identity,
    /// Keep whatever scaling is already in effect.
    Keep,
}
