//! Initial-guess line search: given a Newton step `(dx, dy, dz)` from the
//! current iterate `(x, y, z)`, find the step length minimizing the squared
//! norm of the KKT residual evaluated at `(x + alpha dx, y + alpha dy,
//! z(alpha))`, where `z(alpha)` is the box-clamped dual variable
//! `z_e + alpha dz`.
//!
//! Every inequality row's contribution switches between an "upper active",
//! "lower active" and "inactive" branch at a handful of candidate step
//! lengths (the "nodes" below); between two consecutive nodes the branch
//! assignment is constant and the merit is an exact quadratic in alpha, so
//! the search evaluates the merit at every node plus the closed-form
//! minimizer of the quadratic on every inter-node interval, and returns
//! whichever candidate scores lowest.

use super::sorted_unique_nodes;
use crate::scalar::Scalar;
use nalgebra::DVector;

/// Precomputed data the merit function needs; built once per call by the
/// inner solver from the scaled model and the current Newton direction.
pub struct InitialGuessData<T: Scalar> {
    /// Dense rows of the active+inactive inequality matrix C, length n_in.
    pub c_rows: Vec<DVector<T>>,
    pub cdx: DVector<T>,
    pub residual_in_z_u: DVector<T>,
    pub residual_in_z_l: DVector<T>,
    pub z_e: DVector<T>,
    pub dz: DVector<T>,
    /// `H x + g + rho (x - x_e) + A^T y`
    pub dual_for_eq: DVector<T>,
    /// `H dx + rho dx + A^T dy`
    pub d_dual_for_eq: DVector<T>,
    /// `(A x - b) - (y - y_e) / mu_eq`
    pub primal_residual_eq: DVector<T>,
    /// `A dx - dy / mu_eq`
    pub d_primal_residual_eq: DVector<T>,
    pub mu_in_inv: T,
}

enum Branch {
    Upper,
    Lower,
    Inactive,
}

fn branch_at<T: Scalar>(su: T, sl: T) -> Branch {
    if su >= T::zero() {
        Branch::Upper
    } else if sl <= T::zero() {
        Branch::Lower
    } else {
        Branch::Inactive
    }
}

/// Squared norm of the KKT residual at `alpha`, branch assignment recomputed
/// from the actual sign of `su`/`sl` at that alpha (used to score nodes).
fn merit_at<T: Scalar>(d: &InitialGuessData<T>, alpha: T) -> T {
    let branches = branches_at(d, alpha);
    merit_fixed_branch(d, &branches, alpha)
}

/// Same merit, but with the upper/lower/inactive branch assignment frozen
/// at whatever it was computed for, instead of recomputed from the live
/// sign of `su`/`sl`/`z_raw` at `alpha`: a true quadratic in its argument
/// everywhere, not just close to the point the branches were taken at.
/// Inside the node interval the branches were computed for, `z_raw` hasn't
/// crossed its own clamp boundary (that crossing is itself always a node),
/// so this agrees exactly with the live-clamped merit there; outside it the
/// two diverge, which is fine since callers only trust a candidate alpha
/// found this way when it falls back inside that interval.
fn merit_fixed_branch<T: Scalar>(d: &InitialGuessData<T>, branches: &[Branch], alpha: T) -> T {
    let n_in = d.cdx.len();
    let mut dual = d.dual_for_eq.clone();
    dual.axpy(alpha, &d.d_dual_for_eq, T::one());
    let mut acc = T::zero();
    for k in 0..n_in {
        let su = d.residual_in_z_u[k] + alpha * d.cdx[k];
        let sl = d.residual_in_z_l[k] + alpha * d.cdx[k];
        let z_raw = d.z_e[k] + alpha * d.dz[k];
        match branches[k] {
            Branch::Upper => {
                dual.axpy(z_raw, &d.c_rows[k], T::one());
                let term = su - z_raw * d.mu_in_inv;
                acc += term * term;
            }
            Branch::Lower => {
                dual.axpy(z_raw, &d.c_rows[k], T::one());
                let term = sl - z_raw * d.mu_in_inv;
                acc += term * term;
            }
            Branch::Inactive => {
                acc += z_raw * z_raw;
            }
        }
    }
    let eq = &d.primal_residual_eq + &d.d_primal_residual_eq * alpha;
    acc += eq.dot(&eq);
    acc += dual.dot(&dual);
    acc
}

fn branches_at<T: Scalar>(d: &InitialGuessData<T>, alpha: T) -> Vec<Branch> {
    (0..d.cdx.len())
        .map(|k| {
            let su = d.residual_in_z_u[k] + alpha * d.cdx[k];
            let sl = d.residual_in_z_l[k] + alpha * d.cdx[k];
            branch_at::<T>(su, sl)
        })
        .collect()
}

/// Minimize the exact quadratic through three samples of `f` taken at
/// `alpha0 - 1, alpha0, alpha0 + 1`; three points fully determine a
/// quadratic so this recovers `(a, b, c)` in `a t^2 + 2 b t + c` exactly,
/// without expanding the closed-form sums by hand.
fn fit_and_minimize<T: Scalar>(alpha0: T, f: impl Fn(T) -> T) -> (T, T) {
    let one = T::one();
    let f_minus = f(alpha0 - one);
    let f_mid = f(alpha0);
    let f_plus = f(alpha0 + one);
    let c = f_mid;
    let a = (f_plus + f_minus) * T::from_f64(0.5).unwrap() - c;
    let b = (f_plus - f_minus) * T::from_f64(0.25).unwrap();
    if a > T::from_f64(1e-14).unwrap() {
        let t = -b / a;
        let val = t * (a * t + b + b) + c;
        (alpha0 + t, val)
    } else {
        (alpha0, f_mid)
    }
}

/// Find the step length minimizing the KKT merit along `(dx, dy, dz)`.
pub fn initial_guess_line_search<T: Scalar>(data: &InitialGuessData<T>, r_max: T) -> T {
    let n_in = data.cdx.len();
    if n_in == 0 {
        return T::one();
    }
    let meps = T::machine_epsilon();
    let mut raw = Vec::with_capacity(3 * n_in);
    for k in 0..n_in {
        if data.dz[k].abs() > T::zero() {
            raw.push(-data.z_e[k] / (data.dz[k] + meps));
        }
        if data.cdx[k].abs() > T::zero() {
            raw.push(-data.residual_in_z_u[k] / (data.cdx[k] + meps));
            raw.push(-data.residual_in_z_l[k] / (data.cdx[k] + meps));
        }
    }
    let nodes = sorted_unique_nodes(raw, r_max);
    if nodes.is_empty() {
        return T::one();
    }

    let half = T::from_f64(0.5).unwrap();
    let mut best_alpha = nodes[0];
    let mut best_merit = merit_at(data, nodes[0]);
    for &n in &nodes {
        let m = merit_at(data, n);
        if m < best_merit {
            best_merit = m;
            best_alpha = n;
        }
    }

    let n_alpha = nodes.len();
    for i in 0..=n_alpha {
        let mid = if i == 0 {
            nodes[0] - half
        } else if i == n_alpha {
            nodes[n_alpha - 1] + half
        } else {
            (nodes[i - 1] + nodes[i]) * half
        };
        let branches = branches_at(data, mid);
        let (cand_alpha, _) = fit_and_minimize(mid, |a| merit_fixed_branch(data, &branches, a));

        let in_interval = if i == 0 {
            cand_alpha <= nodes[0]
        } else if i == n_alpha {
            cand_alpha >= nodes[n_alpha - 1]
        } else {
            cand_alpha >= nodes[i - 1] && cand_alpha <= nodes[i]
        };
        if !in_interval {
            continue;
        }
        let cand_merit = merit_at(data, cand_alpha);
        if cand_merit < best_merit {
            best_merit = cand_merit;
            best_alpha = cand_alpha;
        }
    }

    best_alpha
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unconstrained_returns_unit_step() {
        let data = InitialGuessData::<f64> {
            c_rows: vec![],
            cdx: DVector::zeros(0),
            residual_in_z_u: DVector::zeros(0),
            residual_in_z_l: DVector::zeros(0),
            z_e: DVector::zeros(0),
            dz: DVector::zeros(0),
            dual_for_eq: DVector::from_vec(vec![0.0, 0.0]),
            d_dual_for_eq: DVector::from_vec(vec![0.0, 0.0]),
            primal_residual_eq: DVector::zeros(0),
            d_primal_residual_eq: DVector::zeros(0),
            mu_in_inv: 1.0,
        };
        let alpha = initial_guess_line_search(&data, 1e6);
        assert_abs_diff_eq!(alpha, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn single_inactive_row_picks_full_newton_step() {
        // A single row that stays strictly inactive over [0, 1]: the merit
        // is then just the fixed dual + eq residual plus the (small) z^2
        // term, minimized at alpha = 1 since d_dual_for_eq/d_primal
        // point straight at zero from dual_for_eq/primal_residual_eq.
        let data = InitialGuessData::<f64> {
            c_rows: vec![DVector::from_vec(vec![1.0, 0.0])],
            cdx: DVector::from_vec(vec![0.0]),
            residual_in_z_u: DVector::from_vec(vec![-5.0]),
            residual_in_z_l: DVector::from_vec(vec![5.0]),
            z_e: DVector::from_vec(vec![0.1]),
            dz: DVector::from_vec(vec![-0.1]),
            dual_for_eq: DVector::from_vec(vec![1.0, 1.0]),
            d_dual_for_eq: DVector::from_vec(vec![-1.0, -1.0]),
            primal_residual_eq: DVector::zeros(0),
            d_primal_residual_eq: DVector::zeros(0),
            mu_in_inv: 1.0,
        };
        let alpha = initial_guess_line_search(&data, 1e6);
        assert_abs_diff_eq!(alpha, 1.0, epsilon = 1e-6);
    }
}
