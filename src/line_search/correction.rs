//! Correction-guess line search: the step length minimizing the proximal
//! augmented-Lagrangian merit along `dx` alone (no dual direction). Its
//! derivative is piecewise affine and monotonically increasing in alpha —
//! negative at `alpha = 0`, unbounded as `alpha -> infinity` — so it has a
//! unique positive root, found by bracketing between the last candidate
//! with a negative derivative and the first with a positive one and solving
//! the (exactly affine) interpolation in closed form.

use super::sorted_unique_nodes;
use crate::scalar::Scalar;
use nalgebra::DVector;

/// Precomputed data the merit derivative needs; built once per call by the
/// inner solver's correction-guess branch.
pub struct CorrectionGuessData<T: Scalar> {
    pub x: DVector<T>,
    pub xe: DVector<T>,
    pub dx: DVector<T>,
    pub g: DVector<T>,
    pub hdx: DVector<T>,
    pub adx: DVector<T>,
    pub cdx: DVector<T>,
    /// `A x - b + y_e / mu_eq`
    pub residual_in_y: DVector<T>,
    /// `C x - u + z_e / mu_in`
    pub residual_in_z_u: DVector<T>,
    /// `C x - l + z_e / mu_in`
    pub residual_in_z_l: DVector<T>,
    pub mu_eq: T,
    pub mu_in: T,
    pub rho: T,
}

/// `d/dalpha` of the proximal augmented Lagrangian evaluated along `dx` at
/// `x_e + alpha dx`, an affine function of `alpha`.
fn merit_grad_at<T: Scalar>(d: &CorrectionGuessData<T>, alpha: T) -> T {
    let n_in = d.cdx.len();
    let mut a = d.dx.dot(&d.hdx) + d.mu_eq * d.adx.dot(&d.adx) + d.rho * d.dx.dot(&d.dx);
    let mut b = d.x.dot(&d.hdx) + d.mu_eq * d.adx.dot(&d.residual_in_y);
    let base = &d.rho * (&d.x - &d.xe) + &d.g;
    b += base.dot(&d.dx);

    for k in 0..n_in {
        let su = d.residual_in_z_u[k] + d.cdx[k] * alpha;
        let sl = d.residual_in_z_l[k] + d.cdx[k] * alpha;
        if su > T::zero() {
            a += d.mu_in * d.cdx[k] * d.cdx[k];
            b += d.mu_in * d.cdx[k] * d.residual_in_z_u[k];
        }
        if sl < T::zero() {
            a += d.mu_in * d.cdx[k] * d.cdx[k];
            b += d.mu_in * d.cdx[k] * d.residual_in_z_l[k];
        }
    }
    a * alpha + b
}

/// Find the unique positive root of `merit_grad_at`.
pub fn correction_guess_line_search<T: Scalar>(data: &CorrectionGuessData<T>) -> T {
    let n_in = data.cdx.len();
    let meps = T::machine_epsilon();
    let mut raw = Vec::with_capacity(2 * n_in);
    for k in 0..n_in {
        if data.cdx[k].abs() > T::zero() {
            raw.push(-data.residual_in_z_u[k] / (data.cdx[k] + meps));
            raw.push(-data.residual_in_z_l[k] / (data.cdx[k] + meps));
        }
    }
    let r_max = T::from_f64(1e12).unwrap();
    let nodes = sorted_unique_nodes(raw, r_max);
    if nodes.is_empty() {
        return T::one();
    }

    let mut alpha_last_neg = T::zero();
    let mut last_neg_grad: Option<T> = None;
    let mut alpha_first_pos = T::zero();
    let mut first_pos_grad: Option<T> = None;

    for &alpha in nodes.iter().filter(|a| **a > meps) {
        let gr = merit_grad_at(data, alpha);
        if gr < T::zero() {
            alpha_last_neg = alpha;
            last_neg_grad = Some(gr);
        } else {
            alpha_first_pos = alpha;
            first_pos_grad = Some(gr);
            break;
        }
    }

    let first_pos_grad = match first_pos_grad {
        Some(g) => g,
        None => return T::one(),
    };
    let last_neg_grad = match last_neg_grad {
        Some(g) => g,
        None => {
            alpha_last_neg = T::zero();
            merit_grad_at(data, T::zero())
        }
    };

    let denom = first_pos_grad - last_neg_grad;
    if denom.abs() < T::from_f64(1e-14).unwrap() {
        return alpha_last_neg;
    }
    alpha_last_neg - last_neg_grad * (alpha_first_pos - alpha_last_neg) / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn brackets_root_between_nodes() {
        // The single inequality row's node sits at alpha = 5, well past the
        // true root; over [0, 5] neither of its branches activates, so the
        // gradient is exactly the unconstrained affine a*alpha+b with
        // a = dx.Hdx = 4, b = x.Hdx + g.dx = -6, root at alpha = 1.5.
        let data = CorrectionGuessData::<f64> {
            x: DVector::from_vec(vec![1.0, 1.0]),
            xe: DVector::from_vec(vec![1.0, 1.0]),
            dx: DVector::from_vec(vec![-1.0, -1.0]),
            g: DVector::from_vec(vec![1.0, 1.0]),
            hdx: DVector::from_vec(vec![-2.0, -2.0]),
            adx: DVector::zeros(0),
            cdx: DVector::from_vec(vec![2.0]),
            residual_in_y: DVector::zeros(0),
            residual_in_z_u: DVector::from_vec(vec![-10.0]),
            residual_in_z_l: DVector::from_vec(vec![10.0]),
            mu_eq: 1.0,
            mu_in: 1.0,
            rho: 0.0,
        };
        let alpha = correction_guess_line_search(&data);
        assert_abs_diff_eq!(alpha, 1.5, epsilon = 1e-9);
    }
}
