//! Exact piecewise-quadratic/linear step-length search along a Newton
//! direction. Two engines: [`initial_guess`] minimizes the (squared) KKT
//! merit, which is piecewise quadratic in the step length because the
//! clamped dual variables are piecewise affine; [`correction`] finds the
//! unique root of the (piecewise affine) derivative of the proximal
//! augmented-Lagrangian merit.
//!
//! Both operate purely on already-materialized vectors, so they are shared
//! between the dense and sparse backends.

pub mod correction;
pub mod initial_guess;

pub use correction::correction_guess_line_search;
pub use initial_guess::initial_guess_line_search;

use crate::scalar::Scalar;

/// Sorted, deduplicated, finite candidate step lengths with `|alpha| < r_max`
/// dropped (guards against a near-zero denominator blowing a root out to
/// a huge, numerically meaningless step).
pub(crate) fn sorted_unique_nodes<T: Scalar>(raw: Vec<T>, r_max: T) -> Vec<T> {
    let mut nodes: Vec<T> = raw.into_iter().filter(|a| a.abs() < r_max).collect();
    nodes.sort_by(|a, b| a.partial_cmp(b).expect("alpha must not be NaN"));
    let dedup_eps = T::from_f64(1e-12).unwrap();
    nodes.dedup_by(|a, b| (*a - *b).abs() < dedup_eps);
    nodes
}
