//! The immutable problem data `Model`, and the Ruiz-scaled copy
//! `ScaledModel` the solver actually iterates on.

use crate::errors::{Error, Result};
use crate::matrix::{Backend, QpMatrix};
use crate::scalar::Scalar;
use nalgebra::DVector;

/// Problem dimensions, fixed for the lifetime of a `Solver`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dims {
    pub n: usize,
    pub n_eq: usize,
    pub n_in: usize,
}

impl Dims {
    pub fn new(n: usize, n_eq: usize, n_in: usize) -> Self {
        Self { n, n_eq, n_in }
    }

    pub fn kkt_order(&self, n_c: usize) -> usize {
        self.n + self.n_eq + n_c
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::DimensionMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// The immutable model `M`: H, g, A, b, C, l, u, in the caller's original
/// (unscaled) units. `H` is symmetric PSD; missing matrices/vectors passed
/// to `setup`/`update` are treated as zero of the declared shape.
#[derive(Clone, Debug)]
pub struct Model<T: Scalar, B: Backend<T>> {
    pub dims: Dims,
    pub h: B::Mat,
    pub g: DVector<T>,
    pub a: B::Mat,
    pub b: DVector<T>,
    pub c: B::Mat,
    pub l: DVector<T>,
    pub u: DVector<T>,
}

impl<T: Scalar, B: Backend<T>> Model<T, B> {
    pub fn zeros(dims: Dims) -> Self {
        Self {
            dims,
            h: B::Mat::zeros(dims.n, dims.n),
            g: DVector::zeros(dims.n),
            a: B::Mat::zeros(dims.n_eq, dims.n),
            b: DVector::zeros(dims.n_eq),
            c: B::Mat::zeros(dims.n_in, dims.n),
            l: DVector::zeros(dims.n_in),
            u: DVector::zeros(dims.n_in),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let d = self.dims;
        check_len("H.nrows", d.n, self.h.nrows())?;
        check_len("H.ncols", d.n, self.h.ncols())?;
        check_len("g.len", d.n, self.g.len())?;
        check_len("A.nrows", d.n_eq, self.a.nrows())?;
        check_len("A.ncols", d.n, self.a.ncols())?;
        check_len("b.len", d.n_eq, self.b.len())?;
        check_len("C.nrows", d.n_in, self.c.nrows())?;
        check_len("C.ncols", d.n, self.c.ncols())?;
        check_len("l.len", d.n_in, self.l.len())?;
        check_len("u.len", d.n_in, self.u.len())?;
        for i in 0..d.n_in {
            if self.l[i] > self.u[i] {
                return Err(Error::DimensionMismatch {
                    what: "l <= u",
                    expected: 0,
                    got: 1,
                });
            }
        }
        Ok(())
    }
}

/// The Ruiz-scaled copy `M̂`: same shapes as `Model`, values rescaled by the
/// preconditioner's (D, E, c).
#[derive(Clone, Debug)]
pub struct ScaledModel<T: Scalar, B: Backend<T>> {
    pub dims: Dims,
    pub h: B::Mat,
    pub g: DVector<T>,
    pub a: B::Mat,
    pub b: DVector<T>,
    pub c: B::Mat,
    pub l: DVector<T>,
    pub u: DVector<T>,
}

impl<T: Scalar, B: Backend<T>> ScaledModel<T, B> {
    pub fn from_model(model: &Model<T, B>) -> Self {
        Self {
            dims: model.dims,
            h: model.h.clone(),
            g: model.g.clone(),
            a: model.a.clone(),
            b: model.b.clone(),
            c: model.c.clone(),
            l: model.l.clone(),
            u: model.u.clone(),
        }
    }
}
