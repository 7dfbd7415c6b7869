use nalgebra::RealField;
use num_traits::{Float, FromPrimitive};

/// The field the solver operates over. `f64` is the only instantiation the
/// crate ships, but every numeric routine is written against this trait so a
/// single-precision backend can be added without touching solver logic.
pub trait Scalar: RealField + Float + FromPrimitive + Copy + Send + Sync + 'static {
    fn machine_epsilon() -> Self {
        Self::epsilon()
    }
}

impl Scalar for f64 {}
