use num_traits::{Float, FromPrimitive, NumAssignOps};
use std::fmt::Debug;

/// A trait for types the kinematic chain can be evaluated over.
/// Implemented by `f64` and by the dual numbers in [`crate::autodiff`].
pub trait Scalar: Float + FromPrimitive + NumAssignOps + Debug + 'static {
    /// Lifts a plain constant into the scalar type (zero derivative part).
    fn constant(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }

    /// The real part of the scalar.
    fn value(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T: Float + FromPrimitive + NumAssignOps + Debug + 'static> Scalar for T {}

/// A vector-valued function that can be evaluated over any [`Scalar`],
/// which is all forward-mode differentiation needs.
///
/// Implementations must be side-effect free: the Jacobian driver calls
/// `apply` once per input dimension with differently seeded inputs.
pub trait DifferentiableMap {
    /// Length of the input vector.
    fn input_dimension(&self) -> usize;

    /// Length of the output vector.
    fn output_dimension(&self) -> usize;

    /// Evaluates the map at `x` and writes the result into `out`.
    fn apply<T: Scalar>(&self, x: &[T], out: &mut [T]);
}
