//! Homogeneous transform of a single DH joint.

use nalgebra::Matrix4;

use crate::dh::{DhParameters, JointKind};
use crate::traits::Scalar;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Exact (sin, cos) for the structural angles 0, ±90 and ±180 degrees.
fn exact_sin_cos_deg(degrees: f64) -> Option<(f64, f64)> {
    if degrees == 0.0 {
        Some((0.0, 1.0))
    } else if degrees == 90.0 {
        Some((1.0, 0.0))
    } else if degrees == -90.0 {
        Some((-1.0, 0.0))
    } else if degrees == 180.0 || degrees == -180.0 {
        Some((0.0, -1.0))
    } else {
        None
    }
}

/// Replaces the real part of `x` with `exact`, keeping any derivative part.
fn snap<T: Scalar>(x: T, exact: f64) -> T {
    x - T::constant(x.value()) + T::constant(exact)
}

/// Sine and cosine of an angle given in degrees.
///
/// The structural angles 0, ±90 and ±180 produce exact 0/±1 values, so
/// perpendicular and parallel axes carry no rounding residue.
pub fn sin_cos_deg<T: Scalar>(degrees: T) -> (T, T) {
    let (s, c) = (degrees * T::constant(DEG_TO_RAD)).sin_cos();
    match exact_sin_cos_deg(degrees.value()) {
        Some((es, ec)) => (snap(s, es), snap(c, ec)),
        None => (s, c),
    }
}

/// Transform `M_{i-1,i}` of one joint, with `variable` substituted into the
/// slot selected by `kind`.
pub fn joint_transform<T: Scalar>(
    kind: JointKind,
    params: &DhParameters,
    variable: T,
) -> Matrix4<T> {
    let (theta, d) = match kind {
        JointKind::Revolute => (variable, T::constant(params.d)),
        JointKind::Prismatic => (T::constant(params.theta), variable),
    };
    let a = T::constant(params.a);
    let (sa, ca) = sin_cos_deg(T::constant(params.alpha));
    let (st, ct) = sin_cos_deg(theta);
    let zero = T::zero();
    let one = T::one();

    #[rustfmt::skip]
    let m = Matrix4::new(
        ct,   -ca * st,  sa * st, a * ct,
        st,    ca * ct, -sa * ct, a * st,
        zero,  sa,       ca,      d,
        zero,  zero,     zero,    one,
    );
    m
}
