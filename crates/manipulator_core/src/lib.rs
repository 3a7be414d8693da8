pub mod autodiff;
pub mod dh;
pub mod error;
pub mod ik;
pub mod manipulator;
pub mod solvers;
pub mod transform;
/// The `manipulator_core` crate is the kinematics engine for serial
/// manipulators described by Denavit–Hartenberg tables.
/// All evaluation is generic over `Scalar`, so the same chain code runs on
/// plain `f64` and on Dual numbers for forward-mode differentiation.
///
/// Key components:
/// - **DH tables**: `DhTable`, `JointDescriptor` and the `(kind, params)` normalization.
/// - **Transforms**: per-joint homogeneous matrices with exact structural angles.
/// - **Manipulator**: forward kinematics between any two frames and the pose Jacobian.
/// - **Solvers**: projected Levenberg–Marquardt for box-constrained least squares.
/// - **IK**: position/orientation objectives driven by that solver.
pub mod traits;

pub use dh::{ChainDefinition, DhParameters, DhTable, JointDescriptor, JointKind, JointSpec};
pub use error::{KinematicsError, Result};
pub use ik::{IkOptions, IkSolution, ObjectiveForm, OrientationMode};
pub use manipulator::Manipulator;
pub use solvers::{Bound, LeastSquaresSettings, TerminationReason};
