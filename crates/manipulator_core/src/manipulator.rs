//! Serial manipulator: chain composition and the pose Jacobian.

use nalgebra::{DMatrix, Matrix4};
use std::fmt;

use crate::autodiff;
use crate::dh::{ChainDefinition, DhTable, JointDescriptor, JointKind, JointSpec};
use crate::error::{KinematicsError, Result};
use crate::solvers::Bound;
use crate::traits::{DifferentiableMap, Scalar};
use crate::transform::joint_transform;

/// Length of a flattened pose: position (3) then the row-major rotation block (9).
pub const FLAT_POSE_LEN: usize = 12;

/// Composes the transforms of `joints` in order, taking each joint's
/// variable from `variables`.
pub(crate) fn compose<T: Scalar>(joints: &[JointDescriptor], variables: &[T]) -> Matrix4<T> {
    joints
        .iter()
        .zip(variables)
        .fold(Matrix4::identity(), |acc, (joint, &value)| {
            acc * joint_transform(joint.kind, &joint.params, value)
        })
}

/// Flattens a pose into `[px, py, pz, r00, r01, r02, r10, ..., r22]`.
pub fn flatten_pose<T: Scalar>(pose: &Matrix4<T>) -> [T; FLAT_POSE_LEN] {
    std::array::from_fn(|k| {
        if k < 3 {
            pose[(k, 3)]
        } else {
            let idx = k - 3;
            pose[(idx / 3, idx % 3)]
        }
    })
}

/// A serial chain of DH joints with optional per-joint bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Manipulator {
    table: DhTable,
    bounds: Vec<Bound>,
}

impl Manipulator {
    /// Builds an unconstrained manipulator from a DH table.
    pub fn new<I, J>(joints: I) -> Result<Self>
    where
        I: IntoIterator<Item = J>,
        J: Into<JointSpec>,
    {
        let table = DhTable::new(joints)?;
        let bounds = vec![Bound::unbounded(); table.len()];
        Ok(Self { table, bounds })
    }

    /// Builds a manipulator whose joints are limited to `bounds`
    /// (one `(lower, upper)` pair per joint, infinities allowed).
    pub fn with_bounds<I, J>(joints: I, bounds: &[(f64, f64)]) -> Result<Self>
    where
        I: IntoIterator<Item = J>,
        J: Into<JointSpec>,
    {
        let bounds = bounds
            .iter()
            .map(|&(lower, upper)| Bound::new(lower, upper))
            .collect::<Result<Vec<_>>>()?;
        Self::from_parts(DhTable::new(joints)?, Some(bounds))
    }

    pub fn from_definition(definition: ChainDefinition) -> Result<Self> {
        let bounds = definition.bounds()?;
        Self::from_parts(DhTable::new(definition.joints)?, bounds)
    }

    fn from_parts(table: DhTable, bounds: Option<Vec<Bound>>) -> Result<Self> {
        let bounds = match bounds {
            Some(bounds) if bounds.len() != table.len() => {
                return Err(KinematicsError::construction(format!(
                    "expected {} joint bounds, got {}",
                    table.len(),
                    bounds.len()
                )));
            }
            Some(bounds) => bounds,
            None => vec![Bound::unbounded(); table.len()],
        };
        Ok(Self { table, bounds })
    }

    /// Number of joints.
    pub fn dof(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> &DhTable {
        &self.table
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    /// Joint list as `(kind, stored variable value)` pairs.
    pub fn joints(&self) -> Vec<(JointKind, f64)> {
        self.table.joints()
    }

    /// Stored parameter vector.
    pub fn parameters(&self) -> Vec<f64> {
        self.table.variables()
    }

    /// Writes `(1-based joint index, value)` pairs into the stored parameters.
    pub fn set_parameters(&mut self, updates: &[(usize, f64)]) -> Result<()> {
        self.table.set_variables(updates)
    }

    /// Stored-state version; changes on every successful `set_parameters`.
    pub fn version(&self) -> u64 {
        self.table.version()
    }

    /// Pose of frame `end` expressed in frame `start`, using the stored
    /// parameters. Frame 0 is the base, frame N the end effector.
    pub fn forward_kinematics(&self, start: usize, end: usize) -> Result<Matrix4<f64>> {
        let n = self.dof();
        for index in [start, end] {
            if index > n {
                return Err(KinematicsError::Index {
                    index,
                    min: 0,
                    max: n,
                });
            }
        }
        if start > end {
            return Err(KinematicsError::Range { start, end });
        }
        let joints = &self.table.descriptors()[start..end];
        let variables: Vec<f64> = joints.iter().map(JointDescriptor::variable).collect();
        Ok(compose(joints, &variables))
    }

    /// Base-to-end-effector pose with the stored parameters.
    pub fn end_effector_pose(&self) -> Matrix4<f64> {
        compose(self.table.descriptors(), &self.parameters())
    }

    /// Base-to-end-effector pose for a caller-supplied parameter vector.
    /// The stored parameters are not touched.
    pub fn forward_kinematics_with(&self, params: &[f64]) -> Result<Matrix4<f64>> {
        self.check_parameters(params)?;
        Ok(compose(self.table.descriptors(), params))
    }

    /// Jacobian (12 x N) of the flattened end-effector pose with respect to
    /// the parameter vector, evaluated at `params`.
    pub fn jacobian(&self, params: &[f64]) -> Result<DMatrix<f64>> {
        self.check_parameters(params)?;
        autodiff::jacobian(&self.pose_map(), params)
    }

    /// The flattened forward kinematics as a differentiable map.
    pub fn pose_map(&self) -> PoseMap<'_> {
        PoseMap {
            joints: self.table.descriptors(),
        }
    }

    /// Length and finiteness check for a caller-supplied parameter vector.
    pub(crate) fn check_parameters(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.dof() {
            return Err(KinematicsError::dimension(
                "parameter vector",
                self.dof(),
                params.len(),
            ));
        }
        if let Some((idx, &value)) = params.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(KinematicsError::NonFinite {
                joint: idx + 1,
                value,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Manipulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.table, f)
    }
}

/// Parameter vector (N) to flattened end-effector pose (12).
#[derive(Debug, Clone, Copy)]
pub struct PoseMap<'a> {
    joints: &'a [JointDescriptor],
}

impl DifferentiableMap for PoseMap<'_> {
    fn input_dimension(&self) -> usize {
        self.joints.len()
    }

    fn output_dimension(&self) -> usize {
        FLAT_POSE_LEN
    }

    fn apply<T: Scalar>(&self, x: &[T], out: &mut [T]) {
        let pose = compose(self.joints, x);
        out.copy_from_slice(&flatten_pose(&pose));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn planar() -> Manipulator {
        Manipulator::new([
            JointDescriptor::revolute(0.0, 1.0, 0.0, 0.0),
            JointDescriptor::revolute(0.0, 1.0, 0.0, 0.0),
        ])
        .expect("planar chain")
    }

    fn spatial() -> Manipulator {
        Manipulator::new([
            JointDescriptor::revolute(-90.0, 0.175, 0.495, 60.0),
            JointDescriptor::revolute(0.0, 1.095, 0.0, -55.0),
            JointDescriptor::prismatic(-90.0, 0.175, 0.3, 45.0),
            JointDescriptor::revolute(90.0, 0.0, 1.27, 45.0),
        ])
        .expect("spatial chain")
    }

    fn translation(m: &Matrix4<f64>) -> Vector3<f64> {
        m.fixed_view::<3, 1>(0, 3).into_owned()
    }

    #[test]
    fn planar_chain_reaches_along_x() {
        let arm = planar();
        let pose = arm.end_effector_pose();
        assert_eq!(translation(&pose), Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(arm.forward_kinematics(0, 2).expect("fk"), pose);
    }

    #[test]
    fn planar_chain_after_rotating_first_joint() {
        let mut arm = planar();
        arm.set_parameters(&[(1, 90.0)]).expect("set");
        let first = arm.forward_kinematics(0, 1).expect("fk");
        assert_eq!(translation(&first), Vector3::new(0.0, 1.0, 0.0));
        let full = arm.end_effector_pose();
        assert_eq!(translation(&full), Vector3::new(0.0, 2.0, 0.0));
        // end frame x axis now points along base y
        assert_eq!(full[(0, 0)], 0.0);
        assert_eq!(full[(1, 0)], 1.0);
    }

    #[test]
    fn empty_range_is_identity() {
        let arm = spatial();
        for i in 0..=arm.dof() {
            assert_eq!(arm.forward_kinematics(i, i).expect("fk"), Matrix4::identity());
        }
    }

    #[test]
    fn composition_follows_chain_rule() {
        let arm = spatial();
        let n = arm.dof();
        for i in 0..=n {
            for j in i..=n {
                for k in j..=n {
                    let direct = arm.forward_kinematics(i, k).expect("fk");
                    let split = arm.forward_kinematics(i, j).expect("fk")
                        * arm.forward_kinematics(j, k).expect("fk");
                    assert_relative_eq!(direct, split, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn frame_range_faults() {
        let arm = spatial();
        assert_eq!(
            arm.forward_kinematics(3, 1).expect_err("range"),
            KinematicsError::Range { start: 3, end: 1 }
        );
        assert!(matches!(
            arm.forward_kinematics(0, 5).expect_err("index"),
            KinematicsError::Index { index: 5, min: 0, max: 4 }
        ));
    }

    #[test]
    fn supplied_parameters_do_not_touch_stored_state() {
        let arm = spatial();
        let stored = arm.parameters();
        let pose = arm
            .forward_kinematics_with(&[0.0, 10.0, 0.1, -20.0])
            .expect("fk");
        assert_ne!(pose, arm.end_effector_pose());
        assert_eq!(arm.parameters(), stored);
        assert_eq!(arm.forward_kinematics_with(&stored).expect("fk"), arm.end_effector_pose());
        assert!(arm.forward_kinematics_with(&[1.0]).is_err());
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let mut arm = spatial();
        let err = arm
            .forward_kinematics_with(&[0.0, f64::NAN, 0.1, 0.0])
            .expect_err("expected non-finite fault");
        assert!(matches!(err, KinematicsError::NonFinite { joint: 2, .. }));

        assert!(arm.jacobian(&[f64::INFINITY, 0.0, 0.0, 0.0]).is_err());
        assert!(arm.set_parameters(&[(1, f64::NAN)]).is_err());
        assert!(arm.end_effector_pose().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn flatten_pose_is_position_then_row_major_rotation() {
        #[rustfmt::skip]
        let m = Matrix4::new(
            1.0, 2.0, 3.0, 10.0,
            4.0, 5.0, 6.0, 11.0,
            7.0, 8.0, 9.0, 12.0,
            0.0, 0.0, 0.0, 1.0,
        );
        assert_eq!(
            flatten_pose(&m),
            [10.0, 11.0, 12.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );
    }

    #[test]
    fn planar_jacobian_matches_closed_form() {
        let arm = planar();
        let q = [30.0, 45.0];
        let jac = arm.jacobian(&q).expect("jacobian");
        assert_eq!(jac.shape(), (12, 2));

        let k = std::f64::consts::PI / 180.0;
        let (t1, t12) = (30.0f64.to_radians(), 75.0f64.to_radians());
        assert_relative_eq!(jac[(0, 0)], -(t1.sin() + t12.sin()) * k, epsilon = 1e-12);
        assert_relative_eq!(jac[(0, 1)], -t12.sin() * k, epsilon = 1e-12);
        assert_relative_eq!(jac[(1, 0)], (t1.cos() + t12.cos()) * k, epsilon = 1e-12);
        assert_relative_eq!(jac[(1, 1)], t12.cos() * k, epsilon = 1e-12);
        // planar motion never changes z or the third rotation row
        for col in 0..2 {
            assert_eq!(jac[(2, col)], 0.0);
            assert_eq!(jac[(11, col)], 0.0);
        }
    }

    #[test]
    fn display_delegates_to_table() {
        assert_eq!(planar().to_string(), "[(revolute, 0), (revolute, 0)]");
    }

    #[test]
    fn bounds_length_must_match_chain() {
        let err = Manipulator::with_bounds(
            [JointDescriptor::revolute(0.0, 1.0, 0.0, 0.0)],
            &[(-90.0, 90.0), (-90.0, 90.0)],
        )
        .expect_err("expected construction fault");
        assert!(matches!(err, KinematicsError::Construction(_)));
    }
}
