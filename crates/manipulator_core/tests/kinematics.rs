use approx::assert_relative_eq;
use manipulator_core::manipulator::flatten_pose;
use manipulator_core::{
    IkOptions, JointDescriptor, JointKind, JointSpec, KinematicsError, Manipulator,
    ObjectiveForm, OrientationMode, TerminationReason,
};
use nalgebra::{DMatrix, Matrix4};

/// ABB IRB4600-40 in DH form.
fn irb4600() -> Manipulator {
    Manipulator::with_bounds(
        [
            JointDescriptor::revolute(-90.0, 0.175, 0.495, 60.0),
            JointDescriptor::revolute(0.0, 1.095, 0.0, -55.0),
            JointDescriptor::revolute(-90.0, 0.175, 0.0, 45.0),
            JointDescriptor::revolute(90.0, 0.0, 1.27, 45.0),
            JointDescriptor::revolute(90.0, 0.0, 0.0, 30.0),
            JointDescriptor::revolute(0.0, 0.0, 0.135, 45.0),
        ],
        &[
            (-180.0, 180.0),
            (-90.0, 150.0),
            (-180.0, 75.0),
            (-400.0, 400.0),
            (-125.0, 120.0),
            (-400.0, 400.0),
        ],
    )
    .expect("irb4600")
}

fn mixed_chain() -> Manipulator {
    Manipulator::new(vec![
        JointSpec::Record {
            kind: JointKind::Revolute,
            params: vec![90.0, 0.4, 0.3, 15.0],
        },
        JointSpec::Pair(JointKind::Prismatic, vec![-90.0, 0.2, 0.5, 0.0]),
        JointSpec::Pair(JointKind::Revolute, vec![30.0, 0.7, 0.0, -40.0]),
    ])
    .expect("mixed chain")
}

fn position(pose: &Matrix4<f64>) -> [f64; 3] {
    [pose[(0, 3)], pose[(1, 3)], pose[(2, 3)]]
}

fn central_difference(arm: &Manipulator, params: &[f64], h: f64) -> DMatrix<f64> {
    let n = params.len();
    let mut jac = DMatrix::zeros(12, n);
    for j in 0..n {
        let mut plus = params.to_vec();
        let mut minus = params.to_vec();
        plus[j] += h;
        minus[j] -= h;
        let f_plus = flatten_pose(&arm.forward_kinematics_with(&plus).expect("fk"));
        let f_minus = flatten_pose(&arm.forward_kinematics_with(&minus).expect("fk"));
        for i in 0..12 {
            jac[(i, j)] = (f_plus[i] - f_minus[i]) / (2.0 * h);
        }
    }
    jac
}

#[test]
fn jacobian_agrees_with_central_differences() {
    for arm in [irb4600(), mixed_chain()] {
        let params = arm.parameters();
        let jac = arm.jacobian(&params).expect("jacobian");
        assert_eq!(jac.shape(), (12, arm.dof()));
        let numeric = central_difference(&arm, &params, 1e-3);
        assert_relative_eq!(jac, numeric, epsilon = 1e-4);
    }
}

#[test]
fn jacobian_does_not_touch_stored_parameters() {
    let arm = irb4600();
    let before = arm.parameters();
    arm.jacobian(&[0.0, 0.0, 0.0, 0.0, 10.0, 0.0]).expect("jacobian");
    assert_eq!(arm.parameters(), before);
}

#[test]
fn relative_frames_compose_on_full_arm() {
    let arm = irb4600();
    let n = arm.dof();
    for j in 0..=n {
        let split =
            arm.forward_kinematics(0, j).expect("fk") * arm.forward_kinematics(j, n).expect("fk");
        assert_relative_eq!(split, arm.end_effector_pose(), epsilon = 1e-12);
    }
}

#[test]
fn structural_twists_stay_exact_in_single_frames() {
    let arm = irb4600();
    // alpha = -90 on joint 1: third row [0, -1, 0]
    let first = arm.forward_kinematics(0, 1).expect("fk");
    assert_eq!([first[(2, 0)], first[(2, 1)], first[(2, 2)]], [0.0, -1.0, 0.0]);
    // alpha = 90 on joint 4: third row [0, 1, 0]
    let fourth = arm.forward_kinematics(3, 4).expect("fk");
    assert_eq!([fourth[(2, 0)], fourth[(2, 1)], fourth[(2, 2)]], [0.0, 1.0, 0.0]);
}

#[test]
fn full_orientation_round_trip_within_bounds() {
    let arm = irb4600();
    let goal = [20.0, -60.0, 10.0, 30.0, 60.0, 40.0];
    let target = flatten_pose(&arm.forward_kinematics_with(&goal).expect("fk"));
    let start: Vec<f64> = goal
        .iter()
        .zip([5.0, -5.0, 5.0, -5.0, 5.0, -5.0])
        .map(|(g, d)| g + d)
        .collect();

    let options = IkOptions::default()
        .with_orientation(OrientationMode::All)
        .with_start(start);
    let solution = arm
        .inverse_kinematics(&target, &options)
        .expect("ik")
        .ensure_converged()
        .expect("converged");

    assert!(solution.error < 1e-6, "error {}", solution.error);
    let reached = flatten_pose(&arm.forward_kinematics_with(&solution.parameters).expect("fk"));
    for (r, t) in reached.iter().zip(&target) {
        assert!((r - t).abs() < 1e-6);
    }
    for (value, bound) in solution.parameters.iter().zip(arm.bounds()) {
        assert!(bound.contains(*value));
    }
}

#[test]
fn position_round_trip_on_unconstrained_spatial_chain() {
    let arm = mixed_chain();
    let goal = [40.0, 0.8, -10.0];
    let target = position(&arm.forward_kinematics_with(&goal).expect("fk"));
    let options = IkOptions::default().with_start(vec![30.0, 0.6, 0.0]);
    let solution = arm.inverse_kinematics(&target, &options).expect("ik");
    assert!(solution.converged, "reason: {:?}", solution.reason);
    let reached = position(&arm.forward_kinematics_with(&solution.parameters).expect("fk"));
    for (r, t) in reached.iter().zip(&target) {
        assert!((r - t).abs() < 1e-6, "reached {reached:?}, target {target:?}");
    }
}

#[test]
fn approach_axis_mode_never_leaves_bounds() {
    let arm = irb4600();
    let targets: [[f64; 6]; 4] = [
        [1.2, 0.4, 1.1, 1.0, 0.0, 0.0],
        [0.5, -0.9, 0.3, 0.0, 0.0, -1.0],
        [5.0, 5.0, 5.0, 0.0, 1.0, 0.0],
        [-0.1, 0.0, -3.0, 0.6, 0.8, 0.0],
    ];
    for target in &targets {
        let options = IkOptions::default()
            .with_orientation(OrientationMode::X)
            .with_regularization(0.1);
        let solution = arm.inverse_kinematics(target, &options).expect("ik");
        for (value, bound) in solution.parameters.iter().zip(arm.bounds()) {
            assert!(bound.contains(*value), "{value} outside {bound:?}");
        }
    }
}

#[test]
fn position_targets_never_leave_bounds() {
    let arm = irb4600();
    let targets = [
        [1.5, 0.0, 1.0],
        [0.0, 2.0, 0.5],
        [-3.0, -3.0, -3.0],
        [10.0, 0.0, 0.0],
        [0.0, 0.0, 3.2],
    ];
    for target in &targets {
        let solution = arm
            .inverse_kinematics(target, &IkOptions::default())
            .expect("ik");
        for (value, bound) in solution.parameters.iter().zip(arm.bounds()) {
            assert!(bound.contains(*value), "{value} outside {bound:?}");
        }
    }
}

#[test]
fn ik_solution_applies_through_setter() {
    let mut arm = mixed_chain();
    let target = position(&arm.forward_kinematics_with(&[10.0, 0.9, 20.0]).expect("fk"));
    let options = IkOptions::default().with_start(vec![15.0, 0.8, 10.0]);
    let solution = arm.inverse_kinematics(&target, &options).expect("ik");
    let updates: Vec<(usize, f64)> = solution
        .parameters
        .iter()
        .enumerate()
        .map(|(idx, &value)| (idx + 1, value))
        .collect();
    arm.set_parameters(&updates).expect("set");
    assert_eq!(arm.parameters(), solution.parameters);
    let reached = position(&arm.end_effector_pose());
    for (r, t) in reached.iter().zip(&target) {
        assert!((r - t).abs() < 1e-6);
    }
}

#[test]
fn scalar_norm_form_reports_spent_budget_on_six_joints() {
    let arm = irb4600();
    let goal = [20.0, -60.0, 10.0, 30.0, 60.0, 40.0];
    let target = position(&arm.forward_kinematics_with(&goal).expect("fk"));
    let start: Vec<f64> = goal
        .iter()
        .zip([5.0, -5.0, 5.0, -5.0, 5.0, -5.0])
        .map(|(g, d)| g + d)
        .collect();

    let residual = arm
        .inverse_kinematics(&target, &IkOptions::default().with_start(start.clone()))
        .expect("ik");
    assert!(residual.converged, "reason: {:?}", residual.reason);

    let options = IkOptions::default()
        .with_start(start)
        .with_form(ObjectiveForm::ScalarNorm);
    let solution = arm.inverse_kinematics(&target, &options).expect("ik");
    assert!(!solution.converged);
    assert_eq!(solution.reason, TerminationReason::MaxIterations);
    assert_eq!(solution.iterations, options.settings.max_iterations);
    for (value, bound) in solution.parameters.iter().zip(arm.bounds()) {
        assert!(bound.contains(*value));
    }

    let error = solution.error;
    match solution.ensure_converged() {
        Err(KinematicsError::Convergence { error: reported, .. }) => assert_eq!(reported, error),
        other => panic!("expected convergence fault, got {other:?}"),
    }
}

#[test]
fn nan_parameter_never_reaches_stored_state() {
    let mut arm = irb4600();
    let err = arm
        .set_parameters(&[(1, f64::NAN)])
        .expect_err("expected non-finite fault");
    assert!(matches!(err, KinematicsError::NonFinite { joint: 1, .. }));
    assert!(arm.end_effector_pose().iter().all(|v| v.is_finite()));
    // the default start is still the untouched stored state
    assert!(arm.inverse_kinematics(&[1.0, 0.0, 1.0], &IkOptions::default()).is_ok());
}
