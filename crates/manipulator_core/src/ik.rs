//! Inverse kinematics on top of the bounded least-squares solver.
//!
//! The objective compares a target descriptor against the flattened
//! forward kinematics (see [`crate::manipulator::flatten_pose`]):
//!
//! | mode | target | compared components |
//! | --- | --- | --- |
//! | `None` | position (3) | 3 |
//! | `X`/`Y`/`Z` | position (3) + one axis (3) | 12, axis placed in an identity block |
//! | `All` | position (3) + rotation, row-major (9) | 12 |

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dh::JointDescriptor;
use crate::error::{KinematicsError, Result};
use crate::manipulator::{compose, flatten_pose, Manipulator, FLAT_POSE_LEN};
use crate::solvers::{solve_bounded_least_squares, LeastSquaresSettings, TerminationReason};
use crate::traits::{DifferentiableMap, Scalar};

pub const DEFAULT_REGULARIZATION: f64 = 0.5;

/// Which part of the end-effector orientation the target constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrientationMode {
    X,
    Y,
    Z,
    #[serde(alias = "all", alias = "ALL")]
    All,
}

impl OrientationMode {
    /// Column of the rotation block an axis target replaces.
    fn axis_column(self) -> Option<usize> {
        match self {
            OrientationMode::X => Some(0),
            OrientationMode::Y => Some(1),
            OrientationMode::Z => Some(2),
            OrientationMode::All => None,
        }
    }
}

/// Shape of the objective handed to the least-squares solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveForm {
    /// One residual per compared component, each scaled by the regularization.
    #[default]
    Residual,
    /// A single residual `regularization * ‖target − pose‖`, kept for callers
    /// tuned against that objective. Its Jacobian has rank one, so progress
    /// is linear at best: on six-joint arms the default 200-iteration budget
    /// typically runs out (`MaxIterations`, `converged == false`) with an
    /// error around 1e-2 or worse.
    ScalarNorm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IkOptions {
    #[serde(default)]
    pub orientation: Option<OrientationMode>,
    /// Starting parameter vector; the stored parameters when absent.
    #[serde(default)]
    pub start: Option<Vec<f64>>,
    #[serde(default = "default_regularization")]
    pub regularization: f64,
    #[serde(default)]
    pub form: ObjectiveForm,
    #[serde(default)]
    pub settings: LeastSquaresSettings,
}

fn default_regularization() -> f64 {
    DEFAULT_REGULARIZATION
}

impl Default for IkOptions {
    fn default() -> Self {
        Self {
            orientation: None,
            start: None,
            regularization: DEFAULT_REGULARIZATION,
            form: ObjectiveForm::default(),
            settings: LeastSquaresSettings::default(),
        }
    }
}

impl IkOptions {
    pub fn with_orientation(mut self, orientation: OrientationMode) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_start(mut self, start: Vec<f64>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn with_form(mut self, form: ObjectiveForm) -> Self {
        self.form = form;
        self
    }

    pub fn with_settings(mut self, settings: LeastSquaresSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Result of an inverse-kinematics solve.
///
/// `parameters` is the best vector found and lies inside the bounds even
/// when `converged` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IkSolution {
    pub parameters: Vec<f64>,
    pub converged: bool,
    pub reason: TerminationReason,
    /// Unscaled `‖target − pose‖` over the compared components.
    pub error: f64,
    pub iterations: usize,
}

impl IkSolution {
    /// Turns a non-converged solution into a convergence fault.
    pub fn ensure_converged(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(KinematicsError::Convergence {
                iterations: self.iterations,
                error: self.error,
            })
        }
    }
}

/// Expands a target descriptor into the full 12-component flattened target
/// and the number of leading components the objective compares.
pub fn expand_target(
    target: &[f64],
    orientation: Option<OrientationMode>,
) -> Result<([f64; FLAT_POSE_LEN], usize)> {
    let expected = match orientation {
        None => 3,
        Some(OrientationMode::All) => 12,
        Some(_) => 6,
    };
    if target.len() != expected {
        return Err(KinematicsError::dimension("target", expected, target.len()));
    }

    // position followed by an identity rotation block
    let mut full = [0.0; FLAT_POSE_LEN];
    full[3] = 1.0;
    full[7] = 1.0;
    full[11] = 1.0;
    full[..3].copy_from_slice(&target[..3]);

    let Some(mode) = orientation else {
        return Ok((full, 3));
    };
    match mode.axis_column() {
        Some(col) => {
            for row in 0..3 {
                full[3 + row * 3 + col] = target[3 + row];
            }
        }
        None => full[3..].copy_from_slice(&target[3..]),
    }
    Ok((full, FLAT_POSE_LEN))
}

/// IK objective over the parameter vector.
struct IkObjective<'a> {
    joints: &'a [JointDescriptor],
    target: [f64; FLAT_POSE_LEN],
    components: usize,
    regularization: f64,
    form: ObjectiveForm,
}

impl DifferentiableMap for IkObjective<'_> {
    fn input_dimension(&self) -> usize {
        self.joints.len()
    }

    fn output_dimension(&self) -> usize {
        match self.form {
            ObjectiveForm::Residual => self.components,
            ObjectiveForm::ScalarNorm => 1,
        }
    }

    fn apply<T: Scalar>(&self, x: &[T], out: &mut [T]) {
        let pose = flatten_pose(&compose(self.joints, x));
        let weight = T::constant(self.regularization);
        let errors = self.target[..self.components]
            .iter()
            .zip(&pose)
            .map(|(&target, &actual)| T::constant(target) - actual);
        match self.form {
            ObjectiveForm::Residual => {
                for (slot, error) in out.iter_mut().zip(errors) {
                    *slot = weight * error;
                }
            }
            ObjectiveForm::ScalarNorm => {
                let sum = errors.fold(T::zero(), |acc, e| acc + e * e);
                out[0] = weight * sum.sqrt();
            }
        }
    }
}

impl Manipulator {
    /// Searches for joint parameters that bring the end effector to `target`.
    ///
    /// The stored parameters are read (as the default start) but never
    /// written; apply the result with [`Manipulator::set_parameters`].
    pub fn inverse_kinematics(&self, target: &[f64], options: &IkOptions) -> Result<IkSolution> {
        if !(options.regularization > 0.0 && options.regularization.is_finite()) {
            return Err(KinematicsError::invalid_settings(
                "regularization must be positive and finite",
            ));
        }
        let (full_target, components) = expand_target(target, options.orientation)?;
        let start = match &options.start {
            Some(start) => {
                self.check_parameters(start)?;
                start.clone()
            }
            None => self.parameters(),
        };

        let objective = IkObjective {
            joints: self.table().descriptors(),
            target: full_target,
            components,
            regularization: options.regularization,
            form: options.form,
        };

        debug!(
            dof = self.dof(),
            components,
            orientation = ?options.orientation,
            form = ?options.form,
            "Solving inverse kinematics"
        );
        let result =
            solve_bounded_least_squares(&objective, &start, self.bounds(), &options.settings)?;

        let pose = flatten_pose(&compose(self.table().descriptors(), &result.x));
        let error = full_target[..components]
            .iter()
            .zip(&pose)
            .map(|(t, p)| (t - p) * (t - p))
            .sum::<f64>()
            .sqrt();

        let converged = result.converged();
        if !converged {
            warn!(
                iterations = result.iterations,
                error,
                reason = ?result.reason,
                "Inverse kinematics did not converge"
            );
        }

        Ok(IkSolution {
            parameters: result.x,
            converged,
            reason: result.reason,
            error,
            iterations: result.iterations,
        })
    }
}
