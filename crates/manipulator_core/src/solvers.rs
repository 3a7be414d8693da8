use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::autodiff;
use crate::error::{KinematicsError, Result};
use crate::traits::DifferentiableMap;

/// Closed box constraint on one variable. Either side may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if lower.is_nan() || upper.is_nan() {
            return Err(KinematicsError::construction("bounds must not be NaN"));
        }
        if lower > upper {
            return Err(KinematicsError::construction(format!(
                "lower bound {lower} exceeds upper bound {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

impl Default for Bound {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeastSquaresSettings {
    pub max_iterations: usize,
    /// Stop when an accepted step reduces the cost by less than `ftol * cost`.
    pub ftol: f64,
    /// Stop when the step is shorter than `xtol * (xtol + ‖x‖)`.
    pub xtol: f64,
    /// Stop when the projected gradient's largest entry is below `gtol`.
    pub gtol: f64,
    pub initial_damping: f64,
    pub max_damping: f64,
}

impl Default for LeastSquaresSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            initial_damping: 1e-3,
            max_damping: 1e16,
        }
    }
}

impl LeastSquaresSettings {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(KinematicsError::invalid_settings(
                "max_iterations must be greater than zero",
            ));
        }
        for (name, value) in [
            ("ftol", self.ftol),
            ("xtol", self.xtol),
            ("gtol", self.gtol),
            ("initial_damping", self.initial_damping),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(KinematicsError::invalid_settings(format!(
                    "{name} must be positive and finite"
                )));
            }
        }
        if !(self.max_damping > self.initial_damping) {
            return Err(KinematicsError::invalid_settings(
                "max_damping must exceed initial_damping",
            ));
        }
        Ok(())
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The residual vanished exactly.
    ZeroResidual,
    /// Relative cost reduction fell below `ftol`.
    CostTolerance,
    /// Step length fell below `xtol`.
    StepTolerance,
    /// Projected gradient fell below `gtol`.
    GradientTolerance,
    /// Iteration budget spent.
    MaxIterations,
    /// No decreasing step found before damping hit `max_damping`.
    DampingExhausted,
}

impl TerminationReason {
    pub fn converged(self) -> bool {
        !matches!(
            self,
            TerminationReason::MaxIterations | TerminationReason::DampingExhausted
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeastSquaresResult {
    /// Best point found; always inside the bounds.
    pub x: Vec<f64>,
    /// `½‖r(x)‖²`
    pub cost: f64,
    pub residual: Vec<f64>,
    pub iterations: usize,
    pub evaluations: usize,
    pub reason: TerminationReason,
}

impl LeastSquaresResult {
    pub fn converged(&self) -> bool {
        self.reason.converged()
    }

    pub fn residual_norm(&self) -> f64 {
        l2_norm(&self.residual)
    }
}

/// Minimizes `½‖r(x)‖²` subject to `bounds` with a projected
/// Levenberg–Marquardt iteration.
///
/// The Jacobian of `residual` comes from forward-mode differentiation.
/// Variables sitting on a bound with the gradient pushing outward are frozen
/// for the step; every trial point is clamped back into the box.
pub fn solve_bounded_least_squares<M: DifferentiableMap>(
    residual: &M,
    initial_guess: &[f64],
    bounds: &[Bound],
    settings: &LeastSquaresSettings,
) -> Result<LeastSquaresResult> {
    settings.validate()?;
    let n = residual.input_dimension();
    if initial_guess.len() != n {
        return Err(KinematicsError::dimension(
            "initial guess",
            n,
            initial_guess.len(),
        ));
    }
    if bounds.len() != n {
        return Err(KinematicsError::dimension("bounds", n, bounds.len()));
    }
    for (idx, (bound, &value)) in bounds.iter().zip(initial_guess).enumerate() {
        if !value.is_finite() {
            return Err(KinematicsError::NonFinite {
                joint: idx + 1,
                value,
            });
        }
        if !bound.contains(value) {
            return Err(KinematicsError::BoundViolation {
                joint: idx + 1,
                value,
                lower: bound.lower,
                upper: bound.upper,
            });
        }
    }

    let mut x = DVector::from_column_slice(initial_guess);
    let mut r = DVector::from_vec(autodiff::evaluate(residual, initial_guess)?);
    let mut cost = 0.5 * r.norm_squared();
    let mut evaluations = 1usize;
    let mut iterations = 0usize;
    let mut lambda = settings.initial_damping;

    if !cost.is_finite() {
        return Err(KinematicsError::Convergence {
            iterations,
            error: r.norm(),
        });
    }

    debug!(dimension = n, residuals = r.len(), cost, "Starting bounded least squares");

    let reason = 'outer: loop {
        if cost == 0.0 {
            break TerminationReason::ZeroResidual;
        }
        if iterations >= settings.max_iterations {
            break TerminationReason::MaxIterations;
        }

        let jac = autodiff::jacobian(residual, x.as_slice())?;
        let gradient = jac.transpose() * &r;
        let active: Vec<bool> = (0..n)
            .map(|i| {
                (x[i] <= bounds[i].lower && gradient[i] > 0.0)
                    || (x[i] >= bounds[i].upper && gradient[i] < 0.0)
            })
            .collect();

        let projected_gradient = (0..n)
            .filter(|&i| !active[i])
            .map(|i| gradient[i].abs())
            .fold(0.0, f64::max);
        if projected_gradient < settings.gtol {
            break TerminationReason::GradientTolerance;
        }

        let normal = jac.transpose() * &jac;

        loop {
            let Some(delta) = damped_step(&normal, &gradient, &active, lambda) else {
                lambda *= 10.0;
                if lambda > settings.max_damping {
                    break 'outer TerminationReason::DampingExhausted;
                }
                continue;
            };

            let candidate =
                DVector::from_fn(n, |i, _| bounds[i].clamp(x[i] + delta[i]));
            let step_norm = (&candidate - &x).norm();
            if step_norm <= settings.xtol * (settings.xtol + x.norm()) {
                break 'outer TerminationReason::StepTolerance;
            }

            let r_new = DVector::from_vec(autodiff::evaluate(residual, candidate.as_slice())?);
            evaluations += 1;
            let cost_new = 0.5 * r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let reduction = cost - cost_new;
                let previous = cost;
                x = candidate;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(f64::EPSILON);
                iterations += 1;
                trace!(iteration = iterations, cost, lambda, step_norm, "Accepted step");
                if reduction <= settings.ftol * previous {
                    break 'outer TerminationReason::CostTolerance;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > settings.max_damping {
                break 'outer TerminationReason::DampingExhausted;
            }
        }
    };

    debug!(
        iterations,
        evaluations,
        cost,
        ?reason,
        "Bounded least squares finished"
    );

    Ok(LeastSquaresResult {
        x: x.iter().copied().collect(),
        cost,
        residual: r.iter().copied().collect(),
        iterations,
        evaluations,
        reason,
    })
}

/// Solves `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr` with frozen variables held at zero.
fn damped_step(
    normal: &DMatrix<f64>,
    gradient: &DVector<f64>,
    active: &[bool],
    lambda: f64,
) -> Option<DVector<f64>> {
    let n = gradient.len();
    let mut system = normal.clone();
    let mut rhs = -gradient;
    for i in 0..n {
        if active[i] {
            for j in 0..n {
                system[(i, j)] = 0.0;
                system[(j, i)] = 0.0;
            }
            system[(i, i)] = 1.0;
            rhs[i] = 0.0;
        } else {
            let scale = normal[(i, i)].max(1e-12);
            system[(i, i)] += lambda * scale;
        }
    }

    let delta = match system.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => system.lu().solve(&rhs)?,
    };
    if delta.iter().all(|v| v.is_finite()) {
        Some(delta)
    } else {
        None
    }
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
