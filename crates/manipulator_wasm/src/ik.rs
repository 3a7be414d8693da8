//! Inverse kinematics bindings.

use anyhow::bail;
use manipulator_core::{IkOptions, IkSolution, ObjectiveForm, OrientationMode};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

use crate::manipulator::{to_js_error, WasmManipulator};

pub(crate) fn parse_orientation(name: Option<&str>) -> anyhow::Result<Option<OrientationMode>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let mode = match name {
        "" | "none" => return Ok(None),
        "X" | "x" => OrientationMode::X,
        "Y" | "y" => OrientationMode::Y,
        "Z" | "z" => OrientationMode::Z,
        "all" | "ALL" | "All" => OrientationMode::All,
        other => bail!("Unknown orientation mode '{other}'. Expected X, Y, Z or all."),
    };
    Ok(Some(mode))
}

pub(crate) fn build_ik_options(
    orientation: Option<&str>,
    start: Option<Vec<f64>>,
    regularization: Option<f64>,
    scalar_norm: bool,
    max_iterations: Option<u32>,
) -> anyhow::Result<IkOptions> {
    let mut options = IkOptions {
        orientation: parse_orientation(orientation)?,
        start,
        ..IkOptions::default()
    };
    if let Some(regularization) = regularization {
        options.regularization = regularization;
    }
    if scalar_norm {
        options.form = ObjectiveForm::ScalarNorm;
    }
    if let Some(max_iterations) = max_iterations {
        options.settings.max_iterations = max_iterations as usize;
    }
    Ok(options)
}

impl WasmManipulator {
    pub(crate) fn solve_ik(
        &self,
        target: &[f64],
        options: &IkOptions,
    ) -> anyhow::Result<IkSolution> {
        Ok(self.inner.inverse_kinematics(target, options)?)
    }
}

#[wasm_bindgen]
impl WasmManipulator {
    /// Solves for joint parameters (degrees) reaching `target`.
    ///
    /// Returns `{ parameters, converged, reason, error, iterations }`; a
    /// non-converged solve still returns its best in-bounds vector.
    pub fn inverse_kinematics(
        &self,
        target: Vec<f64>,
        orientation: Option<String>,
        start: Option<Vec<f64>>,
        regularization: Option<f64>,
        scalar_norm: bool,
        max_iterations: Option<u32>,
    ) -> Result<JsValue, JsValue> {
        let options = build_ik_options(
            orientation.as_deref(),
            start,
            regularization,
            scalar_norm,
            max_iterations,
        )
        .map_err(to_js_error)?;
        let solution = self
            .solve_ik(&target, &options)
            .map_err(|e| JsValue::from_str(&format!("Inverse kinematics failed: {e}")))?;
        to_value(&solution).map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }
}
