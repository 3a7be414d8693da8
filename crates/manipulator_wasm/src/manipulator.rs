//! Core WASM manipulator wrapper and low-level utilities.

use anyhow::{bail, Context};
use manipulator_core::{ChainDefinition, DhParameters, JointDescriptor, JointKind, Manipulator};
use nalgebra::{Dim, Matrix, RawStorage};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmManipulator {
    pub(crate) inner: Manipulator,
}

pub(crate) fn parse_kind(name: &str) -> anyhow::Result<JointKind> {
    match name.to_ascii_lowercase().as_str() {
        "revolute" | "rotazione" => Ok(JointKind::Revolute),
        "prismatic" | "prismatico" => Ok(JointKind::Prismatic),
        other => bail!("Unknown joint kind '{other}'."),
    }
}

/// Builds a manipulator from flat arrays: one kind per joint, four DH
/// parameters `[alpha, a, d, theta]` per joint, and optional bounds (both
/// arrays empty for an unconstrained chain).
pub(crate) fn build_manipulator(
    kinds: &[String],
    params: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> anyhow::Result<Manipulator> {
    if params.len() != kinds.len() * 4 {
        bail!(
            "Expected {} DH parameters for {} joints, got {}.",
            kinds.len() * 4,
            kinds.len(),
            params.len()
        );
    }
    let joints = kinds
        .iter()
        .zip(params.chunks_exact(4))
        .map(|(kind, p)| {
            Ok(JointDescriptor {
                kind: parse_kind(kind)?,
                params: DhParameters::new(p[0], p[1], p[2], p[3]),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if lower.is_empty() && upper.is_empty() {
        return Manipulator::new(joints).context("Failed to build manipulator.");
    }
    if lower.len() != upper.len() {
        bail!(
            "Bound arrays differ in length ({} lower, {} upper).",
            lower.len(),
            upper.len()
        );
    }
    let bounds: Vec<(f64, f64)> = lower.iter().copied().zip(upper.iter().copied()).collect();
    Manipulator::with_bounds(joints, &bounds).context("Failed to build manipulator.")
}

/// Flattens a matrix row by row.
pub(crate) fn row_major<R: Dim, C: Dim, S: RawStorage<f64, R, C>>(
    matrix: &Matrix<f64, R, C, S>,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(matrix.nrows() * matrix.ncols());
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            out.push(matrix[(i, j)]);
        }
    }
    out
}

pub(crate) fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl WasmManipulator {
    #[wasm_bindgen(constructor)]
    pub fn new(
        kinds: Vec<String>,
        params: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<WasmManipulator, JsValue> {
        console_error_panic_hook::set_once();

        let inner = build_manipulator(&kinds, &params, &lower, &upper)
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        Ok(WasmManipulator { inner })
    }

    /// Builds from a `{ joints, bounds? }` object whose joints are either
    /// `{ kind, params }` records or `[kind, params]` pairs.
    pub fn from_table(table: JsValue) -> Result<WasmManipulator, JsValue> {
        console_error_panic_hook::set_once();

        let definition: ChainDefinition = serde_wasm_bindgen::from_value(table)
            .map_err(|e| JsValue::from_str(&format!("Invalid DH table: {e}")))?;
        let inner = Manipulator::from_definition(definition).map_err(to_js_error)?;
        Ok(WasmManipulator { inner })
    }

    pub fn dof(&self) -> usize {
        self.inner.dof()
    }

    pub fn version(&self) -> f64 {
        self.inner.version() as f64
    }

    pub fn get_parameters(&self) -> Vec<f64> {
        self.inner.parameters()
    }

    /// `joints` are 1-based indices paired with `values`.
    pub fn set_parameters(&mut self, joints: Vec<u32>, values: Vec<f64>) -> Result<(), JsValue> {
        if joints.len() != values.len() {
            return Err(JsValue::from_str(
                "Joint index and value arrays must have the same length.",
            ));
        }
        let updates: Vec<(usize, f64)> = joints
            .into_iter()
            .map(|j| j as usize)
            .zip(values)
            .collect();
        self.inner.set_parameters(&updates).map_err(to_js_error)
    }

    pub fn joints(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.joints())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }

    /// Pose of frame `end` in frame `start`, 16 values row-major.
    pub fn forward_kinematics(&self, start: usize, end: usize) -> Result<Vec<f64>, JsValue> {
        let pose = self
            .inner
            .forward_kinematics(start, end)
            .map_err(to_js_error)?;
        Ok(row_major(&pose))
    }

    pub fn end_effector_pose(&self) -> Vec<f64> {
        row_major(&self.inner.end_effector_pose())
    }

    pub fn forward_kinematics_with(&self, params: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        let pose = self
            .inner
            .forward_kinematics_with(&params)
            .map_err(to_js_error)?;
        Ok(row_major(&pose))
    }

    /// 12 x N Jacobian, row-major.
    pub fn jacobian(&self, params: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        let jac = self.inner.jacobian(&params).map_err(to_js_error)?;
        Ok(row_major(&jac))
    }

    #[wasm_bindgen(js_name = toString)]
    pub fn describe(&self) -> String {
        self.inner.to_string()
    }
}
