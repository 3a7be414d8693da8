//! WASM bridge for `manipulator_core`.
//!
//! The host reads joint sensors, converts them to degrees and hands them to
//! [`WasmManipulator`]; solved parameters go back the same way.

use wasm_bindgen::prelude::*;

mod ik;
mod manipulator;

pub use manipulator::WasmManipulator;

#[wasm_bindgen]
pub fn degrees_to_radians(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().map(f64::to_radians).collect()
}

#[wasm_bindgen]
pub fn radians_to_degrees(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().map(f64::to_degrees).collect()
}
