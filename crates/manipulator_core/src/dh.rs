//! Denavit–Hartenberg tables.
//!
//! External joint descriptions come in two shapes, `{kind, params}` records
//! and `(kind, params)` pairs. Both are normalized into [`JointDescriptor`]
//! once, in [`DhTable::new`]; nothing downstream looks at the original shape.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KinematicsError, Result};
use crate::solvers::Bound;

/// Joint type. Decides which DH slot holds the variable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointKind {
    /// Variable joint angle `theta` (degrees).
    #[serde(alias = "rotazione", alias = "rotation")]
    Revolute,
    /// Variable link offset `d`.
    #[serde(alias = "prismatico")]
    Prismatic,
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointKind::Revolute => write!(f, "revolute"),
            JointKind::Prismatic => write!(f, "prismatic"),
        }
    }
}

/// The four DH constants of one joint. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DhParameters {
    pub alpha: f64,
    pub a: f64,
    pub d: f64,
    pub theta: f64,
}

impl DhParameters {
    pub fn new(alpha: f64, a: f64, d: f64, theta: f64) -> Self {
        Self { alpha, a, d, theta }
    }
}

/// Canonical joint: kind plus DH constants, one of which is the variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDescriptor {
    pub kind: JointKind,
    pub params: DhParameters,
}

impl JointDescriptor {
    pub fn revolute(alpha: f64, a: f64, d: f64, theta: f64) -> Self {
        Self {
            kind: JointKind::Revolute,
            params: DhParameters::new(alpha, a, d, theta),
        }
    }

    pub fn prismatic(alpha: f64, a: f64, d: f64, theta: f64) -> Self {
        Self {
            kind: JointKind::Prismatic,
            params: DhParameters::new(alpha, a, d, theta),
        }
    }

    /// Current value of the variable slot (`theta` or `d`).
    pub fn variable(&self) -> f64 {
        match self.kind {
            JointKind::Revolute => self.params.theta,
            JointKind::Prismatic => self.params.d,
        }
    }

    fn set_variable(&mut self, value: f64) {
        match self.kind {
            JointKind::Revolute => self.params.theta = value,
            JointKind::Prismatic => self.params.d = value,
        }
    }
}

/// A joint as it arrives from outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JointSpec {
    Record {
        #[serde(alias = "tipo", alias = "type")]
        kind: JointKind,
        #[serde(alias = "parametri")]
        params: Vec<f64>,
    },
    Pair(JointKind, Vec<f64>),
}

impl JointSpec {
    fn into_descriptor(self, position: usize) -> Result<JointDescriptor> {
        let (kind, params) = match self {
            JointSpec::Record { kind, params } => (kind, params),
            JointSpec::Pair(kind, params) => (kind, params),
        };
        let [alpha, a, d, theta]: [f64; 4] = params.as_slice().try_into().map_err(|_| {
            KinematicsError::construction(format!(
                "joint {position}: expected 4 DH parameters [alpha, a, d, theta], got {}",
                params.len()
            ))
        })?;
        if ![alpha, a, d, theta].iter().all(|v| v.is_finite()) {
            return Err(KinematicsError::construction(format!(
                "joint {position}: DH parameters must be finite"
            )));
        }
        Ok(JointDescriptor {
            kind,
            params: DhParameters::new(alpha, a, d, theta),
        })
    }
}

impl From<JointDescriptor> for JointSpec {
    fn from(joint: JointDescriptor) -> Self {
        let p = joint.params;
        JointSpec::Record {
            kind: joint.kind,
            params: vec![p.alpha, p.a, p.d, p.theta],
        }
    }
}

impl From<(JointKind, [f64; 4])> for JointSpec {
    fn from((kind, params): (JointKind, [f64; 4])) -> Self {
        JointSpec::Pair(kind, params.to_vec())
    }
}

impl From<(JointKind, Vec<f64>)> for JointSpec {
    fn from((kind, params): (JointKind, Vec<f64>)) -> Self {
        JointSpec::Pair(kind, params)
    }
}

/// Serializable chain definition: joints plus optional per-joint bounds.
/// A `None` side of a bound means unbounded in that direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub joints: Vec<JointSpec>,
    #[serde(default)]
    pub bounds: Option<Vec<(Option<f64>, Option<f64>)>>,
}

impl ChainDefinition {
    pub(crate) fn bounds(&self) -> Result<Option<Vec<Bound>>> {
        self.bounds
            .as_ref()
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|&(lower, upper)| {
                        Bound::new(
                            lower.unwrap_or(f64::NEG_INFINITY),
                            upper.unwrap_or(f64::INFINITY),
                        )
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()
    }
}

/// Ordered joint list of a serial chain.
///
/// The variable slots are the only mutable state and change through
/// [`DhTable::set_variables`], which bumps [`DhTable::version`].
#[derive(Debug, Clone, PartialEq)]
pub struct DhTable {
    joints: Vec<JointDescriptor>,
    version: u64,
}

impl DhTable {
    pub fn new<I, J>(joints: I) -> Result<Self>
    where
        I: IntoIterator<Item = J>,
        J: Into<JointSpec>,
    {
        let joints = joints
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| {
                let spec: JointSpec = spec.into();
                spec.into_descriptor(idx + 1)
            })
            .collect::<Result<Vec<_>>>()?;
        if joints.is_empty() {
            return Err(KinematicsError::construction("DH table has no joints"));
        }
        Ok(Self { joints, version: 0 })
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Number of successful mutations since construction.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn descriptors(&self) -> &[JointDescriptor] {
        &self.joints
    }

    /// Joint list as `(kind, variable value)` pairs.
    pub fn joints(&self) -> Vec<(JointKind, f64)> {
        self.joints.iter().map(|j| (j.kind, j.variable())).collect()
    }

    /// Stored variable values in chain order.
    pub fn variables(&self) -> Vec<f64> {
        self.joints.iter().map(JointDescriptor::variable).collect()
    }

    /// Writes `(1-based index, value)` pairs into the variable slots.
    /// Either every pair is applied or, on an index or non-finite fault,
    /// none is. An empty update leaves the version unchanged.
    pub fn set_variables(&mut self, updates: &[(usize, f64)]) -> Result<()> {
        let slots = updates
            .iter()
            .map(|&(joint, value)| {
                let slot = self.slot(joint)?;
                if !value.is_finite() {
                    return Err(KinematicsError::NonFinite { joint, value });
                }
                Ok(slot)
            })
            .collect::<Result<Vec<_>>>()?;
        if slots.is_empty() {
            return Ok(());
        }
        for (slot, &(_, value)) in slots.into_iter().zip(updates) {
            self.joints[slot].set_variable(value);
        }
        self.version += 1;
        Ok(())
    }

    /// Maps a public 1-based joint index onto storage.
    fn slot(&self, joint: usize) -> Result<usize> {
        if joint == 0 || joint > self.joints.len() {
            return Err(KinematicsError::Index {
                index: joint,
                min: 1,
                max: self.joints.len(),
            });
        }
        Ok(joint - 1)
    }
}

impl fmt::Display for DhTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, joint) in self.joints.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {})", joint.kind, joint.variable())?;
        }
        write!(f, "]")
    }
}
