//! Node values.

use dm_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Value held by a graph node: a real scalar or a vector of reals.
///
/// A vector-valued stochastic node is i.i.d. under its density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Scalar.
    Real(f64),
    /// Vector.
    Vector(Vec<f64>),
}

impl Value {
    /// The scalar, or a validation error for vectors.
    pub fn as_real(&self) -> Result<f64> {
        match self {
            Value::Real(x) => Ok(*x),
            Value::Vector(v) => {
                Err(Error::Validation(format!("expected a real, got a vector of length {}", v.len())))
            }
        }
    }

    /// All elements; a scalar is a one-element slice.
    pub fn elements(&self) -> &[f64] {
        match self {
            Value::Real(x) => std::slice::from_ref(x),
            Value::Vector(v) => v,
        }
    }

    /// Mutable view over all elements.
    pub fn elements_mut(&mut self) -> &mut [f64] {
        match self {
            Value::Real(x) => std::slice::from_mut(x),
            Value::Vector(v) => v,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements().len()
    }

    /// `true` only for an empty vector.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a vector value.
    pub fn is_vector(&self) -> bool {
        matches!(self, Value::Vector(_))
    }

    /// Same shape as `self`, filled from `elements`.
    pub(crate) fn with_shape_of(&self, elements: Vec<f64>) -> Value {
        match self {
            Value::Real(_) => Value::Real(elements.first().copied().unwrap_or(f64::NAN)),
            Value::Vector(_) => Value::Vector(elements),
        }
    }

    /// Exact equality including NaN payloads and signed zeros.
    pub fn bit_eq(&self, other: &Value) -> bool {
        self.is_vector() == other.is_vector()
            && self.len() == other.len()
            && self.elements().iter().zip(other.elements()).all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Real(x) => write!(f, "{}", x),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, "]")
            }
        }
    }
}
