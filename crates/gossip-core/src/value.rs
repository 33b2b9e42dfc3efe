//! Value: the opaque scalar being broadcast.
//!
//! Values travel as JSON numbers. Internally they are finite `f64`s so any
//! number a client sends is accepted, but they are hashed and compared by
//! bit pattern so they can live in a set.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Largest integer an f64 represents exactly (2^53).
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("Value must be a finite number, got {0}")]
    NotFinite(f64),
}

/// A broadcast value.
///
/// `-0.0` is normalized to `0.0` on construction so equal numbers always
/// hash the same. Ordering is total (`f64::total_cmp`).
#[derive(Debug, Clone, Copy)]
pub struct Value(f64);

impl Value {
    /// Create a value from a finite number.
    pub fn new(value: f64) -> Result<Self, ValueError> {
        if !value.is_finite() {
            return Err(ValueError::NotFinite(value));
        }
        // -0.0 == 0.0 but their bits differ
        Ok(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// The value as an integer, if it is integral and exactly representable.
    pub fn as_i64(&self) -> Option<i64> {
        if self.0.fract() == 0.0 && self.0.abs() <= MAX_EXACT_INT {
            Some(self.0 as i64)
        } else {
            None
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.as_i64() {
            Some(i) => write!(f, "{}", i),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self(f64::from(value))
    }
}

// Integral values go out as JSON integers: a client that sent 42 must read back 42, not 42.0
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.as_i64() {
            Some(i) => s.serialize_i64(i),
            None => s.serialize_f64(self.0),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let n = f64::deserialize(d)?;
        Value::new(n).map_err(serde::de::Error::custom)
    }
}
