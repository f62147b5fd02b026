//! Key values produced by sort and group key selectors.
//!
//! Key selectors map an item to a [`KeyValue`], a small dynamically-typed
//! value with a total order. Sort descriptions compare key values; group
//! descriptions test them for equality.

use std::cmp::Ordering;
use std::fmt;

/// Sort direction for a [`crate::SortDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Smallest key first.
    #[default]
    Ascending,
    /// Largest key first.
    Descending,
}

impl SortDirection {
    /// Applies the direction to an ascending ordering.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// A dynamically-typed key value with a total order.
///
/// Values of the same variant compare naturally; `Int` and `Float` compare
/// numerically with each other; otherwise variants compare by a fixed type
/// rank (`None < Bool < Int/Float < Str`) so that mixed-key collections
/// still sort deterministically.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// No key (item lacks the keyed property).
    None,
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Floating-point key.
    Float(f64),
    /// String key.
    Str(String),
}

impl KeyValue {
    /// Total-order comparison between two key values.
    pub fn compare(&self, other: &Self) -> Ordering {
        use KeyValue::*;
        match (self, other) {
            (None, None) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality as used for group keys.
    ///
    /// Consistent with [`compare`](Self::compare), so `Float(f64::NAN)`
    /// groups with itself.
    pub fn same_key(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Returns the contained integer, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the contained string slice, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Str(_) => 3,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "(none)"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for KeyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for KeyValue {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<usize> for KeyValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for KeyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
