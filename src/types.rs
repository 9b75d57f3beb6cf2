//! Value space of diagram leaves.
//!
//! A [`Value`] is what a leaf carries and a [`Type`] describes the set of values
//! a diagram can map to. Boolean diagrams live in the binary backend, everything
//! else in the multi-terminal one.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::utils::{pairing2, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    Boolean,
    /// Integers with optional bounds. `None` means unbounded in that direction.
    Integer {
        lower: Option<i64>,
        upper: Option<i64>,
    },
    Real,
    /// Finite enumeration of `size` values, identified by ordinal.
    Enumerable { size: u32 },
}

impl Type {
    /// Unbounded integers.
    pub const fn integer() -> Self {
        Type::Integer {
            lower: None,
            upper: None,
        }
    }

    /// Integers in `lower..=upper`.
    pub const fn bounded(lower: i64, upper: i64) -> Self {
        Type::Integer {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Boolean)
    }
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Integer { .. })
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer { .. } | Type::Real)
    }

    /// Number of values of a finite type, `None` for infinite ones and for
    /// domains with more than `u64::MAX` values.
    pub fn num_values(&self) -> Option<u64> {
        match *self {
            Type::Boolean => Some(2),
            Type::Integer {
                lower: Some(l),
                upper: Some(u),
            } if l <= u => u64::try_from(u as i128 - l as i128 + 1).ok(),
            Type::Integer { .. } | Type::Real => None,
            Type::Enumerable { size } => Some(size as u64),
        }
    }

    /// Least common supertype, if any.
    pub fn join(&self, other: &Type) -> Option<Type> {
        match (self, other) {
            (Type::Boolean, Type::Boolean) => Some(Type::Boolean),
            (a @ Type::Integer { .. }, b @ Type::Integer { .. }) if a == b => Some(*a),
            (Type::Integer { .. }, Type::Integer { .. }) => Some(Type::integer()),
            (Type::Integer { .. } | Type::Real, Type::Integer { .. } | Type::Real) => {
                Some(Type::Real)
            }
            (Type::Enumerable { size: a }, Type::Enumerable { size: b }) if a == b => {
                Some(*self)
            }
            _ => None,
        }
    }

    /// Whether `value` belongs to this type.
    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Boolean, Value::Bool(_)) => true,
            (Type::Integer { lower, upper }, Value::Int(i)) => {
                lower.map_or(true, |l| l <= *i) && upper.map_or(true, |u| *i <= u)
            }
            (Type::Real, Value::Real(_) | Value::Int(_)) => true,
            (Type::Enumerable { size }, Value::Enum { ordinal, size: s }) => {
                size == s && ordinal < size
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "bool"),
            Type::Integer {
                lower: Some(l),
                upper: Some(u),
            } => write!(f, "int[{}..{}]", l, u),
            Type::Integer { .. } => write!(f, "int"),
            Type::Real => write!(f, "real"),
            Type::Enumerable { size } => write!(f, "enum({})", size),
        }
    }
}

/// A leaf value.
///
/// Reals compare and hash by their canonical bit pattern, so that they can be
/// hash-consed in a unique table.
#[derive(Debug, Copy, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Enum { ordinal: u32, size: u32 },
}

fn canonical_bits(x: f64) -> u64 {
    if x == 0.0 {
        0
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => canonical_bits(*a) == canonical_bits(*b),
            (
                Value::Enum { ordinal: a, size: s },
                Value::Enum {
                    ordinal: b,
                    size: t,
                },
            ) => a == b && s == t,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        MyHash::hash(self).hash(state);
    }
}

impl MyHash for Value {
    fn hash(&self) -> u64 {
        match *self {
            Value::Bool(b) => pairing2(0, b as u64),
            Value::Int(i) => pairing2(1, i as u64),
            Value::Real(x) => pairing2(2, canonical_bits(x)),
            Value::Enum { ordinal, size } => pairing2(3, pairing2(ordinal as u64, size as u64)),
        }
    }
}

impl Value {
    /// The most specific type of this value. Integers are unbounded.
    pub fn type_(&self) -> Type {
        match *self {
            Value::Bool(_) => Type::Boolean,
            Value::Int(_) => Type::integer(),
            Value::Real(_) => Type::Real,
            Value::Enum { size, .. } => Type::Enumerable { size },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Numeric view of integers and reals.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(i) => Some(i as f64),
            Value::Real(x) => Some(x),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }
    pub fn is_zero(&self) -> bool {
        match *self {
            Value::Int(i) => i == 0,
            Value::Real(x) => x == 0.0,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(x) => write!(f, "{}", x),
            Value::Enum { ordinal, .. } => write!(f, "#{}", ordinal),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_values() {
        assert_eq!(Type::Boolean.num_values(), Some(2));
        assert_eq!(Type::bounded(-3, 4).num_values(), Some(8));
        assert_eq!(Type::integer().num_values(), None);
        assert_eq!(Type::Real.num_values(), None);
        assert_eq!(Type::Enumerable { size: 5 }.num_values(), Some(5));
        assert_eq!(Type::bounded(0, i64::MAX).num_values(), Some(1 << 63));
        assert_eq!(Type::bounded(i64::MIN, i64::MAX).num_values(), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(Type::Boolean.join(&Type::Boolean), Some(Type::Boolean));
        assert_eq!(
            Type::bounded(0, 3).join(&Type::bounded(0, 7)),
            Some(Type::integer())
        );
        assert_eq!(Type::integer().join(&Type::Real), Some(Type::Real));
        assert_eq!(Type::Boolean.join(&Type::integer()), None);
    }

    #[test]
    fn test_contains() {
        let t = Type::bounded(1, 3);
        assert!(t.contains(&Value::Int(1)));
        assert!(t.contains(&Value::Int(3)));
        assert!(!t.contains(&Value::Int(4)));
        assert!(!t.contains(&Value::Bool(true)));
    }

    #[test]
    fn test_real_equality_is_canonical() {
        assert_eq!(Value::Real(0.0), Value::Real(-0.0));
        assert_eq!(Value::Real(f64::NAN), Value::Real(f64::NAN));
        assert_ne!(Value::Real(1.0), Value::Int(1));
        assert_eq!(MyHash::hash(&Value::Real(0.0)), MyHash::hash(&Value::Real(-0.0)));
    }
}
