//! Operators that can be applied to diagrams.
//!
//! Each operator knows its arity, how to compute the type of its result, and
//! how to evaluate itself on leaf values. The latter is what the generic
//! fallback uses once every operand has reached a leaf.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{DdError, Result};
use crate::types::{Type, Value};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Operator {
    Id,
    Not,
    And,
    Or,
    Xor,
    Iff,
    Implies,
    Ite,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Subtract,
    Multiply,
    Divide,
    DivideIgnoreZero,
    Mod,
    Max,
    Min,
    AddInverse,
    Ceil,
    Floor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(k) => write!(f, "{}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Operator {
    pub const ALL: [Operator; 25] = [
        Operator::Id,
        Operator::Not,
        Operator::And,
        Operator::Or,
        Operator::Xor,
        Operator::Iff,
        Operator::Implies,
        Operator::Ite,
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::DivideIgnoreZero,
        Operator::Mod,
        Operator::Max,
        Operator::Min,
        Operator::AddInverse,
        Operator::Ceil,
        Operator::Floor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Id => "id",
            Operator::Not => "not",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::Iff => "iff",
            Operator::Implies => "implies",
            Operator::Ite => "ite",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Add => "add",
            Operator::Subtract => "subtract",
            Operator::Multiply => "multiply",
            Operator::Divide => "divide",
            Operator::DivideIgnoreZero => "divide-ignore-zero",
            Operator::Mod => "mod",
            Operator::Max => "max",
            Operator::Min => "min",
            Operator::AddInverse => "add-inverse",
            Operator::Ceil => "ceil",
            Operator::Floor => "floor",
        }
    }

    /// Associative operators accept any positive number of operands.
    pub fn arity(&self) -> Arity {
        match self {
            Operator::Id
            | Operator::Not
            | Operator::AddInverse
            | Operator::Ceil
            | Operator::Floor => Arity::Exactly(1),
            Operator::And
            | Operator::Or
            | Operator::Xor
            | Operator::Add
            | Operator::Multiply
            | Operator::Max
            | Operator::Min => Arity::AtLeast(1),
            Operator::Ite => Arity::Exactly(3),
            _ => Arity::Exactly(2),
        }
    }

    pub fn check_arity(&self, n: usize) -> Result<()> {
        if self.arity().accepts(n) {
            Ok(())
        } else {
            Err(DdError::ArityMismatch {
                op: self.name().to_string(),
                expected: self.arity().to_string(),
                found: n,
            })
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    /// Whether the operator maps booleans to booleans.
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Operator::Id
                | Operator::Not
                | Operator::And
                | Operator::Or
                | Operator::Xor
                | Operator::Iff
                | Operator::Implies
                | Operator::Ite
                | Operator::Eq
                | Operator::Ne
        )
    }

    fn mismatch(&self, types: &[Type]) -> DdError {
        let list: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        DdError::TypeMismatch(format!("{} applied to ({})", self, list.join(", ")))
    }

    /// Type of the result of applying this operator to operands of `types`.
    pub fn result_type(&self, types: &[Type]) -> Result<Type> {
        self.check_arity(types.len())?;
        let all_bool = types.iter().all(Type::is_boolean);
        let all_numeric = types.iter().all(Type::is_numeric);
        let all_integer = types.iter().all(Type::is_integer);
        let numeric = || {
            if all_integer {
                Type::integer()
            } else {
                Type::Real
            }
        };

        match self {
            Operator::Id => Ok(types[0]),
            Operator::Not | Operator::And | Operator::Or | Operator::Xor | Operator::Iff
            | Operator::Implies => {
                if all_bool {
                    Ok(Type::Boolean)
                } else {
                    Err(self.mismatch(types))
                }
            }
            Operator::Ite => {
                if !types[0].is_boolean() {
                    return Err(self.mismatch(types));
                }
                types[1].join(&types[2]).ok_or_else(|| self.mismatch(types))
            }
            Operator::Eq | Operator::Ne => match types[0].join(&types[1]) {
                Some(_) => Ok(Type::Boolean),
                None => Err(self.mismatch(types)),
            },
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
                if all_numeric || all_bool || types[0].join(&types[1]).is_some() {
                    Ok(Type::Boolean)
                } else {
                    Err(self.mismatch(types))
                }
            }
            Operator::Max | Operator::Min if all_bool => Ok(Type::Boolean),
            Operator::Add
            | Operator::Subtract
            | Operator::Multiply
            | Operator::Max
            | Operator::Min
            | Operator::AddInverse => {
                if all_numeric {
                    Ok(numeric())
                } else {
                    Err(self.mismatch(types))
                }
            }
            Operator::Divide | Operator::DivideIgnoreZero => {
                if all_numeric {
                    Ok(Type::Real)
                } else {
                    Err(self.mismatch(types))
                }
            }
            Operator::Mod => {
                if all_integer {
                    Ok(Type::integer())
                } else {
                    Err(self.mismatch(types))
                }
            }
            Operator::Ceil | Operator::Floor => {
                if all_numeric {
                    Ok(Type::integer())
                } else {
                    Err(self.mismatch(types))
                }
            }
        }
    }

    /// Evaluate the operator on leaf values.
    pub fn evaluate(&self, values: &[Value]) -> Result<Value> {
        let types: Vec<Type> = values.iter().map(Value::type_).collect();
        let result_type = self.result_type(&types)?;
        let value = match self {
            Operator::Id => values[0],
            Operator::Not => Value::Bool(!bool_of(&values[0])),
            Operator::And => Value::Bool(values.iter().all(bool_of)),
            Operator::Or => Value::Bool(values.iter().any(bool_of)),
            Operator::Xor => Value::Bool(values.iter().filter(|v| bool_of(v)).count() % 2 == 1),
            Operator::Iff => Value::Bool(bool_of(&values[0]) == bool_of(&values[1])),
            Operator::Implies => Value::Bool(!bool_of(&values[0]) || bool_of(&values[1])),
            Operator::Ite => {
                if bool_of(&values[0]) {
                    values[1]
                } else {
                    values[2]
                }
            }
            Operator::Eq => Value::Bool(compare(&values[0], &values[1])? == Ordering::Equal),
            Operator::Ne => Value::Bool(compare(&values[0], &values[1])? != Ordering::Equal),
            Operator::Lt => Value::Bool(compare(&values[0], &values[1])? == Ordering::Less),
            Operator::Le => Value::Bool(compare(&values[0], &values[1])? != Ordering::Greater),
            Operator::Gt => Value::Bool(compare(&values[0], &values[1])? == Ordering::Greater),
            Operator::Ge => Value::Bool(compare(&values[0], &values[1])? != Ordering::Less),
            Operator::Add => fold_numeric(values, i64::checked_add, |a, b| a + b)?,
            Operator::Subtract => fold_numeric(values, i64::checked_sub, |a, b| a - b)?,
            Operator::Multiply => fold_numeric(values, i64::checked_mul, |a, b| a * b)?,
            Operator::Max | Operator::Min => {
                let want = if *self == Operator::Max {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                let mut best = values[0];
                for v in &values[1..] {
                    if compare(v, &best)? == want {
                        best = *v;
                    }
                }
                best
            }
            Operator::Divide | Operator::DivideIgnoreZero => {
                let a = num_of(&values[0]);
                let b = num_of(&values[1]);
                if b == 0.0 {
                    if *self == Operator::Divide {
                        return Err(DdError::Arithmetic("division by zero".to_string()));
                    }
                    Value::Real(0.0)
                } else {
                    Value::Real(a / b)
                }
            }
            Operator::Mod => {
                let (a, b) = (int_of(&values[0]), int_of(&values[1]));
                if b == 0 {
                    return Err(DdError::Arithmetic("modulo by zero".to_string()));
                }
                Value::Int(a.rem_euclid(b))
            }
            Operator::AddInverse => match values[0] {
                Value::Int(i) => Value::Int(
                    i.checked_neg()
                        .ok_or_else(|| DdError::Arithmetic(format!("overflow negating {}", i)))?,
                ),
                Value::Real(x) => Value::Real(-x),
                _ => return Err(self.mismatch(&types)),
            },
            Operator::Ceil | Operator::Floor => match values[0] {
                Value::Int(i) => Value::Int(i),
                Value::Real(x) => {
                    let r = if *self == Operator::Ceil {
                        x.ceil()
                    } else {
                        x.floor()
                    };
                    if !r.is_finite() || r.abs() > i64::MAX as f64 {
                        return Err(DdError::Arithmetic(format!("{} of {} out of range", self, x)));
                    }
                    Value::Int(r as i64)
                }
                _ => return Err(self.mismatch(&types)),
            },
        };
        Ok(coerce(value, &result_type))
    }
}

fn bool_of(value: &Value) -> bool {
    value.is_true()
}

fn num_of(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn int_of(value: &Value) -> i64 {
    value.as_int().unwrap_or(0)
}

/// Widen an integer to a real when the result type asks for it.
pub(crate) fn coerce(value: Value, ty: &Type) -> Value {
    match (value, ty) {
        (Value::Int(i), Type::Real) => Value::Real(i as f64),
        _ => value,
    }
}

fn fold_numeric(
    values: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let mut acc = int_of(&values[0]);
        for v in &values[1..] {
            let b = int_of(v);
            acc = int_op(acc, b)
                .ok_or_else(|| DdError::Arithmetic(format!("integer overflow at {} and {}", acc, b)))?;
        }
        Ok(Value::Int(acc))
    } else {
        let mut acc = num_of(&values[0]);
        for v in &values[1..] {
            acc = real_op(acc, num_of(v));
        }
        Ok(Value::Real(acc))
    }
}

/// Total order on comparable values of compatible types.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Enum { ordinal: x, size: s }, Value::Enum { ordinal: y, size: t }) if s == t => {
            Ok(x.cmp(y))
        }
        (Value::Int(_) | Value::Real(_), Value::Int(_) | Value::Real(_)) => {
            Ok(num_of(a).total_cmp(&num_of(b)))
        }
        _ => Err(DdError::TypeMismatch(format!(
            "cannot compare {} with {}",
            a.type_(),
            b.type_()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert!(Operator::Ite.check_arity(3).is_ok());
        assert!(Operator::Ite.check_arity(2).is_err());
        assert!(Operator::And.check_arity(5).is_ok());
        assert!(Operator::And.check_arity(0).is_err());
        assert!(Operator::Not.check_arity(1).is_ok());
    }

    #[test]
    fn test_result_type() {
        let b = Type::Boolean;
        let i = Type::bounded(0, 3);
        assert_eq!(Operator::And.result_type(&[b, b, b]), Ok(b));
        assert_eq!(Operator::Add.result_type(&[i, i]), Ok(Type::integer()));
        assert_eq!(Operator::Add.result_type(&[i, Type::Real]), Ok(Type::Real));
        assert_eq!(Operator::Lt.result_type(&[i, i]), Ok(b));
        assert_eq!(Operator::Ite.result_type(&[b, i, i]), Ok(i));
        assert!(Operator::And.result_type(&[b, i]).is_err());
        assert!(Operator::Ite.result_type(&[i, b, b]).is_err());
    }

    #[test]
    fn test_evaluate_boolean() {
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert_eq!(Operator::And.evaluate(&[t, t, f]), Ok(f));
        assert_eq!(Operator::Or.evaluate(&[f, f, t]), Ok(t));
        assert_eq!(Operator::Xor.evaluate(&[t, t, t]), Ok(t));
        assert_eq!(Operator::Implies.evaluate(&[f, f]), Ok(t));
        assert_eq!(Operator::Ite.evaluate(&[f, Value::Int(1), Value::Int(2)]), Ok(Value::Int(2)));
    }

    #[test]
    fn test_evaluate_numeric() {
        assert_eq!(
            Operator::Add.evaluate(&[Value::Int(2), Value::Int(3), Value::Int(4)]),
            Ok(Value::Int(9))
        );
        assert_eq!(
            Operator::Add.evaluate(&[Value::Int(2), Value::Real(0.5)]),
            Ok(Value::Real(2.5))
        );
        assert_eq!(
            Operator::Max.evaluate(&[Value::Int(2), Value::Int(7), Value::Int(3)]),
            Ok(Value::Int(7))
        );
        assert_eq!(
            Operator::Mod.evaluate(&[Value::Int(-1), Value::Int(3)]),
            Ok(Value::Int(2))
        );
        assert_eq!(
            Operator::Lt.evaluate(&[Value::Int(1), Value::Real(1.5)]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            Operator::Ite.evaluate(&[Value::Bool(true), Value::Int(1), Value::Real(0.5)]),
            Ok(Value::Real(1.0))
        );
    }

    #[test]
    fn test_evaluate_errors() {
        assert!(matches!(
            Operator::Divide.evaluate(&[Value::Int(1), Value::Int(0)]),
            Err(DdError::Arithmetic(_))
        ));
        assert_eq!(
            Operator::DivideIgnoreZero.evaluate(&[Value::Int(1), Value::Int(0)]),
            Ok(Value::Real(0.0))
        );
        assert!(matches!(
            Operator::Add.evaluate(&[Value::Int(i64::MAX), Value::Int(1)]),
            Err(DdError::Arithmetic(_))
        ));
    }
}
