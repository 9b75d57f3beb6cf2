//! Typed variables encoded in diagram variables.
//!
//! A [`VariableDd`] represents a variable over a finite domain (booleans,
//! bounded integers, enumerations) by a block of boolean diagram variables per
//! copy. Copies are typically used for the present and next state of a
//! transition system. Variables of all copies are interleaved bit by bit, so
//! that the diagrams relating copies stay small.
//!
//! Integer values are encoded by their offset to the lower bound, enumerable
//! values by their ordinal, least-significant bit first.

use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::panic::Location;
use std::rc::Rc;

use log::debug;

use crate::context::Context;
use crate::dd::Dd;
use crate::error::{DdError, Result};
use crate::operator::Operator;
use crate::types::{Type, Value};

#[derive(Debug)]
pub struct VariableDd {
    context: u32,
    name: String,
    ty: Type,
    bits: u32,
    copies: usize,
    /// `variables[copy][bit]`, owned by the context.
    variables: Vec<Vec<Dd>>,
    indices: Vec<Vec<u32>>,
    encodings: RefCell<Vec<Option<Dd>>>,
}

/// Widest encoding of a single copy; codes must fit a non-negative `i64`.
const MAX_BITS: u32 = 63;

/// Number of bits needed to distinguish `num_values` values.
fn bits_for(num_values: u64) -> u32 {
    if num_values <= 1 {
        0
    } else {
        64 - (num_values - 1).leading_zeros()
    }
}

impl Context {
    /// Create a typed variable with `copies` copies.
    pub fn new_variable(&self, name: &str, ty: Type, copies: usize) -> Result<Rc<VariableDd>> {
        self.check_open()?;
        let num_values = match ty {
            Type::Real => {
                return Err(DdError::TypeMismatch(format!(
                    "variable '{}' of type real cannot be encoded",
                    name
                )))
            }
            Type::Integer { lower, upper } if lower.is_none() || upper.is_none() => {
                return Err(DdError::UnboundedInteger(name.to_string()))
            }
            Type::Integer {
                lower: Some(l),
                upper: Some(u),
            } if l <= u && ty.num_values().is_none() => {
                return Err(DdError::DomainTooLarge {
                    name: name.to_string(),
                    bits: 64,
                })
            }
            _ => ty.num_values().ok_or_else(|| DdError::ValueOutOfDomain {
                name: name.to_string(),
                value: format!("empty domain {}", ty),
            })?,
        };
        let bits = if ty.is_boolean() { 1 } else { bits_for(num_values) };
        if bits > MAX_BITS {
            return Err(DdError::DomainTooLarge {
                name: name.to_string(),
                bits,
            });
        }
        // The arithmetic decoding reaches lower + 2^bits - 1
        if let Type::Integer { lower: Some(l), .. } = ty {
            if l as i128 + ((1i128 << bits) - 1) > i64::MAX as i128 {
                return Err(DdError::DomainTooLarge {
                    name: name.to_string(),
                    bits,
                });
            }
        }

        let limit = self.backend(self.binary_slot()).max_variables();
        let needed = bits as u64 * copies as u64;
        if needed + self.num_variables() as u64 > limit as u64 {
            return Err(DdError::DomainTooLarge {
                name: name.to_string(),
                bits,
            });
        }

        let mut variables = vec![Vec::with_capacity(bits as usize); copies];
        let mut indices = vec![Vec::with_capacity(bits as usize); copies];
        for bit in 0..bits {
            for copy in 0..copies {
                let index = self.new_dd_variable()?;
                if ty.is_boolean() {
                    self.set_variable_name(index, format!("{}_{}", name, copy));
                } else {
                    self.set_variable_name(index, format!("{}_{}_{}", name, bit, copy));
                }
                variables[copy].push(self.variable(index)?);
                indices[copy].push(index);
            }
        }
        debug!(
            "new_variable({}, {}, {}) -> {} bit(s) per copy",
            name, ty, copies, bits
        );

        let variable = Rc::new(VariableDd {
            context: self.id(),
            name: name.to_string(),
            ty,
            bits,
            copies,
            variables,
            indices,
            encodings: RefCell::new(vec![None; copies]),
        });
        self.register_variable(Rc::clone(&variable));
        Ok(variable)
    }

    pub fn new_boolean_variable(&self, name: &str, copies: usize) -> Result<Rc<VariableDd>> {
        self.new_variable(name, Type::Boolean, copies)
    }

    pub fn new_integer_variable(
        &self,
        name: &str,
        lower: i64,
        upper: i64,
        copies: usize,
    ) -> Result<Rc<VariableDd>> {
        self.new_variable(name, Type::bounded(lower, upper), copies)
    }
}

impl Display for VariableDd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({} copies)", self.name, self.ty, self.copies)
    }
}

impl VariableDd {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_(&self) -> &Type {
        &self.ty
    }

    /// Diagram variables per copy.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn num_copies(&self) -> usize {
        self.copies
    }

    fn check_copy(&self, copy: usize) -> Result<()> {
        if copy >= self.copies {
            return Err(DdError::UnknownCopy {
                name: self.name.clone(),
                copy,
            });
        }
        Ok(())
    }

    fn check_context(&self, ctx: &Context) -> Result<()> {
        ctx.check_open()?;
        if ctx.id() != self.context {
            return Err(DdError::ContextMismatch {
                expected: ctx.id(),
                found: self.context,
            });
        }
        Ok(())
    }

    /// Diagram variables of `copy`, least-significant bit first.
    ///
    /// The handles are owned by the context and must not be released.
    pub fn dd_variables(&self, copy: usize) -> Result<&[Dd]> {
        self.check_copy(copy)?;
        Ok(&self.variables[copy])
    }

    /// Indices of the diagram variables of `copy`.
    pub fn dd_variable_indices(&self, copy: usize) -> Result<&[u32]> {
        self.check_copy(copy)?;
        Ok(&self.indices[copy])
    }

    /// Whether diagram variable `index` belongs to any copy of this variable.
    pub fn contains_index(&self, index: u32) -> bool {
        self.indices.iter().any(|copy| copy.contains(&index))
    }

    /// Binary code of `value`.
    pub fn ordinal(&self, value: &Value) -> Result<u64> {
        if !self.ty.contains(value) {
            return Err(DdError::ValueOutOfDomain {
                name: self.name.clone(),
                value: value.to_string(),
            });
        }
        match (self.ty, value) {
            (Type::Boolean, Value::Bool(b)) => Ok(*b as u64),
            (Type::Integer { lower: Some(l), .. }, Value::Int(i)) => Ok((*i as i128 - l as i128) as u64),
            (Type::Enumerable { .. }, Value::Enum { ordinal, .. }) => Ok(*ordinal as u64),
            _ => Err(DdError::ValueOutOfDomain {
                name: self.name.clone(),
                value: value.to_string(),
            }),
        }
    }

    /// Value represented by `code`, if it is a legal code.
    pub fn value_of(&self, code: u64) -> Option<Value> {
        if code >= self.ty.num_values()? {
            return None;
        }
        match self.ty {
            Type::Boolean => Some(Value::Bool(code == 1)),
            Type::Integer { lower: Some(l), .. } => Some(Value::Int(l + code as i64)),
            Type::Enumerable { size } => Some(Value::Enum {
                ordinal: code as u32,
                size,
            }),
            _ => None,
        }
    }

    /// The conjunction of literals over `copy` that matches `code`.
    #[track_caller]
    fn code_cube(&self, ctx: &Context, copy: usize, code: u64) -> Result<Dd> {
        let mut cube = ctx.new_true()?;
        for (bit, &x) in self.variables[copy].iter().enumerate().rev() {
            let literal = if code >> bit & 1 == 1 {
                ctx.retain(x)?
            } else {
                ctx.apply(Operator::Not, &[x])?
            };
            let next = ctx.apply(Operator::And, &[literal, cube]);
            ctx.release(literal)?;
            ctx.release(cube)?;
            cube = next?;
        }
        Ok(cube)
    }

    /// The cube of assignments to `copy` that encode `value`.
    #[track_caller]
    pub fn new_variable_value(&self, ctx: &Context, copy: usize, value: impl Into<Value>) -> Result<Dd> {
        self.check_context(ctx)?;
        self.check_copy(copy)?;
        let code = self.ordinal(&value.into())?;
        self.code_cube(ctx, copy, code)
    }

    /// Conjunction of all diagram variables of `copy`.
    #[track_caller]
    pub fn new_cube(&self, ctx: &Context, copy: usize) -> Result<Dd> {
        self.check_context(ctx)?;
        self.check_copy(copy)?;
        ctx.list_to_cube(&self.variables[copy])
    }

    /// `copy1 == copy2`, bit by bit.
    #[track_caller]
    pub fn new_eq_copies(&self, ctx: &Context, copy1: usize, copy2: usize) -> Result<Dd> {
        self.check_context(ctx)?;
        self.check_copy(copy1)?;
        self.check_copy(copy2)?;
        let mut res = ctx.new_true()?;
        for (&a, &b) in self.variables[copy1].iter().zip(&self.variables[copy2]).rev() {
            let iff = ctx.apply(Operator::Iff, &[a, b])?;
            let next = ctx.apply(Operator::And, &[iff, res]);
            ctx.release(iff)?;
            ctx.release(res)?;
            res = next?;
        }
        Ok(res)
    }

    /// The assignments to `copy` that encode some value of the domain.
    #[track_caller]
    pub fn new_valid_values(&self, ctx: &Context, copy: usize) -> Result<Dd> {
        self.check_context(ctx)?;
        self.check_copy(copy)?;
        let num_values = self.ty.num_values().unwrap_or(0);
        if num_values >= 1 << self.bits {
            return ctx.new_true();
        }

        // code < num_values, scanning from the least-significant bit
        let mut less = ctx.new_false()?;
        for (bit, &x) in self.variables[copy].iter().enumerate() {
            let not_x = ctx.apply(Operator::Not, &[x])?;
            let op = if num_values >> bit & 1 == 1 {
                Operator::Or
            } else {
                Operator::And
            };
            let next = ctx.apply(op, &[not_x, less]);
            ctx.release(not_x)?;
            ctx.release(less)?;
            less = next?;
        }
        Ok(less)
    }

    /// Diagram mapping each assignment of `copy` to the value it encodes.
    ///
    /// Integers are decoded arithmetically, so unused codes map above the upper
    /// bound. Unused codes of an enumeration map to its last value. The
    /// encoding is memoized; the returned handle is a new owned reference.
    #[track_caller]
    pub fn value_encoding(&self, ctx: &Context, copy: usize) -> Result<Dd> {
        let location = Location::caller();
        self.check_context(ctx)?;
        self.check_copy(copy)?;
        let memo = self.encodings.borrow()[copy];
        let encoding = match memo {
            Some(dd) => dd,
            None => {
                let dd = self.build_encoding(ctx, copy)?;
                self.encodings.borrow_mut()[copy] = Some(dd);
                dd
            }
        };
        let id = ctx.backend(encoding.slot()).retain(encoding.id());
        Ok(ctx.own(encoding.slot(), id, location))
    }

    fn build_encoding(&self, ctx: &Context, copy: usize) -> Result<Dd> {
        let vars = &self.variables[copy];
        match self.ty {
            Type::Boolean => ctx.retain(vars[0]),
            Type::Integer { lower: Some(lower), .. } => {
                let mut enc = ctx.new_constant(lower)?;
                let zero = ctx.new_constant(0)?;
                for (bit, &x) in vars.iter().enumerate() {
                    let weight = ctx.new_constant(1i64 << bit)?;
                    let term = ctx.apply(Operator::Ite, &[x, weight, zero]);
                    ctx.release(weight)?;
                    let term = term?;
                    let next = ctx.apply(Operator::Add, &[enc, term]);
                    ctx.release(term)?;
                    ctx.release(enc)?;
                    enc = next?;
                }
                ctx.release(zero)?;
                Ok(enc)
            }
            Type::Enumerable { size } => {
                let mut enc = ctx.new_constant(Value::Enum {
                    ordinal: size.saturating_sub(1),
                    size,
                })?;
                for ordinal in (0..size.saturating_sub(1)).rev() {
                    let cube = self.code_cube(ctx, copy, ordinal as u64)?;
                    let leaf = ctx.new_constant(Value::Enum { ordinal, size })?;
                    let next = ctx.apply(Operator::Ite, &[cube, leaf, enc]);
                    ctx.release_all(&[cube, leaf, enc])?;
                    enc = next?;
                }
                Ok(enc)
            }
            _ => Err(DdError::TypeMismatch(format!(
                "no encoding for variable '{}' of type {}",
                self.name, self.ty
            ))),
        }
    }

    pub(crate) fn release_encodings(&self, ctx: &Context) -> Result<()> {
        let encodings: Vec<Dd> = self.encodings.borrow_mut().iter_mut().filter_map(Option::take).collect();
        ctx.release_all(&encodings)
    }
}
