//! Convenience wrappers over [`Context::apply`].
//!
//! Every operation comes in two flavours: the plain one leaves its operands
//! alone, the `..._with` one also releases them. The latter keeps the
//! bookkeeping of a nested expression local:
//!
//! ```
//! use symdd::context::Context;
//! use symdd::options::DdOptions;
//!
//! let ctx = Context::new(DdOptions::default().with_leak_check(true)).unwrap();
//! let x = ctx.variable(ctx.new_dd_variable().unwrap()).unwrap();
//! let y = ctx.variable(ctx.new_dd_variable().unwrap()).unwrap();
//!
//! // ¬(x ∧ y) ∨ x
//! let f = ctx.or_with(ctx.not_with(ctx.and(x, y).unwrap()).unwrap(), ctx.retain(x).unwrap()).unwrap();
//! assert!(ctx.is_true(f).unwrap());
//! ctx.release(f).unwrap();
//! ctx.close().unwrap();
//! ```

use log::debug;

use crate::context::Context;
use crate::dd::Dd;
use crate::error::Result;
use crate::operator::Operator;

impl Context {
    /// Release `operands` whatever the outcome of `res`, then return `res`.
    pub(crate) fn consume<T>(&self, operands: &[Dd], res: Result<T>) -> Result<T> {
        let released = self.release_all(operands);
        let res = res?;
        released?;
        Ok(res)
    }

    #[track_caller]
    pub fn not(&self, a: Dd) -> Result<Dd> {
        self.apply(Operator::Not, &[a])
    }

    #[track_caller]
    pub fn not_with(&self, a: Dd) -> Result<Dd> {
        self.consume(&[a], self.not(a))
    }

    #[track_caller]
    pub fn and(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::And, &[a, b])
    }

    #[track_caller]
    pub fn and_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.and(a, b))
    }

    #[track_caller]
    pub fn or(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Or, &[a, b])
    }

    #[track_caller]
    pub fn or_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.or(a, b))
    }

    #[track_caller]
    pub fn xor(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Xor, &[a, b])
    }

    #[track_caller]
    pub fn xor_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.xor(a, b))
    }

    #[track_caller]
    pub fn iff(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Iff, &[a, b])
    }

    #[track_caller]
    pub fn iff_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.iff(a, b))
    }

    #[track_caller]
    pub fn implies(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Implies, &[a, b])
    }

    #[track_caller]
    pub fn implies_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.implies(a, b))
    }

    #[track_caller]
    pub fn ite(&self, cond: Dd, then: Dd, other: Dd) -> Result<Dd> {
        self.apply(Operator::Ite, &[cond, then, other])
    }

    #[track_caller]
    pub fn ite_with(&self, cond: Dd, then: Dd, other: Dd) -> Result<Dd> {
        self.consume(&[cond, then, other], self.ite(cond, then, other))
    }

    #[track_caller]
    pub fn eq(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Eq, &[a, b])
    }

    #[track_caller]
    pub fn eq_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.eq(a, b))
    }

    #[track_caller]
    pub fn ne(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Ne, &[a, b])
    }

    #[track_caller]
    pub fn ne_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.ne(a, b))
    }

    #[track_caller]
    pub fn lt(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Lt, &[a, b])
    }

    #[track_caller]
    pub fn lt_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.lt(a, b))
    }

    #[track_caller]
    pub fn le(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Le, &[a, b])
    }

    #[track_caller]
    pub fn le_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.le(a, b))
    }

    #[track_caller]
    pub fn gt(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Gt, &[a, b])
    }

    #[track_caller]
    pub fn gt_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.gt(a, b))
    }

    #[track_caller]
    pub fn ge(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Ge, &[a, b])
    }

    #[track_caller]
    pub fn ge_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.ge(a, b))
    }

    #[track_caller]
    pub fn add(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Add, &[a, b])
    }

    #[track_caller]
    pub fn add_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.add(a, b))
    }

    #[track_caller]
    pub fn subtract(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Subtract, &[a, b])
    }

    #[track_caller]
    pub fn subtract_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.subtract(a, b))
    }

    #[track_caller]
    pub fn multiply(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Multiply, &[a, b])
    }

    #[track_caller]
    pub fn multiply_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.multiply(a, b))
    }

    #[track_caller]
    pub fn divide(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Divide, &[a, b])
    }

    #[track_caller]
    pub fn divide_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.divide(a, b))
    }

    #[track_caller]
    pub fn max(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Max, &[a, b])
    }

    #[track_caller]
    pub fn max_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.max(a, b))
    }

    #[track_caller]
    pub fn min(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.apply(Operator::Min, &[a, b])
    }

    #[track_caller]
    pub fn min_with(&self, a: Dd, b: Dd) -> Result<Dd> {
        self.consume(&[a, b], self.min(a, b))
    }

    #[track_caller]
    pub fn add_inverse(&self, a: Dd) -> Result<Dd> {
        self.apply(Operator::AddInverse, &[a])
    }

    #[track_caller]
    pub fn add_inverse_with(&self, a: Dd) -> Result<Dd> {
        self.consume(&[a], self.add_inverse(a))
    }

    /// Conjunction of all `dds`, true for an empty slice.
    #[track_caller]
    pub fn and_all(&self, dds: &[Dd]) -> Result<Dd> {
        debug!("and_all({} operands)", dds.len());
        if dds.is_empty() {
            return self.new_true();
        }
        self.apply(Operator::And, dds)
    }

    /// Disjunction of all `dds`, false for an empty slice.
    #[track_caller]
    pub fn or_all(&self, dds: &[Dd]) -> Result<Dd> {
        debug!("or_all({} operands)", dds.len());
        if dds.is_empty() {
            return self.new_false();
        }
        self.apply(Operator::Or, dds)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::DdError;
    use crate::options::DdOptions;
    use crate::types::Value;

    fn context() -> Result<Context> {
        Context::new(
            DdOptions::default()
                .with_leak_check(true)
                .with_storage_bits(12),
        )
    }

    #[test]
    fn test_consuming_chain() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let y = ctx.variable(ctx.new_dd_variable()?)?;

        // (x ⇒ y) ⇔ (¬x ∨ y)
        let lhs = ctx.implies(x, y)?;
        let rhs = ctx.or_with(ctx.not(x)?, ctx.retain(y)?)?;
        let same = ctx.iff_with(lhs, rhs)?;
        assert!(ctx.is_true(same)?);
        ctx.release(same)?;

        assert!(matches!(ctx.release(lhs), Err(DdError::DoubleRelease(_))));
        ctx.close()
    }

    #[test]
    fn test_arithmetic_wrappers() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let a = ctx.to_mt(x, 6, 2)?;
        let three = ctx.new_constant(3)?;

        let sum = ctx.add(a, three)?;
        let diff = ctx.subtract(sum, a)?;
        assert_eq!(ctx.value(diff)?, Value::Int(3));

        let prod = ctx.multiply(a, three)?;
        let big = ctx.gt(prod, sum)?;
        assert!(ctx.is_true(big)?);

        let neg = ctx.add_inverse(a)?;
        let zero = ctx.add_with(neg, ctx.retain(a)?)?;
        assert_eq!(ctx.value(zero)?, Value::Int(0));

        let m = ctx.max_with(ctx.retain(a)?, ctx.retain(three)?)?;
        let lo = ctx.min(m, three)?;
        assert_eq!(ctx.value(lo)?, Value::Int(3));

        ctx.release_all(&[a, three, sum, diff, prod, big, zero, m, lo])?;
        ctx.close()
    }

    #[test]
    fn test_and_all_or_all() -> Result<()> {
        let ctx = context()?;
        let x: Vec<Dd> = (0..3)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect::<Result<_>>()?;
        let t = ctx.and_all(&[])?;
        let f = ctx.or_all(&[])?;
        assert!(ctx.is_true(t)?);
        assert!(ctx.is_false(f)?);

        let all = ctx.and_all(&x)?;
        let any = ctx.or_all(&x)?;
        assert!(ctx.is_subset(all, any)?);

        ctx.release_all(&[t, f, all, any])?;
        ctx.close()
    }
}
