//! Backend-independent apply by Shannon expansion.
//!
//! Used whenever a backend reports through
//! [`Backend::can_apply`][crate::backend::Backend::can_apply] that it cannot
//! execute an operator natively. Works for any arity.

use std::collections::HashMap;

use log::debug;

use crate::backend::{NodeId, LEAF_REACHED};
use crate::context::Context;
use crate::error::Result;
use crate::operator::{coerce, Operator};
use crate::types::{Type, Value};
use crate::walker::Walker;

struct Expansion<'a> {
    ctx: &'a Context,
    slot: u8,
    op: Operator,
    ty: &'a Type,
    walkers: Vec<Walker<'a>>,
    /// Operand tuple to (retained) result.
    memo: HashMap<Vec<NodeId>, NodeId>,
}

/// Apply `op` to `operands` of backend `slot`. The result is retained.
pub(crate) fn apply(
    ctx: &Context,
    slot: u8,
    op: Operator,
    ty: &Type,
    operands: &[NodeId],
) -> Result<NodeId> {
    debug!("generic apply({}, {:?}) : {}", op, operands, ty);
    let mut expansion = Expansion {
        ctx,
        slot,
        op,
        ty,
        walkers: operands
            .iter()
            .map(|&id| Walker::from_raw(ctx, slot, id, true))
            .collect(),
        memo: HashMap::new(),
    };
    let result = expansion
        .rec()
        .map(|r| ctx.backend(slot).retain(r));

    let backend = ctx.backend(slot);
    let released = expansion
        .memo
        .into_values()
        .try_for_each(|r| backend.release(r));
    let result = result?;
    released?;
    Ok(result)
}

impl Expansion<'_> {
    fn rec(&mut self) -> Result<NodeId> {
        let key: Vec<NodeId> = self.walkers.iter().map(|w| w.node()).collect();
        if let Some(&r) = self.memo.get(&key) {
            return Ok(r);
        }

        let mut top = LEAF_REACHED;
        for w in &self.walkers {
            top = top.min(w.variable()?);
        }

        let res = if top == LEAF_REACHED {
            let values = self
                .walkers
                .iter()
                .map(|w| w.value())
                .collect::<Result<Vec<Value>>>()?;
            let value = coerce(self.op.evaluate(&values)?, self.ty);
            self.ctx.backend(self.slot).new_constant(&value)?
        } else {
            let high = self.branch(top, true)?;
            let low = self.branch(top, false)?;
            let x = self.ctx.variable_node(self.slot, top)?;
            self.ctx
                .apply_ids(self.slot, Operator::Ite, self.ty, &[x, high, low], false)?
        };
        self.memo.insert(key, res);
        Ok(res)
    }

    /// Move every operand with top variable `v` to one child, expand, and move back.
    fn branch(&mut self, v: u32, high: bool) -> Result<NodeId> {
        let mut moved = Vec::new();
        for (i, w) in self.walkers.iter_mut().enumerate() {
            if w.variable()? == v {
                if high {
                    w.high()?;
                } else {
                    w.low()?;
                }
                moved.push(i);
            }
        }
        let res = self.rec();
        for i in moved {
            self.walkers[i].back()?;
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::dd::Dd;
    use crate::options::DdOptions;

    fn context() -> Result<Context> {
        Context::new(
            DdOptions::default()
                .with_leak_check(true)
                .with_debug(true)
                .with_storage_bits(12),
        )
    }

    fn vars(ctx: &Context, n: usize) -> Result<Vec<Dd>> {
        (0..n)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect()
    }

    #[test]
    fn test_generic_matches_native_boolean() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 3)?;
        for op in [Operator::And, Operator::Or, Operator::Xor, Operator::Iff, Operator::Implies] {
            let native = ctx.apply(op, &[x[0], x[2]])?;
            let generic = ctx.apply_generic(op, &[x[0], x[2]])?;
            assert_eq!(native, generic, "{}", op);
            ctx.release_all(&[native, generic])?;
        }
        let native = ctx.apply(Operator::Ite, &[x[1], x[0], x[2]])?;
        let generic = ctx.apply_generic(Operator::Ite, &[x[1], x[0], x[2]])?;
        assert_eq!(native, generic);
        ctx.release_all(&[native, generic])?;
        ctx.close()
    }

    #[test]
    fn test_generic_matches_native_on_composite_boolean() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 5)?;
        // (x0 ∧ x1) ∨ x3, x2 ⊕ (x0 ∨ x4), ¬x1 ∧ x4
        let f = ctx.or_with(ctx.and(x[0], x[1])?, ctx.retain(x[3])?)?;
        let g = ctx.xor_with(ctx.retain(x[2])?, ctx.or(x[0], x[4])?)?;
        let h = ctx.and_with(ctx.not(x[1])?, ctx.retain(x[4])?)?;
        let dds = [f, g, h];

        let ops = [
            Operator::And,
            Operator::Or,
            Operator::Xor,
            Operator::Iff,
            Operator::Implies,
            Operator::Eq,
            Operator::Ne,
        ];
        for op in ops {
            for &a in &dds {
                for &b in &dds {
                    let native = ctx.apply(op, &[a, b])?;
                    let generic = ctx.apply_generic(op, &[a, b])?;
                    assert_eq!(native, generic, "{}({}, {})", op, a, b);
                    ctx.release_all(&[native, generic])?;
                }
            }
        }
        let native = ctx.apply(Operator::Ite, &[f, g, h])?;
        let generic = ctx.apply_generic(Operator::Ite, &[f, g, h])?;
        assert_eq!(native, generic);

        ctx.release_all(&[native, generic])?;
        ctx.release_all(&dds)?;
        ctx.close()
    }

    #[test]
    fn test_generic_matches_native_on_composite_integer() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 4)?;
        // 2·x0 + (x1 ∨ x3 ? 1 : -3)
        let a = {
            let x13 = ctx.or(x[1], x[3])?;
            let sum = ctx.add_with(ctx.to_mt(x[0], 2, 0)?, ctx.to_mt(x13, 1, -3)?);
            ctx.release(x13)?;
            sum?
        };
        // x2 ⊕ x3 ? (x0 ? 4 : 1) : 7
        let b = {
            let x23 = ctx.xor(x[2], x[3])?;
            let seven = ctx.new_constant(7)?;
            ctx.ite_with(x23, ctx.to_mt(x[0], 4, 1)?, seven)?
        };
        // x1 ? -2 : x2 ? 0 : 3
        let c = {
            let inner = ctx.to_mt(x[2], 0, 3)?;
            let minus_two = ctx.new_constant(-2)?;
            ctx.ite_with(ctx.retain(x[1])?, minus_two, inner)?
        };
        let dds = [a, b, c];

        let ops = [
            Operator::Add,
            Operator::Subtract,
            Operator::Multiply,
            Operator::Max,
            Operator::Min,
            Operator::Lt,
            Operator::Le,
            Operator::Gt,
            Operator::Ge,
            Operator::Eq,
            Operator::Ne,
        ];
        for op in ops {
            for &l in &dds {
                for &r in &dds {
                    let native = ctx.apply(op, &[l, r])?;
                    let generic = ctx.apply_generic(op, &[l, r])?;
                    assert_eq!(native, generic, "{}({}, {})", op, l, r);
                    if op.is_comparison() {
                        assert_eq!(native.slot(), ctx.binary_slot());
                    }
                    ctx.release_all(&[native, generic])?;
                }
            }
        }

        ctx.release_all(&dds)?;
        ctx.close()
    }

    #[test]
    fn test_generic_n_ary_and() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 5)?;
        let all = ctx.apply_generic(Operator::And, &x)?;

        let mut expected = ctx.new_true()?;
        for &xi in &x {
            let next = ctx.apply(Operator::And, &[expected, xi])?;
            ctx.release(expected)?;
            expected = next;
        }
        assert_eq!(all, expected);
        ctx.release_all(&[all, expected])?;
        ctx.close()
    }

    #[test]
    fn test_generic_n_ary_add_in_multi_backend() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 3)?;
        let ints = x
            .iter()
            .map(|&xi| ctx.to_int(xi))
            .collect::<Result<Vec<_>>>()?;

        // three-operand addition is never native in the multi-terminal engine
        let sum = ctx.apply(Operator::Add, &ints)?;
        let total = ctx.abstract_max(sum, x[0])?;
        let cube = ctx.apply(Operator::And, &[x[1], x[2]])?;
        let max = ctx.abstract_max(total, cube)?;
        assert_eq!(ctx.value(max)?, Value::Int(3));
        let min = ctx.abstract_min(sum, x[0])?;
        let min = {
            let r = ctx.abstract_min(min, cube)?;
            ctx.release(min)?;
            r
        };
        assert_eq!(ctx.value(min)?, Value::Int(0));

        ctx.release_all(&ints)?;
        ctx.release_all(&[sum, total, cube, max, min])?;
        ctx.close()
    }

    #[test]
    fn test_generic_comparison() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 1)?[0];
        let f = ctx.to_mt(x, 5, 2)?;
        let three = ctx.new_constant(3)?;
        let gt = ctx.apply_generic(Operator::Gt, &[f, three])?;
        assert_eq!(gt, x);
        ctx.release_all(&[f, three, gt])?;
        ctx.close()
    }
}
