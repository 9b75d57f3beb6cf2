//! Cursor over the nodes of a single diagram.

use crate::backend::{Backend, NodeId};
use crate::context::Context;
use crate::dd::Dd;
use crate::error::{DdError, Result};
use crate::types::Value;

/// A cursor over the subtree of one diagram.
///
/// The walker does not own the diagram: the handle it was created from must
/// stay alive while the walker is in use. With auto-complement on (the
/// default), complement marks are pushed down while descending, so that every
/// leaf reports the value of the function along the walked path.
///
/// A walker becomes stale as soon as its context invalidates walkers (see
/// [`Context::set_allow_reorder`]). Every operation on a stale walker fails
/// with [`DdError::WalkerInvalidated`].
pub struct Walker<'a> {
    ctx: &'a Context,
    slot: u8,
    generation: u64,
    auto_complement: bool,
    current: NodeId,
    stack: Vec<NodeId>,
}

impl Context {
    pub fn walker(&self, dd: Dd) -> Result<Walker<'_>> {
        self.walker_with(dd, true)
    }

    pub fn walker_with(&self, dd: Dd, auto_complement: bool) -> Result<Walker<'_>> {
        self.check(dd)?;
        Ok(Walker::from_raw(self, dd.slot, dd.id, auto_complement))
    }
}

impl<'a> Walker<'a> {
    pub(crate) fn from_raw(ctx: &'a Context, slot: u8, id: NodeId, auto_complement: bool) -> Self {
        let auto_complement = auto_complement && ctx.backend(slot).has_inverter_arcs();
        Self {
            ctx,
            slot,
            generation: ctx.generation(),
            auto_complement,
            current: id,
            stack: Vec::new(),
        }
    }

    fn backend(&self) -> Result<&'a dyn Backend> {
        self.ctx.check_open()?;
        if self.generation != self.ctx.generation() {
            return Err(DdError::WalkerInvalidated);
        }
        Ok(self.ctx.backend(self.slot))
    }

    fn descend(&mut self, high: bool) -> Result<()> {
        let b = self.backend()?;
        if b.is_leaf(self.current) {
            return Err(DdError::WalkerAtLeaf);
        }
        let mut child = if high {
            b.walker_high(self.current)
        } else {
            b.walker_low(self.current)
        };
        if self.auto_complement && b.is_complement(self.current) {
            child = b.walker_complement(child);
        }
        self.stack.push(self.current);
        self.current = child;
        Ok(())
    }

    pub fn low(&mut self) -> Result<()> {
        self.descend(false)
    }

    pub fn high(&mut self) -> Result<()> {
        self.descend(true)
    }

    /// Return to the parent of the current node.
    pub fn back(&mut self) -> Result<()> {
        self.backend()?;
        self.current = self.stack.pop().ok_or(DdError::WalkerAtRoot)?;
        Ok(())
    }

    pub fn is_leaf(&self) -> Result<bool> {
        Ok(self.backend()?.is_leaf(self.current))
    }

    pub fn value(&self) -> Result<Value> {
        let b = self.backend()?;
        if !b.is_leaf(self.current) {
            return Err(DdError::NotALeaf);
        }
        b.value(self.current)
    }

    pub fn variable(&self) -> Result<u32> {
        Ok(self.backend()?.variable(self.current))
    }

    pub fn is_true(&self) -> Result<bool> {
        Ok(self.is_leaf()? && self.value()?.is_true())
    }

    pub fn is_false(&self) -> Result<bool> {
        Ok(self.is_leaf()? && self.value()?.is_false())
    }

    pub fn is_zero(&self) -> Result<bool> {
        Ok(self.is_leaf()? && self.value()?.is_zero())
    }

    pub fn is_complement(&self) -> Result<bool> {
        Ok(self.backend()?.is_complement(self.current))
    }

    /// Drop a complement mark from the current node.
    pub fn regular(&mut self) -> Result<()> {
        self.current = self.backend()?.walker_regular(self.current);
        Ok(())
    }

    /// Flip the complement mark of the current node.
    pub fn complement(&mut self) -> Result<()> {
        self.current = self.backend()?.walker_complement(self.current);
        Ok(())
    }

    pub fn unique_id(&self) -> u64 {
        crate::utils::pairing2(self.slot as u64, self.current)
    }

    pub(crate) fn node(&self) -> NodeId {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::operator::Operator;
    use crate::options::DdOptions;

    fn context() -> Result<Context> {
        Context::new(
            DdOptions::default()
                .with_leak_check(true)
                .with_storage_bits(10),
        )
    }

    #[test]
    fn test_walk_conjunction() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let y = ctx.variable(ctx.new_dd_variable()?)?;
        let f = ctx.apply(Operator::And, &[x, y])?;

        let mut w = ctx.walker(f)?;
        assert_eq!(w.variable()?, 0);
        w.low()?;
        assert!(w.is_false()?);
        w.back()?;
        w.high()?;
        assert_eq!(w.variable()?, 1);
        w.high()?;
        assert!(w.is_true()?);
        assert_eq!(w.depth(), 2);
        assert_eq!(w.low(), Err(DdError::WalkerAtLeaf));
        w.back()?;
        w.back()?;
        assert_eq!(w.back(), Err(DdError::WalkerAtRoot));

        ctx.release(f)?;
        ctx.close()
    }

    #[test]
    fn test_auto_complement() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let not_x = ctx.apply(Operator::Not, &[x])?;
        assert!(ctx.is_complement(not_x)?);

        let mut w = ctx.walker(not_x)?;
        w.high()?;
        assert!(w.is_false()?);

        let mut raw = ctx.walker_with(not_x, false)?;
        raw.high()?;
        assert!(raw.is_true()?);

        ctx.release(not_x)?;
        ctx.close()
    }

    #[test]
    fn test_value_of_inner_node() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let w = ctx.walker(x)?;
        assert_eq!(w.value(), Err(DdError::NotALeaf));
        ctx.close()
    }

    #[test]
    fn test_reorder_invalidates() -> Result<()> {
        let ctx = context()?;
        ctx.set_allow_reorder(true);
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let y = ctx.variable(ctx.new_dd_variable()?)?;

        let mut w = ctx.walker(x)?;
        let f = ctx.apply(Operator::Or, &[x, y])?;
        assert_eq!(w.high(), Err(DdError::WalkerInvalidated));

        ctx.set_allow_reorder(false);
        let mut w = ctx.walker(f)?;
        let g = ctx.apply(Operator::And, &[x, y])?;
        w.high()?;
        ctx.reorder()?;
        assert_eq!(w.back(), Err(DdError::WalkerInvalidated));

        ctx.release_all(&[f, g])?;
        ctx.close()
    }
}
