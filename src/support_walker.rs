//! Explicit, array-based view of a diagram over a fixed support.
//!
//! Walking a diagram symbolically costs a backend lookup per step. Algorithms
//! that explore the same diagram over and over (once per explored state, say)
//! can instead build a [`SupportWalker`] once: it enumerates every reachable
//! pair of diagram node and support position, gives each a dense index, and
//! stores the resulting graph as plain records. Traversal is then a matter of
//! array indexing.
//!
//! Descending always consumes one support variable, also where the diagram
//! does not depend on it. Leaves whose value is in the stop set end the walk
//! early, regardless of the remaining support.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use log::debug;

use crate::backend::{cofactors, Backend, NodeId, LEAF_REACHED};
use crate::context::Context;
use crate::dd::Dd;
use crate::error::{DdError, Result};
use crate::permutation::Permutation;
use crate::types::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Record {
    Inner { low: usize, high: usize },
    /// Index into the value table.
    Leaf(usize),
}

#[derive(Debug)]
struct Graph {
    records: Vec<Record>,
    /// Support position of each record.
    depths: Vec<usize>,
    values: Vec<Value>,
}

impl Graph {
    fn value_index(&self, value: &Value) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

/// Cursor over a compacted graph. Cloning is cheap; the graph is shared.
#[derive(Debug, Clone)]
pub struct SupportWalker {
    graph: Rc<Graph>,
    support: Vec<u32>,
    true_index: Option<usize>,
    false_index: Option<usize>,
    zero_index: Option<usize>,
    index: usize,
    back: Vec<usize>,
}

struct Builder<'a> {
    backend: &'a dyn Backend,
    support: Vec<u32>,
    stops: &'a [Value],
    memo: HashMap<(NodeId, usize), usize>,
    /// Enumerated pairs, in index order.
    order: Vec<(NodeId, usize)>,
}

impl Builder<'_> {
    fn is_stop(&self, node: NodeId) -> Result<bool> {
        if !self.backend.is_leaf(node) {
            return Ok(false);
        }
        let value = self.backend.value(node)?;
        Ok(self.stops.contains(&value))
    }

    /// Successors of `(node, depth)`, `None` for a leaf record.
    fn successors(&self, node: NodeId, depth: usize) -> Result<Option<(NodeId, NodeId)>> {
        let b = self.backend;
        if depth == self.support.len() || self.is_stop(node)? {
            if !b.is_leaf(node) {
                return Err(DdError::NotInSupport(b.variable(node)));
            }
            return Ok(None);
        }
        let var = b.variable(node);
        let v = self.support[depth];
        if var < v {
            return Err(DdError::NotInSupport(var));
        }
        if var == v {
            Ok(Some(cofactors(b, node)))
        } else {
            Ok(Some((node, node)))
        }
    }

    fn enumerate(&mut self, node: NodeId, depth: usize) -> Result<()> {
        if self.memo.contains_key(&(node, depth)) {
            return Ok(());
        }
        self.memo.insert((node, depth), self.order.len());
        self.order.push((node, depth));
        if let Some((low, high)) = self.successors(node, depth)? {
            self.enumerate(low, depth + 1)?;
            self.enumerate(high, depth + 1)?;
        }
        Ok(())
    }

    fn build(self) -> Result<Graph> {
        let mut records = Vec::with_capacity(self.order.len());
        let mut depths = Vec::with_capacity(self.order.len());
        let mut values: Vec<Value> = Vec::new();
        for &(node, depth) in &self.order {
            let record = match self.successors(node, depth)? {
                Some((low, high)) => Record::Inner {
                    low: self.memo[&(low, depth + 1)],
                    high: self.memo[&(high, depth + 1)],
                },
                None => {
                    let value = self.backend.value(node)?;
                    let index = match values.iter().position(|v| *v == value) {
                        Some(i) => i,
                        None => {
                            values.push(value);
                            values.len() - 1
                        }
                    };
                    Record::Leaf(index)
                }
            };
            records.push(record);
            depths.push(depth);
        }
        Ok(Graph {
            records,
            depths,
            values,
        })
    }
}

impl Context {
    /// Support walker stopping early at `false` and `0` leaves.
    pub fn support_walker(&self, dd: Dd, support: Dd) -> Result<SupportWalker> {
        self.support_walker_with_stops(dd, support, &[Value::Bool(false), Value::Int(0)])
    }

    pub fn support_walker_with_stops(
        &self,
        dd: Dd,
        support: Dd,
        stops: &[Value],
    ) -> Result<SupportWalker> {
        self.check(dd)?;
        let support = self.cube_to_list(support)?;
        let mut builder = Builder {
            backend: self.backend(dd.slot),
            support: support.clone(),
            stops,
            memo: HashMap::new(),
            order: Vec::new(),
        };
        builder.enumerate(dd.id, 0)?;
        let graph = builder.build()?;
        debug!(
            "support_walker(dd = {}, support = {:?}) -> {} records, {} values",
            dd,
            support,
            graph.records.len(),
            graph.values.len()
        );
        Ok(SupportWalker::new(Rc::new(graph), support))
    }
}

impl SupportWalker {
    fn new(graph: Rc<Graph>, support: Vec<u32>) -> Self {
        Self {
            true_index: graph.value_index(&Value::Bool(true)),
            false_index: graph.value_index(&Value::Bool(false)),
            zero_index: graph.values.iter().position(Value::is_zero),
            graph,
            support,
            index: 0,
            back: Vec::new(),
        }
    }

    /// Same graph, support variables renamed by `permutation`.
    pub fn permute(&self, permutation: &Permutation) -> SupportWalker {
        let support = self
            .support
            .iter()
            .map(|&v| permutation.get_permuted(v))
            .collect();
        SupportWalker::new(Rc::clone(&self.graph), support)
    }

    fn record(&self) -> Record {
        self.graph.records[self.index]
    }

    pub fn num_records(&self) -> usize {
        self.graph.records.len()
    }

    pub fn support(&self) -> &[u32] {
        &self.support
    }

    pub fn depth(&self) -> usize {
        self.graph.depths[self.index]
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.record(), Record::Leaf(_))
    }

    pub fn value(&self) -> Result<Value> {
        match self.record() {
            Record::Leaf(i) => Ok(self.graph.values[i]),
            Record::Inner { .. } => Err(DdError::NotALeaf),
        }
    }

    fn is_value(&self, index: Option<usize>) -> bool {
        match self.record() {
            Record::Leaf(i) => Some(i) == index,
            Record::Inner { .. } => false,
        }
    }

    pub fn is_true(&self) -> bool {
        self.is_value(self.true_index)
    }

    pub fn is_false(&self) -> bool {
        self.is_value(self.false_index)
    }

    pub fn is_zero(&self) -> bool {
        self.is_value(self.zero_index)
    }

    /// Support variable decided at the current position, [`LEAF_REACHED`] at a leaf.
    pub fn variable(&self) -> u32 {
        if self.is_leaf() {
            LEAF_REACHED
        } else {
            self.support[self.depth()]
        }
    }

    pub fn low(&mut self) -> Result<()> {
        match self.record() {
            Record::Inner { low, .. } => {
                self.back.push(self.index);
                self.index = low;
                Ok(())
            }
            Record::Leaf(_) => Err(DdError::WalkerAtLeaf),
        }
    }

    pub fn high(&mut self) -> Result<()> {
        match self.record() {
            Record::Inner { high, .. } => {
                self.back.push(self.index);
                self.index = high;
                Ok(())
            }
            Record::Leaf(_) => Err(DdError::WalkerAtLeaf),
        }
    }

    pub fn back(&mut self) -> Result<()> {
        self.index = self.back.pop().ok_or(DdError::WalkerAtRoot)?;
        Ok(())
    }

    /// Back to the root.
    pub fn reset(&mut self) {
        self.index = 0;
        self.back.clear();
    }

    /// Render the compacted graph in DOT format.
    pub fn to_dot(&self) -> Result<String> {
        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        for (i, record) in self.graph.records.iter().enumerate() {
            match *record {
                Record::Leaf(v) => {
                    let value = self.graph.values[v];
                    writeln!(
                        dot,
                        "{} [shape=box, label=\"{}: {}\"];",
                        i,
                        value,
                        value.type_()
                    )?;
                }
                Record::Inner { low, high } => {
                    let var = self.support[self.graph.depths[i]];
                    writeln!(dot, "{} [shape=circle, label=\"x{}\"];", i, var)?;
                    writeln!(dot, "{} -> {} [style=dashed];", i, low)?;
                    writeln!(dot, "{} -> {} [style=solid];", i, high)?;
                }
            }
        }
        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::operator::Operator;
    use crate::options::DdOptions;
    use crate::walker::Walker;

    fn context() -> Result<Context> {
        Context::new(
            DdOptions::default()
                .with_leak_check(true)
                .with_debug(true)
                .with_storage_bits(12),
        )
    }

    /// Value of `walker`'s diagram under `assignment`, read with a plain walker.
    fn evaluate(walker: &mut Walker<'_>, assignment: &[bool]) -> Result<Value> {
        let mut steps = 0;
        while !walker.is_leaf()? {
            if assignment[walker.variable()? as usize] {
                walker.high()?;
            } else {
                walker.low()?;
            }
            steps += 1;
        }
        let value = walker.value()?;
        for _ in 0..steps {
            walker.back()?;
        }
        Ok(value)
    }

    #[test]
    fn test_matches_plain_walker() -> Result<()> {
        let ctx = context()?;
        let n = ctx.new_integer_variable("n", 0, 5, 1)?;
        let enc = n.value_encoding(&ctx, 0)?;
        let b = ctx.new_boolean_variable("b", 1)?;
        let bx = b.dd_variables(0)?[0];
        let bint = ctx.to_int(bx)?;
        let f = ctx.apply(Operator::Multiply, &[enc, bint])?;
        let support = ctx.support_dd(f)?;
        let vars = ctx.cube_to_list(support)?;

        // no stop values: every path runs through the whole support
        let mut sw = ctx.support_walker_with_stops(f, support, &[])?;
        let mut w = ctx.walker(f)?;
        for code in 0..(1u32 << vars.len()) {
            let mut assignment = vec![false; ctx.num_variables() as usize];
            sw.reset();
            for (i, &v) in vars.iter().enumerate() {
                assignment[v as usize] = code >> i & 1 == 1;
                assert_eq!(sw.variable(), v);
                if assignment[v as usize] {
                    sw.high()?;
                } else {
                    sw.low()?;
                }
            }
            assert!(sw.is_leaf());
            assert_eq!(sw.value()?, evaluate(&mut w, &assignment)?);
        }

        ctx.release_all(&[enc, bint, f, support])?;
        ctx.close()
    }

    #[test]
    fn test_stop_values() -> Result<()> {
        let ctx = context()?;
        let x: Vec<Dd> = (0..3)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect::<Result<_>>()?;
        let f = ctx.apply(Operator::And, &[x[0], x[2]])?;
        let support = ctx.list_to_cube(&x)?;

        let mut sw = ctx.support_walker(f, support)?;
        assert_eq!(sw.variable(), 0);
        sw.low()?;
        assert!(sw.is_false());
        assert_eq!(sw.low(), Err(DdError::WalkerAtLeaf));
        sw.back()?;

        // x1 is not in the diagram, yet it is a step of the walk
        sw.high()?;
        assert_eq!(sw.variable(), 1);
        assert_eq!(sw.depth(), 1);
        sw.low()?;
        sw.high()?;
        assert!(sw.is_true());
        assert_eq!(sw.variable(), LEAF_REACHED);
        sw.back()?;
        sw.back()?;
        sw.high()?;
        sw.low()?;
        assert!(sw.is_false());

        sw.reset();
        assert_eq!(sw.back(), Err(DdError::WalkerAtRoot));

        ctx.release_all(&[f, support])?;
        ctx.close()
    }

    #[test]
    fn test_not_in_support() -> Result<()> {
        let ctx = context()?;
        let x: Vec<Dd> = (0..2)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect::<Result<_>>()?;
        let f = ctx.apply(Operator::Or, &[x[0], x[1]])?;
        assert!(matches!(
            ctx.support_walker(f, x[1]),
            Err(DdError::NotInSupport(0))
        ));
        assert!(matches!(
            ctx.support_walker(f, x[0]),
            Err(DdError::NotInSupport(1))
        ));
        ctx.release(f)?;
        ctx.close()
    }

    #[test]
    fn test_permute_shares_graph() -> Result<()> {
        let ctx = context()?;
        let x: Vec<Dd> = (0..2)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect::<Result<_>>()?;
        let sw = ctx.support_walker(x[0], x[0])?;
        let p = ctx.new_permutation(&[1, 0])?;
        let mut moved = sw.permute(&p);
        assert_eq!(moved.variable(), 1);
        assert_eq!(moved.num_records(), sw.num_records());
        moved.high()?;
        assert!(moved.is_true());
        ctx.close()
    }

    #[test]
    fn test_to_dot() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let f = ctx.to_int(x)?;
        let sw = ctx.support_walker_with_stops(f, x, &[])?;
        let dot = sw.to_dot()?;
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("shape=box"));
        assert!(dot.contains("style=dashed"));
        assert!(!sw.is_zero());
        ctx.release(f)?;
        ctx.close()
    }
}
