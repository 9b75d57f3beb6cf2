//! Multi-terminal decision diagrams.
//!
//! Leaves carry arbitrary [`Value`]s and are hash-consed in the same unique
//! table as inner nodes. There are no complement edges, so negation is an
//! ordinary apply. Variables are stored with their global (0-based) index.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use log::debug;

use crate::backend::{
    Backend, BackendStats, NodeId, PermutationId, Permutations, RefCounts, LEAF_REACHED,
};
use crate::cache::Cache;
use crate::error::{DdError, Result};
use crate::operator::{Arity, Operator};
use crate::reference::Ref;
use crate::table::Table;
use crate::types::{Type, Value};
use crate::utils::{pairing2, pairing3, MyHash};

pub const IDENTIFIER: &str = "mtbdd";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum MtNode {
    Leaf(Value),
    Inner { variable: u32, low: Ref, high: Ref },
}

impl Default for MtNode {
    fn default() -> Self {
        MtNode::Inner {
            variable: 0,
            low: Ref::INVALID,
            high: Ref::INVALID,
        }
    }
}

impl MyHash for MtNode {
    fn hash(&self) -> u64 {
        match self {
            MtNode::Leaf(value) => pairing2(0, MyHash::hash(value)),
            MtNode::Inner {
                variable,
                low,
                high,
            } => pairing2(
                1,
                pairing3(*variable as u64, low.raw() as u64, high.raw() as u64),
            ),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum OpKey {
    Apply(Operator, u8, [Ref; 3]),
    Abstract(Operator, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Apply(op, n, [a, b, c]) => pairing3(
                pairing2(op as u64, n as u64),
                pairing2(a.raw() as u64, b.raw() as u64),
                c.raw() as u64,
            ),
            OpKey::Abstract(op, f, c) => pairing3(
                pairing2(op as u64, u8::MAX as u64),
                f.raw() as u64,
                c.raw() as u64,
            ),
        }
    }
}

pub struct MultiBackend {
    storage: RefCell<Table<MtNode>>,
    refs: RefCounts,
    cache: RefCell<Cache<OpKey, Ref>>,
    permutations: Permutations,
    num_vars: Cell<u32>,
    gc_runs: Cell<usize>,
}

impl MultiBackend {
    pub fn new(storage_bits: usize, cache_bits: usize) -> Self {
        let storage = Table::new(storage_bits);
        let capacity = storage.capacity();
        Self {
            storage: RefCell::new(storage),
            refs: RefCounts::new(capacity),
            cache: RefCell::new(Cache::new(cache_bits)),
            permutations: Permutations::default(),
            num_vars: Cell::new(0),
            gc_runs: Cell::new(0),
        }
    }

    fn node(&self, r: Ref) -> MtNode {
        *self.storage.borrow().value(r.index())
    }

    fn var(&self, r: Ref) -> u32 {
        match self.node(r) {
            MtNode::Leaf(_) => LEAF_REACHED,
            MtNode::Inner { variable, .. } => variable,
        }
    }

    fn leaf_value(&self, r: Ref) -> Option<Value> {
        match self.node(r) {
            MtNode::Leaf(value) => Some(value),
            MtNode::Inner { .. } => None,
        }
    }

    fn children(&self, r: Ref) -> (Ref, Ref) {
        match self.node(r) {
            MtNode::Leaf(_) => (r, r),
            MtNode::Inner { low, high, .. } => (low, high),
        }
    }

    fn cofactors(&self, r: Ref, v: u32) -> (Ref, Ref) {
        if self.var(r) == v {
            self.children(r)
        } else {
            (r, r)
        }
    }

    fn out_of_memory(&self) -> DdError {
        DdError::OutOfMemory {
            backend: IDENTIFIER,
            capacity: self.storage.borrow().capacity(),
        }
    }

    fn put(&self, node: MtNode) -> Result<Ref> {
        let put = self.storage.borrow_mut().put(node);
        let i = put.ok_or_else(|| self.out_of_memory())?;
        Ok(Ref::positive(i as u32))
    }

    fn mk_leaf(&self, value: Value) -> Result<Ref> {
        self.put(MtNode::Leaf(value))
    }

    fn mk_inner(&self, variable: u32, low: Ref, high: Ref) -> Result<Ref> {
        if low == high {
            return Ok(low);
        }
        self.put(MtNode::Inner {
            variable,
            low,
            high,
        })
    }

    fn mk_var(&self, v: u32) -> Result<Ref> {
        let f = self.mk_leaf(Value::Bool(false))?;
        let t = self.mk_leaf(Value::Bool(true))?;
        self.mk_inner(v, f, t)
    }

    fn apply_rec(&self, op: Operator, operands: &[Ref]) -> Result<Ref> {
        let leaves: Option<Vec<Value>> = operands.iter().map(|&r| self.leaf_value(r)).collect();
        if let Some(values) = leaves {
            return self.mk_leaf(op.evaluate(&values)?);
        }

        match op {
            Operator::And | Operator::Or => {
                let absorbing = op == Operator::Or;
                if operands
                    .iter()
                    .any(|&r| self.leaf_value(r) == Some(Value::Bool(absorbing)))
                {
                    return self.mk_leaf(Value::Bool(absorbing));
                }
            }
            Operator::Ite if operands[1] == operands[2] => return Ok(operands[1]),
            _ => {}
        }

        let mut padded = [Ref::INVALID; 3];
        padded[..operands.len()].copy_from_slice(operands);
        let key = OpKey::Apply(op, operands.len() as u8, padded);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            return Ok(res);
        }

        let top = operands
            .iter()
            .map(|&r| self.var(r))
            .min()
            .unwrap_or(LEAF_REACHED);
        let (lows, highs): (Vec<Ref>, Vec<Ref>) =
            operands.iter().map(|&r| self.cofactors(r, top)).unzip();

        let low = self.apply_rec(op, &lows)?;
        let high = self.apply_rec(op, &highs)?;
        let res = self.mk_inner(top, low, high)?;

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    /// Eliminate the variables of `cube` from `f`, combining cofactors with `op`.
    fn abstract_rec(&self, op: Operator, f: Ref, cube: Ref) -> Result<Ref> {
        if self.leaf_value(cube).is_some() {
            return Ok(f);
        }

        let key = OpKey::Abstract(op, f, cube);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            return Ok(res);
        }

        let vc = self.var(cube);
        let vf = self.var(f);
        let (_, rest) = self.children(cube);
        let res = if vc < vf {
            // `f` does not depend on `vc`, both cofactors are `f` itself.
            let r = self.abstract_rec(op, f, rest)?;
            match op {
                Operator::Or | Operator::And | Operator::Max | Operator::Min => r,
                _ => self.apply_rec(op, &[r, r])?,
            }
        } else if vc == vf {
            let (f0, f1) = self.children(f);
            let e = self.abstract_rec(op, f0, rest)?;
            let t = self.abstract_rec(op, f1, rest)?;
            self.apply_rec(op, &[e, t])?
        } else {
            let (f0, f1) = self.children(f);
            let e = self.abstract_rec(op, f0, cube)?;
            let t = self.abstract_rec(op, f1, cube)?;
            self.mk_inner(vf, e, t)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    fn permute_rec(&self, f: Ref, map: &[u32], memo: &mut HashMap<Ref, Ref>) -> Result<Ref> {
        let v = self.var(f);
        if v == LEAF_REACHED {
            return Ok(f);
        }
        if let Some(&res) = memo.get(&f) {
            return Ok(res);
        }

        let (f0, f1) = self.children(f);
        let low = self.permute_rec(f0, map, memo)?;
        let high = self.permute_rec(f1, map, memo)?;
        let target = map.get(v as usize).copied().unwrap_or(v);
        let x = self.mk_var(target)?;
        let res = self.apply_rec(Operator::Ite, &[x, high, low])?;

        memo.insert(f, res);
        Ok(res)
    }

    /// Run a top-level operation, collecting garbage and retrying once if the
    /// node table overflows. The result is retained.
    fn retrying(&self, op: impl Fn() -> Result<Ref>) -> Result<NodeId> {
        let res = match op() {
            Ok(r) => r,
            Err(DdError::OutOfMemory { .. }) => {
                debug!("node table full, collecting garbage");
                self.collect_garbage();
                op()?
            }
            Err(e) => return Err(e),
        };
        self.refs.retain(res.index());
        Ok(res.id())
    }

    fn abstract_with(&self, op: Operator, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        let (f, c) = (Ref::from_id(dd), Ref::from_id(cube));
        debug!("abstract_{}(f = {}, cube = {})", op, f, c);
        self.retrying(|| self.abstract_rec(op, f, c))
    }
}

impl Backend for MultiBackend {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn has_inverter_arcs(&self) -> bool {
        false
    }

    fn max_variables(&self) -> u32 {
        LEAF_REACHED - 1
    }

    fn can_apply(&self, op: Operator, _ty: &Type, operands: &[NodeId]) -> bool {
        let n = operands.len();
        match op.arity() {
            Arity::Exactly(k) => n == k && k <= 3,
            Arity::AtLeast(_) => (1..=2).contains(&n),
        }
    }

    fn apply(&self, op: Operator, ty: &Type, operands: &[NodeId]) -> Result<NodeId> {
        if !self.can_apply(op, ty, operands) {
            return Err(DdError::UnsupportedOperation {
                backend: IDENTIFIER,
                op: format!("{}/{}", op, operands.len()),
            });
        }
        let r: Vec<Ref> = operands.iter().map(|&id| Ref::from_id(id)).collect();
        debug!("apply({}, {:?}) : {}", op, r, ty);
        self.retrying(|| self.apply_rec(op, &r))
    }

    fn new_constant(&self, value: &Value) -> Result<NodeId> {
        let value = *value;
        self.retrying(|| self.mk_leaf(value))
    }

    fn new_variable(&self) -> Result<NodeId> {
        let v = self.num_vars.get();
        if v >= self.max_variables() {
            return Err(self.out_of_memory());
        }
        let id = self.retrying(|| self.mk_var(v))?;
        self.num_vars.set(v + 1);
        Ok(id)
    }

    fn is_leaf(&self, dd: NodeId) -> bool {
        self.leaf_value(Ref::from_id(dd)).is_some()
    }

    fn value(&self, dd: NodeId) -> Result<Value> {
        self.leaf_value(Ref::from_id(dd)).ok_or(DdError::NotALeaf)
    }

    fn variable(&self, dd: NodeId) -> u32 {
        self.var(Ref::from_id(dd))
    }

    fn walker_low(&self, dd: NodeId) -> NodeId {
        self.children(Ref::from_id(dd)).0.id()
    }

    fn walker_high(&self, dd: NodeId) -> NodeId {
        self.children(Ref::from_id(dd)).1.id()
    }

    fn is_complement(&self, _dd: NodeId) -> bool {
        false
    }

    fn walker_complement(&self, dd: NodeId) -> NodeId {
        dd
    }

    fn walker_regular(&self, dd: NodeId) -> NodeId {
        dd
    }

    fn retain(&self, dd: NodeId) -> NodeId {
        self.refs.retain(Ref::from_id(dd).index());
        dd
    }

    fn release(&self, dd: NodeId) -> Result<()> {
        let r = Ref::from_id(dd);
        if self.refs.release(r.index()) {
            Ok(())
        } else {
            Err(DdError::DoubleRelease(r.to_string()))
        }
    }

    fn ref_count(&self, dd: NodeId) -> u32 {
        self.refs.get(Ref::from_id(dd).index())
    }

    fn new_permutation(&self, map: &[u32]) -> Result<PermutationId> {
        self.permutations.add(map)
    }

    fn permute(&self, dd: NodeId, permutation: PermutationId) -> Result<NodeId> {
        let map = self.permutations.get(permutation)?;
        let f = Ref::from_id(dd);
        debug!("permute(f = {}, perm = {:?})", f, map);
        self.retrying(|| {
            let mut memo = HashMap::new();
            self.permute_rec(f, &map, &mut memo)
        })
    }

    fn free_permutation(&self, permutation: PermutationId) -> Result<()> {
        self.permutations.free(permutation)
    }

    fn num_permutations(&self) -> usize {
        self.permutations.len()
    }

    fn abstract_exist(&self, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_with(Operator::Or, dd, cube)
    }

    fn abstract_forall(&self, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_with(Operator::And, dd, cube)
    }

    fn abstract_sum(&self, _ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_with(Operator::Add, dd, cube)
    }

    fn abstract_product(&self, _ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_with(Operator::Multiply, dd, cube)
    }

    fn abstract_max(&self, _ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_with(Operator::Max, dd, cube)
    }

    fn abstract_min(&self, _ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_with(Operator::Min, dd, cube)
    }

    fn collect_garbage(&self) {
        debug!("Collecting garbage...");
        self.gc_runs.set(self.gc_runs.get() + 1);
        self.cache.borrow_mut().clear();

        let mut storage = self.storage.borrow_mut();
        let mut alive = vec![false; storage.capacity()];
        let mut stack = self.refs.roots();
        while let Some(i) = stack.pop() {
            if alive[i] {
                continue;
            }
            alive[i] = true;
            if let MtNode::Inner { low, high, .. } = *storage.value(i) {
                stack.push(low.index());
                stack.push(high.index());
            }
        }
        let freed = storage.sweep(|i| alive[i]);
        debug!("freed {} nodes, {} remain", freed, storage.real_size());
    }

    fn check_consistency(&self) -> Result<()> {
        let storage = self.storage.borrow();
        let fail = |message: String| DdError::Consistency {
            backend: IDENTIFIER,
            message,
        };
        for i in storage.occupied() {
            let (variable, low, high) = match *storage.value(i) {
                MtNode::Leaf(_) => continue,
                MtNode::Inner {
                    variable,
                    low,
                    high,
                } => (variable, low, high),
            };
            if low == high {
                return Err(fail(format!("node @{} is redundant", i)));
            }
            for child in [low, high] {
                if child.is_negated() {
                    return Err(fail(format!("node @{} has a complement edge", i)));
                }
                if !storage.is_occupied(child.index()) {
                    return Err(fail(format!("node @{} points to freed {}", i, child)));
                }
                if let MtNode::Inner { variable: w, .. } = *storage.value(child.index()) {
                    if w <= variable {
                        return Err(fail(format!("node @{} violates the variable order", i)));
                    }
                }
            }
        }
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        let storage = self.storage.borrow();
        let cache = self.cache.borrow();
        BackendStats {
            identifier: IDENTIFIER,
            nodes: storage.real_size(),
            capacity: storage.capacity(),
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            gc_runs: self.gc_runs.get(),
        }
    }

    fn close(&self) -> Result<()> {
        self.cache.borrow_mut().clear();
        self.permutations.clear();
        debug!(
            "closing '{}' with {} outstanding references",
            IDENTIFIER,
            self.refs.total()
        );
        Ok(())
    }
}
