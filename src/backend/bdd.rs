//! Boolean decision diagrams with complement edges.
//!
//! Canonicity is maintained the classic way: the high edge of a stored node is
//! never complemented, so `mk_node` pushes a complement on the high child up to
//! the returned reference. There is a single terminal (table index 1), `ONE`;
//! `ZERO` is its complement.
//!
//! Internally variables are 1-indexed (0 marks the terminal); the backend
//! reports 0-based indices through the [`Backend`] interface.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use log::debug;

use crate::backend::{
    Backend, BackendStats, NodeId, PermutationId, Permutations, RefCounts, LEAF_REACHED,
};
use crate::cache::Cache;
use crate::error::{DdError, Result};
use crate::operator::Operator;
use crate::reference::Ref;
use crate::table::Table;
use crate::types::{Type, Value};
use crate::utils::{pairing3, MyHash};

pub const IDENTIFIER: &str = "bdd";

const ONE: Ref = Ref::positive(1);
const ZERO: Ref = ONE.negate();

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::INVALID,
            high: Ref::INVALID,
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(
            self.variable as u64,
            self.low.raw() as u64,
            self.high.raw() as u64,
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum OpKey {
    Ite(Ref, Ref, Ref),
    Exist(Ref, Ref),
    AndExist(Ref, Ref, Ref),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Ite(f, g, h) => pairing3(f.raw() as u64, g.raw() as u64, h.raw() as u64),
            OpKey::Exist(f, c) => pairing3(f.raw() as u64, c.raw() as u64, u32::MAX as u64),
            OpKey::AndExist(f, g, c) => pairing3(
                pairing3(f.raw() as u64, g.raw() as u64, c.raw() as u64),
                1,
                1,
            ),
        }
    }
}

pub struct BinaryBackend {
    storage: RefCell<Table<Node>>,
    refs: RefCounts,
    cache: RefCell<Cache<OpKey, Ref>>,
    permutations: Permutations,
    num_vars: Cell<u32>,
    gc_runs: Cell<usize>,
}

impl BinaryBackend {
    pub fn new(storage_bits: usize, cache_bits: usize) -> Self {
        let mut storage = Table::new(storage_bits);
        let capacity = storage.capacity();

        // The terminal node lives outside of any bucket.
        let one = storage.add(Node::default());
        debug_assert_eq!(one, Some(ONE.index()));

        Self {
            storage: RefCell::new(storage),
            refs: RefCounts::new(capacity),
            cache: RefCell::new(Cache::new(cache_bits)),
            permutations: Permutations::default(),
            num_vars: Cell::new(0),
            gc_runs: Cell::new(0),
        }
    }

    fn node(&self, r: Ref) -> Node {
        *self.storage.borrow().value(r.index())
    }

    fn var(&self, r: Ref) -> u32 {
        self.node(r).variable
    }

    fn is_terminal(&self, r: Ref) -> bool {
        r.index() == ONE.index()
    }

    fn low_node(&self, r: Ref) -> Ref {
        self.node(r).low.xor(r.is_negated())
    }

    fn high_node(&self, r: Ref) -> Ref {
        self.node(r).high.xor(r.is_negated())
    }

    fn out_of_memory(&self) -> DdError {
        DdError::OutOfMemory {
            backend: IDENTIFIER,
            capacity: self.storage.borrow().capacity(),
        }
    }

    fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Result<Ref> {
        debug_assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return Ok(-self.mk_node(v, -low, -high)?);
        }

        // Handle duplicates
        if low == high {
            return Ok(low);
        }

        let put = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        });
        let i = put.ok_or_else(|| self.out_of_memory())?;
        Ok(Ref::positive(i as u32))
    }

    fn mk_var(&self, v: u32) -> Result<Ref> {
        self.mk_node(v, ZERO, ONE)
    }

    fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || v < self.var(node) {
            return (node, node);
        }
        (self.low_node(node), self.high_node(node))
    }

    /// `ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)`
    fn ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        debug!("ite(f = {}, g = {}, h = {})", f, g, h);

        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if f == ONE {
            return Ok(g);
        }
        if f == ZERO {
            return Ok(h);
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => F
        if g == h {
            return Ok(g);
        }
        if g == ONE && h == ZERO {
            return Ok(f);
        }
        if g == ZERO && h == ONE {
            return Ok(-f);
        }
        if g == ONE && h == -f {
            return Ok(ONE);
        }
        if g == f && h == ONE {
            return Ok(ONE);
        }
        if g == -f && h == ZERO {
            return Ok(ZERO);
        }
        if g == ZERO && h == f {
            return Ok(f);
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.ite(f, ONE, h);
        }
        if h == f {
            return self.ite(f, g, ZERO);
        }
        if g == -f {
            return self.ite(f, ZERO, h);
        }
        if h == -f {
            return self.ite(f, g, ONE);
        }

        let i = self.var(f);
        let j = self.var(g);
        let k = self.var(h);

        // Equivalent pairs (choose the one with the lowest variable):
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        //   ite(F,G,~G) == ite(G,F,~F)
        if g == ONE && k < i {
            return self.ite(h, ONE, f);
        }
        if h == ZERO && j < i {
            return self.ite(g, f, ZERO);
        }
        if h == ONE && j < i {
            return self.ite(-g, -f, ONE);
        }
        if g == ZERO && k < i {
            return self.ite(-h, ZERO, -f);
        }
        if g == -h && j < i {
            return self.ite(g, f, -f);
        }

        // Make sure the first two pointers (f and g) are regular
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            return Ok(res.xor(n));
        }

        // Determine the top variable:
        let mut m = self.var(f);
        let j = self.var(g);
        let k = self.var(h);
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.ite(f0, g0, h0)?;
        let t = self.ite(f1, g1, h1)?;

        let res = self.mk_node(m, e, t)?;
        self.cache.borrow_mut().insert(key, res);

        Ok(res.xor(n))
    }

    fn and(&self, f: Ref, g: Ref) -> Result<Ref> {
        self.ite(f, g, ZERO)
    }

    fn or(&self, f: Ref, g: Ref) -> Result<Ref> {
        self.ite(f, ONE, g)
    }

    fn exist(&self, f: Ref, cube: Ref) -> Result<Ref> {
        if cube == ONE || self.is_terminal(f) {
            return Ok(f);
        }

        // Cube variables above the top of `f` do not matter.
        let vf = self.var(f);
        let mut cube = cube;
        while cube != ONE && self.var(cube) < vf {
            cube = self.high_node(cube);
        }
        if cube == ONE {
            return Ok(f);
        }

        let key = OpKey::Exist(f, cube);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            return Ok(res);
        }

        let (f0, f1) = self.top_cofactors(f, vf);
        let res = if self.var(cube) == vf {
            let rest = self.high_node(cube);
            let e = self.exist(f0, rest)?;
            if e == ONE {
                ONE
            } else {
                let t = self.exist(f1, rest)?;
                self.or(e, t)?
            }
        } else {
            let e = self.exist(f0, cube)?;
            let t = self.exist(f1, cube)?;
            self.mk_node(vf, e, t)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    fn and_exist(&self, f: Ref, g: Ref, cube: Ref) -> Result<Ref> {
        if f == ZERO || g == ZERO || f == -g {
            return Ok(ZERO);
        }
        if f == ONE && g == ONE {
            return Ok(ONE);
        }
        if cube == ONE {
            return self.and(f, g);
        }
        if f == ONE || f == g {
            return self.exist(g, cube);
        }
        if g == ONE {
            return self.exist(f, cube);
        }

        let (f, g) = if f.raw() <= g.raw() { (f, g) } else { (g, f) };

        let top = {
            let (i, j) = (self.var(f), self.var(g));
            if i == 0 {
                j
            } else if j == 0 {
                i
            } else {
                i.min(j)
            }
        };
        let mut cube = cube;
        while cube != ONE && self.var(cube) < top {
            cube = self.high_node(cube);
        }
        if cube == ONE {
            return self.and(f, g);
        }

        let key = OpKey::AndExist(f, g, cube);
        let cached = self.cache.borrow_mut().get(&key);
        if let Some(res) = cached {
            return Ok(res);
        }

        let (f0, f1) = self.top_cofactors(f, top);
        let (g0, g1) = self.top_cofactors(g, top);
        let res = if self.var(cube) == top {
            let rest = self.high_node(cube);
            let e = self.and_exist(f0, g0, rest)?;
            if e == ONE {
                ONE
            } else {
                let t = self.and_exist(f1, g1, rest)?;
                self.or(e, t)?
            }
        } else {
            let e = self.and_exist(f0, g0, cube)?;
            let t = self.and_exist(f1, g1, cube)?;
            self.mk_node(top, e, t)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    fn permute_rec(&self, f: Ref, map: &[u32], memo: &mut HashMap<Ref, Ref>) -> Result<Ref> {
        if self.is_terminal(f) {
            return Ok(f);
        }
        if let Some(&res) = memo.get(&f) {
            return Ok(res);
        }

        let v = self.var(f) - 1;
        let low = self.permute_rec(self.low_node(f), map, memo)?;
        let high = self.permute_rec(self.high_node(f), map, memo)?;
        let target = map.get(v as usize).copied().unwrap_or(v);
        let x = self.mk_var(target + 1)?;
        let res = self.ite(x, high, low)?;

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

    fn unsupported(&self, op: &str) -> DdError {
        DdError::UnsupportedOperation {
            backend: IDENTIFIER,
            op: op.to_string(),
        }
    }
}

impl Backend for BinaryBackend {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn has_inverter_arcs(&self) -> bool {
        true
    }

    fn has_and_exist(&self) -> bool {
        true
    }

    fn max_variables(&self) -> u32 {
        LEAF_REACHED - 2
    }

    fn can_apply(&self, op: Operator, ty: &Type, operands: &[NodeId]) -> bool {
        if !ty.is_boolean() {
            return false;
        }
        let n = operands.len();
        match op {
            Operator::Id | Operator::Not => n == 1,
            Operator::And
            | Operator::Or
            | Operator::Xor
            | Operator::Iff
            | Operator::Implies
            | Operator::Eq
            | Operator::Ne => n == 2,
            Operator::Ite => n == 3,
            _ => false,
        }
    }

    fn apply(&self, op: Operator, ty: &Type, operands: &[NodeId]) -> Result<NodeId> {
        if !self.can_apply(op, ty, operands) {
            return Err(self.unsupported(op.name()));
        }
        let r: Vec<Ref> = operands.iter().map(|&id| Ref::from_id(id)).collect();
        debug!("apply({}, {:?})", op, r);

        self.retrying(|| match op {
            Operator::Id => Ok(r[0]),
            Operator::Not => Ok(-r[0]),
            Operator::And => self.ite(r[0], r[1], ZERO),
            Operator::Or => self.ite(r[0], ONE, r[1]),
            Operator::Xor | Operator::Ne => self.ite(r[0], -r[1], r[1]),
            Operator::Iff | Operator::Eq => self.ite(r[0], r[1], -r[1]),
            Operator::Implies => self.ite(r[0], r[1], ONE),
            Operator::Ite => self.ite(r[0], r[1], r[2]),
            _ => Err(self.unsupported(op.name())),
        })
    }

    fn new_constant(&self, value: &Value) -> Result<NodeId> {
        match value {
            Value::Bool(b) => {
                self.refs.retain(ONE.index());
                Ok(ONE.xor(!*b).id())
            }
            _ => Err(DdError::TypeMismatch(format!(
                "backend '{}' only holds booleans, got {}",
                IDENTIFIER, value
            ))),
        }
    }

    fn new_variable(&self) -> Result<NodeId> {
        let v = self.num_vars.get();
        if v >= self.max_variables() {
            return Err(self.out_of_memory());
        }
        let id = self.retrying(|| self.mk_var(v + 1))?;
        self.num_vars.set(v + 1);
        debug!("new_variable() -> x{}", v);
        Ok(id)
    }

    fn is_leaf(&self, dd: NodeId) -> bool {
        self.is_terminal(Ref::from_id(dd))
    }

    fn value(&self, dd: NodeId) -> Result<Value> {
        let r = Ref::from_id(dd);
        if self.is_terminal(r) {
            Ok(Value::Bool(!r.is_negated()))
        } else {
            Err(DdError::NotALeaf)
        }
    }

    fn variable(&self, dd: NodeId) -> u32 {
        let r = Ref::from_id(dd);
        if self.is_terminal(r) {
            LEAF_REACHED
        } else {
            self.var(r) - 1
        }
    }

    fn walker_low(&self, dd: NodeId) -> NodeId {
        self.node(Ref::from_id(dd)).low.id()
    }

    fn walker_high(&self, dd: NodeId) -> NodeId {
        self.node(Ref::from_id(dd)).high.id()
    }

    fn is_complement(&self, dd: NodeId) -> bool {
        Ref::from_id(dd).is_negated()
    }

    fn walker_complement(&self, dd: NodeId) -> NodeId {
        Ref::from_id(dd).negate().id()
    }

    fn walker_regular(&self, dd: NodeId) -> NodeId {
        Ref::from_id(dd).regular().id()
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
        let (f, c) = (Ref::from_id(dd), Ref::from_id(cube));
        debug!("abstract_exist(f = {}, cube = {})", f, c);
        self.retrying(|| self.exist(f, c))
    }

    fn abstract_forall(&self, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        let (f, c) = (Ref::from_id(dd), Ref::from_id(cube));
        debug!("abstract_forall(f = {}, cube = {})", f, c);
        self.retrying(|| Ok(-self.exist(-f, c)?))
    }

    fn abstract_sum(&self, _ty: &Type, _dd: NodeId, _cube: NodeId) -> Result<NodeId> {
        Err(self.unsupported("abstract-sum"))
    }

    fn abstract_product(&self, _ty: &Type, _dd: NodeId, _cube: NodeId) -> Result<NodeId> {
        Err(self.unsupported("abstract-product"))
    }

    // Over booleans, max is disjunction and min is conjunction.
    fn abstract_max(&self, _ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_exist(dd, cube)
    }

    fn abstract_min(&self, _ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId> {
        self.abstract_forall(dd, cube)
    }

    fn abstract_and_exist(&self, a: NodeId, b: NodeId, cube: NodeId) -> Result<NodeId> {
        let (f, g, c) = (Ref::from_id(a), Ref::from_id(b), Ref::from_id(cube));
        debug!("abstract_and_exist(f = {}, g = {}, cube = {})", f, g, c);
        self.retrying(|| self.and_exist(f, g, c))
    }

    fn collect_garbage(&self) {
        debug!("Collecting garbage...");
        self.gc_runs.set(self.gc_runs.get() + 1);
        self.cache.borrow_mut().clear();

        let mut storage = self.storage.borrow_mut();
        let mut alive = vec![false; storage.capacity()];
        alive[ONE.index()] = true;
        let mut stack = self.refs.roots();
        while let Some(i) = stack.pop() {
            if alive[i] {
                continue;
            }
            alive[i] = true;
            let node = *storage.value(i);
            stack.push(node.low.index());
            stack.push(node.high.index());
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
            if i == ONE.index() {
                continue;
            }
            let node = storage.value(i);
            if node.variable == 0 {
                return Err(fail(format!("inner node @{} has no variable", i)));
            }
            if node.high.is_negated() {
                return Err(fail(format!("node @{} has a complemented high edge", i)));
            }
            if node.low == node.high {
                return Err(fail(format!("node @{} is redundant", i)));
            }
            for child in [node.low, node.high] {
                if child.index() == ONE.index() {
                    continue;
                }
                if !storage.is_occupied(child.index()) {
                    return Err(fail(format!("node @{} points to freed {}", i, child)));
                }
                if storage.value(child.index()).variable <= node.variable {
                    return Err(fail(format!("node @{} violates the variable order", i)));
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

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn backend() -> BinaryBackend {
        BinaryBackend::new(12, 10)
    }

    fn vars(bdd: &BinaryBackend, n: usize) -> Vec<Ref> {
        (0..n)
            .map(|_| Ref::from_id(bdd.new_variable().unwrap()))
            .collect()
    }

    #[test]
    fn test_var() {
        let bdd = backend();
        let x = vars(&bdd, 1)[0];

        assert_eq!(bdd.variable(x.id()), 0);
        assert_eq!(bdd.high_node(x), ONE);
        assert_eq!(bdd.low_node(x), ZERO);
    }

    #[test]
    fn test_not_var() {
        let bdd = backend();
        let x = vars(&bdd, 1)[0];
        let not_x = -x;

        assert_eq!(bdd.high_node(not_x), ZERO);
        assert_eq!(bdd.low_node(not_x), ONE);
    }

    #[test]
    fn test_terminal() {
        let bdd = backend();
        assert!(bdd.is_leaf(ONE.id()));
        assert!(bdd.is_leaf(ZERO.id()));
        assert_eq!(bdd.value(ONE.id()), Ok(Value::Bool(true)));
        assert_eq!(bdd.value(ZERO.id()), Ok(Value::Bool(false)));
        assert_eq!(bdd.variable(ONE.id()), LEAF_REACHED);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = backend();
        let x = vars(&bdd, 2);

        let f = -bdd.and(x[0], x[1]).unwrap();
        let g = bdd.or(-x[0], -x[1]).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_xor_itself() {
        let bdd = backend();
        let x = vars(&bdd, 2);
        let f = bdd.and(x[0], x[1]).unwrap();

        assert_eq!(bdd.ite(f, -f, f), Ok(ZERO));
        assert_eq!(bdd.ite(f, f, -f), Ok(ONE));
    }

    #[test]
    fn test_apply_ite() {
        let bdd = backend();
        let x = vars(&bdd, 3);
        let (f, g, h) = (x[0], x[1], x[2]);

        assert_eq!(bdd.ite(ONE, g, h), Ok(g));
        assert_eq!(bdd.ite(ZERO, g, h), Ok(h));
        assert_eq!(bdd.ite(f, g, g), Ok(g));
        assert_eq!(bdd.ite(f, ONE, ZERO), Ok(f));
        assert_eq!(bdd.ite(f, ZERO, ONE), Ok(-f));

        let res = bdd.ite(-f, -g, -h).unwrap();
        let expected = bdd.mk_node(1, -g, -h).unwrap();
        assert_eq!(res, expected);
    }

    #[test]
    fn test_exist() {
        let bdd = backend();
        let x = vars(&bdd, 3);
        let f = bdd.and(x[0], x[1]).unwrap();
        let f = bdd.or(f, x[2]).unwrap();

        // ∃x2. (x0 ∧ x1) ∨ x2 = 1
        assert_eq!(bdd.exist(f, x[2]), Ok(ONE));
        // ∃x0. (x0 ∧ x1) ∨ x2 = x1 ∨ x2
        assert_eq!(bdd.exist(f, x[0]), bdd.or(x[1], x[2]));
    }

    #[test]
    fn test_and_exist_matches_two_step() {
        let bdd = backend();
        let x = vars(&bdd, 4);
        let a = bdd.or(x[0], x[2]).unwrap();
        let b = bdd.ite(x[1], x[3], -x[0]).unwrap();
        let cube = bdd.and(x[0], x[1]).unwrap();

        let fused = bdd.and_exist(a, b, cube).unwrap();
        let ab = bdd.and(a, b).unwrap();
        assert_eq!(fused, bdd.exist(ab, cube).unwrap());
    }

    #[test]
    fn test_permute_swaps_variables() {
        let bdd = backend();
        let x = vars(&bdd, 2);
        let f = bdd.and(x[0], -x[1]).unwrap();
        let p = bdd.new_permutation(&[1, 0]).unwrap();

        let g = Ref::from_id(bdd.permute(f.id(), p).unwrap());
        assert_eq!(g, bdd.and(x[1], -x[0]).unwrap());
    }

    #[test]
    fn test_invalid_permutation() {
        let bdd = backend();
        assert!(matches!(
            bdd.new_permutation(&[0, 0]),
            Err(DdError::InvalidPermutation(_))
        ));
    }

    #[test]
    fn test_out_of_memory_is_reported() {
        let bdd = BinaryBackend::new(3, 4);
        let mut result = Ok(0);
        for _ in 0..16 {
            result = bdd.new_variable();
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(DdError::OutOfMemory { .. })));
    }

    #[test]
    fn test_garbage_collection_keeps_retained() {
        let bdd = backend();
        let x = vars(&bdd, 3);
        let f = bdd
            .apply(Operator::And, &Type::Boolean, &[x[0].id(), x[1].id()])
            .unwrap();
        let tmp = bdd.or(x[1], x[2]).unwrap();
        assert!(bdd.storage.borrow().is_occupied(tmp.index()));

        bdd.collect_garbage();
        assert!(!bdd.storage.borrow().is_occupied(tmp.index()));
        assert!(bdd.storage.borrow().is_occupied(Ref::from_id(f).index()));
        assert!(bdd.check_consistency().is_ok());
    }

    #[test]
    fn test_double_release() {
        let bdd = backend();
        let t = bdd.new_constant(&Value::Bool(true)).unwrap();
        assert!(bdd.release(t).is_ok());
        assert!(matches!(bdd.release(t), Err(DdError::DoubleRelease(_))));
    }
}
