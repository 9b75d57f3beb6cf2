use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use log::debug;
use num_bigint::BigUint;

use crate::backend::{cofactors, NodeId, LEAF_REACHED};
use crate::context::Context;
use crate::dd::Dd;
use crate::error::{DdError, Result};
use crate::operator::Operator;
use crate::types::Value;
use crate::variable::VariableDd;

/// A node of some backend, viewed through complement-normalizing cofactors.
#[derive(Copy, Clone)]
struct Node {
    slot: u8,
    id: NodeId,
}

impl Node {
    fn of(dd: Dd) -> Self {
        Self {
            slot: dd.slot,
            id: dd.id,
        }
    }

    fn variable(self, ctx: &Context) -> u32 {
        ctx.backend(self.slot).variable(self.id)
    }

    fn is_leaf(self, ctx: &Context) -> bool {
        ctx.backend(self.slot).is_leaf(self.id)
    }

    fn value(self, ctx: &Context) -> Result<Value> {
        ctx.backend(self.slot).value(self.id)
    }

    fn children(self, ctx: &Context) -> (Node, Node) {
        let (low, high) = cofactors(ctx.backend(self.slot), self.id);
        (
            Node {
                slot: self.slot,
                id: low,
            },
            Node {
                slot: self.slot,
                id: high,
            },
        )
    }

    fn is_true(self, ctx: &Context) -> bool {
        self.is_leaf(ctx) && self.value(ctx).map_or(false, |v| v.is_true())
    }

    fn is_false(self, ctx: &Context) -> bool {
        self.is_leaf(ctx) && self.value(ctx).map_or(false, |v| v.is_false())
    }
}

impl Context {
    // Cubes

    /// Conjunction of all `dds`.
    #[track_caller]
    pub fn list_to_cube(&self, dds: &[Dd]) -> Result<Dd> {
        self.check_all(dds)?;
        let mut cube = self.new_true()?;
        for &dd in dds.iter().rev() {
            let next = self.apply(Operator::And, &[dd, cube]);
            self.release(cube)?;
            cube = next?;
        }
        Ok(cube)
    }

    /// Conjunction of the variables with the given indices.
    #[track_caller]
    pub fn int_set_to_dd(&self, indices: &BTreeSet<u32>) -> Result<Dd> {
        let vars = indices
            .iter()
            .map(|&v| self.variable(v))
            .collect::<Result<Vec<_>>>()?;
        self.list_to_cube(&vars)
    }

    /// Fails with [`DdError::NotACube`] unless `dd` is a conjunction of positive literals.
    pub fn assert_cube(&self, dd: Dd) -> Result<()> {
        self.check(dd)?;
        if self.is_cube_node(dd.slot, dd.id) {
            Ok(())
        } else {
            Err(DdError::NotACube(dd.to_string()))
        }
    }

    /// Variables of `cube`, in order.
    pub fn cube_to_list(&self, cube: Dd) -> Result<Vec<u32>> {
        self.assert_cube(cube)?;
        let mut node = Node::of(cube);
        let mut vars = Vec::new();
        while !node.is_leaf(self) {
            vars.push(node.variable(self));
            node = node.children(self).1;
        }
        Ok(vars)
    }

    pub fn cube_size(&self, cube: Dd) -> Result<usize> {
        Ok(self.cube_to_list(cube)?.len())
    }

    // Support

    /// Indices of the variables `dd` depends on.
    pub fn support(&self, dd: Dd) -> Result<BTreeSet<u32>> {
        self.check(dd)?;
        let b = self.backend(dd.slot);
        let mut support = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![b.walker_regular(dd.id)];
        while let Some(id) = stack.pop() {
            if b.is_leaf(id) || !visited.insert(id) {
                continue;
            }
            support.insert(b.variable(id));
            stack.push(b.walker_regular(b.walker_low(id)));
            stack.push(b.walker_regular(b.walker_high(id)));
        }
        Ok(support)
    }

    /// The support of `dd` as a cube.
    #[track_caller]
    pub fn support_dd(&self, dd: Dd) -> Result<Dd> {
        let support = self.support(dd)?;
        self.int_set_to_dd(&support)
    }

    /// Typed variables with at least one diagram variable in the support of `dd`.
    pub fn high_level_support(&self, dd: Dd) -> Result<Vec<Rc<VariableDd>>> {
        let support = self.support(dd)?;
        Ok(self
            .variables()
            .into_iter()
            .filter(|var| support.iter().any(|&v| var.contains_index(v)))
            .collect())
    }

    /// Number of distinct nodes of `dd`, leaves included.
    pub fn count_nodes(&self, dd: Dd) -> Result<BigUint> {
        self.check(dd)?;
        let b = self.backend(dd.slot);
        let mut visited = HashSet::new();
        let mut stack = vec![b.walker_regular(dd.id)];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) || b.is_leaf(id) {
                continue;
            }
            stack.push(b.walker_regular(b.walker_low(id)));
            stack.push(b.walker_regular(b.walker_high(id)));
        }
        Ok(BigUint::from(visited.len()))
    }

    /// Whether `a` implies `b`.
    pub fn is_subset(&self, a: Dd, b: Dd) -> Result<bool> {
        let implies = self.apply(Operator::Implies, &[a, b])?;
        let res = self.is_true(implies);
        self.release(implies)?;
        res
    }

    /// Whether `a` and `b` have no common satisfying assignment.
    pub fn is_disjoint(&self, a: Dd, b: Dd) -> Result<bool> {
        let and = self.apply(Operator::And, &[a, b])?;
        let res = self.is_false(and);
        self.release(and)?;
        res
    }

    // Counting

    /// Number of assignments to the variables of `cube` that satisfy `dd`.
    ///
    /// The support of `dd` must be contained in `cube`.
    pub fn count_sat(&self, dd: Dd, cube: Dd) -> Result<BigUint> {
        self.check(dd)?;
        self.assert_cube(cube)?;
        if !self.is_boolean(dd)? {
            return Err(DdError::TypeMismatch(format!(
                "count_sat needs a boolean diagram, got {}",
                self.get_type(dd)?
            )));
        }
        debug!("count_sat(dd = {}, cube = {})", dd, cube);
        let mut memo = HashMap::new();
        self.count_sat_rec(Node::of(dd), Node::of(cube), &mut memo)
    }

    fn count_sat_rec(
        &self,
        dd: Node,
        cube: Node,
        memo: &mut HashMap<NodeId, BigUint>,
    ) -> Result<BigUint> {
        if cube.is_leaf(self) {
            return if dd.is_true(self) {
                Ok(BigUint::from(1u32))
            } else if dd.is_false(self) {
                Ok(BigUint::ZERO)
            } else {
                Err(DdError::NotInSupport(dd.variable(self)))
            };
        }
        let v = cube.variable(self);
        let next = cube.children(self).1;
        let var = dd.variable(self);
        if var < v {
            return Err(DdError::NotInSupport(var));
        }
        if var > v {
            return Ok(self.count_sat_rec(dd, next, memo)? * 2u32);
        }

        // the cube position of an inner node is fixed by its variable
        if let Some(count) = memo.get(&dd.id) {
            return Ok(count.clone());
        }
        let (low, high) = dd.children(self);
        let count = self.count_sat_rec(low, next, memo)? + self.count_sat_rec(high, next, memo)?;
        memo.insert(dd.id, count.clone());
        Ok(count)
    }

    /// Greedy path to a satisfying leaf, as a map from variable to its value.
    fn sat_path(&self, dd: Dd) -> Result<Option<BTreeMap<u32, bool>>> {
        self.check(dd)?;
        let mut node = Node::of(dd);
        if node.is_false(self) {
            return Ok(None);
        }
        let mut path = BTreeMap::new();
        while !node.is_leaf(self) {
            let v = node.variable(self);
            let (low, high) = node.children(self);
            if !low.is_leaf(self) || low.is_true(self) {
                path.insert(v, false);
                node = low;
            } else {
                path.insert(v, true);
                node = high;
            }
        }
        if !node.is_true(self) {
            return Err(DdError::TypeMismatch(format!(
                "find_sat needs a boolean diagram, found leaf {}",
                node.value(self)?
            )));
        }
        Ok(Some(path))
    }

    /// One satisfying assignment of `dd` over the variables of `cube`, as a
    /// conjunction of literals, or false if `dd` is unsatisfiable.
    ///
    /// Variables of `cube` that `dd` does not constrain get the negative literal.
    /// Path variables outside of `cube` are dropped, so the result is the
    /// projection of a satisfying assignment onto `cube`.
    #[track_caller]
    pub fn find_sat(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let vars = self.cube_to_list(cube)?;
        let path = match self.sat_path(dd)? {
            Some(path) => path,
            None => return self.new_false(),
        };

        let mut res = self.new_true()?;
        for &v in vars.iter().rev() {
            let x = self.variable(v)?;
            let literal = if path.get(&v).copied().unwrap_or(false) {
                self.retain(x)?
            } else {
                self.apply(Operator::Not, &[x])?
            };
            let next = self.apply(Operator::And, &[literal, res]);
            self.release(literal)?;
            self.release(res)?;
            res = next?;
        }
        Ok(res)
    }

    /// The variables set to true by [`Context::find_sat`], `None` if unsatisfiable.
    pub fn find_sat_set(&self, dd: Dd, cube: Dd) -> Result<Option<BTreeSet<u32>>> {
        let vars = self.cube_to_list(cube)?;
        Ok(self.sat_path(dd)?.map(|path| {
            vars.into_iter()
                .filter(|v| path.get(v).copied().unwrap_or(false))
                .collect()
        }))
    }

    // Folds over satisfying assignments

    /// Fold `op` over the values `dd` takes on the assignments to `support`
    /// that satisfy `sat`. `None` if `sat` is unsatisfiable.
    pub fn apply_over_sat_with_support(
        &self,
        op: Operator,
        dd: Dd,
        support: Dd,
        sat: Dd,
    ) -> Result<Option<Value>> {
        self.check(dd)?;
        self.check(sat)?;
        self.assert_cube(support)?;
        op.check_arity(2)?;
        debug!(
            "apply_over_sat({}, dd = {}, support = {}, sat = {})",
            op, dd, support, sat
        );
        let mut memo = HashMap::new();
        self.apply_over_sat_rec(op, Node::of(dd), Node::of(sat), Node::of(support), &mut memo)
    }

    /// [`Context::apply_over_sat_with_support`] over the joint support of `dd` and `sat`.
    pub fn apply_over_sat(&self, op: Operator, dd: Dd, sat: Dd) -> Result<Option<Value>> {
        let mut support = self.support(dd)?;
        support.extend(self.support(sat)?);
        let cube = self.int_set_to_dd(&support)?;
        let res = self.apply_over_sat_with_support(op, dd, cube, sat);
        self.release(cube)?;
        res
    }

    fn apply_over_sat_rec(
        &self,
        op: Operator,
        dd: Node,
        sat: Node,
        support: Node,
        memo: &mut HashMap<(NodeId, NodeId, NodeId), Option<Value>>,
    ) -> Result<Option<Value>> {
        if sat.is_false(self) {
            return Ok(None);
        }
        if support.is_leaf(self) {
            if !sat.is_leaf(self) {
                return Err(DdError::NotInSupport(sat.variable(self)));
            }
            if !dd.is_leaf(self) {
                return Err(DdError::NotInSupport(dd.variable(self)));
            }
            return dd.value(self).map(Some);
        }
        let key = (dd.id, sat.id, support.id);
        if let Some(res) = memo.get(&key) {
            return Ok(*res);
        }

        let v = support.variable(self);
        let next = support.children(self).1;
        let (dd_low, dd_high) = if dd.variable(self) <= v {
            dd.children(self)
        } else {
            (dd, dd)
        };
        let (sat_low, sat_high) = if sat.variable(self) <= v {
            sat.children(self)
        } else {
            (sat, sat)
        };
        let low = self.apply_over_sat_rec(op, dd_low, sat_low, next, memo)?;
        let high = self.apply_over_sat_rec(op, dd_high, sat_high, next, memo)?;
        let res = match (low, high) {
            (None, r) | (r, None) => r,
            (Some(l), Some(h)) => Some(op.evaluate(&[l, h])?),
        };
        memo.insert(key, res);
        Ok(res)
    }

    pub fn max_over_sat(&self, dd: Dd, sat: Dd) -> Result<Option<Value>> {
        self.apply_over_sat(Operator::Max, dd, sat)
    }

    pub fn min_over_sat(&self, dd: Dd, sat: Dd) -> Result<Option<Value>> {
        self.apply_over_sat(Operator::Min, dd, sat)
    }

    pub fn and_over_sat(&self, dd: Dd, sat: Dd) -> Result<Option<Value>> {
        self.apply_over_sat(Operator::And, dd, sat)
    }

    pub fn or_over_sat(&self, dd: Dd, sat: Dd) -> Result<Option<Value>> {
        self.apply_over_sat(Operator::Or, dd, sat)
    }

    /// Distinct values of `dd` on the assignments satisfying `sat`, in the order
    /// of first occurrence along a low-first traversal.
    pub fn collect_values(&self, dd: Dd, sat: Dd) -> Result<Vec<Value>> {
        self.check(dd)?;
        self.check(sat)?;
        let mut values = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_values_rec(Node::of(dd), Node::of(sat), &mut visited, &mut seen, &mut values)?;
        Ok(values)
    }

    fn collect_values_rec(
        &self,
        dd: Node,
        sat: Node,
        visited: &mut HashSet<(NodeId, NodeId)>,
        seen: &mut HashSet<Value>,
        values: &mut Vec<Value>,
    ) -> Result<()> {
        if sat.is_false(self) || !visited.insert((dd.id, sat.id)) {
            return Ok(());
        }
        if dd.is_leaf(self) {
            let value = dd.value(self)?;
            if seen.insert(value) {
                values.push(value);
            }
            return Ok(());
        }
        let v = dd.variable(self).min(sat.variable(self));
        let (dd_low, dd_high) = if dd.variable(self) == v {
            dd.children(self)
        } else {
            (dd, dd)
        };
        let (sat_low, sat_high) = if sat.variable(self) == v {
            sat.children(self)
        } else {
            (sat, sat)
        };
        self.collect_values_rec(dd_low, sat_low, visited, seen, values)?;
        self.collect_values_rec(dd_high, sat_high, visited, seen, values)
    }

    /// Some value `dd` takes on an assignment satisfying `sat`, `None` if `sat` is unsatisfiable.
    pub fn get_some_leaf_value(&self, dd: Dd, sat: Dd) -> Result<Option<Value>> {
        self.check(dd)?;
        self.check(sat)?;
        let mut failed = HashSet::new();
        self.some_leaf_rec(Node::of(dd), Node::of(sat), &mut failed)
    }

    fn some_leaf_rec(
        &self,
        dd: Node,
        sat: Node,
        failed: &mut HashSet<(NodeId, NodeId)>,
    ) -> Result<Option<Value>> {
        if sat.is_false(self) || failed.contains(&(dd.id, sat.id)) {
            return Ok(None);
        }
        if dd.is_leaf(self) {
            return dd.value(self).map(Some);
        }
        let v = dd.variable(self).min(sat.variable(self));
        debug_assert_ne!(v, LEAF_REACHED);
        let (dd_low, dd_high) = if dd.variable(self) == v {
            dd.children(self)
        } else {
            (dd, dd)
        };
        let (sat_low, sat_high) = if sat.variable(self) == v {
            sat.children(self)
        } else {
            (sat, sat)
        };
        if let Some(value) = self.some_leaf_rec(dd_low, sat_low, failed)? {
            return Ok(Some(value));
        }
        if let Some(value) = self.some_leaf_rec(dd_high, sat_high, failed)? {
            return Ok(Some(value));
        }
        failed.insert((dd.id, sat.id));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
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
    fn test_cube_helpers() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 4)?;
        let cube = ctx.list_to_cube(&[x[3], x[0], x[2]])?;
        assert_eq!(ctx.cube_to_list(cube)?, vec![0, 2, 3]);
        assert_eq!(ctx.cube_size(cube)?, 3);

        let same = ctx.int_set_to_dd(&BTreeSet::from([0, 2, 3]))?;
        assert_eq!(same, cube);

        let not_x = ctx.apply(Operator::Not, &[x[1]])?;
        assert!(matches!(ctx.assert_cube(not_x), Err(DdError::NotACube(_))));
        let t = ctx.new_true()?;
        assert_eq!(ctx.cube_size(t)?, 0);

        ctx.release_all(&[cube, same, not_x, t])?;
        ctx.close()
    }

    #[test]
    fn test_support() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 4)?;
        let f = ctx.apply(Operator::Ite, &[x[1], x[3], x[0]])?;
        assert_eq!(ctx.support(f)?, BTreeSet::from([0, 1, 3]));
        let s = ctx.support_dd(f)?;
        assert_eq!(ctx.cube_to_list(s)?, vec![0, 1, 3]);

        let n = ctx.new_integer_variable("n", 0, 3, 1)?;
        let b = ctx.new_boolean_variable("b", 1)?;
        let enc = n.value_encoding(&ctx, 0)?;
        let high = ctx.high_level_support(enc)?;
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].name(), "n");
        assert!(ctx.high_level_support(b.dd_variables(0)?[0])?[0].name() == "b");

        ctx.release_all(&[f, s, enc])?;
        ctx.close()
    }

    #[test]
    fn test_count_sat() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 3)?;
        let not_x2 = ctx.apply(Operator::Not, &[x[2]])?;
        let f = ctx.apply(Operator::And, &[x[0], x[1], not_x2])?;
        let cube = ctx.list_to_cube(&x)?;
        assert_eq!(ctx.count_sat(f, cube)?, BigUint::from(1u32));

        let g = ctx.apply(Operator::Or, &[x[0], x[2]])?;
        assert_eq!(ctx.count_sat(g, cube)?, BigUint::from(6u32));
        assert_eq!(ctx.count_sat(not_x2, cube)?, BigUint::from(4u32));

        let t = ctx.new_true()?;
        assert_eq!(ctx.count_sat(t, cube)?, BigUint::from(8u32));

        let small = ctx.list_to_cube(&[x[0]])?;
        assert!(matches!(ctx.count_sat(g, small), Err(DdError::NotInSupport(2))));

        ctx.release_all(&[not_x2, f, cube, g, t, small])?;
        ctx.close()
    }

    #[test]
    fn test_count_sat_wide() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 80)?;
        let cube = ctx.list_to_cube(&x)?;
        let t = ctx.new_true()?;
        assert_eq!(ctx.count_sat(t, cube)?, BigUint::from(1u32) << 80);
        ctx.release_all(&[cube, t])?;
        ctx.close()
    }

    #[test]
    fn test_find_sat() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 3)?;
        let cube = ctx.list_to_cube(&x)?;

        let f = ctx.apply(Operator::And, &[x[0], x[2]])?;
        let sat = ctx.find_sat(f, cube)?;
        // x1 is unconstrained and fixed to false
        let not_x1 = ctx.apply(Operator::Not, &[x[1]])?;
        let expected = ctx.apply(Operator::And, &[f, not_x1])?;
        assert_eq!(sat, expected);
        assert_eq!(ctx.find_sat_set(f, cube)?, Some(BTreeSet::from([0, 2])));
        assert!(ctx.is_subset(sat, f)?);

        let ff = ctx.new_false()?;
        let none = ctx.find_sat(ff, cube)?;
        assert!(ctx.is_false(none)?);
        assert_eq!(ctx.find_sat_set(ff, cube)?, None);

        ctx.release_all(&[cube, f, sat, not_x1, expected, ff, none])?;
        ctx.close()
    }

    #[test]
    fn test_find_sat_projects_onto_cube() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 3)?;
        let f = ctx.apply(Operator::And, &[x[0], x[1]])?;

        // x0 lies on the path but not in the cube
        let cube = ctx.list_to_cube(&[x[1]])?;
        let sat = ctx.find_sat(f, cube)?;
        assert_eq!(sat, x[1]);
        assert_eq!(ctx.find_sat_set(f, cube)?, Some(BTreeSet::from([1])));

        // x2 of the cube is negated, x0 is dropped
        let cube12 = ctx.list_to_cube(&[x[1], x[2]])?;
        let sat12 = ctx.find_sat(f, cube12)?;
        let not_x2 = ctx.apply(Operator::Not, &[x[2]])?;
        let expected = ctx.apply(Operator::And, &[x[1], not_x2])?;
        assert_eq!(sat12, expected);

        ctx.release_all(&[f, cube, sat, cube12, sat12, not_x2, expected])?;
        ctx.close()
    }

    #[test]
    fn test_subset_disjoint() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 2)?;
        let both = ctx.apply(Operator::And, &[x[0], x[1]])?;
        let not_x0 = ctx.apply(Operator::Not, &[x[0]])?;
        assert!(ctx.is_subset(both, x[0])?);
        assert!(!ctx.is_subset(x[0], both)?);
        assert!(ctx.is_disjoint(both, not_x0)?);
        assert!(!ctx.is_disjoint(x[1], not_x0)?);
        ctx.release_all(&[both, not_x0])?;
        ctx.close()
    }

    #[test]
    fn test_count_nodes() -> Result<()> {
        let ctx = context()?;
        let x = vars(&ctx, 2)?;
        let f = ctx.apply(Operator::Xor, &[x[0], x[1]])?;
        // two inner nodes sharing the terminal (complement edges)
        assert_eq!(ctx.count_nodes(f)?, BigUint::from(3u32));
        ctx.release(f)?;
        ctx.close()
    }

    #[test]
    fn test_apply_over_sat() -> Result<()> {
        let ctx = context()?;
        let n = ctx.new_integer_variable("n", 0, 7, 1)?;
        let enc = n.value_encoding(&ctx, 0)?;
        let vars = n.dd_variables(0)?;

        // odd values
        let sat = ctx.retain(vars[0])?;
        assert_eq!(ctx.max_over_sat(enc, sat)?, Some(Value::Int(7)));
        assert_eq!(ctx.min_over_sat(enc, sat)?, Some(Value::Int(1)));

        let mut values = ctx.collect_values(enc, sat)?;
        values.sort_by_key(|v| v.as_int());
        assert_eq!(
            values,
            vec![Value::Int(1), Value::Int(3), Value::Int(5), Value::Int(7)]
        );
        let some = ctx.get_some_leaf_value(enc, sat)?.and_then(|v| v.as_int());
        assert!(matches!(some, Some(v) if v % 2 == 1));

        let ff = ctx.new_false()?;
        assert_eq!(ctx.max_over_sat(enc, ff)?, None);
        assert_eq!(ctx.get_some_leaf_value(enc, ff)?, None);

        let lt3 = {
            let three = ctx.new_constant(3)?;
            let r = ctx.apply(Operator::Lt, &[enc, three]);
            ctx.release(three)?;
            r?
        };
        assert_eq!(ctx.and_over_sat(lt3, sat)?, Some(Value::Bool(false)));
        assert_eq!(ctx.or_over_sat(lt3, sat)?, Some(Value::Bool(true)));

        ctx.release_all(&[enc, sat, ff, lt3])?;
        ctx.close()
    }
}
