//! The decision-diagram context.
//!
//! A [`Context`] owns the backends, the global variable list and the
//! bookkeeping for every handle it gives out. All operations go through it.
//!
//! ## Backends
//!
//! There are two roles: the *binary* backend holds boolean diagrams, the
//! *multi-terminal* backend everything else. Constants are routed by their
//! value (booleans to binary, everything else to multi-terminal). When an
//! operation mixes the two, the binary operands are imported into the
//! multi-terminal backend first. Comparisons computed in the multi-terminal
//! backend are imported back, so that boolean results end up in the binary
//! backend. Selecting the same backend for both roles shares one instance and
//! no import ever happens.
//!
//! ## Ownership
//!
//! Every [`Dd`] returned by the context is owned by the caller and must be
//! handed back exactly once through [`Context::release`]. With
//! [`DdOptions::leak_check`] enabled the context remembers where each handle
//! was created and [`Context::close`] reports the survivors.
//!
//! ```
//! use symdd::context::Context;
//! use symdd::options::DdOptions;
//! use symdd::operator::Operator;
//!
//! let ctx = Context::new(DdOptions::default().with_leak_check(true)).unwrap();
//! let x = ctx.new_boolean_variable("x", 1).unwrap();
//! let x0 = x.dd_variables(0).unwrap()[0];
//!
//! let not_x = ctx.apply(Operator::Not, &[x0]).unwrap();
//! let t = ctx.apply(Operator::Or, &[x0, not_x]).unwrap();
//! assert!(ctx.is_true(t).unwrap());
//!
//! ctx.release_all(&[not_x, t]).unwrap();
//! ctx.close().unwrap();
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::panic::Location;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::backend::{self, cofactors, Backend, BackendStats, NodeId};
use crate::dd::Dd;
use crate::error::{DdError, Result};
use crate::generic;
use crate::operator::Operator;
use crate::options::DdOptions;
use crate::types::{Type, Value};
use crate::utils::pairing2;
use crate::variable::VariableDd;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Accumulating timer that tolerates nested start/stop pairs.
#[derive(Default)]
pub(crate) struct Stopwatch {
    elapsed: Cell<Duration>,
    depth: Cell<u32>,
    started: Cell<Option<Instant>>,
}

impl Stopwatch {
    pub fn start(&self) {
        if self.depth.get() == 0 {
            self.started.set(Some(Instant::now()));
        }
        self.depth.set(self.depth.get() + 1);
    }

    pub fn stop(&self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            if let Some(started) = self.started.take() {
                self.elapsed.set(self.elapsed.get() + started.elapsed());
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

#[derive(Copy, Clone, Debug)]
enum Abstraction {
    Exist,
    Forall,
    Sum,
    Product,
    Max,
    Min,
}

pub struct Context {
    id: u32,
    options: DdOptions,
    backends: Vec<Box<dyn Backend>>,
    binary: u8,
    multi: u8,
    closed: Cell<bool>,
    and_exist: Cell<bool>,
    and_exist_warned: Cell<bool>,
    allow_reorder: Cell<bool>,
    generation: Cell<u64>,
    /// Projection node of every variable, per backend slot.
    variable_nodes: RefCell<Vec<Vec<NodeId>>>,
    variable_names: RefCell<Vec<Option<String>>>,
    /// Handles held by the context itself (variable projections).
    borrowed: RefCell<HashSet<Dd>>,
    variables: RefCell<Vec<Rc<VariableDd>>>,
    live: RefCell<HashMap<Dd, Vec<&'static Location<'static>>>>,
    total_time: Stopwatch,
    conversion_time: Stopwatch,
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("binary", &self.backend(self.binary).identifier())
            .field("multi", &self.backend(self.multi).identifier())
            .field("variables", &self.num_variables())
            .field("closed", &self.closed.get())
            .finish()
    }
}

impl Context {
    pub fn new(options: DdOptions) -> Result<Self> {
        let mut backends = vec![backend::create(&options.binary_backend, &options)?];
        let multi = if options.multi_backend == options.binary_backend {
            0
        } else {
            backends.push(backend::create(&options.multi_backend, &options)?);
            1
        };
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            "new context #{} (binary = '{}', multi = '{}')",
            id, options.binary_backend, options.multi_backend
        );

        Ok(Self {
            id,
            and_exist: Cell::new(options.and_exist),
            allow_reorder: Cell::new(options.allow_reorder),
            options,
            backends,
            binary: 0,
            multi,
            closed: Cell::new(false),
            and_exist_warned: Cell::new(false),
            generation: Cell::new(0),
            variable_nodes: RefCell::new(Vec::new()),
            variable_names: RefCell::new(Vec::new()),
            borrowed: RefCell::new(HashSet::new()),
            variables: RefCell::new(Vec::new()),
            live: RefCell::new(HashMap::new()),
            total_time: Stopwatch::default(),
            conversion_time: Stopwatch::default(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn options(&self) -> &DdOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn backend(&self, slot: u8) -> &dyn Backend {
        self.backends[slot as usize].as_ref()
    }

    pub(crate) fn binary_slot(&self) -> u8 {
        self.binary
    }

    pub(crate) fn multi_slot(&self) -> u8 {
        self.multi
    }

    pub fn set_and_exist(&self, enabled: bool) {
        self.and_exist.set(enabled);
    }

    pub fn and_exist(&self) -> bool {
        self.and_exist.get()
    }

    pub fn set_allow_reorder(&self, allow: bool) {
        self.allow_reorder.set(allow);
    }

    pub fn allow_reorder(&self) -> bool {
        self.allow_reorder.get()
    }

    /// Current walker generation. Walkers created in an older generation are stale.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn invalidate_walkers(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    /// Called before every operation that may restructure the backends.
    fn structural(&self) {
        if self.allow_reorder.get() {
            self.invalidate_walkers();
        }
    }

    pub(crate) fn timed<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.total_time.start();
        let res = f();
        self.total_time.stop();
        res
    }

    pub fn total_time(&self) -> Duration {
        self.total_time.elapsed()
    }

    pub fn conversion_time(&self) -> Duration {
        self.conversion_time.elapsed()
    }

    pub fn statistics(&self) -> Vec<BackendStats> {
        self.backends.iter().map(|b| b.stats()).collect()
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed.get() {
            Err(DdError::ContextClosed)
        } else {
            Ok(())
        }
    }

    /// Validate that `dd` is a live handle of this context.
    pub(crate) fn check(&self, dd: Dd) -> Result<()> {
        self.check_open()?;
        if dd.context != self.id {
            return Err(DdError::ContextMismatch {
                expected: self.id,
                found: dd.context,
            });
        }
        if dd.slot as usize >= self.backends.len() {
            return Err(DdError::UseAfterRelease(dd.to_string()));
        }
        if self.options.debug && self.backend(dd.slot).ref_count(dd.id) == 0 {
            return Err(DdError::UseAfterRelease(dd.to_string()));
        }
        if self.options.leak_check
            && !self.live.borrow().contains_key(&dd)
            && !self.borrowed.borrow().contains(&dd)
        {
            return Err(DdError::UseAfterRelease(dd.to_string()));
        }
        Ok(())
    }

    pub(crate) fn check_all(&self, dds: &[Dd]) -> Result<()> {
        dds.iter().try_for_each(|&dd| self.check(dd))
    }

    fn debug_check(&self) -> Result<()> {
        if self.options.debug {
            for b in &self.backends {
                b.check_consistency()?;
            }
        }
        Ok(())
    }

    /// Wrap a retained backend node into a handle owned by the caller.
    pub(crate) fn own(&self, slot: u8, id: NodeId, location: &'static Location<'static>) -> Dd {
        let dd = Dd::new(self.id, slot, id);
        if self.options.leak_check {
            self.live.borrow_mut().entry(dd).or_default().push(location);
        }
        dd
    }

    /// A new owned handle to the node of `dd`.
    #[track_caller]
    pub fn retain(&self, dd: Dd) -> Result<Dd> {
        let location = Location::caller();
        self.check(dd)?;
        let id = self.backend(dd.slot).retain(dd.id);
        Ok(self.own(dd.slot, id, location))
    }

    #[track_caller]
    pub fn retain_all(&self, dds: &[Dd]) -> Result<Vec<Dd>> {
        self.collect_owned(dds.iter().map(|&dd| self.retain(dd)))
    }

    /// Collect owned handles. On the first error the handles collected so far
    /// are released again.
    pub(crate) fn collect_owned<I>(&self, dds: I) -> Result<Vec<Dd>>
    where
        I: IntoIterator<Item = Result<Dd>>,
    {
        let mut res = Vec::new();
        for dd in dds {
            match dd {
                Ok(dd) => res.push(dd),
                Err(e) => return self.release_on_error(&res, Err(e)),
            }
        }
        Ok(res)
    }

    /// Pass `res` through, releasing `owned` if it is an error.
    pub(crate) fn release_on_error<T>(&self, owned: &[Dd], res: Result<T>) -> Result<T> {
        if res.is_err() {
            self.release_all(owned)?;
        }
        res
    }

    /// Give back an owned handle.
    pub fn release(&self, dd: Dd) -> Result<()> {
        self.check_open()?;
        if dd.context != self.id {
            return Err(DdError::ContextMismatch {
                expected: self.id,
                found: dd.context,
            });
        }
        if self.options.leak_check {
            let mut live = self.live.borrow_mut();
            match live.get_mut(&dd) {
                Some(sites) => {
                    sites.pop();
                    if sites.is_empty() {
                        live.remove(&dd);
                    }
                }
                None => return Err(DdError::DoubleRelease(dd.to_string())),
            }
        }
        self.backend(dd.slot).release(dd.id)
    }

    pub fn release_all(&self, dds: &[Dd]) -> Result<()> {
        dds.iter().try_for_each(|&dd| self.release(dd))
    }

    // Variables

    pub fn num_variables(&self) -> u32 {
        self.variable_nodes.borrow().len() as u32
    }

    /// Create a fresh boolean diagram variable in every backend and return its index.
    pub fn new_dd_variable(&self) -> Result<u32> {
        self.check_open()?;
        let index = self.num_variables();
        let mut nodes = Vec::with_capacity(self.backends.len());
        for (slot, b) in self.backends.iter().enumerate() {
            let id = b.new_variable()?;
            self.borrowed
                .borrow_mut()
                .insert(Dd::new(self.id, slot as u8, id));
            nodes.push(id);
        }
        self.variable_nodes.borrow_mut().push(nodes);
        debug!("new_dd_variable() -> {}", index);
        Ok(index)
    }

    pub fn set_variable_name(&self, index: u32, name: impl Into<String>) {
        let mut names = self.variable_names.borrow_mut();
        if names.len() <= index as usize {
            names.resize(index as usize + 1, None);
        }
        names[index as usize] = Some(name.into());
    }

    /// Name of a variable, `x<index>` if none was set.
    pub fn variable_name(&self, index: u32) -> String {
        self.variable_names
            .borrow()
            .get(index as usize)
            .cloned()
            .flatten()
            .unwrap_or_else(|| format!("x{}", index))
    }

    pub(crate) fn variable_node(&self, slot: u8, index: u32) -> Result<NodeId> {
        self.variable_nodes
            .borrow()
            .get(index as usize)
            .map(|nodes| nodes[slot as usize])
            .ok_or(DdError::UnknownVariable(index))
    }

    /// The projection diagram of variable `index` in the binary backend.
    ///
    /// The handle is owned by the context and must not be released.
    pub fn variable(&self, index: u32) -> Result<Dd> {
        self.check_open()?;
        let id = self.variable_node(self.binary, index)?;
        Ok(Dd::new(self.id, self.binary, id))
    }

    pub(crate) fn register_variable(&self, variable: Rc<VariableDd>) {
        self.variables.borrow_mut().push(variable);
    }

    /// All typed variables created so far.
    pub fn variables(&self) -> Vec<Rc<VariableDd>> {
        self.variables.borrow().clone()
    }

    // Constants

    #[track_caller]
    pub fn new_constant(&self, value: impl Into<Value>) -> Result<Dd> {
        let location = Location::caller();
        self.check_open()?;
        let value = value.into();
        let slot = if value.type_().is_boolean() {
            self.binary
        } else {
            self.multi
        };
        let id = self.backend(slot).new_constant(&value)?;
        Ok(self.own(slot, id, location))
    }

    #[track_caller]
    pub fn new_true(&self) -> Result<Dd> {
        self.new_constant(true)
    }

    #[track_caller]
    pub fn new_false(&self) -> Result<Dd> {
        self.new_constant(false)
    }

    // Queries

    pub fn is_leaf(&self, dd: Dd) -> Result<bool> {
        self.check(dd)?;
        Ok(self.backend(dd.slot).is_leaf(dd.id))
    }

    pub fn value(&self, dd: Dd) -> Result<Value> {
        self.check(dd)?;
        self.backend(dd.slot).value(dd.id)
    }

    pub fn is_true(&self, dd: Dd) -> Result<bool> {
        Ok(self.is_leaf(dd)? && self.value(dd)?.is_true())
    }

    pub fn is_false(&self, dd: Dd) -> Result<bool> {
        Ok(self.is_leaf(dd)? && self.value(dd)?.is_false())
    }

    /// Index of the top variable, [`LEAF_REACHED`][crate::backend::LEAF_REACHED] for leaves.
    pub fn top_variable(&self, dd: Dd) -> Result<u32> {
        self.check(dd)?;
        Ok(self.backend(dd.slot).variable(dd.id))
    }

    pub fn is_complement(&self, dd: Dd) -> Result<bool> {
        self.check(dd)?;
        Ok(self.backend(dd.slot).is_complement(dd.id))
    }

    /// An id unique among all nodes of this context.
    pub fn unique_id(&self, dd: Dd) -> u64 {
        pairing2(dd.slot as u64, dd.id)
    }

    pub(crate) fn type_of(&self, slot: u8, id: NodeId) -> Result<Type> {
        let b = self.backend(slot);
        let mut id = id;
        while !b.is_leaf(id) {
            id = b.walker_high(id);
        }
        Ok(b.value(id)?.type_())
    }

    /// Type of the values of `dd`, read off the leaf reached by following high edges.
    pub fn get_type(&self, dd: Dd) -> Result<Type> {
        self.check(dd)?;
        self.type_of(dd.slot, dd.id)
    }

    pub fn is_boolean(&self, dd: Dd) -> Result<bool> {
        Ok(self.get_type(dd)?.is_boolean())
    }

    pub(crate) fn is_cube_node(&self, slot: u8, id: NodeId) -> bool {
        let b = self.backend(slot);
        let mut id = id;
        loop {
            if b.is_leaf(id) {
                return b.value(id).map_or(false, |v| v.is_true());
            }
            let (low, high) = cofactors(b, id);
            if !(b.is_leaf(low) && b.value(low).map_or(false, |v| v.is_false())) {
                return false;
            }
            id = high;
        }
    }

    /// Cube well-formedness, verified in debug mode only.
    pub(crate) fn check_cube(&self, cube: Dd) -> Result<()> {
        if self.options.debug && !self.is_cube_node(cube.slot, cube.id) {
            return Err(DdError::NotACube(cube.to_string()));
        }
        Ok(())
    }

    // Apply

    /// Apply `op` to `operands`, returning a new owned handle.
    #[track_caller]
    pub fn apply(&self, op: Operator, operands: &[Dd]) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.apply_raw(op, operands, false)?;
        Ok(self.own(slot, id, location))
    }

    /// Like [`Context::apply`], but always through the generic Shannon-expansion path.
    #[track_caller]
    pub fn apply_generic(&self, op: Operator, operands: &[Dd]) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.apply_raw(op, operands, true)?;
        Ok(self.own(slot, id, location))
    }

    /// Apply a boolean operator directly in the binary backend.
    #[track_caller]
    pub fn apply_boolean(&self, op: Operator, operands: &[Dd]) -> Result<Dd> {
        let location = Location::caller();
        self.check_all(operands)?;
        op.check_arity(operands.len())?;
        if let Some(dd) = operands.iter().find(|dd| dd.slot != self.binary) {
            return Err(DdError::TypeMismatch(format!(
                "{} is not in the binary backend",
                dd
            )));
        }
        let ty = Type::Boolean;
        self.structural();
        let ids: Vec<NodeId> = operands.iter().map(|dd| dd.id).collect();
        let id = self.timed(|| {
            let id = self.apply_ids(self.binary, op, &ty, &ids, false)?;
            self.debug_check()?;
            Ok(id)
        })?;
        Ok(self.own(self.binary, id, location))
    }

    fn apply_raw(&self, op: Operator, operands: &[Dd], force_generic: bool) -> Result<(u8, NodeId)> {
        self.check_all(operands)?;
        op.check_arity(operands.len())?;
        let types = operands
            .iter()
            .map(|&dd| self.get_type(dd))
            .collect::<Result<Vec<_>>>()?;
        let ty = op.result_type(&types)?;
        debug!("apply({}, {:?}) : {}", op, operands, ty);
        self.structural();

        self.timed(|| {
            let first = operands[0].slot;
            let slot = if operands.iter().all(|dd| dd.slot == first) {
                first
            } else {
                self.multi
            };

            let mut imported = Vec::new();
            let result = (|| {
                let mut ids = Vec::with_capacity(operands.len());
                for dd in operands {
                    if dd.slot == slot {
                        ids.push(dd.id);
                    } else {
                        let id = self.import(dd.slot, slot, dd.id)?;
                        imported.push(id);
                        ids.push(id);
                    }
                }
                self.apply_ids(slot, op, &ty, &ids, force_generic)
            })();
            for id in imported {
                self.backend(slot).release(id)?;
            }
            let id = result?;

            if slot == self.multi && self.multi != self.binary && op.is_comparison() {
                let converted = self.import(slot, self.binary, id);
                self.backend(slot).release(id)?;
                self.debug_check()?;
                return Ok((self.binary, converted?));
            }
            self.debug_check()?;
            Ok((slot, id))
        })
    }

    /// Native apply when the backend can, the generic fallback otherwise.
    pub(crate) fn apply_ids(
        &self,
        slot: u8,
        op: Operator,
        ty: &Type,
        ids: &[NodeId],
        force_generic: bool,
    ) -> Result<NodeId> {
        let b = self.backend(slot);
        if !force_generic && b.can_apply(op, ty, ids) {
            b.apply(op, ty, ids)
        } else {
            generic::apply(self, slot, op, ty, ids)
        }
    }

    // Import

    /// Copy the diagram `id` of backend `from` into backend `to`. The result is retained.
    pub(crate) fn import(&self, from: u8, to: u8, id: NodeId) -> Result<NodeId> {
        debug!("import(slot {} -> slot {}, {})", from, to, id);
        self.conversion_time.start();
        let allow_reorder = self.allow_reorder.replace(false);

        let mut memo = HashMap::new();
        let result = self
            .type_of(from, id)
            .and_then(|ty| self.import_rec(from, to, id, &ty, &mut memo))
            .map(|r| self.backend(to).retain(r));
        let released = memo
            .into_values()
            .try_for_each(|r| self.backend(to).release(r));

        self.allow_reorder.set(allow_reorder);
        self.conversion_time.stop();
        let result = result?;
        released?;
        Ok(result)
    }

    fn import_rec(
        &self,
        from: u8,
        to: u8,
        id: NodeId,
        ty: &Type,
        memo: &mut HashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        if let Some(&r) = memo.get(&id) {
            return Ok(r);
        }
        let src = self.backend(from);
        let res = if src.is_leaf(id) {
            self.backend(to).new_constant(&src.value(id)?)?
        } else {
            let v = src.variable(id);
            let (low, high) = cofactors(src, id);
            let high = self.import_rec(from, to, high, ty, memo)?;
            let low = self.import_rec(from, to, low, ty, memo)?;
            let x = self.variable_node(to, v)?;
            self.apply_ids(to, Operator::Ite, ty, &[x, high, low], false)?
        };
        memo.insert(id, res);
        Ok(res)
    }

    /// Convert a boolean diagram into a multi-terminal one with the given leaf values.
    #[track_caller]
    pub fn to_mt(&self, dd: Dd, for_true: impl Into<Value>, for_false: impl Into<Value>) -> Result<Dd> {
        let t = self.new_constant(for_true)?;
        let f = self.new_constant(for_false)?;
        let res = self.apply(Operator::Ite, &[dd, t, f]);
        self.release(t)?;
        self.release(f)?;
        res
    }

    /// `1` where `dd` holds, `0` elsewhere.
    #[track_caller]
    pub fn to_int(&self, dd: Dd) -> Result<Dd> {
        self.to_mt(dd, 1, 0)
    }

    // Permutation

    /// Rename the variables of `dd` according to `permutation`.
    #[track_caller]
    pub fn permute(&self, dd: Dd, permutation: &crate::permutation::Permutation) -> Result<Dd> {
        let location = Location::caller();
        self.check(dd)?;
        if permutation.context_id() != self.id {
            return Err(DdError::ContextMismatch {
                expected: self.id,
                found: permutation.context_id(),
            });
        }
        self.structural();
        let id = self.timed(|| {
            let pid = permutation.materialize(self, dd.slot)?;
            let id = self.backend(dd.slot).permute(dd.id, pid)?;
            self.debug_check()?;
            Ok(id)
        })?;
        Ok(self.own(dd.slot, id, location))
    }

    /// Run the backend reordering hook. Invalidates every open walker.
    pub fn reorder(&self) -> Result<()> {
        self.check_open()?;
        for b in &self.backends {
            b.reorder()?;
        }
        self.invalidate_walkers();
        Ok(())
    }

    // Abstraction

    fn abstract_raw(&self, kind: Abstraction, dd: Dd, cube: Dd) -> Result<(u8, NodeId)> {
        self.check(dd)?;
        self.check(cube)?;
        self.check_cube(cube)?;
        let ty = self.get_type(dd)?;
        debug!("abstract_{:?}(dd = {}, cube = {})", kind, dd, cube);
        self.structural();

        self.timed(|| {
            let slot = dd.slot;
            let b = self.backend(slot);
            let cube_id = if cube.slot == slot {
                cube.id
            } else {
                self.import(cube.slot, slot, cube.id)?
            };
            let result = match kind {
                Abstraction::Exist => b.abstract_exist(dd.id, cube_id),
                Abstraction::Forall => b.abstract_forall(dd.id, cube_id),
                Abstraction::Sum => b.abstract_sum(&ty, dd.id, cube_id),
                Abstraction::Product => b.abstract_product(&ty, dd.id, cube_id),
                Abstraction::Max => b.abstract_max(&ty, dd.id, cube_id),
                Abstraction::Min => b.abstract_min(&ty, dd.id, cube_id),
            };
            if cube.slot != slot {
                b.release(cube_id)?;
            }
            let id = result?;
            self.debug_check()?;
            Ok((slot, id))
        })
    }

    #[track_caller]
    pub fn abstract_exist(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.abstract_raw(Abstraction::Exist, dd, cube)?;
        Ok(self.own(slot, id, location))
    }

    #[track_caller]
    pub fn abstract_forall(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.abstract_raw(Abstraction::Forall, dd, cube)?;
        Ok(self.own(slot, id, location))
    }

    #[track_caller]
    pub fn abstract_sum(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.abstract_raw(Abstraction::Sum, dd, cube)?;
        Ok(self.own(slot, id, location))
    }

    #[track_caller]
    pub fn abstract_product(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.abstract_raw(Abstraction::Product, dd, cube)?;
        Ok(self.own(slot, id, location))
    }

    #[track_caller]
    pub fn abstract_max(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.abstract_raw(Abstraction::Max, dd, cube)?;
        Ok(self.own(slot, id, location))
    }

    #[track_caller]
    pub fn abstract_min(&self, dd: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        let (slot, id) = self.abstract_raw(Abstraction::Min, dd, cube)?;
        Ok(self.own(slot, id, location))
    }

    /// `∃cube. a ∧ b`, fused in one pass when the backend supports it and
    /// [`Context::and_exist`] is enabled.
    #[track_caller]
    pub fn abstract_and_exist(&self, a: Dd, b: Dd, cube: Dd) -> Result<Dd> {
        let location = Location::caller();
        self.check(a)?;
        self.check(b)?;
        self.check(cube)?;
        self.check_cube(cube)?;
        if !self.is_boolean(a)? || !self.is_boolean(b)? {
            return Err(DdError::TypeMismatch(format!(
                "and-exist needs boolean operands, got {} and {}",
                self.get_type(a)?,
                self.get_type(b)?
            )));
        }

        let backend = self.backend(a.slot);
        let fused = self.and_exist.get() && a.slot == b.slot && backend.has_and_exist();
        if self.and_exist.get() && !fused && !self.and_exist_warned.replace(true) {
            warn!(
                "fused and-exist requested, but backend '{}' does not provide it",
                backend.identifier()
            );
        }

        if !fused {
            let and = self.apply(Operator::And, &[a, b])?;
            let res = self.abstract_exist(and, cube);
            self.release(and)?;
            return res;
        }

        debug!("abstract_and_exist(a = {}, b = {}, cube = {})", a, b, cube);
        self.structural();
        let id = self.timed(|| {
            let cube_id = if cube.slot == a.slot {
                cube.id
            } else {
                self.import(cube.slot, a.slot, cube.id)?
            };
            let result = backend.abstract_and_exist(a.id, b.id, cube_id);
            if cube.slot != a.slot {
                backend.release(cube_id)?;
            }
            let id = result?;
            self.debug_check()?;
            Ok(id)
        })?;
        Ok(self.own(a.slot, id, location))
    }

    /// `¬∃cube. (¬a ∧ b)`.
    #[track_caller]
    pub fn abstract_implies_forall(&self, a: Dd, b: Dd, cube: Dd) -> Result<Dd> {
        let not_a = self.apply(Operator::Not, &[a])?;
        let exist = self.abstract_and_exist(not_a, b, cube);
        self.release(not_a)?;
        let exist = exist?;
        let res = self.apply(Operator::Not, &[exist]);
        self.release(exist)?;
        res
    }

    // Lifecycle

    /// Close the context, releasing every variable and both backends.
    ///
    /// With leak checking enabled, handles that are still alive are reported
    /// through [`DdError::Leak`].
    pub fn close(&self) -> Result<()> {
        self.check_open()?;

        let variables: Vec<Rc<VariableDd>> = self.variables.borrow_mut().drain(..).collect();
        for variable in variables {
            variable.release_encodings(self)?;
        }

        let mut leaked: Vec<(Dd, &'static Location<'static>)> = self
            .live
            .borrow_mut()
            .drain()
            .flat_map(|(dd, sites)| sites.into_iter().map(move |site| (dd, site)))
            .collect();
        leaked.sort_by_key(|(dd, site)| (site.file(), site.line(), site.column(), *dd));

        for dd in self.borrowed.borrow_mut().drain() {
            self.backend(dd.slot).release(dd.id)?;
        }
        self.closed.set(true);

        info!(
            "DD context #{} closed: conversion time {:.3}s, total time {:.3}s",
            self.id,
            self.conversion_time.elapsed().as_secs_f64(),
            self.total_time.elapsed().as_secs_f64()
        );
        for b in &self.backends {
            info!("{:?}", b.stats());
            b.close()?;
        }

        if leaked.is_empty() {
            return Ok(());
        }
        let report = leaked
            .iter()
            .map(|(dd, site)| format!("  {} allocated at {}", dd, site))
            .collect::<Vec<_>>()
            .join("\n");
        warn!("{} node(s) leaked:\n{}", leaked.len(), report);
        Err(DdError::Leak {
            count: leaked.len(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn options() -> DdOptions {
        DdOptions::default()
            .with_leak_check(true)
            .with_debug(true)
            .with_storage_bits(12)
            .with_cache_bits(10)
    }

    #[test]
    fn test_constants_are_routed_by_type() -> Result<()> {
        let ctx = Context::new(options())?;
        let t = ctx.new_true()?;
        let three = ctx.new_constant(3)?;
        assert_eq!(t.slot(), ctx.binary_slot());
        assert_eq!(three.slot(), ctx.multi_slot());
        assert_eq!(ctx.value(three)?, Value::Int(3));
        assert!(ctx.is_true(t)?);
        ctx.release_all(&[t, three])?;
        ctx.close()
    }

    #[test]
    fn test_boolean_laws() -> Result<()> {
        let ctx = Context::new(options())?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let y = ctx.variable(ctx.new_dd_variable()?)?;

        let xx = ctx.apply(Operator::And, &[x, x])?;
        assert_eq!(xx, x);

        let xy = ctx.apply(Operator::And, &[x, y])?;
        let yx = ctx.apply(Operator::And, &[y, x])?;
        assert_eq!(xy, yx);

        let not_x = ctx.apply(Operator::Not, &[x])?;
        let taut = ctx.apply(Operator::Or, &[x, not_x])?;
        assert!(ctx.is_true(taut)?);

        // ¬(x ∧ y) = ¬x ∨ ¬y
        let lhs = ctx.apply(Operator::Not, &[xy])?;
        let not_y = ctx.apply(Operator::Not, &[y])?;
        let rhs = ctx.apply(Operator::Or, &[not_x, not_y])?;
        assert_eq!(lhs, rhs);

        ctx.release_all(&[xx, xy, yx, not_x, taut, lhs, not_y, rhs])?;
        ctx.close()
    }

    #[test]
    fn test_leak_is_reported() -> Result<()> {
        let ctx = Context::new(options())?;
        let _forgotten = ctx.new_constant(1)?;
        match ctx.close() {
            Err(DdError::Leak { count, report }) => {
                assert_eq!(count, 1);
                assert!(report.contains("context.rs"));
            }
            other => panic!("expected a leak, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_double_release() -> Result<()> {
        let ctx = Context::new(options())?;
        let t = ctx.new_true()?;
        ctx.release(t)?;
        assert!(matches!(ctx.release(t), Err(DdError::DoubleRelease(_))));
        assert!(matches!(ctx.is_leaf(t), Err(DdError::UseAfterRelease(_))));
        ctx.close()
    }

    #[test]
    fn test_use_after_close() -> Result<()> {
        let ctx = Context::new(options())?;
        ctx.close()?;
        assert_eq!(ctx.new_true().err(), Some(DdError::ContextClosed));
        assert_eq!(ctx.close().err(), Some(DdError::ContextClosed));
        Ok(())
    }

    #[test]
    fn test_context_mismatch() -> Result<()> {
        let a = Context::new(options())?;
        let b = Context::new(options())?;
        let t = a.new_true()?;
        assert!(matches!(b.is_leaf(t), Err(DdError::ContextMismatch { .. })));
        a.release(t)?;
        a.close()?;
        b.close()
    }

    #[test]
    fn test_mixed_backends_are_imported() -> Result<()> {
        let ctx = Context::new(options())?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let one = ctx.new_constant(1)?;
        let two = ctx.new_constant(2)?;

        // ite(x, 1, 2) lives in the multi-terminal backend
        let f = ctx.apply(Operator::Ite, &[x, one, two])?;
        assert_eq!(f.slot(), ctx.multi_slot());
        assert_eq!(ctx.top_variable(f)?, 0);

        // comparisons come back as binary diagrams, equal to the variable
        let lt = ctx.apply(Operator::Lt, &[f, two])?;
        assert_eq!(lt.slot(), ctx.binary_slot());
        assert_eq!(lt, x);
        assert!(ctx.total_time() >= ctx.conversion_time());

        ctx.release_all(&[one, two, f, lt])?;
        ctx.close()
    }

    #[test]
    fn test_shared_backend() -> Result<()> {
        let ctx = Context::new(options().with_binary_backend("mtbdd"))?;
        assert_eq!(ctx.binary_slot(), ctx.multi_slot());
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let one = ctx.new_constant(1)?;
        let zero = ctx.new_constant(0)?;
        let f = ctx.apply(Operator::Ite, &[x, one, zero])?;
        let eq = ctx.apply(Operator::Eq, &[f, one])?;
        assert_eq!(eq, x);
        ctx.release_all(&[one, zero, f, eq])?;
        ctx.close()
    }

    #[test]
    fn test_unknown_backend() {
        let err = Context::new(options().with_multi_backend("sylvan")).err();
        assert_eq!(err, Some(DdError::UnknownBackend("sylvan".to_string())));
    }

    #[test]
    fn test_abstract_and_exist_paths_agree() -> Result<()> {
        for fused in [true, false] {
            let ctx = Context::new(options().with_and_exist(fused))?;
            let x: Vec<Dd> = (0..4)
                .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
                .collect::<Result<_>>()?;
            let a = ctx.apply(Operator::Or, &[x[0], x[2]])?;
            let b = ctx.apply(Operator::Ite, &[x[1], x[3], x[0]])?;
            let cube = ctx.apply(Operator::And, &[x[0], x[1]])?;

            let r1 = ctx.abstract_and_exist(a, b, cube)?;
            let ab = ctx.apply(Operator::And, &[a, b])?;
            let r2 = ctx.abstract_exist(ab, cube)?;
            assert_eq!(r1, r2);

            ctx.release_all(&[a, b, cube, r1, ab, r2])?;
            ctx.close()?;
        }
        Ok(())
    }

    #[test]
    fn test_abstract_implies_forall() -> Result<()> {
        let ctx = Context::new(options())?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let y = ctx.variable(ctx.new_dd_variable()?)?;

        // ∀x. (x ⇒ y) = y
        let r = ctx.abstract_implies_forall(x, y, x)?;
        assert_eq!(r, y);
        ctx.release(r)?;
        ctx.close()
    }

    #[test]
    fn test_abstract_sum_over_mt() -> Result<()> {
        let ctx = Context::new(options())?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let f = ctx.to_int(x)?;
        let seven = ctx.new_constant(7)?;
        let g = ctx.apply(Operator::Add, &[f, seven])?;

        // (0 + 7) + (1 + 7)
        let s = ctx.abstract_sum(g, x)?;
        assert_eq!(ctx.value(s)?, Value::Int(15));
        let m = ctx.abstract_min(g, x)?;
        assert_eq!(ctx.value(m)?, Value::Int(7));

        ctx.release_all(&[f, seven, g, s, m])?;
        ctx.close()
    }

    #[test]
    fn test_not_a_cube() -> Result<()> {
        let ctx = Context::new(options())?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let not_x = ctx.apply(Operator::Not, &[x])?;
        assert!(matches!(
            ctx.abstract_exist(x, not_x),
            Err(DdError::NotACube(_))
        ));
        ctx.release(not_x)?;
        ctx.close()
    }

    fn triples(n: u32) -> impl Iterator<Item = [u32; 3]> {
        (0..n).flat_map(move |a| {
            (a + 1..n).flat_map(move |b| (b + 1..n).map(move |c| [a, b, c]))
        })
    }

    #[test]
    fn test_full_table_collects_garbage() -> Result<()> {
        let ctx = Context::new(options().with_storage_bits(6))?;
        let x: Vec<Dd> = (0..10)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect::<Result<_>>()?;

        // Far more nodes than the table holds, but only one result alive at a time
        for [a, b, c] in triples(10) {
            let f = ctx.apply(Operator::And, &[x[a as usize], x[b as usize], x[c as usize]])?;
            ctx.release(f)?;
        }
        assert!(ctx.statistics()[ctx.binary_slot() as usize].gc_runs > 0);
        ctx.close()
    }

    #[test]
    fn test_full_table_reports_out_of_memory() -> Result<()> {
        let ctx = Context::new(options().with_storage_bits(6))?;
        let x: Vec<Dd> = (0..10)
            .map(|_| ctx.new_dd_variable().and_then(|i| ctx.variable(i)))
            .collect::<Result<_>>()?;

        let mut alive = Vec::new();
        let mut failure = None;
        for [a, b, c] in triples(10) {
            match ctx.apply(Operator::And, &[x[a as usize], x[b as usize], x[c as usize]]) {
                Ok(f) => alive.push(f),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        let failure = failure.expect("the table should overflow");
        assert!(matches!(failure, DdError::OutOfMemory { backend: "bdd", .. }));
        assert!(failure.is_recoverable());

        // The context stays usable and nothing leaked on the failed path
        ctx.release_all(&alive)?;
        let f = ctx.apply(Operator::And, &[x[0], x[1], x[2]])?;
        ctx.release(f)?;
        ctx.close()
    }

    #[test]
    fn test_stopwatch_nesting() {
        let watch = Stopwatch::default();
        watch.start();
        watch.start();
        watch.stop();
        let inner = watch.elapsed();
        watch.stop();
        assert_eq!(inner, Duration::ZERO);
        assert!(watch.elapsed() >= inner);
    }
}
