//! The backend contract.
//!
//! A backend is a native decision-diagram engine. It hands out plain integer
//! node ids, keeps an external reference count per node, and executes the
//! operations it can do natively. Everything a backend cannot do (see
//! [`Backend::can_apply`]) is covered by the generic fallback in
//! [`crate::generic`].
//!
//! Two engines ship with the crate:
//!
//! - [`bdd::BinaryBackend`] (`"bdd"`): boolean diagrams with complement edges
//!   and a fused and-exist.
//! - [`mtbdd::MultiBackend`] (`"mtbdd"`): multi-terminal diagrams over any
//!   [`Value`], without complement edges.

use std::cell::RefCell;

use crate::error::{DdError, Result};
use crate::operator::Operator;
use crate::options::DdOptions;
use crate::types::{Type, Value};

pub mod bdd;
pub mod mtbdd;

/// Backend-local node id.
pub type NodeId = u64;

/// Variable index reported for leaves. Larger than any real variable, so a
/// leaf always sorts last in a Shannon expansion.
pub const LEAF_REACHED: u32 = u32::MAX;

/// Opaque permutation object, produced by [`Backend::new_permutation`] and only
/// meaningful to the backend that produced it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PermutationId(pub(crate) usize);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub identifier: &'static str,
    pub nodes: usize,
    pub capacity: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub gc_runs: usize,
}

pub trait Backend {
    fn identifier(&self) -> &'static str;

    /// Whether node ids may carry a complement mark.
    fn has_inverter_arcs(&self) -> bool;

    /// Whether [`Backend::abstract_and_exist`] is implemented natively.
    fn has_and_exist(&self) -> bool {
        false
    }

    /// Maximal number of variables the engine can hold.
    fn max_variables(&self) -> u32;

    /// Capability probe for [`Backend::apply`].
    fn can_apply(&self, op: Operator, ty: &Type, operands: &[NodeId]) -> bool;

    /// Apply `op` natively. The result is retained.
    fn apply(&self, op: Operator, ty: &Type, operands: &[NodeId]) -> Result<NodeId>;

    /// A retained leaf.
    fn new_constant(&self, value: &Value) -> Result<NodeId>;

    /// Create the next variable and return its retained projection node.
    fn new_variable(&self) -> Result<NodeId>;

    fn is_leaf(&self, dd: NodeId) -> bool;

    /// Value of a leaf, respecting a complement mark on `dd`.
    fn value(&self, dd: NodeId) -> Result<Value>;

    /// Variable index of an inner node, [`LEAF_REACHED`] for leaves.
    fn variable(&self, dd: NodeId) -> u32;

    /// Stored low child of the regular node of `dd`, with its own mark.
    fn walker_low(&self, dd: NodeId) -> NodeId;

    /// Stored high child of the regular node of `dd`, with its own mark.
    fn walker_high(&self, dd: NodeId) -> NodeId;

    fn is_complement(&self, dd: NodeId) -> bool;

    fn walker_complement(&self, dd: NodeId) -> NodeId;

    fn walker_regular(&self, dd: NodeId) -> NodeId;

    /// Increment the reference count and return `dd`.
    fn retain(&self, dd: NodeId) -> NodeId;

    /// Decrement the reference count.
    fn release(&self, dd: NodeId) -> Result<()>;

    fn ref_count(&self, dd: NodeId) -> u32;

    /// Register a variable mapping. `map` must be a bijection on `0..map.len()`
    /// covering every variable of the engine.
    fn new_permutation(&self, map: &[u32]) -> Result<PermutationId>;

    fn permute(&self, dd: NodeId, permutation: PermutationId) -> Result<NodeId>;

    /// Drop a permutation. Its id may be handed out again.
    fn free_permutation(&self, permutation: PermutationId) -> Result<()>;

    /// Number of permutations currently registered.
    fn num_permutations(&self) -> usize;

    fn abstract_exist(&self, dd: NodeId, cube: NodeId) -> Result<NodeId>;

    fn abstract_forall(&self, dd: NodeId, cube: NodeId) -> Result<NodeId>;

    fn abstract_sum(&self, ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId>;

    fn abstract_product(&self, ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId>;

    fn abstract_max(&self, ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId>;

    fn abstract_min(&self, ty: &Type, dd: NodeId, cube: NodeId) -> Result<NodeId>;

    /// `exist(and(a, b), cube)` in one pass.
    fn abstract_and_exist(&self, a: NodeId, b: NodeId, cube: NodeId) -> Result<NodeId> {
        let _ = (a, b, cube);
        Err(DdError::UnsupportedOperation {
            backend: self.identifier(),
            op: "and-exist".to_string(),
        })
    }

    /// Variable reordering hook. Native engines keep the identity order.
    fn reorder(&self) -> Result<()> {
        Ok(())
    }

    fn equals(&self, a: NodeId, b: NodeId) -> bool {
        a == b
    }

    fn hash(&self, dd: NodeId) -> u64 {
        dd
    }

    /// Free every node not reachable from a retained one.
    fn collect_garbage(&self);

    /// Internal self-check of the node table.
    fn check_consistency(&self) -> Result<()>;

    fn stats(&self) -> BackendStats;

    fn close(&self) -> Result<()>;
}

/// Instantiate a backend by identifier.
pub fn create(identifier: &str, options: &DdOptions) -> Result<Box<dyn Backend>> {
    match identifier {
        bdd::IDENTIFIER => Ok(Box::new(bdd::BinaryBackend::new(
            options.storage_bits,
            options.cache_bits,
        ))),
        mtbdd::IDENTIFIER => Ok(Box::new(mtbdd::MultiBackend::new(
            options.storage_bits,
            options.cache_bits,
        ))),
        _ => Err(DdError::UnknownBackend(identifier.to_string())),
    }
}

/// Low and high cofactor of `dd`, with a complement mark on `dd` pushed down
/// to both children.
pub(crate) fn cofactors(backend: &dyn Backend, dd: NodeId) -> (NodeId, NodeId) {
    let low = backend.walker_low(dd);
    let high = backend.walker_high(dd);
    if backend.is_complement(dd) {
        (backend.walker_complement(low), backend.walker_complement(high))
    } else {
        (low, high)
    }
}

/// External reference counts, indexed by node-table index.
pub(crate) struct RefCounts {
    counts: RefCell<Vec<u32>>,
}

impl RefCounts {
    pub fn new(capacity: usize) -> Self {
        Self {
            counts: RefCell::new(vec![0; capacity]),
        }
    }

    pub fn retain(&self, index: usize) {
        let mut counts = self.counts.borrow_mut();
        counts[index] = counts[index].saturating_add(1);
    }

    pub fn release(&self, index: usize) -> bool {
        let mut counts = self.counts.borrow_mut();
        if counts[index] == 0 {
            return false;
        }
        counts[index] -= 1;
        true
    }

    pub fn get(&self, index: usize) -> u32 {
        self.counts.borrow()[index]
    }

    /// Indices with a positive count.
    pub fn roots(&self) -> Vec<usize> {
        self.counts
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.borrow().iter().map(|&c| c as u64).sum()
    }
}

/// Registered variable mappings. Freed slots are reused by later registrations.
#[derive(Default)]
pub(crate) struct Permutations {
    maps: RefCell<Vec<Option<Vec<u32>>>>,
}

impl Permutations {
    pub fn add(&self, map: &[u32]) -> Result<PermutationId> {
        let mut seen = vec![false; map.len()];
        for (from, &to) in map.iter().enumerate() {
            if to as usize >= map.len() || seen[to as usize] {
                return Err(DdError::InvalidPermutation(format!(
                    "{} -> {} breaks bijectivity",
                    from, to
                )));
            }
            seen[to as usize] = true;
        }
        let mut maps = self.maps.borrow_mut();
        match maps.iter().position(Option::is_none) {
            Some(i) => {
                maps[i] = Some(map.to_vec());
                Ok(PermutationId(i))
            }
            None => {
                maps.push(Some(map.to_vec()));
                Ok(PermutationId(maps.len() - 1))
            }
        }
    }

    pub fn get(&self, permutation: PermutationId) -> Result<Vec<u32>> {
        self.maps
            .borrow()
            .get(permutation.0)
            .and_then(|map| map.clone())
            .ok_or_else(|| DdError::InvalidPermutation(format!("unknown {:?}", permutation)))
    }

    pub fn free(&self, permutation: PermutationId) -> Result<()> {
        match self.maps.borrow_mut().get_mut(permutation.0) {
            Some(map @ Some(_)) => {
                *map = None;
                Ok(())
            }
            _ => Err(DdError::InvalidPermutation(format!(
                "unknown {:?}",
                permutation
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.borrow().iter().filter(|map| map.is_some()).count()
    }

    pub fn clear(&self) {
        self.maps.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_backends() {
        let options = DdOptions::default().with_storage_bits(8);
        assert_eq!(create("bdd", &options).unwrap().identifier(), "bdd");
        assert_eq!(create("mtbdd", &options).unwrap().identifier(), "mtbdd");
    }

    #[test]
    fn test_create_unknown_backend() {
        let options = DdOptions::default();
        assert_eq!(
            create("cudd", &options).err(),
            Some(DdError::UnknownBackend("cudd".to_string()))
        );
    }

    #[test]
    fn test_ref_counts() {
        let refs = RefCounts::new(4);
        refs.retain(2);
        refs.retain(2);
        assert_eq!(refs.get(2), 2);
        assert_eq!(refs.roots(), vec![2]);
        assert!(refs.release(2));
        assert!(refs.release(2));
        assert!(!refs.release(2));
        assert_eq!(refs.total(), 0);
    }

    #[test]
    fn test_permutation_slots_are_reused() {
        let perms = Permutations::default();
        let a = perms.add(&[1, 0]).unwrap();
        let b = perms.add(&[0, 1, 2]).unwrap();
        assert_eq!(perms.len(), 2);

        perms.free(a).unwrap();
        assert_eq!(perms.len(), 1);
        assert!(matches!(perms.get(a), Err(DdError::InvalidPermutation(_))));
        assert!(matches!(perms.free(a), Err(DdError::InvalidPermutation(_))));

        let c = perms.add(&[2, 0, 1]).unwrap();
        assert_eq!(c, a);
        assert_eq!(perms.get(c).unwrap(), vec![2, 0, 1]);
        assert_eq!(perms.get(b).unwrap(), vec![0, 1, 2]);
        assert_eq!(perms.len(), 2);
    }
}
