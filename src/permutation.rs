//! Variable permutations.

use std::cell::RefCell;

use log::debug;

use crate::backend::PermutationId;
use crate::context::Context;
use crate::dd::Dd;
use crate::error::{DdError, Result};

/// A bijective renaming of diagram variables.
///
/// The map may be shorter than the number of variables of the context; the
/// missing indices are mapped to themselves. The backend-specific object is
/// built on first use and rebuilt whenever the context has gained variables
/// since.
#[derive(Debug)]
pub struct Permutation {
    context: u32,
    map: Vec<u32>,
    /// Per backend slot: variable count at build time and the backend object.
    built: RefCell<Vec<Option<(u32, PermutationId)>>>,
}

fn check_bijection(map: &[u32]) -> Result<()> {
    let mut seen = vec![false; map.len()];
    for (from, &to) in map.iter().enumerate() {
        match seen.get_mut(to as usize) {
            Some(s) if !*s => *s = true,
            _ => {
                return Err(DdError::InvalidPermutation(format!(
                    "{} -> {} is not a bijection on 0..{}",
                    from,
                    to,
                    map.len()
                )))
            }
        }
    }
    Ok(())
}

impl Permutation {
    fn new(context: u32, map: Vec<u32>) -> Result<Self> {
        check_bijection(&map)?;
        Ok(Self {
            context,
            map,
            built: RefCell::new(Vec::new()),
        })
    }

    pub fn context_id(&self) -> u32 {
        self.context
    }

    /// Image of `variable`.
    pub fn get_permuted(&self, variable: u32) -> u32 {
        self.map.get(variable as usize).copied().unwrap_or(variable)
    }

    pub fn map(&self) -> &[u32] {
        &self.map
    }

    pub fn inverse(&self) -> Permutation {
        let mut inverse = vec![0; self.map.len()];
        for (from, &to) in self.map.iter().enumerate() {
            inverse[to as usize] = from as u32;
        }
        Permutation {
            context: self.context,
            map: inverse,
            built: RefCell::new(Vec::new()),
        }
    }

    /// The backend object for `slot`, (re)built for the current variable count.
    pub(crate) fn materialize(&self, ctx: &Context, slot: u8) -> Result<PermutationId> {
        let num_vars = ctx.num_variables();
        if self.map.len() > num_vars as usize {
            return Err(DdError::InvalidPermutation(format!(
                "map over {} variables, context has {}",
                self.map.len(),
                num_vars
            )));
        }

        let mut built = self.built.borrow_mut();
        if built.len() <= slot as usize {
            built.resize(slot as usize + 1, None);
        }
        let backend = ctx.backend(slot);
        if let Some((n, id)) = built[slot as usize].take() {
            if n == num_vars {
                built[slot as usize] = Some((n, id));
                return Ok(id);
            }
            backend.free_permutation(id)?;
        }

        let extended: Vec<u32> = (0..num_vars).map(|v| self.get_permuted(v)).collect();
        debug!("materialize permutation {:?} for slot {}", extended, slot);
        let id = backend.new_permutation(&extended)?;
        built[slot as usize] = Some((num_vars, id));
        Ok(id)
    }
}

impl Context {
    /// Permutation mapping variable `i` to `map[i]`.
    pub fn new_permutation(&self, map: &[u32]) -> Result<Permutation> {
        self.check_open()?;
        Permutation::new(self.id(), map.to_vec())
    }

    /// Permutation swapping `first[i]` with `second[i]`.
    ///
    /// Both lists hold variable diagrams and must be disjoint.
    pub fn new_permutation_lists(&self, first: &[Dd], second: &[Dd]) -> Result<Permutation> {
        let first = first
            .iter()
            .map(|&dd| self.variable_index(dd))
            .collect::<Result<Vec<_>>>()?;
        let second = second
            .iter()
            .map(|&dd| self.variable_index(dd))
            .collect::<Result<Vec<_>>>()?;
        self.swapping(&first, &second)
    }

    /// Permutation swapping the variables of two cubes, in variable order.
    pub fn new_permutation_cubes(&self, first: Dd, second: Dd) -> Result<Permutation> {
        let first = self.cube_to_list(first)?;
        let second = self.cube_to_list(second)?;
        self.swapping(&first, &second)
    }

    fn variable_index(&self, dd: Dd) -> Result<u32> {
        self.check(dd)?;
        let v = self.top_variable(dd)?;
        if self.variable_node(dd.slot, v).ok() != Some(dd.id) {
            return Err(DdError::InvalidPermutation(format!(
                "{} is not a variable",
                dd
            )));
        }
        Ok(v)
    }

    fn swapping(&self, first: &[u32], second: &[u32]) -> Result<Permutation> {
        self.check_open()?;
        if first.len() != second.len() {
            return Err(DdError::InvalidPermutation(format!(
                "lists of different length ({} and {})",
                first.len(),
                second.len()
            )));
        }
        if let Some(v) = first.iter().find(|v| second.contains(v)) {
            return Err(DdError::InvalidPermutation(format!(
                "variable {} occurs in both lists",
                v
            )));
        }

        let size = first
            .iter()
            .chain(second)
            .map(|&v| v + 1)
            .max()
            .unwrap_or(0);
        let mut map: Vec<u32> = (0..size).collect();
        for (&a, &b) in first.iter().zip(second) {
            map[a as usize] = b;
            map[b as usize] = a;
        }
        Permutation::new(self.id(), map)
    }
}
