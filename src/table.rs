//! Hash-consing unique table.
//!
//! Fixed-capacity storage with chained buckets. Cell 0 is a sentry and never
//! handed out, so index 0 doubles as the "end of chain" marker.

use std::cmp::min;
use std::ops::Index;

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
    occupied: bool,
}

impl<T: Default> Default for Entry<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            next: 0,
            occupied: false,
        }
    }
}

pub struct Table<T> {
    data: Vec<Entry<T>>,

    buckets: Vec<usize>,
    bitmask: u64,

    /// Index of the first *possibly* free (non-occupied) cell.
    min_free: usize,
    /// Index of the last occupied cell.
    last_index: usize,
    /// Number of occupied cells.
    real_size: usize,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table of size `2^bits`.
    pub fn new(bits: usize) -> Self {
        assert!(
            (1..=31).contains(&bits),
            "Storage bits should be in the range 1..=31"
        );

        let capacity = 1 << bits;
        let mut data: Vec<Entry<T>> = Vec::with_capacity(capacity);
        data.resize_with(capacity, Entry::default);
        data[0].occupied = true; // sentry

        let buckets_bits = min(bits, 16);
        let buckets_size = 1 << buckets_bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        Self {
            data,
            buckets,
            bitmask,
            min_free: 1,
            last_index: 0,
            real_size: 0,
        }
    }
}

impl<T> Table<T> {
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
    /// Number of occupied cells.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.data[index].occupied
    }

    /// Allocate a new cell, or `None` if the table is full.
    pub(crate) fn alloc(&mut self) -> Option<usize> {
        let index = match (self.min_free..=self.last_index).find(|&i| !self.is_occupied(i)) {
            Some(i) => i,
            None => {
                if self.last_index + 1 >= self.capacity() {
                    return None;
                }
                self.last_index += 1;
                self.last_index
            }
        };

        self.data[index].occupied = true;
        self.min_free = index + 1;
        self.real_size += 1;

        Some(index)
    }

    /// Place a value into a fresh cell outside of any bucket.
    pub fn add(&mut self, value: T) -> Option<usize> {
        let index = self.alloc()?;
        self.data[index].value = value;
        self.data[index].next = 0;
        Some(index)
    }

    /// Iterate over the indices of all occupied cells.
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        (1..=self.last_index).filter(move |&i| self.data[i].occupied)
    }

    /// Unlink and free every chained cell for which `keep` returns false.
    /// Returns the number of freed cells.
    pub fn sweep(&mut self, keep: impl Fn(usize) -> bool) -> usize {
        let mut freed = 0;
        for b in 0..self.buckets.len() {
            let mut prev = 0;
            let mut index = self.buckets[b];
            while index != 0 {
                let next = self.data[index].next;
                if keep(index) {
                    prev = index;
                } else {
                    if prev == 0 {
                        self.buckets[b] = next;
                    } else {
                        self.data[prev].next = next;
                    }
                    self.data[index].occupied = false;
                    self.data[index].next = 0;
                    self.min_free = min(self.min_free, index);
                    self.real_size -= 1;
                    freed += 1;
                }
                index = next;
            }
        }
        freed
    }
}

impl<T> Table<T>
where
    T: MyHash + Eq,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Find the cell holding `value`, inserting it if absent.
    /// Returns `None` only when a new cell is needed and the table is full.
    pub fn put(&mut self, value: T) -> Option<usize> {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            let i = self.add(value)?;
            self.buckets[bucket_index] = i;
            return Some(i);
        }

        loop {
            if &value == self.value(index) {
                return Some(index);
            }

            let next = self.data[index].next;
            if next == 0 {
                let i = self.add(value)?;
                self.data[index].next = i;
                return Some(i);
            }
            index = next;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
