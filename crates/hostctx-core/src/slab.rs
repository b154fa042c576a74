//! Dense index allocator
//!
//! Hands out small integers that tag engine contexts. Freed indices are kept
//! in a min-heap so the smallest free slot is always reused first; the slot
//! table only ever grows.
//!
//! The slab is not synchronized. The context registry owns the only instance
//! and touches it while holding its lock.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

/// Index of an occupied slab slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlabIndex(u32);

impl SlabIndex {
    /// Wrap a raw index value
    pub const fn new(raw: u32) -> Self {
        SlabIndex(raw)
    }

    /// Get the raw index value
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the index as a slot offset
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlabIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<SlabIndex> for u64 {
    fn from(index: SlabIndex) -> u64 {
        u64::from(index.0)
    }
}

/// Errors reported when releasing a slot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlabError {
    /// The index was never handed out by this slab
    #[error("slab index {index} out of range (capacity {capacity})")]
    OutOfRange {
        /// Offending index
        index: SlabIndex,
        /// Number of slots handed out so far
        capacity: usize,
    },

    /// The slot is already free
    #[error("slab index {0} released twice")]
    DoubleRelease(SlabIndex),
}

/// Free-list backed index allocator
#[derive(Debug, Default)]
pub struct Slab {
    /// Occupancy flag per slot
    occupied: Vec<bool>,

    /// Released slots, smallest first
    free: BinaryHeap<Reverse<u32>>,

    /// Number of occupied slots
    live: usize,
}

impl Slab {
    /// Create an empty slab
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty slab with room for `capacity` slots before growing
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            occupied: Vec::with_capacity(capacity),
            free: BinaryHeap::new(),
            live: 0,
        }
    }

    /// Allocate the smallest free index
    pub fn allocate(&mut self) -> SlabIndex {
        let raw = match self.free.pop() {
            Some(Reverse(raw)) => raw,
            None => {
                let raw = u32::try_from(self.occupied.len())
                    .unwrap_or_else(|_| panic!("slab exhausted: more than {} live slots", u32::MAX));
                self.occupied.push(false);
                raw
            }
        };

        self.occupied[raw as usize] = true;
        self.live += 1;
        SlabIndex(raw)
    }

    /// Return `index` to the free list
    pub fn release(&mut self, index: SlabIndex) -> Result<(), SlabError> {
        let capacity = self.occupied.len();
        let slot = self
            .occupied
            .get_mut(index.as_usize())
            .ok_or(SlabError::OutOfRange { index, capacity })?;

        if !*slot {
            return Err(SlabError::DoubleRelease(index));
        }

        *slot = false;
        self.live -= 1;
        self.free.push(Reverse(index.as_u32()));
        Ok(())
    }

    /// Check whether `index` is currently allocated
    pub fn is_occupied(&self, index: SlabIndex) -> bool {
        self.occupied.get(index.as_usize()).copied().unwrap_or(false)
    }

    /// Number of allocated slots
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if no slot is allocated
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever handed out (allocated or free)
    pub fn capacity(&self) -> usize {
        self.occupied.len()
    }
}
