//! Size-class free list over a bump cursor.
//!
//! Block sizes are rounded up to the allocation granule, and the rounded
//! size is the block's size class. A request is served from, in order:
//!
//! 1. a released block of exactly its class,
//! 2. the smallest released block of a larger class (taken whole),
//! 3. the bump cursor.
//!
//! Blocks are never split or coalesced, except that releasing the block
//! that ends at the cursor moves the cursor back. Free-space accounting
//! counts reserved class sizes, so `release(allocate(n))` restores it
//! exactly.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::ArenaError;

#[derive(Clone, Copy, Debug)]
struct Block {
    /// Requested length in bytes.
    length: usize,
    /// Reserved bytes (size class of the block actually handed out).
    class: usize,
}

/// Allocator state for one arena.
#[derive(Debug)]
pub struct FreeList {
    capacity: usize,
    granule: usize,
    cursor: usize,
    reserved: usize,
    /// Released blocks: size class → offsets.
    free: BTreeMap<usize, Vec<usize>>,
    /// Live blocks keyed by offset.
    live: IndexMap<usize, Block>,
}

impl FreeList {
    /// Allocator for `capacity` bytes handing out multiples of `granule`.
    pub fn new(capacity: usize, granule: usize) -> Self {
        Self {
            capacity,
            granule,
            cursor: 0,
            reserved: 0,
            free: BTreeMap::new(),
            live: IndexMap::new(),
        }
    }

    /// Size class for a request of `length` bytes. Never smaller than one
    /// granule, so zero-length allocations still get distinct offsets.
    pub fn size_class(&self, length: usize) -> Option<usize> {
        let rounded = length.checked_add(self.granule - 1)? & !(self.granule - 1);
        Some(rounded.max(self.granule))
    }

    /// Reserve a block for `length` bytes and return its offset.
    pub fn alloc(&mut self, length: usize) -> Result<usize, ArenaError> {
        let available = self.free_bytes() as u64;
        let out_of_space = move || ArenaError::OutOfSpace {
            requested: length as u64,
            available,
        };
        let class = self.size_class(length).ok_or_else(out_of_space)?;

        let (offset, block_class) = match self.take_free(class) {
            Some(found) => found,
            None => {
                let end = self.cursor.checked_add(class).ok_or_else(out_of_space)?;
                if end > self.capacity {
                    return Err(out_of_space());
                }
                let offset = self.cursor;
                self.cursor = end;
                (offset, class)
            }
        };

        self.reserved += block_class;
        self.live.insert(
            offset,
            Block {
                length,
                class: block_class,
            },
        );
        Ok(offset)
    }

    /// Return a live block. `length` must match the original request.
    pub fn release(&mut self, offset: usize, length: usize) -> Result<(), ArenaError> {
        let Some(block) = self.live.get(&offset).copied().filter(|b| b.length == length) else {
            return Err(ArenaError::InvalidSlot {
                offset: offset as u64,
                length: length as u64,
            });
        };
        self.live.swap_remove(&offset);
        self.reserved -= block.class;

        if offset + block.class == self.cursor {
            self.cursor = offset;
        } else {
            self.free.entry(block.class).or_default().push(offset);
        }
        Ok(())
    }

    fn take_free(&mut self, class: usize) -> Option<(usize, usize)> {
        let found = self
            .free
            .range_mut(class..)
            .find(|(_, offsets)| !offsets.is_empty())
            .and_then(|(&size, offsets)| offsets.pop().map(|offset| (offset, size)))?;
        if self.free.get(&found.1).is_some_and(Vec::is_empty) {
            self.free.remove(&found.1);
        }
        Some(found)
    }

    /// Whether `offset` starts a live block of `length` bytes.
    pub fn is_live(&self, offset: usize, length: usize) -> bool {
        self.live.get(&offset).is_some_and(|b| b.length == length)
    }

    /// Bytes not reserved by any live block.
    pub fn free_bytes(&self) -> usize {
        self.capacity - self.reserved
    }

    /// Bytes reserved by live blocks.
    pub fn reserved_bytes(&self) -> usize {
        self.reserved
    }

    /// Number of live blocks.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of released blocks waiting for reuse.
    pub fn free_block_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Current bump cursor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
