//! The session arena: storage, allocation, and bounds-checked views.

use std::ops::Range;

use smallvec::SmallVec;
use weir_core::{ElementKind, SlotDescriptor, MAX_RANK};

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::freelist::FreeList;
use crate::view::IoViews;

/// Words of canary placed after the usable region.
const GUARD_WORDS: usize = 2;

/// Canary pattern: every guard byte is `0xAA`.
const GUARD_PATTERN: u64 = 0xAAAA_AAAA_AAAA_AAAA;

/// What the host tells the sandboxed module at session start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaHandshake {
    /// Offset of the first usable byte. Always 0: all offsets are
    /// relative to the arena base.
    pub base_offset: u64,
    /// Usable bytes.
    pub capacity: u64,
}

/// Fixed-capacity byte arena addressed by offset.
///
/// Storage is a `Vec<u64>` allocated once, which makes the base 8-byte
/// aligned; with the configured alignment every allocation can be viewed
/// as any [`ElementKind`] in place. The storage is never reallocated, so a
/// descriptor that was in bounds stays in bounds for the whole session.
#[derive(Debug)]
pub struct Arena {
    words: Vec<u64>,
    capacity: usize,
    alignment: usize,
    blocks: FreeList,
}

impl Arena {
    /// Allocate a zeroed arena.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let data_words = config.capacity / 8;
        let mut words = vec![0u64; data_words + GUARD_WORDS];
        words[data_words..].fill(GUARD_PATTERN);
        Ok(Self {
            words,
            capacity: config.capacity,
            alignment: config.alignment,
            blocks: FreeList::new(config.capacity, config.alignment),
        })
    }

    /// Usable bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }

    /// Offset alignment of every allocation.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes not reserved by a live allocation.
    pub fn free_bytes(&self) -> u64 {
        self.blocks.free_bytes() as u64
    }

    /// Bytes reserved by live allocations.
    pub fn used_bytes(&self) -> u64 {
        self.blocks.reserved_bytes() as u64
    }

    /// Number of live allocations.
    pub fn live_count(&self) -> usize {
        self.blocks.live_count()
    }

    /// The `(base_offset, capacity)` pair exposed to the module.
    pub fn handshake(&self) -> ArenaHandshake {
        ArenaHandshake {
            base_offset: 0,
            capacity: self.capacity(),
        }
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Reserve `length` raw bytes. The slot is typed as rank-1 `U8`.
    pub fn allocate(&mut self, length: u64) -> Result<SlotDescriptor, ArenaError> {
        let requested = usize::try_from(length).map_err(|_| ArenaError::OutOfSpace {
            requested: length,
            available: self.free_bytes(),
        })?;
        // A byte slot must be describable with a single u32 extent.
        if u32::try_from(length).is_err() {
            return Err(ArenaError::OutOfSpace {
                requested: length,
                available: self.free_bytes(),
            });
        }
        let offset = self.blocks.alloc(requested)?;
        SlotDescriptor::bytes(offset as u64, length).ok_or(ArenaError::InvalidShape { rank: 1 })
    }

    /// Reserve a tensor of `kind` with `shape`.
    pub fn allocate_tensor(
        &mut self,
        kind: ElementKind,
        shape: &[u32],
    ) -> Result<SlotDescriptor, ArenaError> {
        let invalid = ArenaError::InvalidShape { rank: shape.len() };
        if shape.len() > MAX_RANK {
            return Err(invalid);
        }
        let template = SlotDescriptor::tensor(0, kind, shape).ok_or(invalid)?;
        let length = usize::try_from(template.length).map_err(|_| ArenaError::OutOfSpace {
            requested: template.length,
            available: self.free_bytes(),
        })?;
        let offset = self.blocks.alloc(length)?;
        Ok(template.at(offset as u64))
    }

    /// Return a slot obtained from [`allocate`] or [`allocate_tensor`].
    ///
    /// Fails with [`ArenaError::InvalidSlot`] on double release or when the
    /// slot does not match a live allocation exactly.
    ///
    /// [`allocate`]: Arena::allocate
    /// [`allocate_tensor`]: Arena::allocate_tensor
    pub fn release(&mut self, slot: &SlotDescriptor) -> Result<(), ArenaError> {
        let invalid = ArenaError::InvalidSlot {
            offset: slot.offset,
            length: slot.length,
        };
        let offset = usize::try_from(slot.offset).map_err(|_| invalid.clone())?;
        let length = usize::try_from(slot.length).map_err(|_| invalid)?;
        self.blocks.release(offset, length)
    }

    /// Whether `slot` is a live allocation.
    pub fn is_allocated(&self, slot: &SlotDescriptor) -> bool {
        match (usize::try_from(slot.offset), usize::try_from(slot.length)) {
            (Ok(offset), Ok(length)) => self.blocks.is_live(offset, length),
            _ => false,
        }
    }

    // ── Views ───────────────────────────────────────────────────

    /// Byte range of `slot`, checked against `[0, capacity)`.
    pub fn check_bounds(&self, slot: &SlotDescriptor) -> Result<Range<usize>, ArenaError> {
        let violation = || ArenaError::BoundsViolation {
            offset: slot.offset,
            length: slot.length,
            capacity: self.capacity(),
        };
        let end = slot.end().ok_or_else(violation)?;
        if end > self.capacity() {
            return Err(violation());
        }
        // end <= capacity, which fits usize.
        Ok(slot.offset as usize..end as usize)
    }

    /// Check that `slot` can be viewed as its element kind in place.
    pub fn check_alignment(&self, slot: &SlotDescriptor) -> Result<(), ArenaError> {
        let size = slot.kind.size();
        if slot.offset % size != 0 || slot.length % size != 0 {
            return Err(ArenaError::Misaligned {
                offset: slot.offset,
                length: slot.length,
                element_size: size as usize,
            });
        }
        Ok(())
    }

    /// Read-only bytes of `slot`.
    pub fn view(&self, slot: &SlotDescriptor) -> Result<&[u8], ArenaError> {
        let range = self.check_bounds(slot)?;
        Ok(&self.bytes()[range])
    }

    /// Mutable bytes of `slot`.
    pub fn view_mut(&mut self, slot: &SlotDescriptor) -> Result<&mut [u8], ArenaError> {
        let range = self.check_bounds(slot)?;
        Ok(&mut self.bytes_mut()[range])
    }

    /// Read-only typed view of `slot`.
    pub fn view_as<T: bytemuck::Pod>(&self, slot: &SlotDescriptor) -> Result<&[T], ArenaError> {
        let bytes = self.view(slot)?;
        bytemuck::try_cast_slice(bytes).map_err(|_| misaligned::<T>(slot))
    }

    /// Mutable typed view of `slot`.
    pub fn view_mut_as<T: bytemuck::Pod>(
        &mut self,
        slot: &SlotDescriptor,
    ) -> Result<&mut [T], ArenaError> {
        let bytes = self.view_mut(slot)?;
        bytemuck::try_cast_slice_mut(bytes).map_err(|_| misaligned::<T>(slot))
    }

    /// Overwrite `slot` with `bytes`. Lengths must match.
    pub fn write(&mut self, slot: &SlotDescriptor, bytes: &[u8]) -> Result<(), ArenaError> {
        let dst = self.view_mut(slot)?;
        if dst.len() != bytes.len() {
            return Err(ArenaError::LengthMismatch {
                expected: slot.length,
                actual: bytes.len() as u64,
            });
        }
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite `slot` with typed `values`.
    pub fn write_as<T: bytemuck::Pod>(
        &mut self,
        slot: &SlotDescriptor,
        values: &[T],
    ) -> Result<(), ArenaError> {
        self.write(slot, bytemuck::cast_slice(values))
    }

    /// Borrow every input slot shared and the output slot exclusively.
    ///
    /// Fails with [`ArenaError::BoundsViolation`] if any slot is out of
    /// range and with [`ArenaError::Aliased`] if the output overlaps an
    /// input. Inputs may overlap each other.
    pub fn split_io(
        &mut self,
        inputs: &[SlotDescriptor],
        output: &SlotDescriptor,
    ) -> Result<IoViews<'_>, ArenaError> {
        let out = self.check_bounds(output)?;
        let mut ranges: SmallVec<[Range<usize>; weir_core::MAX_INPUTS]> = SmallVec::new();
        for (index, input) in inputs.iter().enumerate() {
            let range = self.check_bounds(input)?;
            let disjoint = range.is_empty() || range.end <= out.start || range.start >= out.end;
            if !disjoint {
                return Err(ArenaError::Aliased { input: index });
            }
            ranges.push(range);
        }

        let (head, rest) = self.bytes_mut().split_at_mut(out.start);
        let (output, tail) = rest.split_at_mut(out.len());
        let head: &[u8] = head;
        let tail: &[u8] = tail;

        let inputs = ranges
            .into_iter()
            .map(|r| {
                if r.is_empty() {
                    &head[..0]
                } else if r.end <= out.start {
                    &head[r]
                } else {
                    &tail[r.start - out.end..r.end - out.end]
                }
            })
            .collect();
        Ok(IoViews { inputs, output })
    }

    // ── Integrity ───────────────────────────────────────────────

    /// Whether the guard region past `capacity` still holds its canary.
    ///
    /// No view can reach the guard, so a failure here means the storage
    /// was written through some path other than this type.
    pub fn check_integrity(&self) -> bool {
        self.words[self.capacity / 8..]
            .iter()
            .all(|&w| w == GUARD_PATTERN)
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words[..self.capacity / 8])
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let data_words = self.capacity / 8;
        bytemuck::cast_slice_mut(&mut self.words[..data_words])
    }

    #[cfg(test)]
    fn corrupt_guard(&mut self) {
        if let Some(w) = self.words.last_mut() {
            *w = 0;
        }
    }
}

fn misaligned<T>(slot: &SlotDescriptor) -> ArenaError {
    ArenaError::Misaligned {
        offset: slot.offset,
        length: slot.length,
        element_size: std::mem::size_of::<T>(),
    }
}

// Compile-time assertion: the arena moves between host and dispatcher threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Arena>();
};
