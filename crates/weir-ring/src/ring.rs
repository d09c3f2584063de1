//! Lock-free SPSC ring of fixed-size record slots.
//!
//! Positions are monotonic `u64` counters that never wrap in practice;
//! the slot index is `pos & (capacity - 1)`. The producer owns `tail`, the
//! consumer owns `head`, and `tail - head <= capacity` always holds.
//!
//! Each slot carries a `published` flag. The producer stores the body,
//! then sets the flag with `Release`; the consumer loads the flag with
//! `Acquire` before it reads the body. The consumer clears the flag before
//! advancing `head` with `Release`, and the producer loads `head` with
//! `Acquire` before reusing the slot.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::codec::{RawRecord, WireRecord, RECORD_WORDS};
use crate::error::CodecError;

/// A counter on its own cache line so head and tail do not false-share.
#[repr(align(128))]
struct Padded(AtomicU64);

struct Slot {
    published: AtomicBool,
    body: [AtomicU64; RECORD_WORDS],
}

impl Slot {
    fn new() -> Self {
        Self {
            published: AtomicBool::new(false),
            body: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

struct Shared {
    slots: Box<[Slot]>,
    mask: u64,
    head: Padded,
    tail: Padded,
}

impl Shared {
    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        tail.saturating_sub(head) as usize
    }
}

// Compile-time assertion: both halves move to other threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Shared>();
    assert::<Producer<weir_core::CommandRecord>>();
    assert::<Consumer<weir_core::ResultRecord>>();
};

/// Create a ring with `capacity` slots.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two or is less than 2. Session
/// configs validate this before any ring is built.
pub fn channel<R: WireRecord>(capacity: usize) -> (Producer<R>, Consumer<R>) {
    assert!(
        capacity >= 2 && capacity.is_power_of_two(),
        "ring capacity must be a power of two >= 2, got {capacity}"
    );
    let shared = Arc::new(Shared {
        slots: (0..capacity).map(|_| Slot::new()).collect(),
        mask: capacity as u64 - 1,
        head: Padded(AtomicU64::new(0)),
        tail: Padded(AtomicU64::new(0)),
    });
    let producer = Producer {
        shared: Arc::clone(&shared),
        tail: 0,
        cached_head: 0,
        _record: PhantomData,
    };
    let consumer = Consumer {
        shared,
        head: 0,
        cached_tail: 0,
        _record: PhantomData,
    };
    (producer, consumer)
}

/// The writing half of a ring.
pub struct Producer<R> {
    shared: Arc<Shared>,
    tail: u64,
    cached_head: u64,
    _record: PhantomData<fn(R)>,
}

impl<R: WireRecord> Producer<R> {
    /// Push an already-encoded record. Returns `false` if the ring is full.
    pub fn try_push_raw(&mut self, raw: &RawRecord) -> bool {
        let shared = &*self.shared;
        if self.tail - self.cached_head == shared.capacity() {
            self.cached_head = shared.head.0.load(Ordering::Acquire);
            if self.tail - self.cached_head == shared.capacity() {
                return false;
            }
        }

        let slot = &shared.slots[(self.tail & shared.mask) as usize];
        debug_assert!(!slot.published.load(Ordering::Relaxed));
        for (cell, &word) in slot.body.iter().zip(raw.words.iter()) {
            cell.store(word, Ordering::Relaxed);
        }
        // Body first, flag last.
        slot.published.store(true, Ordering::Release);

        self.tail += 1;
        shared.tail.0.store(self.tail, Ordering::Release);
        true
    }

    /// Encode and push `record`. `Ok(false)` means the ring is full and
    /// nothing was written.
    pub fn try_push(&mut self, record: &R) -> Result<bool, CodecError> {
        let raw = record.to_raw()?;
        Ok(self.try_push_raw(&raw))
    }

    /// Records currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether no records are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the next push would fail.
    pub fn is_full(&self) -> bool {
        self.len() as u64 >= self.shared.capacity()
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }

    /// Records pushed over the ring's lifetime.
    pub fn pushed(&self) -> u64 {
        self.tail
    }
}

/// The reading half of a ring.
pub struct Consumer<R> {
    shared: Arc<Shared>,
    head: u64,
    cached_tail: u64,
    _record: PhantomData<fn() -> R>,
}

impl<R: WireRecord> Consumer<R> {
    /// Pop the oldest record without decoding it. `None` if empty.
    pub fn try_pop_raw(&mut self) -> Option<RawRecord> {
        let shared = &*self.shared;
        if self.head == self.cached_tail {
            self.cached_tail = shared.tail.0.load(Ordering::Acquire);
            if self.head == self.cached_tail {
                return None;
            }
        }

        let slot = &shared.slots[(self.head & shared.mask) as usize];
        // Flag first, body second.
        if !slot.published.load(Ordering::Acquire) {
            return None;
        }
        let mut raw = RawRecord::zeroed();
        for (word, cell) in raw.words.iter_mut().zip(slot.body.iter()) {
            *word = cell.load(Ordering::Relaxed);
        }
        slot.published.store(false, Ordering::Relaxed);

        self.head += 1;
        shared.head.0.store(self.head, Ordering::Release);
        Some(raw)
    }

    /// Pop and decode the oldest record.
    ///
    /// The slot is consumed even when decoding fails, so a malformed
    /// record cannot wedge the ring.
    pub fn try_pop(&mut self) -> Option<Result<R, CodecError>> {
        self.try_pop_raw().map(|raw| R::decode(&raw))
    }

    /// Records currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Whether no records are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }

    /// Records popped over the ring's lifetime.
    pub fn popped(&self) -> u64 {
        self.head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use weir_core::{
        CommandRecord, CorrelationId, ElementKind, OpId, ResultRecord, Sequence, SlotDescriptor,
        Status,
    };

    fn cmd(n: u64) -> CommandRecord {
        CommandRecord {
            sequence: Sequence(n),
            op_id: OpId(1),
            correlation_id: CorrelationId(n),
            inputs: smallvec::smallvec![
                SlotDescriptor::tensor(0, ElementKind::F32, &[64]).unwrap()
            ],
            output: SlotDescriptor::tensor(256, ElementKind::F32, &[64]).unwrap(),
        }
    }

    #[test]
    fn empty_ring_pops_none() {
        let (_tx, mut rx) = channel::<CommandRecord>(4);
        assert!(rx.try_pop().is_none());
        assert!(rx.is_empty());
    }

    #[test]
    fn push_then_pop_preserves_record() {
        let (mut tx, mut rx) = channel::<CommandRecord>(4);
        assert!(tx.try_push(&cmd(1)).unwrap());
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_pop().unwrap().unwrap(), cmd(1));
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn full_ring_rejects_push_without_corruption() {
        let (mut tx, mut rx) = channel::<CommandRecord>(4);
        for n in 0..4 {
            assert!(tx.try_push(&cmd(n)).unwrap());
        }
        assert!(tx.is_full());
        assert!(!tx.try_push(&cmd(99)).unwrap());
        assert!(!tx.try_push(&cmd(100)).unwrap());
        assert_eq!(tx.pushed(), 4);

        for n in 0..4 {
            assert_eq!(rx.try_pop().unwrap().unwrap(), cmd(n));
        }
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn slots_are_reused_after_wraparound() {
        let (mut tx, mut rx) = channel::<CommandRecord>(2);
        for n in 0..10 {
            assert!(tx.try_push(&cmd(n)).unwrap());
            assert_eq!(rx.try_pop().unwrap().unwrap().sequence, Sequence(n));
        }
        assert_eq!(rx.popped(), 10);
    }

    #[test]
    fn malformed_record_is_consumed() {
        let (mut tx, mut rx) = channel::<CommandRecord>(2);
        let mut raw = cmd(5).to_raw().unwrap();
        raw.as_bytes_mut()[37] = 0;
        assert!(tx.try_push_raw(&raw));
        assert!(tx.try_push(&cmd(6)).unwrap());
        assert!(rx.try_pop().unwrap().is_err());
        assert_eq!(rx.try_pop().unwrap().unwrap(), cmd(6));
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_capacity_panics() {
        let _ = channel::<ResultRecord>(3);
    }

    #[test]
    fn cross_thread_fifo() {
        const N: u64 = 10_000;
        let (mut tx, mut rx) = channel::<ResultRecord>(8);
        let producer = thread::spawn(move || {
            for n in 0..N {
                let record = ResultRecord {
                    correlation_id: CorrelationId(n),
                    status: Status::Ok,
                    output: SlotDescriptor::bytes(n, 1).unwrap(),
                };
                while !tx.try_push(&record).unwrap() {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0;
        while expected < N {
            match rx.try_pop() {
                Some(record) => {
                    let record = record.unwrap();
                    assert_eq!(record.correlation_id, CorrelationId(expected));
                    assert_eq!(record.output.offset, expected);
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(rx.try_pop().is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn interleaved_ops_are_fifo_and_bounded(
                cap_pow in 1u32..5,
                ops in prop::collection::vec(any::<bool>(), 1..200),
            ) {
                let capacity = 1usize << cap_pow;
                let (mut tx, mut rx) = channel::<CommandRecord>(capacity);
                let mut model = std::collections::VecDeque::new();
                let mut next = 0u64;
                for push in ops {
                    if push {
                        let accepted = tx.try_push(&cmd(next)).unwrap();
                        prop_assert_eq!(accepted, model.len() < capacity);
                        if accepted {
                            model.push_back(next);
                        }
                        next += 1;
                    } else {
                        let popped = rx.try_pop().map(|r| r.unwrap().sequence.0);
                        prop_assert_eq!(popped, model.pop_front());
                    }
                    prop_assert!(rx.len() <= capacity);
                    prop_assert_eq!(rx.len(), model.len());
                }
            }
        }
    }
}
