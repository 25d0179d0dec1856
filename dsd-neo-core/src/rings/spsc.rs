//! Single-producer/single-consumer ring buffer.
//!
//! Capacity is fixed at construction and is usable occupancy + 1 (one slot
//! always empty, so full/empty are disambiguated without separate flags).
//! Writes beyond capacity drop the excess and increment `producer_drops`;
//! previously written data is never overwritten. Reads block on a condvar
//! with a timeout, incrementing `read_timeouts` on expiry. A shared atomic
//! `exit` flag causes blocked reads/writes to return promptly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    buf: Mutex<RingState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    exit: AtomicBool,
    producer_drops: AtomicU64,
    read_timeouts: AtomicU64,
}

struct RingState<T> {
    data: Vec<Option<T>>,
    head: usize, // next read position
    tail: usize, // next write position
    used: usize,
}

/// Producer half of an SPSC ring. Not `Clone` — exactly one producer per ring.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
}

/// Consumer half of an SPSC ring. Not `Clone` — exactly one consumer per ring.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

/// Constructs a bounded SPSC ring of usable capacity `capacity` (i.e. it can
/// hold `capacity` items before writes start dropping).
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity >= 1, "ring capacity must be at least 1");
    let slots = capacity + 1;
    let inner = Arc::new(Inner {
        buf: Mutex::new(RingState {
            data: (0..slots).map(|_| None).collect(),
            head: 0,
            tail: 0,
            used: 0,
        }),
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
        capacity,
        exit: AtomicBool::new(false),
        producer_drops: AtomicU64::new(0),
        read_timeouts: AtomicU64::new(0),
    });
    (
        Producer {
            inner: inner.clone(),
        },
        Consumer { inner },
    )
}

impl<T> Producer<T> {
    /// Non-blocking write of as many items as fit; excess items are dropped
    /// and counted in `producer_drops`. Returns the number actually written.
    pub fn write(&self, items: impl IntoIterator<Item = T>) -> usize {
        let mut state = self.inner.buf.lock().unwrap();
        let mut written = 0usize;
        for item in items {
            if state.used >= self.inner.capacity {
                self.inner.producer_drops.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let tail = state.tail;
            let slots = state.data.len();
            state.data[tail] = Some(item);
            state.tail = (tail + 1) % slots;
            state.used += 1;
            written += 1;
        }
        drop(state);
        if written > 0 {
            self.inner.not_empty.notify_one();
        }
        written
    }

    pub fn producer_drops(&self) -> u64 {
        self.inner.producer_drops.load(Ordering::Relaxed)
    }
}

impl<T> Consumer<T> {
    /// Blocking read of up to `max` items, waiting up to `timeout` for data to
    /// arrive. Returns an empty vec (and increments `read_timeouts`) if the
    /// timeout elapses with nothing available, or if `exit` is set.
    pub fn read(&self, max: usize, timeout: Duration) -> Vec<T> {
        let mut state = self.inner.buf.lock().unwrap();
        if state.used == 0 {
            let (guard, result) = self
                .inner
                .not_empty
                .wait_timeout_while(state, timeout, |s| {
                    s.used == 0 && !self.inner.exit.load(Ordering::Relaxed)
                })
                .unwrap();
            state = guard;
            if result.timed_out() && state.used == 0 {
                self.inner.read_timeouts.fetch_add(1, Ordering::Relaxed);
                return Vec::new();
            }
        }
        if self.inner.exit.load(Ordering::Relaxed) && state.used == 0 {
            return Vec::new();
        }
        let n = max.min(state.used);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let head = state.head;
            let slots = state.data.len();
            out.push(state.data[head].take().expect("ring slot invariant"));
            state.head = (head + 1) % slots;
            state.used -= 1;
        }
        drop(state);
        if n > 0 {
            self.inner.not_full.notify_one();
        }
        out
    }

    pub fn read_timeouts(&self) -> u64 {
        self.inner.read_timeouts.load(Ordering::Relaxed)
    }

    pub fn used(&self) -> usize {
        self.inner.buf.lock().unwrap().used
    }
}

/// Shared exit signal that promptly wakes any blocked producer/consumer.
pub fn request_exit<T>(side: &Consumer<T>) {
    side.inner.exit.store(true, Ordering::Relaxed);
    side.inner.not_empty.notify_all();
    side.inner.not_full.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wrap_preserves_fifo_order() {
        let (p, c) = channel::<u32>(8);
        p.write([10, 20, 30, 40, 50, 60]);
        let first = c.read(3, Duration::from_millis(10));
        assert_eq!(first, vec![10, 20, 30]);
        p.write([70, 80, 90]);
        let rest = c.read(6, Duration::from_millis(10));
        assert_eq!(rest, vec![40, 50, 60, 70, 80, 90]);
        assert_eq!(c.used(), 0);
    }

    #[test]
    fn ring_overflow_drops_excess_and_keeps_order() {
        let (p, c) = channel::<u32>(4);
        p.write([1, 2, 3]);
        p.write([9, 10]);
        assert_eq!(c.used(), 3);
        assert_eq!(p.producer_drops(), 2);
        let out = c.read(3, Duration::from_millis(10));
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn read_timeout_increments_counter_and_returns_empty() {
        let (_p, c) = channel::<u32>(4);
        let out = c.read(1, Duration::from_millis(5));
        assert!(out.is_empty());
        assert_eq!(c.read_timeouts(), 1);
    }

    #[test]
    fn exit_flag_unblocks_waiting_consumer() {
        let (_p, c) = channel::<u32>(4);
        request_exit(&c);
        let out = c.read(1, Duration::from_secs(5));
        assert!(out.is_empty());
    }

    #[test]
    fn capacity_one_allows_single_item() {
        let (p, c) = channel::<u32>(1);
        assert_eq!(p.write([1, 2, 3]), 1);
        assert_eq!(p.producer_drops(), 2);
        assert_eq!(c.read(1, Duration::from_millis(10)), vec![1]);
    }

    use proptest::prelude::*;

    proptest! {
        /// FIFO law: for any capacity and any write of at most `capacity`
        /// items, nothing is dropped and a full read returns them in the
        /// exact order written.
        #[test]
        fn fifo_order_preserved_when_write_fits(
            capacity in 1usize..64,
            values in prop::collection::vec(any::<u32>(), 0..64),
        ) {
            prop_assume!(values.len() <= capacity);
            let (p, c) = channel::<u32>(capacity);
            let written = p.write(values.clone());
            prop_assert_eq!(written, values.len());
            prop_assert_eq!(p.producer_drops(), 0);
            let out = c.read(values.len(), Duration::from_millis(50));
            prop_assert_eq!(out, values);
        }

        /// Overflow law: writing beyond capacity drops exactly the excess,
        /// counts it in `producer_drops`, and never reorders or loses any of
        /// the items that did fit.
        #[test]
        fn overflow_drops_exactly_the_excess(
            capacity in 1usize..32,
            base in prop::collection::vec(any::<u32>(), 0..32),
            overflow in prop::collection::vec(any::<u32>(), 0..32),
        ) {
            prop_assume!(base.len() <= capacity);
            let (p, c) = channel::<u32>(capacity);
            p.write(base.clone());
            let remaining_space = capacity - base.len();
            let written = p.write(overflow.clone());
            let expected_drops = overflow.len().saturating_sub(remaining_space);
            prop_assert_eq!(written, overflow.len() - expected_drops);
            prop_assert_eq!(p.producer_drops(), expected_drops as u64);

            let mut expected = base;
            expected.extend(overflow.into_iter().take(remaining_space));
            let out = c.read(expected.len(), Duration::from_millis(50));
            prop_assert_eq!(out, expected);
        }
    }
}
