//! Ring Buffer — time-indexed bounded signal log.
//!
//! Grounded on `hti/io/eventpack.py`'s `RingBuffer`: appended timestamps are
//! caller-enforced non-decreasing, eviction is oldest-first FIFO, and
//! `window` uses a binary search over the sorted timestamps (the Python
//! original uses `bisect`; `Vec::partition_point` is the idiomatic Rust
//! equivalent, giving the same `O(log n + k)` cost).

use std::collections::VecDeque;

use crate::error::InvariantViolation;

/// A payload stamped with its insertion time, returned by [`RingBuffer::window`].
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    pub t: f64,
    pub payload: T,
}

/// Bounded, time-indexed log of payloads.
pub struct RingBuffer<T> {
    ts: VecDeque<f64>,
    xs: VecDeque<T>,
    maxlen: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(maxlen: usize) -> Self {
        assert!(maxlen > 0, "RingBuffer::maxlen must be > 0");
        Self {
            ts: VecDeque::with_capacity(maxlen),
            xs: VecDeque::with_capacity(maxlen),
            maxlen,
        }
    }

    /// Append a payload at time `t`. Evicts from the front once length
    /// exceeds `maxlen`. Callers must ensure `t` is non-decreasing across
    /// calls; the buffer does not re-sort. Checked in debug builds only —
    /// `window`'s binary search silently returns wrong results on a release
    /// build that violates this, so callers should exercise this path under
    /// `cfg(debug_assertions)` during development.
    pub fn add(&mut self, t: f64, payload: T) {
        if cfg!(debug_assertions) {
            if let Err(violation) = self.check_monotonic(t) {
                panic!("{violation}");
            }
        }
        self.ts.push_back(t);
        self.xs.push_back(payload);
        if self.ts.len() > self.maxlen {
            self.ts.pop_front();
            self.xs.pop_front();
        }
    }

    /// The non-decreasing-timestamp invariant `add` relies on, exposed so a
    /// caller can check it explicitly instead of panicking.
    pub fn check_monotonic(&self, t: f64) -> Result<(), InvariantViolation> {
        if let Some(&last) = self.ts.back() {
            if t < last {
                return Err(InvariantViolation(format!(
                    "RingBuffer::add called with t={t} < last stored t={last}"
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    /// Payloads whose timestamp lies in `[t0, t1]`, each paired with its
    /// stored time, oldest first.
    pub fn window(&self, t0: f64, t1: f64) -> Vec<Timestamped<T>> {
        let ts: Vec<f64> = self.ts.iter().copied().collect();
        let i0 = ts.partition_point(|&t| t < t0);
        let i1 = ts.partition_point(|&t| t <= t1);
        (i0..i1)
            .map(|i| Timestamped {
                t: self.ts[i],
                payload: self.xs[i].clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first_past_capacity() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(2);
        buf.add(0.0, 1);
        buf.add(1.0, 2);
        buf.add(2.0, 3);
        assert_eq!(buf.len(), 2);
        let all = buf.window(0.0, 10.0);
        assert_eq!(all.iter().map(|e| e.payload).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(10);
        for i in 0..10 {
            buf.add(i as f64 * 0.1, i);
        }
        let win = buf.window(0.3, 0.6);
        let vals: Vec<i32> = win.iter().map(|e| e.payload).collect();
        assert_eq!(vals, vec![3, 4, 5, 6]);
    }

    #[test]
    fn window_outside_range_is_empty() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(10);
        buf.add(1.0, 1);
        assert!(buf.window(2.0, 3.0).is_empty());
    }

    #[test]
    fn window_preserves_tail_order_after_eviction() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(3);
        for i in 0..6 {
            buf.add(i as f64, i);
        }
        let win = buf.window(0.0, 100.0);
        let vals: Vec<i32> = win.iter().map(|e| e.payload).collect();
        assert_eq!(vals, vec![3, 4, 5]);
    }

    #[test]
    fn check_monotonic_rejects_a_decreasing_timestamp() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(4);
        buf.add(1.0, 1);
        assert!(buf.check_monotonic(0.5).is_err());
        assert!(buf.check_monotonic(1.0).is_ok());
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn add_with_decreasing_timestamp_panics_in_debug_builds() {
        let mut buf: RingBuffer<i32> = RingBuffer::new(4);
        buf.add(1.0, 1);
        buf.add(0.5, 2);
    }
}
