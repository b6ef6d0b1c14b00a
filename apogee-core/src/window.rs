//! Fixed-Capacity Sample Window for Trend Detection
//!
//! ## Overview
//!
//! The altitude-descent criterion works on a sliding window of recent
//! in-range altitude samples. This module provides that window as a ring
//! buffer with a compile-time capacity and a runtime window length, so
//! the window size stays a configuration value without dynamic
//! allocation.
//!
//! ## Design Rationale
//!
//! A growable vector would keep every sample of the whole flight alive
//! just to read the last few. Only the most recent `size` samples ever
//! matter:
//!
//! ```text
//! SampleWindow<8>, size = 5, after pushing 1..=7:
//! ┌───┬───┬───┬───┬───┬───┬───┬───┐
//! │ 1 │ 2 │ 3 │ 4 │ 5 │ 6 │ 7 │   │
//! └───┴───┴───┴───┴───┴───┴───┴───┘
//!               └──── mean() ────┘
//! ```
//!
//! - O(1) push, oldest sample logically evicted once `size` is reached
//! - `mean()` only defined once the window has filled (`is_full()`)
//! - Zero heap allocations, `Copy`-only contents

use crate::errors::ConfigError;

/// Largest window length the decision engine supports
pub const MAX_WINDOW_SIZE: usize = 64;

/// Ring buffer over the last `size` pushed samples
///
/// `N` is the storage capacity; `size` (≤ N) is the logical window length
/// used by `mean()` and `is_full()`.
#[derive(Debug, Clone)]
pub struct SampleWindow<const N: usize> {
    data: [f64; N],
    write_pos: usize,
    len: usize,
    size: usize,
}

impl<const N: usize> SampleWindow<N> {
    /// Create a window of logical length `size`
    ///
    /// Fails if `size` is below 2 (a trend needs at least two means, and a
    /// mean needs a non-trivial window) or exceeds the capacity `N`.
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size < 2 || size > N {
            return Err(ConfigError::WindowSize {
                got: size,
                min: 2,
                max: N,
            });
        }
        Ok(Self {
            data: [0.0; N],
            write_pos: 0,
            len: 0,
            size,
        })
    }

    /// Append a sample, evicting the oldest once the window is full
    pub fn push(&mut self, sample: f64) {
        self.data[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % N;
        if self.len < self.size {
            self.len += 1;
        }
    }

    /// Number of samples currently inside the logical window
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no samples have been pushed yet
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once `size` samples have accumulated
    pub const fn is_full(&self) -> bool {
        self.len >= self.size
    }

    /// Configured logical window length
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Mean of the last `size` samples
    ///
    /// Returns `None` until the window has filled; a mean over a partial
    /// window would bias the trend comparison at the start of flight.
    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let mut sum = 0.0;
        for i in 0..self.size {
            // Walk backwards from the most recent write
            let idx = (self.write_pos + N - 1 - i) % N;
            sum += self.data[idx];
        }
        Some(sum / self.size as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_sizes() {
        assert!(SampleWindow::<8>::new(1).is_err());
        assert!(SampleWindow::<8>::new(9).is_err());
        assert!(SampleWindow::<8>::new(8).is_ok());
    }

    #[test]
    fn mean_requires_full_window() {
        let mut w = SampleWindow::<8>::new(3).unwrap();
        w.push(1.0);
        w.push(2.0);
        assert_eq!(w.mean(), None);

        w.push(3.0);
        assert!(w.is_full());
        assert_eq!(w.mean(), Some(2.0));
    }

    #[test]
    fn mean_slides_with_eviction() {
        let mut w = SampleWindow::<4>::new(3).unwrap();
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            w.push(v);
        }
        // Window now holds [30, 40, 50]
        assert_eq!(w.mean(), Some(40.0));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn wraps_capacity_boundary() {
        let mut w = SampleWindow::<3>::new(3).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        // Window holds [2, 3, 4] across the wrap point
        assert_eq!(w.mean(), Some(3.0));
    }
}
