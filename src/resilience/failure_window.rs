//! Sliding-window event counter.
//!
//! The window is split into a ring of buckets. Each bucket is one `AtomicU64`
//! packing the bucket epoch (upper bits) with its count (lower bits), so a
//! bucket can be rolled over and incremented in a single compare-and-swap and
//! concurrent writers never lose updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const BUCKETS: usize = 10;
const COUNT_BITS: u32 = 24;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;
const EPOCH_MASK: u64 = (1 << (64 - COUNT_BITS)) - 1;

fn pack(epoch: u64, count: u64) -> u64 {
    ((epoch & EPOCH_MASK) << COUNT_BITS) | (count & COUNT_MASK)
}

fn unpack(word: u64) -> (u64, u64) {
    (word >> COUNT_BITS, word & COUNT_MASK)
}

/// Counts events that happened within the last `window`.
#[derive(Debug)]
pub struct FailureWindow {
    origin: Instant,
    bucket_nanos: u64,
    buckets: [AtomicU64; BUCKETS],
}

impl FailureWindow {
    pub fn new(window: Duration, origin: Instant) -> Self {
        let bucket_nanos = (window.as_nanos() / BUCKETS as u128).max(1) as u64;
        Self {
            origin,
            bucket_nanos,
            buckets: Default::default(),
        }
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        Duration::from_nanos(self.bucket_nanos.saturating_mul(BUCKETS as u64))
    }

    fn epoch(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        ((elapsed / self.bucket_nanos as u128) as u64) & EPOCH_MASK
    }

    /// Record one event at `now`.
    pub fn record(&self, now: Instant) {
        let epoch = self.epoch(now);
        let bucket = &self.buckets[(epoch % BUCKETS as u64) as usize];
        // The closure always returns Some, so the update cannot fail.
        let _ = bucket.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            let (current, count) = unpack(word);
            if current >= epoch {
                // Same bucket, or a late writer whose slot already rolled forward.
                Some(pack(current, (count + 1).min(COUNT_MASK)))
            } else {
                Some(pack(epoch, 1))
            }
        });
    }

    /// Number of events recorded within the window ending at `now`.
    pub fn count(&self, now: Instant) -> u64 {
        let epoch = self.epoch(now);
        self.buckets
            .iter()
            .map(|b| unpack(b.load(Ordering::Acquire)))
            .filter(|(e, _)| *e <= epoch && epoch - *e < BUCKETS as u64)
            .map(|(_, c)| c)
            .sum()
    }
}
