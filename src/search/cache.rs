// src/search/cache.rs
//! Prediction cache: fingerprint → (value, priors).
//!
//! A flat array of lock-striped chunks; the chunk is picked by the low
//! bits of the position fingerprint. Each chunk holds a handful of slots
//! with a circular write index, so eviction is oldest-within-chunk. The
//! cache is advisory: lock contention on either side is treated as a miss
//! and the caller proceeds uncached.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const CHUNK_SLOTS: usize = 8;
/// Entries store at most this many priors; positions with more legal moves
/// bypass the cache.
pub const MAX_CACHED_PRIORS: usize = 56;

const PRIOR_SCALE: f32 = u16::MAX as f32;

#[derive(Clone, Copy)]
struct CacheEntry {
    key: u64,
    value: f32,
    prior_count: u8,
    /// Priors quantized to u16, aligned with the position's legal-move
    /// order.
    priors: [u16; MAX_CACHED_PRIORS],
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            key: 0,
            value: 0.0,
            prior_count: 0,
            priors: [0; MAX_CACHED_PRIORS],
        }
    }
}

struct ChunkInner {
    entries: [CacheEntry; CHUNK_SLOTS],
    write_index: usize,
}

struct Chunk {
    inner: Mutex<ChunkInner>,
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ChunkInner {
                entries: [CacheEntry::default(); CHUNK_SLOTS],
                write_index: 0,
            }),
        }
    }
}

/// Store handle reserved before a predictor round-trip, so results can be
/// published without rescanning. Plain data; the chunk is re-locked (or
/// skipped) at publication time.
#[derive(Clone, Copy, Debug)]
pub struct CacheStore {
    chunk_index: usize,
    key: u64,
}

/// Guards an expensive reset from being triggered repeatedly in a burst.
pub struct Throttle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn try_fire(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

pub struct PredictionCache {
    chunks: Vec<Chunk>,
    mask: usize,
    reset_throttle: Throttle,
    probe_count: AtomicU64,
    hit_count: AtomicU64,
}

impl PredictionCache {
    const RESET_INTERVAL: Duration = Duration::from_secs(10);
    const CHUNK_BYTES: usize = 1024;

    pub fn new(request_gibibytes: usize, min_gibibytes: usize) -> Self {
        let gibibytes = request_gibibytes.max(min_gibibytes);
        let requested = (gibibytes << 30) / Self::CHUNK_BYTES;
        // Power of two at or below the request, so chunk selection is a mask.
        let chunk_count = if requested.is_power_of_two() {
            requested
        } else {
            requested.next_power_of_two() / 2
        }
        .max(1);
        let mut chunks = Vec::with_capacity(chunk_count);
        chunks.resize_with(chunk_count, Chunk::default);
        tracing::debug!(chunks = chunk_count, "prediction cache allocated");
        Self {
            chunks,
            mask: chunk_count - 1,
            reset_throttle: Throttle::new(Self::RESET_INTERVAL),
            probe_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    /// A small cache for tests: `chunk_count` must be a power of two.
    pub fn with_chunks(chunk_count: usize) -> Self {
        assert!(chunk_count.is_power_of_two());
        let mut chunks = Vec::with_capacity(chunk_count);
        chunks.resize_with(chunk_count, Chunk::default);
        Self {
            chunks,
            mask: chunk_count - 1,
            reset_throttle: Throttle::new(Self::RESET_INTERVAL),
            probe_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn chunk_index(&self, key: u64) -> usize {
        (key as usize) & self.mask
    }

    pub fn lookup(&self, key: u64) -> Option<(f32, Vec<f32>)> {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        let chunk = &self.chunks[self.chunk_index(key)];
        let inner = chunk.inner.try_lock()?;
        for entry in inner.entries.iter() {
            if entry.prior_count > 0 && entry.key == key {
                let priors = entry.priors[..entry.prior_count as usize]
                    .iter()
                    .map(|&q| q as f32 / PRIOR_SCALE)
                    .collect();
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                return Some((entry.value, priors));
            }
        }
        None
    }

    /// Reserve a store slot for `key`. Returns `None` when the chunk is
    /// contended; the caller then proceeds uncached.
    pub fn reserve(&self, key: u64) -> Option<CacheStore> {
        let chunk_index = self.chunk_index(key);
        self.chunks[chunk_index].inner.try_lock()?;
        Some(CacheStore { chunk_index, key })
    }

    /// Publish results into a previously reserved slot, evicting the
    /// oldest entry in the chunk. Oversized policies and contention are
    /// silently dropped.
    pub fn store(&self, handle: CacheStore, value: f32, priors: &[f32]) -> bool {
        if priors.is_empty() || priors.len() > MAX_CACHED_PRIORS {
            return false;
        }
        let chunk = &self.chunks[handle.chunk_index];
        let mut inner = match chunk.inner.try_lock() {
            Some(inner) => inner,
            None => return false,
        };
        let index = inner.write_index;
        let entry = &mut inner.entries[index];
        entry.key = handle.key;
        entry.value = value;
        entry.prior_count = priors.len() as u8;
        for (slot, &p) in entry.priors.iter_mut().zip(priors.iter()) {
            *slot = (p * PRIOR_SCALE).round() as u16;
        }
        inner.write_index = (index + 1) % CHUNK_SLOTS;
        true
    }

    /// Throttled full reset; returns whether the reset actually ran.
    pub fn clear(&self) -> bool {
        if !self.reset_throttle.try_fire() {
            return false;
        }
        for chunk in &self.chunks {
            let mut inner = chunk.inner.lock();
            inner.entries = [CacheEntry::default(); CHUNK_SLOTS];
            inner.write_index = 0;
        }
        self.probe_count.store(0, Ordering::Relaxed);
        self.hit_count.store(0, Ordering::Relaxed);
        true
    }

    pub fn hit_rate(&self) -> f64 {
        let probes = self.probe_count.load(Ordering::Relaxed);
        if probes == 0 {
            return 0.0;
        }
        self.hit_count.load(Ordering::Relaxed) as f64 / probes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_blocks_rapid_refire() {
        let throttle = Throttle::new(Duration::from_secs(60));
        assert!(throttle.try_fire());
        assert!(!throttle.try_fire());
    }

    #[test]
    fn oversized_policies_are_rejected() {
        let cache = PredictionCache::with_chunks(4);
        let handle = cache.reserve(42).unwrap();
        let too_many = vec![0.01; MAX_CACHED_PRIORS + 1];
        assert!(!cache.store(handle, 0.5, &too_many));
        assert!(cache.lookup(42).is_none());
    }
}
