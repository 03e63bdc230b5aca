//! A single byte-budgeted thumbnail tier

use log::debug;
use lru::LruCache;
use serde::Serialize;

use crate::core::types::{CacheTier, Thumbnail};

/// Counters for one tier
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    /// Puts refused because the cached entry had more frames
    pub rejected: u64,
}

impl TierStats {
    /// Hit rate as a percentage (0.0 - 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Budget utilization as a percentage
    pub fn utilization(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            (self.bytes as f64 / self.max_bytes as f64) * 100.0
        }
    }
}

/// Key → thumbnail map bounded by a byte budget, least recently used
/// entries go first. Any entry may disappear at any time, so every read is
/// a potential miss.
pub struct TierCache {
    tier: CacheTier,
    entries: LruCache<String, Thumbnail>,
    max_bytes: usize,
    current_bytes: usize,
    stats: TierStats,
}

impl TierCache {
    pub fn new(tier: CacheTier, max_bytes: usize) -> Self {
        Self {
            tier,
            entries: LruCache::unbounded(),
            max_bytes,
            current_bytes: 0,
            stats: TierStats::default(),
        }
    }

    pub fn tier(&self) -> CacheTier {
        self.tier
    }

    /// Look up a thumbnail, marking it recently used
    pub fn get(&mut self, key: &str) -> Option<Thumbnail> {
        match self.entries.get(key) {
            Some(thumb) => {
                self.stats.hits += 1;
                Some(thumb.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up without touching recency or counters
    pub fn peek(&self, key: &str) -> Option<&Thumbnail> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Store a thumbnail.
    ///
    /// Refused when the cached entry has more frames than the incoming one,
    /// or when the thumbnail alone exceeds the tier budget. Returns whether
    /// the entry was stored.
    pub fn put(&mut self, key: &str, thumbnail: Thumbnail) -> bool {
        if let Some(existing) = self.entries.peek(key) {
            if thumbnail.frame_count() < existing.frame_count() {
                debug!(
                    "{} tier keeps {} ({} frames over {})",
                    self.tier.name(),
                    key,
                    existing.frame_count(),
                    thumbnail.frame_count()
                );
                self.stats.rejected += 1;
                return false;
            }
        }

        let size = thumbnail.byte_size();
        if size > self.max_bytes {
            debug!(
                "{} tier skips {}: {} bytes over a {} byte budget",
                self.tier.name(),
                key,
                size,
                self.max_bytes
            );
            return false;
        }

        if let Some(old) = self.entries.pop(key) {
            self.current_bytes -= old.byte_size();
        }
        while self.current_bytes + size > self.max_bytes {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.current_bytes -= evicted.byte_size();
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }

        self.entries.put(key.to_string(), thumbnail);
        self.current_bytes += size;
        self.stats.insertions += 1;
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<Thumbnail> {
        let removed = self.entries.pop(key);
        if let Some(thumb) = &removed {
            self.current_bytes -= thumb.byte_size();
        }
        removed
    }

    /// Drop everything, as a low-memory discard would
    pub fn evict_all(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        self.current_bytes = 0;
        self.stats.evictions += count as u64;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            entries: self.entries.len(),
            bytes: self.current_bytes,
            max_bytes: self.max_bytes,
            ..self.stats
        }
    }
}
