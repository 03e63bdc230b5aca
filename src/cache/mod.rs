//! Tiered Thumbnail Cache
//!
//! Three independent tiers keyed by resource key:
//!
//! - **Low-res** - tiny placeholders, filled only by background backfill
//! - **High-res** - grid-cell sized decode results
//! - **Full-width** - screen-width decode results from magnified mode
//!
//! Storing into the high-res or full-width tier schedules a scaled copy for
//! the low-res tier if it has none yet and none is on its way.

pub mod backfill;
pub mod tier;

use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

pub use backfill::{BackfillResult, LowResBackfill};
pub use tier::{TierCache, TierStats};

use crate::core::config::CacheConfig;
use crate::core::types::{CacheTier, Thumbnail};

/// Snapshot of all tiers
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub low_res: TierStats,
    pub high_res: TierStats,
    pub full_width: TierStats,
}

/// The three thumbnail tiers plus the low-res backfill pool
pub struct TieredCache {
    low_res: TierCache,
    high_res: TierCache,
    full_width: TierCache,
    backfill: LowResBackfill,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            low_res: TierCache::new(CacheTier::LowRes, config.low_res_bytes()),
            high_res: TierCache::new(CacheTier::HighRes, config.high_res_bytes()),
            full_width: TierCache::new(CacheTier::FullWidth, config.full_width_bytes()),
            backfill: LowResBackfill::new(config.low_res_size, config.backfill_threads),
        }
    }

    fn tier(&self, tier: CacheTier) -> &TierCache {
        match tier {
            CacheTier::LowRes => &self.low_res,
            CacheTier::HighRes => &self.high_res,
            CacheTier::FullWidth => &self.full_width,
        }
    }

    fn tier_mut(&mut self, tier: CacheTier) -> &mut TierCache {
        match tier {
            CacheTier::LowRes => &mut self.low_res,
            CacheTier::HighRes => &mut self.high_res,
            CacheTier::FullWidth => &mut self.full_width,
        }
    }

    /// Look up `key` in one tier. Collects finished backfills first so the
    /// low-res tier is as fresh as it can be.
    pub fn get(&mut self, tier: CacheTier, key: &str) -> Option<Thumbnail> {
        if tier == CacheTier::LowRes {
            self.poll_backfill();
        }
        self.tier_mut(tier).get(key)
    }

    pub fn contains(&self, tier: CacheTier, key: &str) -> bool {
        self.tier(tier).contains(key)
    }

    /// Store into a tier, honouring the frame-count overwrite rule.
    /// Returns whether the entry was stored.
    pub fn put(&mut self, tier: CacheTier, key: &str, thumbnail: Thumbnail) -> bool {
        let backfill_needed = tier != CacheTier::LowRes
            && !self.low_res.contains(key)
            && !self.backfill.is_pending(key);

        if backfill_needed {
            self.backfill.request(key, &thumbnail);
        }
        self.tier_mut(tier).put(key, thumbnail)
    }

    /// Move finished backfills into the low-res tier. Returns how many were stored.
    pub fn poll_backfill(&mut self) -> usize {
        let done = self.backfill.try_collect();
        self.store_backfill(done)
    }

    /// Wait for outstanding backfills, then store them
    pub fn flush_backfill(&mut self, timeout: Duration) -> usize {
        let done = self.backfill.collect_all(timeout);
        self.store_backfill(done)
    }

    fn store_backfill(&mut self, done: Vec<BackfillResult>) -> usize {
        let mut stored = 0;
        for result in done {
            if self.low_res.put(&result.key, result.thumbnail) {
                stored += 1;
            }
        }
        if stored > 0 {
            debug!("Stored {} low-res placeholders", stored);
        }
        stored
    }

    pub fn pending_backfills(&self) -> usize {
        self.backfill.in_flight()
    }

    /// Empty one tier. Emptying the low-res tier also disowns the backfills
    /// in flight, so none of them lands after the eviction.
    pub fn evict_tier(&mut self, tier: CacheTier) {
        info!("Evicting {} tier ({} entries)", tier.name(), self.tier(tier).len());
        self.tier_mut(tier).evict_all();
        if tier == CacheTier::LowRes {
            self.backfill.invalidate();
        }
    }

    /// Empty every tier
    pub fn evict_all(&mut self) {
        for tier in CacheTier::ALL {
            self.evict_tier(tier);
        }
    }

    pub fn len(&self, tier: CacheTier) -> usize {
        self.tier(tier).len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            low_res: self.low_res.stats(),
            high_res: self.high_res.stats(),
            full_width: self.full_width.stats(),
        }
    }
}
