//! Background population of the low-resolution tier
//!
//! Scaling happens on a small rayon pool; finished placeholders come back
//! over a channel and are stored by whoever owns the cache, so the tiers
//! keep a single writer.
//!
//! Only keys with a scale in flight are tracked. Invalidating bumps a
//! generation; results from an older generation are dropped on arrival.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbaImage;
use log::{debug, warn};

use crate::core::types::Thumbnail;
use crate::transform;

/// A scaled placeholder ready for the low-res tier
#[derive(Debug)]
pub struct BackfillResult {
    pub key: String,
    pub thumbnail: Thumbnail,
}

/// What a pool job sends back
struct ScaledFrame {
    generation: u64,
    result: BackfillResult,
}

/// Keeps at most one low-res scale in flight per key
pub struct LowResBackfill {
    pool: Option<rayon::ThreadPool>,
    target_size: u32,
    result_tx: Sender<ScaledFrame>,
    result_rx: Receiver<ScaledFrame>,
    pending_keys: HashSet<String>,
    generation: u64,
    // Jobs not yet received, stale ones included
    outstanding: usize,
}

impl LowResBackfill {
    pub fn new(target_size: u32, threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("lowres-backfill-{}", i))
            .build();
        let pool = match pool {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Falling back to the global pool for low-res backfill: {}", e);
                None
            }
        };

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        Self {
            pool,
            target_size,
            result_tx,
            result_rx,
            pending_keys: HashSet::new(),
            generation: 0,
            outstanding: 0,
        }
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// A current scale for `key` has been started and not yet collected
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending_keys.contains(key)
    }

    /// Number of scales started but not yet collected
    pub fn in_flight(&self) -> usize {
        self.outstanding
    }

    /// Schedule a scale of the first frame of `thumbnail`. Returns false if
    /// this key already has one in flight or there is nothing to scale.
    pub fn request(&mut self, key: &str, thumbnail: &Thumbnail) -> bool {
        if self.pending_keys.contains(key) {
            return false;
        }
        let frame: Arc<RgbaImage> = match thumbnail.frames.first() {
            Some(frame) => Arc::clone(frame),
            None => return false,
        };

        self.pending_keys.insert(key.to_string());
        self.outstanding += 1;

        let key = key.to_string();
        let ratio = thumbnail.ratio;
        let size = self.target_size;
        let generation = self.generation;
        let tx = self.result_tx.clone();
        let job = move || {
            let scaled = transform::scale(&frame, size, true);
            let thumbnail = Thumbnail::still(scaled, false, ratio);
            // The receiver only goes away with the cache itself.
            let _ = tx.send(ScaledFrame {
                generation,
                result: BackfillResult { key, thumbnail },
            });
        };

        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
        true
    }

    /// Collect every finished placeholder without blocking
    pub fn try_collect(&mut self) -> Vec<BackfillResult> {
        let mut done = Vec::new();
        while let Ok(scaled) = self.result_rx.try_recv() {
            self.receive(scaled, &mut done);
        }
        done
    }

    fn receive(&mut self, scaled: ScaledFrame, done: &mut Vec<BackfillResult>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if scaled.generation != self.generation {
            debug!("Dropping stale low-res scale for {}", scaled.result.key);
            return;
        }
        self.pending_keys.remove(&scaled.result.key);
        done.push(scaled.result);
    }

    /// Block until every scheduled placeholder has arrived or `timeout`
    /// passes, whichever comes first.
    pub fn collect_all(&mut self, timeout: Duration) -> Vec<BackfillResult> {
        let deadline = Instant::now() + timeout;
        let mut done = self.try_collect();

        while self.outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.result_rx.recv_timeout(remaining) {
                Ok(scaled) => self.receive(scaled, &mut done),
                Err(RecvTimeoutError::Timeout) => {
                    debug!("{} low-res scales still running", self.outstanding);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        done
    }

    /// Disown every scale in flight, after the low-res tier was emptied.
    /// Their results are dropped when they arrive.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.pending_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_once_per_key() {
        let mut backfill = LowResBackfill::new(8, 1);
        let thumb = Thumbnail::still(RgbaImage::new(64, 32), false, 0.5);

        assert!(backfill.request("k", &thumb));
        assert!(!backfill.request("k", &thumb));
        assert!(backfill.is_pending("k"));

        let done = backfill.collect_all(Duration::from_secs(10));
        assert_eq!(done.len(), 1);
        assert!(!backfill.is_pending("k"));
        assert_eq!(done[0].key, "k");
        assert_eq!(done[0].thumbnail.dimensions(), (8, 4));
        assert!((done[0].thumbnail.ratio - 0.5).abs() < f32::EPSILON);
        assert_eq!(backfill.in_flight(), 0);
    }

    #[test]
    fn test_empty_thumbnail_is_ignored() {
        let mut backfill = LowResBackfill::new(8, 1);
        let empty = Thumbnail::new(Vec::new(), None, false, 1.0);
        assert!(!backfill.request("k", &empty));
        assert!(!backfill.is_pending("k"));
    }

    #[test]
    fn test_key_can_be_requested_again_once_collected() {
        let mut backfill = LowResBackfill::new(8, 1);
        let thumb = Thumbnail::still(RgbaImage::new(16, 16), false, 1.0);
        backfill.request("k", &thumb);
        backfill.collect_all(Duration::from_secs(10));

        assert!(backfill.request("k", &thumb));
        assert_eq!(backfill.collect_all(Duration::from_secs(10)).len(), 1);
    }

    #[test]
    fn test_invalidate_drops_scales_in_flight() {
        let mut backfill = LowResBackfill::new(8, 1);
        let thumb = Thumbnail::still(RgbaImage::new(16, 16), false, 1.0);
        backfill.request("k", &thumb);

        backfill.invalidate();
        assert!(!backfill.is_pending("k"));
        assert!(backfill.collect_all(Duration::from_secs(10)).is_empty());
        assert_eq!(backfill.in_flight(), 0);

        assert!(backfill.request("k", &thumb));
        let done = backfill.collect_all(Duration::from_secs(10));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].key, "k");
    }

    #[test]
    fn test_stale_result_does_not_clear_new_request() {
        let mut backfill = LowResBackfill::new(8, 1);
        let thumb = Thumbnail::still(RgbaImage::new(16, 16), false, 1.0);
        backfill.request("k", &thumb);
        backfill.invalidate();
        backfill.request("k", &thumb);

        let done = backfill.collect_all(Duration::from_secs(10));
        assert_eq!(done.len(), 1);
        assert_eq!(backfill.in_flight(), 0);
        assert!(!backfill.is_pending("k"));
    }
}
