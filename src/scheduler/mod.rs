//! Decode Scheduler
//!
//! Single-writer coordinator between the picker grid and the decode workers.
//!
//! - Requests wait in a priority queue: pictures, then video first frames,
//!   then multi-frame video, FIFO within each class.
//! - At most one request is being decoded at any time.
//! - Every request that reaches a worker, or fails to dispatch, gets its
//!   callback exactly once. Cancelled requests get none.
//!
//! All methods take `&mut self` and run on the interactive thread; workers
//! report back through a [`WorkerResult`] channel that [`DecodeScheduler::pump`]
//! drains.

pub mod stats;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};

pub use stats::{
    BucketStats, DecodeStats, LogTelemetry, NullTelemetry, StatsBucket, StatsReport, TelemetrySink,
};

use crate::cache::TieredCache;
use crate::core::config::Config;
use crate::core::error::{DecodeError, DecodeOutcome};
use crate::core::types::{
    CacheTier, DecodeCallback, DecodeRequest, DecodeResult, MediaKind, Thumbnail,
};
use crate::decoder::{
    format_duration, result_channel, DecodeJob, FrameSourceFactory, ImageDecodeChannel,
    ImageDecodeService, ResourceOpener, VideoFrameChannel, VideoFrameWorker, WorkerResult,
};

/// Heap entry ordering requests so the smallest priority key pops first
struct Pending(DecodeRequest);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority_key() == other.0.priority_key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.priority_key().cmp(&self.0.priority_key())
    }
}

/// Owns the pending queue, the processing slot, the worker channels and the
/// thumbnail cache.
pub struct DecodeScheduler {
    pending: BinaryHeap<Pending>,
    processing: Option<DecodeRequest>,
    image_channel: Box<dyn ImageDecodeChannel>,
    video_channel: Box<dyn VideoFrameChannel>,
    results: Receiver<WorkerResult>,
    cache: TieredCache,
    stats: DecodeStats,
    telemetry: Box<dyn TelemetrySink>,
}

impl DecodeScheduler {
    pub fn new(
        cache: TieredCache,
        image_channel: Box<dyn ImageDecodeChannel>,
        video_channel: Box<dyn VideoFrameChannel>,
        results: Receiver<WorkerResult>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Self {
        Self {
            pending: BinaryHeap::new(),
            processing: None,
            image_channel,
            video_channel,
            results,
            cache,
            stats: DecodeStats::new(),
            telemetry,
        }
    }

    /// Start both workers and wire them to a new scheduler
    pub fn with_workers(
        config: &Config,
        opener: Arc<dyn ResourceOpener>,
        frame_sources: Arc<dyn FrameSourceFactory>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> std::io::Result<Self> {
        let (result_tx, result_rx) = result_channel();
        let images = ImageDecodeService::spawn(opener.clone(), config.decode.clone(), result_tx.clone())?;
        let videos = VideoFrameWorker::spawn(opener, frame_sources, config.decode.clone(), result_tx)?;

        Ok(Self::new(
            TieredCache::new(&config.cache),
            Box::new(images),
            Box::new(videos),
            result_rx,
            telemetry,
        ))
    }

    /// Queue a thumbnail request. Dispatches at once if nothing is decoding.
    pub fn request(
        &mut self,
        key: impl Into<String>,
        kind: MediaKind,
        size: u32,
        full_width: bool,
        first_frame_only: bool,
        callback: DecodeCallback,
    ) {
        let request = DecodeRequest::new(key, kind, size, full_width, first_frame_only, callback);
        self.enqueue(request);
    }

    pub fn enqueue(&mut self, request: DecodeRequest) {
        debug!(
            "Queued {} ({:?}, size {}, full width {})",
            request.key,
            request.priority_class(),
            request.size,
            request.full_width
        );
        self.pending.push(Pending(request));
        if self.processing.is_none() {
            self.dispatch_next();
        }
    }

    /// Drop every pending request for `key`. The in-flight request is left
    /// alone. Returns how many were removed; their callbacks never fire.
    pub fn cancel(&mut self, key: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| p.0.key != key);
        let removed = before - self.pending.len();
        if removed > 0 {
            debug!("Cancelled {} pending request(s) for {}", removed, key);
        }
        removed
    }

    /// Complete the in-flight request with a worker's answer, then move on
    pub fn on_worker_result(&mut self, result: WorkerResult) {
        let Some(mut request) = self.processing.take() else {
            warn!("Ignoring result for {} with nothing in flight", result.key);
            return;
        };
        if request.key != result.key {
            warn!(
                "Ignoring result for {} while {} is in flight",
                result.key, request.key
            );
            self.processing = Some(request);
            return;
        }

        let decoded = match result.result {
            Ok(media) if media.frames.is_empty() => {
                Err(DecodeError::DecodeRuntime("worker returned no frames".to_string()))
            }
            other => other,
        };

        let outcome = match decoded {
            Ok(media) => {
                let duration = media.duration.map(format_duration);
                let thumbnail =
                    Thumbnail::new(media.frames, duration.clone(), request.full_width, media.ratio);
                let tier = if request.full_width {
                    CacheTier::FullWidth
                } else {
                    CacheTier::HighRes
                };
                self.cache.put(tier, &request.key, thumbnail.clone());

                DecodeResult {
                    key: request.key.clone(),
                    kind: request.kind,
                    full_width: request.full_width,
                    ratio: media.ratio,
                    duration,
                    thumbnail: Some(thumbnail),
                    outcome: DecodeOutcome::Success,
                }
            }
            Err(e) => {
                warn!("Decode failed for {}: {}", request.key, e);
                DecodeResult::failed(&request, DecodeOutcome::from(&e))
            }
        };

        self.finish(&mut request, outcome);
        self.dispatch_next();
    }

    /// Hand every queued worker result to [`Self::on_worker_result`] without
    /// blocking, and store finished low-res backfills. Returns the number of
    /// worker results handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(result) = self.results.try_recv() {
            self.on_worker_result(result);
            handled += 1;
        }
        self.cache.poll_backfill();
        handled
    }

    /// Like [`Self::pump`], but waits up to `timeout` for the first result.
    ///
    /// Once every worker is gone no result can arrive: outstanding requests,
    /// the in-flight one included, fail with `ChannelUnavailable`.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.results.recv_timeout(timeout) {
            Ok(result) => {
                self.on_worker_result(result);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) => self.pump(),
            Err(RecvTimeoutError::Disconnected) => {
                if self.is_idle() {
                    thread::sleep(timeout);
                } else {
                    warn!("Decode workers are gone, failing outstanding requests");
                    self.fail_outstanding();
                }
                self.pump()
            }
        }
    }

    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.processing.is_none()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_some()
    }

    /// Whether any request for `key` is queued or in flight
    pub fn has_request(&self, key: &str) -> bool {
        self.processing_key() == Some(key) || self.pending.iter().any(|p| p.0.key == key)
    }

    pub fn processing_key(&self) -> Option<&str> {
        self.processing.as_ref().map(|r| r.key.as_str())
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TieredCache {
        &mut self.cache
    }

    /// Counters of the batch in progress
    pub fn stats(&self) -> StatsReport {
        self.stats.snapshot()
    }

    pub fn telemetry_mut(&mut self) -> &mut dyn TelemetrySink {
        self.telemetry.as_mut()
    }

    /// Fail everything still queued with `ChannelUnavailable` and drop the
    /// in-flight request's callback.
    pub fn shutdown(&mut self) {
        if let Some(request) = self.processing.take() {
            debug!("Abandoning in-flight request for {}", request.key);
        }
        while let Some(Pending(mut request)) = self.pending.pop() {
            let result = DecodeResult::failed(&request, DecodeOutcome::ChannelUnavailable);
            self.finish(&mut request, result);
        }
        self.flush_report();
        info!("Decode scheduler shut down");
    }

    fn fail_outstanding(&mut self) {
        let in_flight = self.processing.take().into_iter();
        // Highest priority first, the order they would have been dispatched in
        let queued = std::mem::take(&mut self.pending)
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|p| p.0);
        for mut request in in_flight.chain(queued) {
            let result = DecodeResult::failed(&request, DecodeOutcome::ChannelUnavailable);
            self.finish(&mut request, result);
        }
        self.flush_report();
    }

    /// Pop until one request is handed to a worker or the queue is empty.
    /// Dispatch failures complete the request at once and the loop goes on.
    fn dispatch_next(&mut self) {
        while self.processing.is_none() {
            let Some(Pending(mut request)) = self.pending.pop() else {
                self.flush_report();
                return;
            };

            let job = DecodeJob::from(&request);
            let dispatched = match request.kind {
                MediaKind::Picture if !self.image_channel.is_connected() => {
                    Err(DecodeError::ChannelUnavailable)
                }
                MediaKind::Picture => self.image_channel.dispatch(job),
                MediaKind::Video => self.video_channel.dispatch(job),
            };

            match dispatched {
                Ok(()) => {
                    debug!("Dispatched {} to the {} worker", request.key, request.kind);
                    self.processing = Some(request);
                }
                Err(e) => {
                    warn!("Could not dispatch {}: {}", request.key, e);
                    let result = DecodeResult::failed(&request, DecodeOutcome::from(&e));
                    self.finish(&mut request, result);
                }
            }
        }
    }

    fn finish(&mut self, request: &mut DecodeRequest, result: DecodeResult) {
        let bucket = StatsBucket::for_request(request);
        let latency = request.created_at.elapsed();
        self.stats.record(bucket, result.outcome, latency);
        self.telemetry.request_latency(bucket, result.outcome, latency);
        request.complete(result);
    }

    /// Report the batch once the scheduler has fully drained
    fn flush_report(&mut self) {
        if !self.is_idle() || self.stats.is_empty() {
            return;
        }
        let report = self.stats.take_report();
        debug!("Decode batch drained after {} request(s)", report.total_requests());
        self.telemetry.decode_batch(&report);
    }
}

impl Drop for DecodeScheduler {
    fn drop(&mut self) {
        if !self.is_idle() {
            self.shutdown();
        }
    }
}
