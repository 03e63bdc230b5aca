//! Per-batch decode statistics and the telemetry sink they are flushed to
//!
//! A batch runs from the first completion after the queue drained until the
//! queue drains again (nothing pending, nothing processing).

use std::time::Duration;

use log::info;
use serde::Serialize;

use crate::core::error::DecodeOutcome;
use crate::core::types::{DecodeRequest, MediaKind};

/// Latency/outcome buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatsBucket {
    Image,
    VideoSingleFrame,
    VideoMultiFrame,
}

impl StatsBucket {
    pub fn for_request(request: &DecodeRequest) -> Self {
        match (request.kind, request.first_frame_only) {
            (MediaKind::Picture, _) => StatsBucket::Image,
            (MediaKind::Video, true) => StatsBucket::VideoSingleFrame,
            (MediaKind::Video, false) => StatsBucket::VideoMultiFrame,
        }
    }

    fn index(&self) -> usize {
        match self {
            StatsBucket::Image => 0,
            StatsBucket::VideoSingleFrame => 1,
            StatsBucket::VideoMultiFrame => 2,
        }
    }
}

/// Counters for one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BucketStats {
    pub requests: u64,
    /// Indexed by [`DecodeOutcome::index`]
    pub outcomes: [u64; 6],
    pub total_latency: Duration,
    pub max_latency: Duration,
}

impl BucketStats {
    pub fn count(&self, outcome: DecodeOutcome) -> u64 {
        self.outcomes[outcome.index()]
    }

    pub fn failures(&self) -> u64 {
        self.requests - self.count(DecodeOutcome::Success)
    }

    pub fn mean_latency(&self) -> Duration {
        if self.requests == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_latency.as_nanos() / u128::from(self.requests);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Aggregate of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsReport {
    pub image: BucketStats,
    pub video_single_frame: BucketStats,
    pub video_multi_frame: BucketStats,
}

impl StatsReport {
    pub fn total_requests(&self) -> u64 {
        self.image.requests + self.video_single_frame.requests + self.video_multi_frame.requests
    }

    pub fn bucket(&self, bucket: StatsBucket) -> &BucketStats {
        match bucket {
            StatsBucket::Image => &self.image,
            StatsBucket::VideoSingleFrame => &self.video_single_frame,
            StatsBucket::VideoMultiFrame => &self.video_multi_frame,
        }
    }
}

/// Batch counters owned by the scheduler
#[derive(Debug, Default)]
pub struct DecodeStats {
    buckets: [BucketStats; 3],
    lifetime_requests: u64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, bucket: StatsBucket, outcome: DecodeOutcome, latency: Duration) {
        let stats = &mut self.buckets[bucket.index()];
        stats.requests += 1;
        stats.outcomes[outcome.index()] += 1;
        stats.total_latency += latency;
        stats.max_latency = stats.max_latency.max(latency);
        self.lifetime_requests += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.requests == 0)
    }

    /// Current batch without resetting it
    pub fn snapshot(&self) -> StatsReport {
        StatsReport {
            image: self.buckets[0],
            video_single_frame: self.buckets[1],
            video_multi_frame: self.buckets[2],
        }
    }

    /// End the batch: return its counters and start over
    pub fn take_report(&mut self) -> StatsReport {
        let report = self.snapshot();
        self.buckets = Default::default();
        report
    }

    /// Requests recorded since creation, across batches
    pub fn lifetime_requests(&self) -> u64 {
        self.lifetime_requests
    }
}

/// Write-only destination for counters. Calls must return promptly.
pub trait TelemetrySink {
    /// A decode batch finished
    fn decode_batch(&mut self, report: &StatsReport);

    /// A single request finished
    fn request_latency(&mut self, _bucket: StatsBucket, _outcome: DecodeOutcome, _latency: Duration) {}

    /// Grid binding counters since the previous call
    fn grid_counts(&mut self, _cache_hits: u64, _decode_requests: u64) {}
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn decode_batch(&mut self, _report: &StatsReport) {}
}

/// Writes batch summaries to the log
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn decode_batch(&mut self, report: &StatsReport) {
        for (name, bucket) in [
            ("images", &report.image),
            ("video first frames", &report.video_single_frame),
            ("video animations", &report.video_multi_frame),
        ] {
            if bucket.requests == 0 {
                continue;
            }
            info!(
                "Decoded {} {} ({} failed), mean {:?}, max {:?}",
                bucket.requests,
                name,
                bucket.failures(),
                bucket.mean_latency(),
                bucket.max_latency
            );
        }
    }

    fn grid_counts(&mut self, cache_hits: u64, decode_requests: u64) {
        info!(
            "Grid bound {} cells from cache, requested {} decodes",
            cache_hits, decode_requests
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_take_report() {
        let mut stats = DecodeStats::new();
        assert!(stats.is_empty());

        stats.record(StatsBucket::Image, DecodeOutcome::Success, Duration::from_millis(10));
        stats.record(StatsBucket::Image, DecodeOutcome::IoError, Duration::from_millis(30));
        stats.record(
            StatsBucket::VideoMultiFrame,
            DecodeOutcome::Success,
            Duration::from_millis(100),
        );

        let report = stats.take_report();
        assert_eq!(report.total_requests(), 3);
        assert_eq!(report.image.requests, 2);
        assert_eq!(report.image.failures(), 1);
        assert_eq!(report.image.count(DecodeOutcome::IoError), 1);
        assert_eq!(report.image.mean_latency(), Duration::from_millis(20));
        assert_eq!(report.image.max_latency, Duration::from_millis(30));
        assert_eq!(report.video_single_frame.requests, 0);

        assert!(stats.is_empty());
        assert_eq!(stats.lifetime_requests(), 3);
    }

    #[test]
    fn test_mean_latency_beyond_u32_requests() {
        let requests = u64::from(u32::MAX) + 2;
        let bucket = BucketStats {
            requests,
            total_latency: Duration::from_nanos(requests * 3),
            ..Default::default()
        };
        assert_eq!(bucket.mean_latency(), Duration::from_nanos(3));
    }

    #[test]
    fn test_bucket_for_request() {
        let picture = DecodeRequest::new("p", MediaKind::Picture, 1, false, false, Box::new(|_| {}));
        let first = DecodeRequest::new("v", MediaKind::Video, 1, false, true, Box::new(|_| {}));
        let multi = DecodeRequest::new("v", MediaKind::Video, 1, false, false, Box::new(|_| {}));

        assert_eq!(StatsBucket::for_request(&picture), StatsBucket::Image);
        assert_eq!(StatsBucket::for_request(&first), StatsBucket::VideoSingleFrame);
        assert_eq!(StatsBucket::for_request(&multi), StatsBucket::VideoMultiFrame);
    }
}
