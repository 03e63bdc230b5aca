//! In-process video frame extraction
//!
//! A [`FrameSource`] hands out frames by timestamp; the worker picks the
//! timestamps, sizes every frame for the requested layout and reports the
//! clip length. Sources are produced per key by a [`FrameSourceFactory`],
//! so any backend (a media framework, an animated image) can plug in.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use log::{debug, error, warn};

use crate::core::config::DecodeConfig;
use crate::core::error::{DecodeError, Result};
use crate::decoder::opener::{ReadSeek, ResourceOpener};
use crate::decoder::{DecodeJob, DecodedMedia, VideoFrameChannel, WorkerResult};
use crate::transform;

/// Random access to the frames of one clip
pub trait FrameSource {
    fn duration(&self) -> Duration;

    /// The frame showing at `at`
    fn frame_at(&mut self, at: Duration) -> Result<RgbaImage>;
}

/// Opens a [`FrameSource`] over a resource's bytes
pub trait FrameSourceFactory: Send + Sync {
    fn open(&self, key: &str, reader: Box<dyn ReadSeek>) -> Result<Box<dyn FrameSource>>;
}

/// Timestamps to sample: `frames` points `interval` apart starting at zero.
/// If they would run past the end of the clip, the spacing shrinks to
/// `duration / frames`.
pub fn frame_timestamps(duration: Duration, frames: u32, interval: Duration) -> Vec<Duration> {
    let frames = frames.max(1);
    let step = match interval.checked_mul(frames) {
        Some(span) if span <= duration => interval,
        _ => duration / frames,
    };
    (0..frames).map(|i| step * i).collect()
}

/// Elapsed-time string: `M:SS` below an hour, `H:MM:SS` above
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Pull and size the frames `job` asks for
pub fn extract_frames(
    source: &mut dyn FrameSource,
    job: &DecodeJob,
    config: &DecodeConfig,
) -> Result<DecodedMedia> {
    let duration = source.duration();
    let count = if job.first_frame_only {
        1
    } else {
        config.animation_frames
    };

    let mut frames = Vec::new();
    let mut ratio = 1.0;
    for (index, at) in frame_timestamps(duration, count, config.frame_interval())
        .into_iter()
        .enumerate()
    {
        let frame = source.frame_at(at)?;
        if index == 0 {
            ratio = transform::compute_aspect_ratio(frame.width(), frame.height());
        }
        let sized = if job.full_width {
            transform::fit_to_width(frame, job.size)
        } else {
            transform::square_thumbnail(frame, job.size, None)
        };
        frames.push(sized);
    }

    Ok(DecodedMedia {
        frames,
        duration: Some(duration),
        ratio,
    })
}

// =============================================================================
// Animated image backend
// =============================================================================

/// Decoded animation held in memory
pub struct AnimatedImageSource {
    /// (start time, frame), in order
    frames: Vec<(Duration, RgbaImage)>,
    duration: Duration,
}

/// Frames without a delay are shown for this long
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

impl AnimatedImageSource {
    pub fn from_frames(frames: Vec<(Duration, RgbaImage)>) -> Result<Self> {
        if frames.is_empty() {
            return Err(DecodeError::DecodeRuntime("animation has no frames".to_string()));
        }
        let mut start = Duration::ZERO;
        let mut timed = Vec::with_capacity(frames.len());
        for (delay, frame) in frames {
            timed.push((start, frame));
            start += if delay.is_zero() {
                DEFAULT_FRAME_DELAY
            } else {
                delay
            };
        }
        Ok(Self {
            frames: timed,
            duration: start,
        })
    }
}

impl FrameSource for AnimatedImageSource {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn frame_at(&mut self, at: Duration) -> Result<RgbaImage> {
        self.frames
            .iter()
            .take_while(|(start, _)| *start <= at)
            .last()
            .or_else(|| self.frames.first())
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| DecodeError::DecodeRuntime("animation has no frames".to_string()))
    }
}

/// Reads animated GIFs as clips
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimatedImageFactory;

impl FrameSourceFactory for AnimatedImageFactory {
    fn open(&self, _key: &str, mut reader: Box<dyn ReadSeek>) -> Result<Box<dyn FrameSource>> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let decoder = GifDecoder::new(std::io::Cursor::new(bytes))?;
        let frames = decoder
            .into_frames()
            .collect_frames()?
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let delay = Duration::from_millis((numer / denom.max(1)) as u64);
                (delay, frame.into_buffer())
            })
            .collect();

        Ok(Box::new(AnimatedImageSource::from_frames(frames)?))
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Background thread extracting frames one job at a time
pub struct VideoFrameWorker {
    request_tx: Option<Sender<DecodeJob>>,
    handle: Option<JoinHandle<()>>,
}

impl VideoFrameWorker {
    pub fn spawn(
        opener: Arc<dyn ResourceOpener>,
        factory: Arc<dyn FrameSourceFactory>,
        config: DecodeConfig,
        result_tx: Sender<WorkerResult>,
    ) -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<DecodeJob>();

        let handle = thread::Builder::new()
            .name("frame-extractor".to_string())
            .spawn(move || {
                while let Ok(job) = request_rx.recv() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        opener
                            .open(&job.key)
                            .and_then(|reader| factory.open(&job.key, reader))
                            .and_then(|mut source| extract_frames(source.as_mut(), &job, &config))
                    }));
                    let result = outcome.unwrap_or_else(|_| {
                        error!("Frame extractor panicked on {}", job.key);
                        Err(DecodeError::DecodeRuntime("frame extractor panicked".to_string()))
                    });

                    if let Err(e) = &result {
                        debug!("Frame extraction failed for {}: {}", job.key, e);
                    }
                    if result_tx.send(WorkerResult { key: job.key, result }).is_err() {
                        break;
                    }
                }
                debug!("Frame extractor stopped");
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            handle: Some(handle),
        })
    }

    pub fn shutdown(&mut self) {
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Frame extractor thread exited abnormally");
            }
        }
    }
}

impl VideoFrameChannel for VideoFrameWorker {
    fn dispatch(&mut self, job: DecodeJob) -> Result<()> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| DecodeError::SourceUnavailable("frame extractor stopped".to_string()))?;
        tx.send(job)
            .map_err(|_| DecodeError::SourceUnavailable("frame extractor stopped".to_string()))
    }
}

impl Drop for VideoFrameWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MediaKind;
    use crate::decoder::result_channel;
    use crate::testdb::{encode_gif, MemoryOpener, SyntheticClip};

    fn video_job(size: u32, full_width: bool, first_frame_only: bool) -> DecodeJob {
        DecodeJob {
            key: "v".to_string(),
            kind: MediaKind::Video,
            size,
            full_width,
            first_frame_only,
        }
    }

    #[test]
    fn test_frame_timestamps_fixed_interval() {
        let stamps = frame_timestamps(Duration::from_secs(60), 3, Duration::from_secs(2));
        assert_eq!(
            stamps,
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_frame_timestamps_shortened_for_short_clip() {
        let stamps = frame_timestamps(Duration::from_secs(5), 10, Duration::from_secs(2));
        assert_eq!(stamps.len(), 10);
        assert_eq!(stamps[1], Duration::from_millis(500));
        assert!(*stamps.last().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn test_frame_timestamps_single_frame() {
        let stamps = frame_timestamps(Duration::from_secs(5), 1, Duration::from_secs(2));
        assert_eq!(stamps, vec![Duration::ZERO]);
    }

    #[test]
    fn test_frame_timestamps_huge_interval_does_not_overflow() {
        let stamps = frame_timestamps(Duration::from_secs(10), 10, Duration::MAX);
        assert_eq!(stamps.len(), 10);
        assert_eq!(stamps[1], Duration::from_secs(1));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05");
        assert_eq!(format_duration(Duration::from_secs(125)), "2:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_extract_first_frame_square() {
        let mut clip = SyntheticClip::new(1920, 1080, Duration::from_secs(30));
        let media = extract_frames(&mut clip, &video_job(10, false, true), &DecodeConfig::default())
            .unwrap();

        assert_eq!(media.frames.len(), 1);
        assert_eq!(media.frames[0].dimensions(), (10, 10));
        assert!((media.ratio - 0.5625).abs() < 1e-6);
        assert_eq!(media.duration, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_extract_full_width_animation() {
        let mut clip = SyntheticClip::new(1920, 1080, Duration::from_secs(30));
        let config = DecodeConfig {
            animation_frames: 3,
            ..Default::default()
        };
        let media = extract_frames(&mut clip, &video_job(2000, true, false), &config).unwrap();

        assert_eq!(media.frames.len(), 3);
        assert_eq!(media.frames[2].dimensions(), (2000, 1125));
        assert_eq!(
            clip.requested(),
            &[Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_animated_image_source_timing() {
        let source = AnimatedImageSource::from_frames(vec![
            (Duration::from_millis(200), RgbaImage::new(2, 2)),
            (Duration::ZERO, RgbaImage::new(3, 3)),
        ]);
        let mut source = source.unwrap();
        assert_eq!(source.duration(), Duration::from_millis(300));
        assert_eq!(
            source.frame_at(Duration::from_millis(250)).unwrap().dimensions(),
            (3, 3)
        );
        assert_eq!(source.frame_at(Duration::ZERO).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn test_animated_image_source_rejects_empty() {
        assert!(AnimatedImageSource::from_frames(Vec::new()).is_err());
    }

    #[test]
    fn test_worker_extracts_gif() {
        let mut opener = MemoryOpener::new();
        opener.insert("clip.gif", encode_gif(32, 16, 4));

        let (result_tx, result_rx) = result_channel();
        let mut worker = VideoFrameWorker::spawn(
            Arc::new(opener),
            Arc::new(AnimatedImageFactory),
            DecodeConfig {
                animation_frames: 4,
                ..Default::default()
            },
            result_tx,
        )
        .unwrap();

        let mut job = video_job(8, false, false);
        job.key = "clip.gif".to_string();
        worker.dispatch(job).unwrap();

        let result = result_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        let media = result.result.unwrap();
        assert_eq!(media.frames.len(), 4);
        assert_eq!(media.frames[0].dimensions(), (8, 8));
        assert!((media.ratio - 0.5).abs() < 1e-6);
    }

    struct PanickingFactory;

    impl FrameSourceFactory for PanickingFactory {
        fn open(&self, _key: &str, _reader: Box<dyn ReadSeek>) -> Result<Box<dyn FrameSource>> {
            panic!("backend blew up");
        }
    }

    #[test]
    fn test_worker_survives_panicking_source() {
        let mut opener = MemoryOpener::new();
        opener.insert("v", encode_gif(8, 8, 2));
        opener.insert("clip.gif", encode_gif(8, 8, 2));

        let (result_tx, result_rx) = result_channel();
        let mut worker = VideoFrameWorker::spawn(
            Arc::new(opener),
            Arc::new(PanickingFactory),
            DecodeConfig::default(),
            result_tx,
        )
        .unwrap();

        worker.dispatch(video_job(8, false, true)).unwrap();
        let result = result_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(result.result, Err(DecodeError::DecodeRuntime(_))));

        // The thread is still serving jobs
        let mut job = video_job(8, false, true);
        job.key = "clip.gif".to_string();
        worker.dispatch(job).unwrap();
        let result = result_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(result.key, "clip.gif");
        assert!(matches!(result.result, Err(DecodeError::DecodeRuntime(_))));
    }

    #[test]
    fn test_worker_reports_missing_source() {
        let (result_tx, result_rx) = result_channel();
        let mut worker = VideoFrameWorker::spawn(
            Arc::new(MemoryOpener::new()),
            Arc::new(AnimatedImageFactory),
            DecodeConfig::default(),
            result_tx,
        )
        .unwrap();

        worker.dispatch(video_job(8, false, true)).unwrap();
        let result = result_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(result.result, Err(DecodeError::SourceUnavailable(_))));
    }
}
