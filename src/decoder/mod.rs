//! Decode Workers
//!
//! The scheduler talks to two capabilities:
//!
//! - [`ImageDecodeChannel`] - the isolated image decoder. One call in flight,
//!   and the channel itself can disappear.
//! - [`VideoFrameChannel`] - the in-process frame extractor.
//!
//! Dispatch never blocks. Each worker answers by sending a [`WorkerResult`]
//! over the channel returned by [`result_channel`]; the interactive side
//! drains it and hands every result to the scheduler.

pub mod image_service;
pub mod opener;
pub mod video;

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use image::RgbaImage;

use crate::core::error::Result;
use crate::core::types::{DecodeRequest, MediaKind};

pub use image_service::{decode_image, ImageDecodeService};
pub use opener::{FsOpener, ReadSeek, ResourceOpener};
pub use video::{
    extract_frames, format_duration, frame_timestamps, AnimatedImageFactory, FrameSource,
    FrameSourceFactory, VideoFrameWorker,
};

/// The request fields a worker needs, detached from the caller's callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeJob {
    pub key: String,
    pub kind: MediaKind,
    pub size: u32,
    pub full_width: bool,
    pub first_frame_only: bool,
}

impl From<&DecodeRequest> for DecodeJob {
    fn from(request: &DecodeRequest) -> Self {
        Self {
            key: request.key.clone(),
            kind: request.kind,
            size: request.size,
            full_width: request.full_width,
            first_frame_only: request.first_frame_only,
        }
    }
}

/// Pixels and metadata produced by a worker
#[derive(Debug, Clone)]
pub struct DecodedMedia {
    pub frames: Vec<RgbaImage>,
    /// Clip length, videos only
    pub duration: Option<Duration>,
    /// Height / width of the upright, uncropped source
    pub ratio: f32,
}

/// A worker's answer, correlated by key
#[derive(Debug)]
pub struct WorkerResult {
    pub key: String,
    pub result: Result<DecodedMedia>,
}

impl WorkerResult {
    pub fn success(key: impl Into<String>, media: DecodedMedia) -> Self {
        Self {
            key: key.into(),
            result: Ok(media),
        }
    }

    pub fn failure(key: impl Into<String>, error: crate::core::error::DecodeError) -> Self {
        Self {
            key: key.into(),
            result: Err(error),
        }
    }
}

/// Channel pair carrying worker results back to the interactive context
pub fn result_channel() -> (Sender<WorkerResult>, Receiver<WorkerResult>) {
    crossbeam_channel::unbounded()
}

/// The isolated image decoder
pub trait ImageDecodeChannel {
    /// Whether a dispatch could currently reach the decoder
    fn is_connected(&self) -> bool;

    /// Hand one job to the decoder. Fails with
    /// [`DecodeError::ChannelUnavailable`](crate::core::error::DecodeError::ChannelUnavailable)
    /// when the decoder is gone.
    fn dispatch(&mut self, job: DecodeJob) -> Result<()>;
}

/// The in-process video frame extractor
pub trait VideoFrameChannel {
    fn dispatch(&mut self, job: DecodeJob) -> Result<()>;
}
