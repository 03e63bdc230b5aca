//! In-memory stand-ins for the media store and the decode workers

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use image::{Rgba, RgbaImage};

use crate::core::error::{DecodeError, Result};
use crate::core::types::MediaKind;
use crate::decoder::{
    DecodeJob, FrameSource, FrameSourceFactory, ImageDecodeChannel, ReadSeek, ResourceOpener,
    VideoFrameChannel,
};

// =============================================================================
// Opener
// =============================================================================

/// Resource store backed by a map of key to bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Percentage of opens that fail with an I/O error (0-100)
    failure_rate: u8,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_rate(failure_rate: u8) -> Self {
        Self {
            failure_rate: failure_rate.min(100),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, key: &str, bytes: Vec<u8>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(key.to_string(), bytes);
        }
    }

    pub fn remove(&mut self, key: &str) {
        if let Ok(mut files) = self.files.write() {
            files.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceOpener for MemoryOpener {
    fn open(&self, key: &str) -> Result<Box<dyn ReadSeek>> {
        if self.failure_rate > 0 && rand::random::<u8>() % 100 < self.failure_rate {
            return Err(DecodeError::Io(format!("simulated read failure on {}", key)));
        }
        let files = self
            .files
            .read()
            .map_err(|_| DecodeError::Io("resource store poisoned".to_string()))?;
        let bytes = files
            .get(key)
            .cloned()
            .ok_or_else(|| DecodeError::SourceUnavailable(key.to_string()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn size_hint(&self, key: &str) -> Option<u64> {
        self.files
            .read()
            .ok()
            .and_then(|f| f.get(key).map(|b| b.len() as u64))
    }
}

// =============================================================================
// Synthetic clips
// =============================================================================

/// A clip of solid frames whose shade encodes the timestamp.
/// Records every timestamp it is asked for.
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    width: u32,
    height: u32,
    duration: Duration,
    requested: Vec<Duration>,
}

impl SyntheticClip {
    pub fn new(width: u32, height: u32, duration: Duration) -> Self {
        Self {
            width,
            height,
            duration,
            requested: Vec::new(),
        }
    }

    pub fn requested(&self) -> &[Duration] {
        &self.requested
    }
}

impl FrameSource for SyntheticClip {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn frame_at(&mut self, at: Duration) -> Result<RgbaImage> {
        if at > self.duration {
            return Err(DecodeError::DecodeRuntime(format!(
                "seek to {:?} past end {:?}",
                at, self.duration
            )));
        }
        self.requested.push(at);
        let shade = (at.as_millis() % 256) as u8;
        Ok(RgbaImage::from_pixel(
            self.width,
            self.height,
            Rgba([shade, shade, shade, 255]),
        ))
    }
}

/// Hands out a [`SyntheticClip`] for any key, ignoring the bytes
#[derive(Debug, Clone, Copy)]
pub struct SyntheticClipFactory {
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
}

impl FrameSourceFactory for SyntheticClipFactory {
    fn open(&self, _key: &str, _reader: Box<dyn ReadSeek>) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(SyntheticClip::new(
            self.width,
            self.height,
            self.duration,
        )))
    }
}

// =============================================================================
// Recording channels
// =============================================================================

/// Dispatch order shared by recording channels
#[derive(Debug, Clone, Default)]
pub struct DispatchLog(Rc<RefCell<Vec<DecodeJob>>>);

impl DispatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, job: DecodeJob) {
        self.0.borrow_mut().push(job);
    }

    pub fn jobs(&self) -> Vec<DecodeJob> {
        self.0.borrow().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().iter().map(|j| j.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn last(&self) -> Option<DecodeJob> {
        self.0.borrow().last().cloned()
    }
}

/// Image channel that records jobs and never decodes. Can be disconnected.
#[derive(Debug, Clone)]
pub struct RecordingImageChannel {
    log: DispatchLog,
    connected: Rc<Cell<bool>>,
}

impl RecordingImageChannel {
    pub fn new(log: DispatchLog) -> Self {
        Self {
            log,
            connected: Rc::new(Cell::new(true)),
        }
    }

    /// Shared toggle; clones observe the same state
    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }
}

impl ImageDecodeChannel for RecordingImageChannel {
    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn dispatch(&mut self, job: DecodeJob) -> Result<()> {
        if !self.connected.get() {
            return Err(DecodeError::ChannelUnavailable);
        }
        debug_assert_eq!(job.kind, MediaKind::Picture);
        self.log.push(job);
        Ok(())
    }
}

/// Video channel that records jobs and never decodes
#[derive(Debug, Clone)]
pub struct RecordingVideoChannel {
    log: DispatchLog,
}

impl RecordingVideoChannel {
    pub fn new(log: DispatchLog) -> Self {
        Self { log }
    }
}

impl VideoFrameChannel for RecordingVideoChannel {
    fn dispatch(&mut self, job: DecodeJob) -> Result<()> {
        debug_assert_eq!(job.kind, MediaKind::Video);
        self.log.push(job);
        Ok(())
    }
}
