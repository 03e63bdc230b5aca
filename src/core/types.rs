//! Shared data model: requests, priorities, thumbnails and results

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::core::error::DecodeOutcome;

// =============================================================================
// Media Kind
// =============================================================================

/// Kind of media behind a resource key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Picture,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Picture => write!(f, "picture"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Scheduling class of a request. Lower rank is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    Picture = 0,
    VideoFirstFrame = 1,
    VideoOtherFrames = 2,
}

impl PriorityClass {
    pub fn for_request(kind: MediaKind, first_frame_only: bool) -> Self {
        match (kind, first_frame_only) {
            (MediaKind::Picture, _) => PriorityClass::Picture,
            (MediaKind::Video, true) => PriorityClass::VideoFirstFrame,
            (MediaKind::Video, false) => PriorityClass::VideoOtherFrames,
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

static NEXT_ORDINAL: AtomicU64 = AtomicU64::new(1);

/// Next process-wide request ordinal. Strictly increasing.
pub fn next_ordinal() -> u64 {
    NEXT_ORDINAL.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Thumbnail
// =============================================================================

/// A decoded result unit: one frame for a still, several for an animated preview
#[derive(Debug, Clone)]
pub struct Thumbnail {
    /// Frames in display order
    pub frames: Vec<Arc<RgbaImage>>,
    /// Human-readable clip length (videos only)
    pub duration: Option<String>,
    /// Whether this was produced for the full-width layout
    pub full_width: bool,
    /// Height / width of the original, uncropped decode
    pub ratio: f32,
}

impl Thumbnail {
    pub fn new(frames: Vec<RgbaImage>, duration: Option<String>, full_width: bool, ratio: f32) -> Self {
        Self {
            frames: frames.into_iter().map(Arc::new).collect(),
            duration,
            full_width,
            ratio,
        }
    }

    /// Single-frame still
    pub fn still(image: RgbaImage, full_width: bool, ratio: f32) -> Self {
        Self::new(vec![image], None, full_width, ratio)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn first_frame(&self) -> Option<&RgbaImage> {
        self.frames.first().map(|f| f.as_ref())
    }

    /// Pixel dimensions of the first frame
    pub fn dimensions(&self) -> (u32, u32) {
        self.first_frame().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    /// Approximate memory held by all frames
    pub fn byte_size(&self) -> usize {
        self.frames.iter().map(|f| f.as_raw().len()).sum()
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Get the first frame as a PNG data URL for use in HTML/web UIs
    pub fn to_data_url(&self) -> Option<String> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let frame = self.first_frame()?;
        let mut png = Vec::new();
        frame
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .ok()?;
        Some(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
    }
}

// =============================================================================
// Cache Tier
// =============================================================================

/// One of the three independent thumbnail caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheTier {
    LowRes,
    HighRes,
    FullWidth,
}

impl CacheTier {
    pub const ALL: [CacheTier; 3] = [CacheTier::LowRes, CacheTier::HighRes, CacheTier::FullWidth];

    pub fn name(&self) -> &'static str {
        match self {
            CacheTier::LowRes => "low-res",
            CacheTier::HighRes => "high-res",
            CacheTier::FullWidth => "full-width",
        }
    }
}

// =============================================================================
// Requests and Results
// =============================================================================

/// What a caller gets back, exactly once per request that reaches a worker
/// or fails to dispatch.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    pub key: String,
    pub kind: MediaKind,
    pub full_width: bool,
    /// `None` on any failure; show a blank or failure tile
    pub thumbnail: Option<Thumbnail>,
    pub duration: Option<String>,
    pub ratio: f32,
    pub outcome: DecodeOutcome,
}

impl DecodeResult {
    pub fn failed(request: &DecodeRequest, outcome: DecodeOutcome) -> Self {
        Self {
            key: request.key.clone(),
            kind: request.kind,
            full_width: request.full_width,
            thumbnail: None,
            duration: None,
            ratio: 1.0,
            outcome,
        }
    }
}

/// Callback invoked on the interactive context with the final result
pub type DecodeCallback = Box<dyn FnOnce(DecodeResult)>;

/// A unit of work asking for a thumbnail of one key at one size and mode
pub struct DecodeRequest {
    pub key: String,
    pub kind: MediaKind,
    /// Edge length for square mode, width for full-width mode
    pub size: u32,
    pub full_width: bool,
    /// Video only: extract a single representative frame
    pub first_frame_only: bool,
    pub ordinal: u64,
    pub created_at: Instant,
    pub callback: Option<DecodeCallback>,
}

impl DecodeRequest {
    pub fn new(
        key: impl Into<String>,
        kind: MediaKind,
        size: u32,
        full_width: bool,
        first_frame_only: bool,
        callback: DecodeCallback,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            size,
            full_width,
            first_frame_only: first_frame_only && kind == MediaKind::Video,
            ordinal: next_ordinal(),
            created_at: Instant::now(),
            callback: Some(callback),
        }
    }

    pub fn priority_class(&self) -> PriorityClass {
        PriorityClass::for_request(self.kind, self.first_frame_only)
    }

    /// Heap key: class rank first, FIFO ordinal as the tie-break
    pub fn priority_key(&self) -> (u8, u64) {
        (self.priority_class().rank(), self.ordinal)
    }

    /// Fire the callback if it has not fired yet
    pub fn complete(&mut self, result: DecodeResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl fmt::Debug for DecodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeRequest")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("full_width", &self.full_width)
            .field("first_frame_only", &self.first_frame_only)
            .field("ordinal", &self.ordinal)
            .finish()
    }
}
