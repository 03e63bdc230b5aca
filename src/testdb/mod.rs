//! Test Media Module
//!
//! Fakes for exercising the decode pipeline without real files or a real
//! decoder process:
//!
//! - **Generators** - real PNG/GIF bytes and seeded random libraries
//! - **Opener** - an in-memory resource store with optional failure injection
//! - **Clips** - synthetic frame sources that record what was asked of them
//! - **Channels** - worker channels that only record dispatch order
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use picker_thumbnails::testdb::{encode_png, MemoryOpener};
//!
//! let mut opener = MemoryOpener::new();
//! opener.insert("photo.png", encode_png(64, 48));
//! ```

pub mod generator;
pub mod mock_media;

pub use generator::{encode_gif, encode_png, generate_library, gradient, GeneratedMedia};
pub use mock_media::{
    DispatchLog, MemoryOpener, RecordingImageChannel, RecordingVideoChannel, SyntheticClip,
    SyntheticClipFactory,
};

/// An opener preloaded with a generated library
pub fn library_opener(count: usize, seed: u64) -> (MemoryOpener, Vec<GeneratedMedia>) {
    let library = generate_library(count, seed);
    let mut opener = MemoryOpener::new();
    for media in &library {
        opener.insert(&media.key, media.bytes.clone());
    }
    (opener, library)
}
