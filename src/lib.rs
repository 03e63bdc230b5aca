//! Picker Thumbnails Library
//!
//! Decode scheduling, tiered thumbnail caching and bitmap transforms for a
//! photo/video picker grid. Thumbnails refine progressively: a grid cell shows
//! whatever the cache already has, a rescaled placeholder while a decode
//! runs, and the authoritative image once it arrives.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`core`] - Configuration, error types and the shared data model
//! - [`transform`] - Pure geometry: sub-sampling, cropping, fitting, orientation
//! - [`cache`] - Low-res, high-res and full-width tiers with background backfill
//! - [`decoder`] - The image decode service and the video frame worker
//! - [`scheduler`] - Priority queue with a single in-flight request
//! - [`grid`] - Candidate lists and per-cell binding decisions
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - In-memory openers, synthetic clips and recording channels
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use picker_thumbnails::core::config::Config;
//! use picker_thumbnails::decoder::{AnimatedImageFactory, FsOpener};
//! use picker_thumbnails::grid::{CandidateProvider, DirectoryCandidates, GridCell, PickerGrid};
//! use picker_thumbnails::scheduler::{DecodeScheduler, LogTelemetry};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let mut scheduler = DecodeScheduler::with_workers(
//!         &config,
//!         Arc::new(FsOpener),
//!         Arc::new(AnimatedImageFactory),
//!         Box::new(LogTelemetry),
//!     )?;
//!     let mut grid = PickerGrid::new(config.grid.clone());
//!
//!     let cells: Vec<GridCell> = DirectoryCandidates::new("/photos")
//!         .candidates()?
//!         .iter()
//!         .map(|candidate| {
//!             let cell = GridCell::new();
//!             grid.bind_cell(&cell, candidate, &mut scheduler);
//!             cell
//!         })
//!         .collect();
//!
//!     while !scheduler.is_idle() {
//!         scheduler.pump_timeout(Duration::from_millis(50));
//!     }
//!     println!("{} cells bound", cells.len());
//!     Ok(())
//! }
//! ```
//!
//! # Threading
//!
//! The scheduler, cache and grid live on one interactive thread. Decodes run
//! on worker threads and come back as messages that
//! [`scheduler::DecodeScheduler::pump`] applies; low-res placeholders are
//! scaled on a small rayon pool.

pub mod cache;
pub mod cli;
pub mod core;
pub mod decoder;
pub mod grid;
pub mod scheduler;
pub mod testdb;
pub mod transform;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
