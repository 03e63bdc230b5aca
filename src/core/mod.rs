//! Core functionality module
//!
//! Shared building blocks for the rest of the crate.
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types, decode outcomes and result aliases
//! - `types` - Requests, priorities, thumbnails and results

pub mod config;
pub mod error;
pub mod types;
