//! Resource opening
//!
//! Both workers read source bytes through a [`ResourceOpener`]. Failures are
//! reported once and never retried.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::core::error::Result;

/// A seekable byte source
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Yields a seekable handle for a resource key
pub trait ResourceOpener: Send + Sync {
    fn open(&self, key: &str) -> Result<Box<dyn ReadSeek>>;

    /// Source size in bytes, when cheaply known
    fn size_hint(&self, _key: &str) -> Option<u64> {
        None
    }
}

/// Opens keys as filesystem paths
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOpener;

impl ResourceOpener for FsOpener {
    fn open(&self, key: &str) -> Result<Box<dyn ReadSeek>> {
        let file = File::open(Path::new(key))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn size_hint(&self, key: &str) -> Option<u64> {
        std::fs::metadata(key).ok().map(|m| m.len())
    }
}
