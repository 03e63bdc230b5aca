//! Candidate list providers
//!
//! A candidate is one tile of the picker grid. Media tiles carry a resource
//! key the decoders understand; affordance tiles (camera, browse) are drawn
//! statically and never decoded.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::core::error::{DecodeError, Result};
use crate::core::types::MediaKind;

/// What a grid tile shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TileKind {
    Picture,
    Video,
    /// "Open camera" affordance
    Camera,
    /// "Browse other files" affordance
    Browse,
}

impl TileKind {
    /// The decodable media kind, `None` for affordance tiles
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            TileKind::Picture => Some(MediaKind::Picture),
            TileKind::Video => Some(MediaKind::Video),
            TileKind::Camera | TileKind::Browse => None,
        }
    }
}

/// One entry of the library, as the grid sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub key: String,
    pub kind: TileKind,
    pub last_modified: DateTime<Utc>,
}

impl Candidate {
    pub fn new(key: impl Into<String>, kind: TileKind, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            kind,
            last_modified,
        }
    }

    /// An affordance tile; its key only has to be unique within the grid
    pub fn affordance(kind: TileKind) -> Self {
        let key = match kind {
            TileKind::Camera => "tile:camera",
            TileKind::Browse => "tile:browse",
            TileKind::Picture | TileKind::Video => "tile:media",
        };
        Self::new(key, kind, DateTime::<Utc>::MIN_UTC)
    }
}

/// Yields the library in display order
pub trait CandidateProvider {
    fn candidates(&self) -> Result<Vec<Candidate>>;
}

/// Tile kind for a file, by extension. Animated GIFs count as clips.
pub fn classify(path: &Path) -> Option<TileKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())?;

    match ext.as_str() {
        "jpg" | "jpeg" | "png" => Some(TileKind::Picture),
        "gif" => Some(TileKind::Video),
        _ => None,
    }
}

/// Newest first; equal timestamps fall back to key order
pub fn sort_newest_first(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Media files under a directory
#[derive(Debug, Clone)]
pub struct DirectoryCandidates {
    root: PathBuf,
    recursive: bool,
    follow_symlinks: bool,
}

impl DirectoryCandidates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
            follow_symlinks: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

impl CandidateProvider for DirectoryCandidates {
    fn candidates(&self) -> Result<Vec<Candidate>> {
        if !self.root.is_dir() {
            return Err(DecodeError::SourceUnavailable(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .max_depth(if self.recursive { usize::MAX } else { 1 });

        let mut candidates = Vec::new();
        for entry in walker.into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(kind) = classify(entry.path()) else {
                continue;
            };
            let last_modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);

            candidates.push(Candidate::new(
                entry.path().to_string_lossy().to_string(),
                kind,
                last_modified,
            ));
        }

        sort_newest_first(&mut candidates);
        debug!(
            "Found {} media files under {}",
            candidates.len(),
            self.root.display()
        );
        Ok(candidates)
    }
}

/// A fixed list, already in display order
#[derive(Debug, Clone, Default)]
pub struct StaticCandidates(pub Vec<Candidate>);

impl CandidateProvider for StaticCandidates {
    fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.0.clone())
    }
}
