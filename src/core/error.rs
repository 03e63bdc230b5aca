//! Error types for thumbnail decoding
//!
//! Every failure a decode request can end in is one of the [`DecodeError`]
//! variants. Callbacks never see the error itself; they receive the flat
//! [`DecodeOutcome`] next to an empty payload, so success and failure travel
//! the same path.

use serde::Serialize;
use std::io;
use thiserror::Error;

/// Main error type for decode work
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The file (or the resource behind a key) could not be opened
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Malformed data or an unexpected failure inside a worker
    #[error("Decode failed: {0}")]
    DecodeRuntime(String),

    /// Out-of-memory class failure (image limits, oversized sources)
    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    /// General I/O error while reading source bytes
    #[error("IO error: {0}")]
    Io(String),

    /// The out-of-process decode channel is gone
    #[error("Decoder channel unavailable")]
    ChannelUnavailable,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DecodeError>;

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                DecodeError::SourceUnavailable(err.to_string())
            }
            io::ErrorKind::OutOfMemory => DecodeError::ResourceExhausted(err.to_string()),
            _ => DecodeError::Io(err.to_string()),
        }
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(e) => DecodeError::ResourceExhausted(e.to_string()),
            image::ImageError::IoError(e) => DecodeError::from(e),
            other => DecodeError::DecodeRuntime(other.to_string()),
        }
    }
}

/// Terminal outcome of a single decode request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecodeOutcome {
    Success,
    SourceUnavailable,
    DecodeRuntimeError,
    ResourceExhausted,
    IoError,
    ChannelUnavailable,
}

impl DecodeOutcome {
    /// All outcomes, in reporting order
    pub const ALL: [DecodeOutcome; 6] = [
        DecodeOutcome::Success,
        DecodeOutcome::SourceUnavailable,
        DecodeOutcome::DecodeRuntimeError,
        DecodeOutcome::ResourceExhausted,
        DecodeOutcome::IoError,
        DecodeOutcome::ChannelUnavailable,
    ];

    pub fn is_success(&self) -> bool {
        matches!(self, DecodeOutcome::Success)
    }

    /// Stable index into per-outcome counter arrays
    pub fn index(&self) -> usize {
        match self {
            DecodeOutcome::Success => 0,
            DecodeOutcome::SourceUnavailable => 1,
            DecodeOutcome::DecodeRuntimeError => 2,
            DecodeOutcome::ResourceExhausted => 3,
            DecodeOutcome::IoError => 4,
            DecodeOutcome::ChannelUnavailable => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DecodeOutcome::Success => "success",
            DecodeOutcome::SourceUnavailable => "source_unavailable",
            DecodeOutcome::DecodeRuntimeError => "decode_error",
            DecodeOutcome::ResourceExhausted => "resource_exhausted",
            DecodeOutcome::IoError => "io_error",
            DecodeOutcome::ChannelUnavailable => "channel_unavailable",
        }
    }
}

impl From<&DecodeError> for DecodeOutcome {
    fn from(err: &DecodeError) -> Self {
        match err {
            DecodeError::SourceUnavailable(_) => DecodeOutcome::SourceUnavailable,
            DecodeError::DecodeRuntime(_) => DecodeOutcome::DecodeRuntimeError,
            DecodeError::ResourceExhausted(_) => DecodeOutcome::ResourceExhausted,
            DecodeError::Io(_) => DecodeOutcome::IoError,
            DecodeError::ChannelUnavailable => DecodeOutcome::ChannelUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            DecodeError::from(missing),
            DecodeError::SourceUnavailable(_)
        ));

        let oom = io::Error::new(io::ErrorKind::OutOfMemory, "oom");
        assert!(matches!(
            DecodeError::from(oom),
            DecodeError::ResourceExhausted(_)
        ));

        let other = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        assert!(matches!(DecodeError::from(other), DecodeError::Io(_)));
    }

    #[test]
    fn test_image_error_mapping() {
        let err = image::ImageError::Limits(image::error::LimitError::from_kind(
            image::error::LimitErrorKind::InsufficientMemory,
        ));
        assert!(matches!(
            DecodeError::from(err),
            DecodeError::ResourceExhausted(_)
        ));

        let garbage = image::load_from_memory(b"definitely not an image").unwrap_err();
        assert!(matches!(
            DecodeError::from(garbage),
            DecodeError::DecodeRuntime(_)
        ));
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            DecodeOutcome::from(&DecodeError::ChannelUnavailable),
            DecodeOutcome::ChannelUnavailable
        );
        assert_eq!(
            DecodeOutcome::from(&DecodeError::Io("x".into())),
            DecodeOutcome::IoError
        );
    }

    #[test]
    fn test_outcome_indices_are_unique() {
        for (i, outcome) in DecodeOutcome::ALL.iter().enumerate() {
            assert_eq!(outcome.index(), i);
        }
        assert!(DecodeOutcome::Success.is_success());
        assert!(!DecodeOutcome::IoError.is_success());
    }
}
