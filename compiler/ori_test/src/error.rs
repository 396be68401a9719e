//! Error types for cache persistence.

use std::path::PathBuf;

/// Errors that can occur while reading or writing the persisted cache.
///
/// Never escapes a run: the orchestrator turns every `CacheError` into a
/// warning and continues with a cold cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is too short or its header could not be decoded.
    #[error("invalid cache header in {path}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    /// The on-disk format version does not match this build.
    #[error("format version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    /// The cache was written by a different tool version.
    #[error("tool version mismatch in {path}: expected {expected}, got {actual}")]
    ToolVersionMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The stored checksum does not match the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error in {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },
}

impl CacheError {
    /// Path of the file the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            CacheError::Io { path, .. }
            | CacheError::InvalidHeader { path, .. }
            | CacheError::VersionMismatch { path, .. }
            | CacheError::ToolVersionMismatch { path, .. }
            | CacheError::ChecksumMismatch { path, .. }
            | CacheError::Serialization { path, .. } => path,
        }
    }
}
