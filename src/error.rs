//! Error types for regionstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RegionError
pub type Result<T> = std::result::Result<T, RegionError>;

/// Unified error type for regionstore operations
#[derive(Debug, Error)]
pub enum RegionError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Disk or filesystem failure. Never suppressed by lenient mode.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    /// The region file (or one of its cells) does not follow the on-disk layout.
    /// Only raised when the file was opened strictly.
    #[error("Malformed region file: {0}")]
    Malformed(String),

    // -------------------------------------------------------------------------
    // Compression Errors
    // -------------------------------------------------------------------------
    #[error("Unknown compression id: {0}")]
    UnknownCompression(u8),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegionError {
    /// Whether this error reports a malformed region file
    pub fn is_malformed(&self) -> bool {
        matches!(self, RegionError::Malformed(_))
    }
}
