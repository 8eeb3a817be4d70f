//! Error types for the spam-samples library.
//!
//! Every store operation returns [`SampleError`]. The variants fall into the
//! groups callers usually branch on: validation, missing rows, oversized
//! import lines, storage failures and stream failures.

use thiserror::Error;

use crate::models::SampleOrigin;

/// Errors that can occur while working with the samples store.
#[derive(Error, Debug)]
pub enum SampleError {
    /// A type or origin literal outside the enumerated set
    #[error("invalid {kind}: {value:?}")]
    InvalidValue {
        /// Which enumeration was being parsed
        kind: &'static str,
        /// The rejected literal
        value: String,
    },

    /// An origin that cannot be stored (only `preset` and `user` can)
    #[error("origin {0} is not allowed for stored samples")]
    InvalidOrigin(SampleOrigin),

    /// Message is empty or whitespace only
    #[error("sample message cannot be empty")]
    EmptyMessage,

    /// Store settings that cannot work, such as a zero-sized buffer
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Delete target does not exist
    #[error("sample not found: {0}")]
    NotFound(String),

    /// Import line exceeded the per-line size cap
    #[error("line {line} exceeds the maximum length of {max} bytes")]
    LineTooLong {
        /// 1-based line number in the import source
        line: usize,
        /// Configured cap, terminator included
        max: usize,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Reading the import source failed
    #[error("Stream error: {0}")]
    Stream(#[source] std::io::Error),
}

impl SampleError {
    /// True for bad enum literals, `any` on write paths, empty messages and bad settings.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue { .. }
                | Self::InvalidOrigin(_)
                | Self::EmptyMessage
                | Self::InvalidConfig(_)
        )
    }

    /// True when a delete target was absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for failures of the underlying engine or its connection pool.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Pool(_) | Self::Task(_))
    }
}

/// Convenience type alias for Result with `SampleError`
pub type Result<T> = std::result::Result<T, SampleError>;
