//! Spam Samples - Training Sample Storage
//!
//! A Rust library that keeps the ham/spam training lines of a spam
//! classifier in SQLite.
//!
//! # Features
//!
//! - Unique message text across the store, re-adding moves a message
//! - Bulk import of newline-separated text with optional partition reset
//! - Cancellable newest-first iteration and a byte-stream export
//! - Per type/origin counters

/// Write timestamps for recency ordering
pub mod clock;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// SQL against the samples table
pub mod queries;
/// Repository pattern for data access
pub mod repository;
/// The samples store
pub mod samples;
/// Database schema definitions
pub mod schema;
/// Iterator and reader over stored samples
pub mod stream;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use config::{AppConfig, SamplesConfig};
pub use db::Database;
pub use error::{Result, SampleError};
pub use models::{Sample, SampleOrigin, SampleStats, SampleType};
pub use repository::SampleRepository;
pub use samples::Samples;
pub use stream::{ReaderCloser, SampleIter, SampleReader};
pub use tokio_util::sync::CancellationToken;
