//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.

/// Samples table schema
pub mod samples {
    /// Table name
    pub const TABLE: &str = "samples";
    /// Primary key column
    pub const ID: &str = "id";
    /// Ham/spam label column
    pub const TYPE: &str = "type";
    /// Preset/user origin column
    pub const ORIGIN: &str = "origin";
    /// Sample text column, unique
    pub const MESSAGE: &str = "message";
    /// Last write timestamp column, unix microseconds
    pub const CREATED_AT: &str = "created_at";
}

/// Schema bootstrap script, safe to run repeatedly
pub const CREATE_SAMPLES: &str = include_str!("../migrations/2026-01-10-000000_create_samples/up.sql");
