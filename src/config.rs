use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SampleError;

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage engine settings
    pub database: DatabaseConfig,
    /// Log output settings
    pub logging: LoggingConfig,
    /// Samples store tuning
    pub samples: SamplesConfig,
}

/// Connection pool and SQLite settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file
    pub path: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long to wait for a pooled connection
    pub connection_timeout_secs: u64,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Optional log file; its directory receives daily-rotated files
    pub file_path: Option<String>,
    /// Console format, "text" or "json"
    pub format: String,
}

/// Samples store tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesConfig {
    /// Import line cap in bytes, terminator included
    pub max_line_bytes: usize,
    /// Lines applied per import transaction
    pub import_batch_size: usize,
    /// Messages buffered between the iterator worker and its consumer
    pub iterator_buffer: usize,
    /// Chunks buffered between the reader producer and its consumer
    pub reader_buffer_chunks: usize,
    /// Target size of one reader chunk
    pub reader_chunk_bytes: usize,
    /// Rows fetched per connection checkout by the iterator and reader
    pub stream_page_rows: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/samples.db".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        }
    }
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
            import_batch_size: 500,
            iterator_buffer: 64,
            reader_buffer_chunks: 4,
            reader_chunk_bytes: 32 * 1024,
            stream_page_rows: 256,
        }
    }
}

impl SamplesConfig {
    /// Reject settings the store cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |reason: &str| Err(SampleError::InvalidConfig(reason.to_string()));

        if self.max_line_bytes < 2 {
            return invalid("max_line_bytes must be at least 2");
        }
        if self.import_batch_size == 0 {
            return invalid("import_batch_size must be greater than 0");
        }
        if self.iterator_buffer == 0 || self.reader_buffer_chunks == 0 {
            return invalid("stream buffers must be greater than 0");
        }
        if self.reader_chunk_bytes == 0 {
            return invalid("reader_chunk_bytes must be greater than 0");
        }
        if self.stream_page_rows == 0 {
            return invalid("stream_page_rows must be greater than 0");
        }

        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));
        Self::finish(builder)
    }

    /// Load configuration from an explicit file on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path));
        Self::finish(builder)
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config = builder
            // e.g. SPAM_SAMPLES__DATABASE__PATH
            .add_source(Environment::with_prefix("SPAM_SAMPLES").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(anyhow::anyhow!("database path cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        self.samples.validate()?;

        Ok(())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}
