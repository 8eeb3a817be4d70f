use std::fs;
use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// A connection checked out of [`DbPool`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pooled SQLite engine handle shared by store components
///
/// Connections run in WAL mode with a busy timeout, so readers holding
/// an open cursor do not block writers and concurrent writers queue
/// instead of failing.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the database at `path` with default pool settings
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let config = DatabaseConfig {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };
        Self::open(&config)
    }

    /// Create a new database connection pool
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(crate::error::SampleError::Stream)?;
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        info!(path = %path.display(), max_connections = config.max_connections, "Database opened");

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` with a pooled connection in autocommit mode
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.get_connection()?;
        f(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction, committing on success
    ///
    /// The write lock is taken up front so the transaction never has to
    /// upgrade from a read lock; returning an error rolls everything back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Current pool occupancy
    #[must_use]
    pub fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("state", &self.pool.state()).finish()
    }
}
