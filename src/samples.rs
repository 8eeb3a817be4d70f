//! The samples store.
//!
//! [`Samples`] keeps ham/spam training lines in a single SQLite table where
//! the message text is unique across the whole store. Writing a message
//! that already exists moves it to the new type/origin and refreshes its
//! timestamp instead of adding a row.

use std::future::Future;
use std::io;
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::RecencyClock;
use crate::config::SamplesConfig;
use crate::db::Database;
use crate::error::{Result, SampleError};
use crate::logging::OperationTimer;
use crate::metrics;
use crate::models::{Sample, SampleOrigin, SampleStats, SampleType};
use crate::queries::{self, SampleFilter};
use crate::repository::SampleRepository;
use crate::stream::{SampleIter, SampleReader};
use crate::validation::InputValidator;

/// Shared handle to the samples store
///
/// Clones share the connection pool, the recency clock and the reader
/// permit.
#[derive(Debug, Clone)]
pub struct Samples {
    db: Arc<Database>,
    clock: Arc<RecencyClock>,
    reader_gate: Arc<Semaphore>,
    config: SamplesConfig,
}

impl Samples {
    /// Create the store over `db` with default tuning, creating the schema if needed
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        Self::with_config(db, SamplesConfig::default()).await
    }

    /// Create the store over `db`, creating the schema if needed
    ///
    /// Fails with [`SampleError::InvalidConfig`] before touching storage
    /// when `config` cannot work.
    pub async fn with_config(db: Arc<Database>, config: SamplesConfig) -> Result<Self> {
        config.validate()?;

        let bootstrap_db = Arc::clone(&db);
        let latest = tokio::task::spawn_blocking(move || {
            bootstrap_db.with_transaction(|tx| {
                queries::bootstrap(tx)?;
                queries::latest_created_at(tx)
            })
        })
        .await??;

        debug!(latest_created_at = latest, "Samples schema ready");

        Ok(Self {
            db,
            clock: Arc::new(RecencyClock::starting_after(latest)),
            reader_gate: Arc::new(Semaphore::new(1)),
            config,
        })
    }

    /// Look up the stored sample whose text is exactly `message`
    pub async fn find(&self, message: &str) -> Result<Option<Sample>> {
        let message = message.to_owned();
        timed(
            "find",
            self.blocking(move |db| db.with_connection(|conn| queries::find_by_message(conn, &message))),
        )
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Upsert one batch of import lines in a single transaction
    async fn apply_batch(&self, sample_type: SampleType, origin: SampleOrigin, batch: Vec<String>) -> Result<usize> {
        let clock = Arc::clone(&self.clock);
        self.blocking(move |db| {
            db.with_transaction(|tx| {
                for message in &batch {
                    queries::upsert(tx, sample_type, origin, message, clock.next_micros())?;
                }
                Ok(batch.len())
            })
        })
        .await
    }

    async fn import_lines(
        &self,
        sample_type: SampleType,
        origin: SampleOrigin,
        source: &mut (dyn AsyncRead + Unpin + Send),
        cleanup: bool,
    ) -> Result<SampleStats> {
        if cleanup {
            let removed = self
                .blocking(move |db| {
                    db.with_connection(|conn| queries::delete_partition(conn, sample_type, origin))
                })
                .await?;
            debug!(%sample_type, %origin, removed, "Partition cleared before import");
        }

        let max = self.config.max_line_bytes;
        let batch_size = self.config.import_batch_size;
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        let mut batch = Vec::with_capacity(batch_size);
        let mut lines = 0;
        let mut applied = 0;

        let outcome: Result<()> = async {
            while let Some(line) = read_line(&mut reader, &mut buf, max, lines + 1).await? {
                lines += 1;
                if let Some(message) = InputValidator::normalize_line(&line) {
                    batch.push(message.to_owned());
                }
                if batch.len() >= batch_size {
                    applied += self
                        .apply_batch(sample_type, origin, mem::take(&mut batch))
                        .await?;
                }
            }
            Ok(())
        }
        .await;

        // lines read before a failure are kept
        let flushed = if batch.is_empty() {
            Ok(0)
        } else {
            self.apply_batch(sample_type, origin, batch).await
        };

        if let Err(err) = outcome {
            match flushed {
                Ok(n) => warn!(
                    %sample_type, %origin, applied = applied + n, error = %err,
                    "Import aborted, earlier lines kept"
                ),
                Err(flush_err) => warn!(
                    %sample_type, %origin, applied, error = %err, flush_error = %flush_err,
                    "Import aborted and pending lines were not applied"
                ),
            }
            return Err(err);
        }
        applied += flushed?;

        metrics::record_import(applied);
        info!(%sample_type, %origin, lines, applied, cleanup, "Import finished");

        self.stats().await
    }
}

/// Read one line through a `max`-byte window
///
/// Returns `None` at end of input.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize, line: usize) -> Result<Option<String>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = u64::try_from(max).unwrap_or(u64::MAX);
    let read = reader
        .take(limit)
        .read_until(b'\n', buf)
        .await
        .map_err(SampleError::Stream)?;
    if read == 0 {
        return Ok(None);
    }

    InputValidator::validate_line_length(buf, max, line)?;

    let text = std::str::from_utf8(buf).map_err(|e| {
        SampleError::Stream(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line {line} is not valid UTF-8: {e}"),
        ))
    })?;
    Ok(Some(text.to_owned()))
}

async fn timed<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timer = OperationTimer::new(operation);
    let res = fut.await;
    timer.finish(res.is_ok());
    res
}

#[async_trait]
impl SampleRepository for Samples {
    async fn add(&self, sample_type: SampleType, origin: SampleOrigin, message: &str) -> Result<()> {
        InputValidator::validate_storage_origin(origin)?;
        InputValidator::validate_message(message)?;

        let message = message.to_owned();
        let clock = Arc::clone(&self.clock);
        timed(
            "add",
            self.blocking(move |db| {
                db.with_connection(|conn| {
                    queries::upsert(conn, sample_type, origin, &message, clock.next_micros())
                })
            }),
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        timed(
            "delete",
            self.blocking(move |db| {
                db.with_connection(|conn| match queries::delete_by_id(conn, id)? {
                    0 => Err(SampleError::NotFound(format!("id {id}"))),
                    _ => Ok(()),
                })
            }),
        )
        .await
    }

    async fn delete_message(&self, message: &str) -> Result<()> {
        InputValidator::validate_message(message)?;

        let message = message.to_owned();
        timed(
            "delete_message",
            self.blocking(move |db| {
                db.with_connection(|conn| match queries::delete_by_message(conn, &message)? {
                    0 => Err(SampleError::NotFound(format!("message {message:?}"))),
                    _ => Ok(()),
                })
            }),
        )
        .await
    }

    async fn import(
        &self,
        sample_type: SampleType,
        origin: SampleOrigin,
        source: &mut (dyn AsyncRead + Unpin + Send),
        cleanup: bool,
    ) -> Result<SampleStats> {
        InputValidator::validate_storage_origin(origin)?;
        timed("import", self.import_lines(sample_type, origin, source, cleanup)).await
    }

    async fn read(&self, sample_type: SampleType, origin: SampleOrigin) -> Result<Vec<String>> {
        let filter = SampleFilter { sample_type, origin };
        timed(
            "read",
            self.blocking(move |db| db.with_connection(|conn| queries::select_messages(conn, filter))),
        )
        .await
    }

    async fn iterator(
        &self,
        sample_type: SampleType,
        origin: SampleOrigin,
        cancel: CancellationToken,
    ) -> Result<SampleIter> {
        let filter = SampleFilter { sample_type, origin };
        timed("iterator", async {
            Ok(SampleIter::spawn(
                Arc::clone(&self.db),
                filter,
                &cancel,
                self.config.iterator_buffer,
                self.config.stream_page_rows,
            ))
        })
        .await
    }

    async fn reader(&self, sample_type: SampleType, origin: SampleOrigin) -> Result<SampleReader> {
        let filter = SampleFilter { sample_type, origin };
        timed("reader", async {
            let permit = Arc::clone(&self.reader_gate)
                .acquire_owned()
                .await
                .map_err(|e| SampleError::Stream(io::Error::other(e)))?;

            Ok(SampleReader::spawn(
                Arc::clone(&self.db),
                filter,
                permit,
                self.config.reader_buffer_chunks,
                self.config.reader_chunk_bytes,
                self.config.stream_page_rows,
            ))
        })
        .await
    }

    async fn stats(&self) -> Result<SampleStats> {
        timed("stats", self.blocking(|db| db.with_connection(queries::stats))).await
    }
}
