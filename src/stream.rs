//! Lazy iteration and streaming export over stored samples.
//!
//! Both stream types are a producer on the blocking pool feeding a
//! bounded channel. The producer reads keyset pages and checks a pooled
//! connection out only while a page is fetched, so a stalled consumer
//! never pins a connection.

use std::io;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::Result;
use crate::queries::{self, PageCursor, SampleFilter};

/// Push `item` to the consumer from a blocking thread
///
/// Waits for channel capacity and the cancellation signal together;
/// returns false once the stream should stop.
fn forward<T>(handle: &Handle, tx: &mpsc::Sender<T>, cancel: &CancellationToken, item: T) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    handle.block_on(async {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            sent = tx.send(item) => sent.is_ok(),
        }
    })
}

/// Walk messages matching `filter` newest first until `visit` returns false
fn walk_pages<F>(db: &Database, filter: SampleFilter, page_rows: usize, mut visit: F) -> Result<()>
where
    F: FnMut(String) -> bool,
{
    let mut after: Option<PageCursor> = None;
    loop {
        let page = db.with_connection(|conn| queries::newest_page(conn, filter, after, page_rows))?;
        let full = page.len() >= page_rows;
        let Some(&(last, _)) = page.last() else {
            return Ok(());
        };

        for (_, message) in page {
            if !visit(message) {
                return Ok(());
            }
        }

        if !full {
            return Ok(());
        }
        after = Some(last);
    }
}

/// Forward-only sequence of messages, newest first
///
/// Dropping the iterator or firing the token it was created with stops
/// the worker and returns its connection to the pool.
pub struct SampleIter {
    rx: mpsc::Receiver<Result<String>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl SampleIter {
    pub(crate) fn spawn(
        db: Arc<Database>,
        filter: SampleFilter,
        parent: &CancellationToken,
        buffer: usize,
        page_rows: usize,
    ) -> Self {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(buffer);
        let handle = Handle::current();
        let worker_cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let res = walk_pages(&db, filter, page_rows, |message| {
                forward(&handle, &tx, &worker_cancel, Ok(message))
            });
            if let Err(err) = res {
                warn!(error = %err, ?filter, "Sample iterator worker failed");
                forward(&handle, &tx, &worker_cancel, Err(err));
            }
            debug!(?filter, "Sample iterator worker finished");
        });

        Self {
            rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        }
    }

    /// Next message, or `None` once exhausted or cancelled
    pub async fn next(&mut self) -> Option<Result<String>> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {}
            item = self.rx.recv() => return item,
        }
        self.rx.close();
        None
    }

    /// Drain the remaining messages
    pub async fn try_collect(mut self) -> Result<Vec<String>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await {
            messages.push(message?);
        }
        Ok(messages)
    }
}

struct ReaderShared {
    closed: AtomicBool,
    cancel: CancellationToken,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl ReaderShared {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let permit = self
            .permit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(permit);
        debug!("Sample reader closed");
    }
}

/// Handle that closes a [`SampleReader`] from another task
#[derive(Clone)]
pub struct ReaderCloser {
    shared: Arc<ReaderShared>,
}

impl ReaderCloser {
    /// Close the reader; safe to call any number of times
    pub fn close(&self) {
        self.shared.close();
    }
}

/// Newline-terminated export of messages, newest first
///
/// Holds the store's reader permit until closed or dropped.
pub struct SampleReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
    shared: Arc<ReaderShared>,
}

impl SampleReader {
    pub(crate) fn spawn(
        db: Arc<Database>,
        filter: SampleFilter,
        permit: OwnedSemaphorePermit,
        buffer_chunks: usize,
        chunk_bytes: usize,
        page_rows: usize,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(buffer_chunks);
        let handle = Handle::current();
        let producer_cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let mut buf = Vec::with_capacity(chunk_bytes);
            let mut open = true;
            let res = walk_pages(&db, filter, page_rows, |message| {
                buf.extend_from_slice(message.as_bytes());
                buf.push(b'\n');
                if buf.len() >= chunk_bytes {
                    let full = mem::replace(&mut buf, Vec::with_capacity(chunk_bytes));
                    open = forward(&handle, &tx, &producer_cancel, Ok(full));
                }
                open && !producer_cancel.is_cancelled()
            });
            if res.is_ok() && open && !buf.is_empty() {
                forward(&handle, &tx, &producer_cancel, Ok(buf));
            }
            if let Err(err) = res {
                warn!(error = %err, ?filter, "Sample reader producer failed");
                forward(&handle, &tx, &producer_cancel, Err(io::Error::other(err)));
            }
        });

        debug!(?filter, "Sample reader opened");

        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
            shared: Arc::new(ReaderShared {
                closed: AtomicBool::new(false),
                cancel,
                permit: Mutex::new(Some(permit)),
            }),
        }
    }

    /// Stop the producer and release the reader permit
    ///
    /// Idempotent; later reads fail.
    pub fn close(&self) {
        self.shared.close();
    }

    /// A cloneable handle that can close this reader from elsewhere
    #[must_use]
    pub fn closer(&self) -> ReaderCloser {
        ReaderCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether `close` has run
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl AsyncRead for SampleReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.is_closed() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "sample reader is closed",
                )));
            }

            if this.pos < this.chunk.len() {
                let n = buf.remaining().min(this.chunk.len() - this.pos);
                buf.put_slice(&this.chunk[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(err)) => return Poll::Ready(Err(err)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl Drop for SampleReader {
    fn drop(&mut self) {
        self.shared.close();
    }
}
