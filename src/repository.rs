use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{SampleOrigin, SampleStats, SampleType};
use crate::stream::{SampleIter, SampleReader};

/// Storage of classifier training samples
///
/// Implementations are shared between tasks and must tolerate arbitrary
/// interleaving of every method.
#[async_trait]
pub trait SampleRepository: Send + Sync {
    /// Insert a sample, or move an existing message to `sample_type`/`origin`
    async fn add(&self, sample_type: SampleType, origin: SampleOrigin, message: &str) -> Result<()>;

    /// Remove the sample with `id`
    async fn delete(&self, id: i64) -> Result<()>;

    /// Remove the sample whose text is exactly `message`
    async fn delete_message(&self, message: &str) -> Result<()>;

    /// Load newline-separated samples from `source`
    ///
    /// With `cleanup` the `(sample_type, origin)` partition is emptied
    /// first. Returns counters for the whole store after the import.
    async fn import(
        &self,
        sample_type: SampleType,
        origin: SampleOrigin,
        source: &mut (dyn AsyncRead + Unpin + Send),
        cleanup: bool,
    ) -> Result<SampleStats>;

    /// All matching messages, in no particular order
    async fn read(&self, sample_type: SampleType, origin: SampleOrigin) -> Result<Vec<String>>;

    /// Lazily yield matching messages, newest first, until `cancel` fires
    async fn iterator(
        &self,
        sample_type: SampleType,
        origin: SampleOrigin,
        cancel: CancellationToken,
    ) -> Result<SampleIter>;

    /// Stream matching messages as newline-terminated bytes, newest first
    ///
    /// Waits while another reader of the same store is open.
    async fn reader(&self, sample_type: SampleType, origin: SampleOrigin) -> Result<SampleReader>;

    /// Counters over the whole store
    async fn stats(&self) -> Result<SampleStats>;
}
