use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, PollError};
use crate::types::{ListedOffset, Record};

/// The slice of a messaging-cluster client the retrieval engine needs.
///
/// One instance serves one command invocation: it is subscribed at most once,
/// polled from a single task, and closed exactly once when the engine is done
/// with it. `close` may be called from another task while a `poll` is
/// blocked; the blocked poll must then return `PollError::Closed`.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Current end offset of every partition of `topic`.
    async fn list_end_offsets(&self, topic: &str) -> Result<Vec<ListedOffset>, ClientError>;

    /// Earliest offset still available on every partition of `topic`.
    async fn list_start_offsets(&self, topic: &str) -> Result<Vec<ListedOffset>, ClientError>;

    /// Store `offsets` (partition, offset) as the committed position of `group`.
    async fn commit_offsets(
        &self,
        group: &str,
        topic: &str,
        offsets: &[(i32, i64)],
    ) -> Result<(), ClientError>;

    async fn subscribe(&self, topic: &str) -> Result<(), ClientError>;

    /// Wait for the next batch of records. Returns `PollError::Cancelled` as
    /// soon as `cancel` fires.
    async fn poll(&self, cancel: &CancellationToken) -> Result<Vec<Record>, PollError>;

    fn close(&self);
}
