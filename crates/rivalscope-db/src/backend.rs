use async_trait::async_trait;
use rivalscope_common::Result;

/// Durable table holding one serialized history log per session.
///
/// Implementations report every failure as an error; the history store
/// decides how to degrade.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short identifier used in logs and status output.
    fn backend_id(&self) -> &str;

    /// Cheap connectivity check run once at startup.
    async fn probe(&self) -> Result<()>;

    /// Serialized log for `session_id`, or `None` when no row exists.
    async fn select(&self, session_id: &str) -> Result<Option<String>>;

    /// Update the row for `session_id` if present, insert it otherwise.
    async fn upsert(&self, session_id: &str, serialized_log: &str) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;
}
