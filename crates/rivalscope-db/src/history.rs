use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rivalscope_common::{Error, MessageRecord};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::RemoteBackend;
use crate::codec::{decode_log, encode_log};
use crate::dedup::{dedupe, is_recent_duplicate};

/// Which copy of the log a store is serving from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Remote backend reachable and authoritative.
    Connected,
    /// Remote backend failed after startup; the mirror is authoritative.
    Degraded,
    /// No remote backend was available at startup.
    LocalOnly,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Connected => "connected",
            StoreMode::Degraded => "degraded",
            StoreMode::LocalOnly => "local_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Appended,
    /// The record matched one of the trailing entries and was dropped.
    SkippedDuplicate,
}

/// Ordered, append-only chat log for a single session.
///
/// None of these operations fail: backend problems are logged and the store
/// keeps serving from its in-process mirror.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get_messages(&self) -> Vec<MessageRecord>;

    async fn add_message(&self, record: MessageRecord) -> AddOutcome;

    async fn clear(&self);

    /// Overwrite the whole log.
    async fn replace(&self, records: Vec<MessageRecord>);

    /// Drop repeated records from the whole log in one locked step and write
    /// the result back. Returns how many records were removed.
    async fn dedupe(&self) -> usize;

    fn mode(&self) -> StoreMode;
}

/// Store with no remote side at all.
#[derive(Default)]
pub struct LocalHistoryStore {
    mirror: Mutex<Vec<MessageRecord>>,
}

impl LocalHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for LocalHistoryStore {
    async fn get_messages(&self) -> Vec<MessageRecord> {
        self.mirror.lock().await.clone()
    }

    async fn add_message(&self, record: MessageRecord) -> AddOutcome {
        let mut mirror = self.mirror.lock().await;
        if is_recent_duplicate(&mirror, &record) {
            info!(role = %record.role, "skipping duplicate message");
            return AddOutcome::SkippedDuplicate;
        }
        debug!(role = %record.role, "adding message to local history");
        mirror.push(record);
        AddOutcome::Appended
    }

    async fn clear(&self) {
        self.mirror.lock().await.clear();
    }

    async fn replace(&self, records: Vec<MessageRecord>) {
        *self.mirror.lock().await = records;
    }

    async fn dedupe(&self) -> usize {
        let mut mirror = self.mirror.lock().await;
        let unique = dedupe(&mirror);
        let removed = mirror.len() - unique.len();
        if removed > 0 {
            *mirror = unique;
        }
        removed
    }

    fn mode(&self) -> StoreMode {
        StoreMode::LocalOnly
    }
}

/// Store backed by a remote table, with an in-process mirror.
///
/// Starts connected. The first failed backend call latches it into
/// [`StoreMode::Degraded`], after which the backend is never contacted again.
pub struct RemoteHistoryStore {
    backend: Arc<dyn RemoteBackend>,
    session_id: String,
    mirror: Mutex<Vec<MessageRecord>>,
    degraded: AtomicBool,
}

impl RemoteHistoryStore {
    pub fn new(backend: Arc<dyn RemoteBackend>, session_id: impl Into<String>) -> Self {
        Self {
            backend,
            session_id: session_id.into(),
            mirror: Mutex::new(Vec::new()),
            degraded: AtomicBool::new(false),
        }
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn degrade(&self, operation: &str, error: &Error) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                backend = self.backend.backend_id(),
                operation,
                "remote history unavailable ({error}); serving from local mirror for the rest of this process"
            );
        } else {
            debug!(operation, "remote history already degraded: {error}");
        }
    }

    /// Reload the mirror from the backend. Callers hold the mirror lock.
    async fn refresh(&self, mirror: &mut Vec<MessageRecord>) {
        match self.backend.select(&self.session_id).await {
            Ok(Some(raw)) => match decode_log(&raw) {
                Ok(records) => {
                    debug!(count = records.len(), "loaded history from remote");
                    *mirror = records;
                }
                Err(e) => {
                    warn!(
                        session_id = %self.session_id,
                        "stored history is unreadable, treating it as empty; \
                         the next write will replace the unreadable row: {e}"
                    );
                    mirror.clear();
                }
            },
            Ok(None) => {
                debug!(session_id = %self.session_id, "no stored history");
                mirror.clear();
            }
            Err(e) => self.degrade("select", &e),
        }
    }

    async fn persist(&self, records: &[MessageRecord]) {
        let serialized = match encode_log(records) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!("failed to serialize history, keeping it local only: {e}");
                return;
            }
        };
        match self.backend.upsert(&self.session_id, &serialized).await {
            Ok(()) => debug!(count = records.len(), "stored history remotely"),
            Err(e) => self.degrade("upsert", &e),
        }
    }
}

#[async_trait]
impl HistoryStore for RemoteHistoryStore {
    async fn get_messages(&self) -> Vec<MessageRecord> {
        let mut mirror = self.mirror.lock().await;
        if !self.is_degraded() {
            self.refresh(&mut mirror).await;
        }
        mirror.clone()
    }

    async fn add_message(&self, record: MessageRecord) -> AddOutcome {
        let mut mirror = self.mirror.lock().await;
        if !self.is_degraded() {
            self.refresh(&mut mirror).await;
        }

        if is_recent_duplicate(&mirror, &record) {
            info!(role = %record.role, "skipping duplicate message");
            return AddOutcome::SkippedDuplicate;
        }

        debug!(role = %record.role, "adding message to history");
        mirror.push(record);

        if !self.is_degraded() {
            self.persist(&mirror).await;
        }
        AddOutcome::Appended
    }

    async fn clear(&self) {
        let mut mirror = self.mirror.lock().await;
        if !self.is_degraded() {
            match self.backend.delete(&self.session_id).await {
                Ok(()) => info!(session_id = %self.session_id, "cleared remote history"),
                Err(e) => self.degrade("delete", &e),
            }
        }
        mirror.clear();
    }

    async fn replace(&self, records: Vec<MessageRecord>) {
        let mut mirror = self.mirror.lock().await;
        *mirror = records;
        if !self.is_degraded() {
            self.persist(&mirror).await;
        }
    }

    async fn dedupe(&self) -> usize {
        let mut mirror = self.mirror.lock().await;
        if !self.is_degraded() {
            self.refresh(&mut mirror).await;
        }

        let unique = dedupe(&mirror);
        let removed = mirror.len() - unique.len();
        if removed > 0 {
            *mirror = unique;
            if !self.is_degraded() {
                self.persist(&mirror).await;
            }
        }
        removed
    }

    fn mode(&self) -> StoreMode {
        if self.is_degraded() {
            StoreMode::Degraded
        } else {
            StoreMode::Connected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteBackend;
    use rivalscope_common::Result;
    use std::sync::atomic::AtomicUsize;

    /// Backend whose calls can be switched to fail at any point.
    #[derive(Default)]
    struct FlakyBackend {
        inner: Option<Arc<SqliteBackend>>,
        failing: AtomicBool,
        calls: AtomicUsize,
        raw_override: std::sync::Mutex<Option<String>>,
    }

    impl FlakyBackend {
        fn healthy() -> Self {
            Self {
                inner: Some(Arc::new(SqliteBackend::in_memory().unwrap())),
                ..Default::default()
            }
        }

        fn fail_from_now_on(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> Result<&SqliteBackend> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Backend("connection refused".into()));
            }
            Ok(self.inner.as_deref().expect("healthy backend"))
        }
    }

    #[async_trait]
    impl RemoteBackend for FlakyBackend {
        fn backend_id(&self) -> &str {
            "flaky"
        }

        async fn probe(&self) -> Result<()> {
            self.check()?.probe().await
        }

        async fn select(&self, session_id: &str) -> Result<Option<String>> {
            let backend = self.check()?;
            if let Some(raw) = self.raw_override.lock().unwrap().clone() {
                return Ok(Some(raw));
            }
            backend.select(session_id).await
        }

        async fn upsert(&self, session_id: &str, serialized_log: &str) -> Result<()> {
            self.check()?.upsert(session_id, serialized_log).await
        }

        async fn delete(&self, session_id: &str) -> Result<()> {
            self.check()?.delete(session_id).await
        }
    }

    fn remote_store() -> (Arc<FlakyBackend>, RemoteHistoryStore) {
        let backend = Arc::new(FlakyBackend::healthy());
        let store = RemoteHistoryStore::new(backend.clone(), "temp_session");
        (backend, store)
    }

    #[tokio::test]
    async fn local_store_appends_in_order() {
        let store = LocalHistoryStore::new();
        store.add_message(MessageRecord::human("What is X?")).await;
        store.add_message(MessageRecord::ai("X is a company.")).await;
        assert_eq!(
            store.get_messages().await,
            vec![
                MessageRecord::human("What is X?"),
                MessageRecord::ai("X is a company."),
            ]
        );
        assert_eq!(store.mode(), StoreMode::LocalOnly);
    }

    #[tokio::test]
    async fn local_store_skips_recent_duplicate() {
        let store = LocalHistoryStore::new();
        assert_eq!(
            store.add_message(MessageRecord::human("hi")).await,
            AddOutcome::Appended
        );
        assert_eq!(
            store.add_message(MessageRecord::human("hi")).await,
            AddOutcome::SkippedDuplicate
        );
        assert_eq!(store.get_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_outside_window_is_kept() {
        let store = LocalHistoryStore::new();
        store.add_message(MessageRecord::human("hi")).await;
        store.add_message(MessageRecord::ai("hello")).await;
        store.add_message(MessageRecord::human("more")).await;
        assert_eq!(
            store.add_message(MessageRecord::human("hi")).await,
            AddOutcome::Appended
        );
        assert_eq!(store.get_messages().await.len(), 4);
    }

    #[tokio::test]
    async fn remote_store_writes_through_to_backend() {
        let (backend, store) = remote_store();
        store.add_message(MessageRecord::human("What is X?")).await;
        store.add_message(MessageRecord::ai("X is a company.")).await;

        let raw = backend
            .inner
            .as_ref()
            .unwrap()
            .select("temp_session")
            .await
            .unwrap()
            .expect("row should exist");
        assert_eq!(decode_log(&raw).unwrap().len(), 2);
        assert_eq!(store.mode(), StoreMode::Connected);
    }

    #[tokio::test]
    async fn remote_store_reads_rows_written_elsewhere() {
        let (backend, store) = remote_store();
        let raw = encode_log(&[MessageRecord::human("from another worker")]).unwrap();
        backend
            .inner
            .as_ref()
            .unwrap()
            .upsert("temp_session", &raw)
            .await
            .unwrap();

        assert_eq!(
            store.get_messages().await,
            vec![MessageRecord::human("from another worker")]
        );
    }

    #[tokio::test]
    async fn failed_upsert_keeps_record_in_mirror() {
        let (backend, store) = remote_store();
        store.add_message(MessageRecord::human("first")).await;
        backend.fail_from_now_on();

        assert_eq!(
            store.add_message(MessageRecord::ai("second")).await,
            AddOutcome::Appended
        );
        assert_eq!(store.mode(), StoreMode::Degraded);
        assert_eq!(
            store.get_messages().await,
            vec![MessageRecord::human("first"), MessageRecord::ai("second")]
        );
    }

    #[tokio::test]
    async fn degraded_store_stops_calling_backend() {
        let (backend, store) = remote_store();
        backend.fail_from_now_on();
        store.get_messages().await;
        assert_eq!(store.mode(), StoreMode::Degraded);

        let calls = backend.calls.load(Ordering::SeqCst);
        store.add_message(MessageRecord::human("a")).await;
        store.get_messages().await;
        store.clear().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn degradation_does_not_recover() {
        let (backend, store) = remote_store();
        backend.fail_from_now_on();
        store.get_messages().await;
        backend.failing.store(false, Ordering::SeqCst);

        store.add_message(MessageRecord::human("after outage")).await;
        assert_eq!(store.mode(), StoreMode::Degraded);
        assert!(
            backend
                .inner
                .as_ref()
                .unwrap()
                .select("temp_session")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn clear_empties_mirror_even_when_delete_fails() {
        let (backend, store) = remote_store();
        store.add_message(MessageRecord::human("one")).await;
        store.add_message(MessageRecord::ai("two")).await;
        backend.fail_from_now_on();

        store.clear().await;
        assert!(store.get_messages().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_remote_log_reads_as_empty() {
        let (backend, store) = remote_store();
        *backend.raw_override.lock().unwrap() = Some("{not json".to_string());

        assert!(store.get_messages().await.is_empty());
        assert_eq!(store.mode(), StoreMode::Connected);
    }

    #[tokio::test]
    async fn write_after_malformed_log_replaces_row() {
        let (backend, store) = remote_store();
        *backend.raw_override.lock().unwrap() = Some("{not json".to_string());

        store.add_message(MessageRecord::human("fresh start")).await;

        let raw = backend
            .inner
            .as_ref()
            .unwrap()
            .select("temp_session")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            decode_log(&raw).unwrap(),
            vec![MessageRecord::human("fresh start")]
        );
        assert_eq!(store.mode(), StoreMode::Connected);
    }

    #[tokio::test]
    async fn remote_dedupe_rewrites_backend_row() {
        let (backend, store) = remote_store();
        let raw = encode_log(&[
            MessageRecord::human("q"),
            MessageRecord::ai("a"),
            MessageRecord::human("q"),
        ])
        .unwrap();
        backend
            .inner
            .as_ref()
            .unwrap()
            .upsert("temp_session", &raw)
            .await
            .unwrap();

        assert_eq!(store.dedupe().await, 1);
        assert_eq!(store.dedupe().await, 0);
        let raw = backend
            .inner
            .as_ref()
            .unwrap()
            .select("temp_session")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            decode_log(&raw).unwrap(),
            vec![MessageRecord::human("q"), MessageRecord::ai("a")]
        );
    }

    #[tokio::test]
    async fn replace_persists_new_log() {
        let (backend, store) = remote_store();
        store.add_message(MessageRecord::human("a")).await;
        store
            .replace(vec![MessageRecord::human("b"), MessageRecord::ai("c")])
            .await;

        let raw = backend
            .inner
            .as_ref()
            .unwrap()
            .select("temp_session")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            decode_log(&raw).unwrap(),
            vec![MessageRecord::human("b"), MessageRecord::ai("c")]
        );
    }
}
