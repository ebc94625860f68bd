use std::path::PathBuf;
use std::sync::Arc;

use rivalscope_common::{Error, MessageRecord, Result};
use rivalscope_config::{ConfigLoader, MemoryBackendKind, MemoryConfig};
use tracing::{info, warn};

use crate::backend::RemoteBackend;
use crate::history::{AddOutcome, HistoryStore, LocalHistoryStore, RemoteHistoryStore, StoreMode};
use crate::sqlite::SqliteBackend;
use crate::supabase::SupabaseBackend;

/// Conversation memory for the process-wide session.
///
/// Picks the concrete store once, at construction. Callers never learn
/// whether the log lives remotely or only in this process.
#[derive(Clone)]
pub struct SessionMemory {
    store: Arc<dyn HistoryStore>,
    session_id: String,
}

impl SessionMemory {
    pub fn new(store: Arc<dyn HistoryStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    /// Memory that never leaves the process.
    pub fn local(session_id: impl Into<String>) -> Self {
        Self::new(Arc::new(LocalHistoryStore::new()), session_id)
    }

    /// Build the configured backend and fall back to local memory if it
    /// cannot be constructed or reached.
    pub async fn connect(config: &MemoryConfig) -> Self {
        match build_backend(config) {
            Ok(Some(backend)) => Self::with_backend(backend, &config.session_id).await,
            Ok(None) => {
                info!("remote history disabled, using in-process memory");
                Self::local(&config.session_id)
            }
            Err(e) => {
                warn!("failed to set up remote history ({e}); using in-process memory");
                Self::local(&config.session_id)
            }
        }
    }

    /// Probe `backend` once; use it if reachable, otherwise go local-only.
    pub async fn with_backend(backend: Arc<dyn RemoteBackend>, session_id: &str) -> Self {
        match backend.probe().await {
            Ok(()) => {
                info!(backend = backend.backend_id(), "connected to remote history");
                Self::new(
                    Arc::new(RemoteHistoryStore::new(backend, session_id)),
                    session_id,
                )
            }
            Err(e) => {
                warn!(
                    backend = backend.backend_id(),
                    "remote history unreachable at startup ({e}); using in-process memory"
                );
                Self::local(session_id)
            }
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> StoreMode {
        self.store.mode()
    }

    pub async fn get_messages(&self) -> Vec<MessageRecord> {
        self.store.get_messages().await
    }

    pub async fn add_message(&self, record: MessageRecord) -> AddOutcome {
        self.store.add_message(record).await
    }

    pub async fn clear(&self) {
        self.store.clear().await
    }

    /// Drop repeated `(role, content)` pairs from the whole log and write the
    /// result back. Returns how many records were removed.
    pub async fn dedupe(&self) -> usize {
        let removed = self.store.dedupe().await;
        if removed > 0 {
            info!(removed, "cleaned duplicate messages");
        }
        removed
    }
}

fn build_backend(config: &MemoryConfig) -> Result<Option<Arc<dyn RemoteBackend>>> {
    match config.backend {
        MemoryBackendKind::Local => Ok(None),
        MemoryBackendKind::Supabase => {
            let url = config
                .supabase_url
                .as_deref()
                .ok_or_else(|| Error::Config("SUPABASE_URL is not set".into()))?;
            let key = config
                .supabase_key
                .as_deref()
                .ok_or_else(|| Error::Config("SUPABASE_SERVICE_ROLE_KEY is not set".into()))?;
            Ok(Some(Arc::new(SupabaseBackend::new(url, key, &config.table))))
        }
        MemoryBackendKind::Sqlite => {
            let path = config
                .sqlite_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| ConfigLoader::default_config_dir().join("history.db"));
            Ok(Some(Arc::new(SqliteBackend::open(&path)?)))
        }
    }
}
