pub mod backend;
pub mod codec;
pub mod dedup;
pub mod history;
pub mod memory;
pub mod sqlite;
pub mod supabase;

pub use backend::RemoteBackend;
pub use codec::{decode_log, encode_log};
pub use dedup::{DUPLICATE_WINDOW, dedupe, is_recent_duplicate};
pub use history::{AddOutcome, HistoryStore, LocalHistoryStore, RemoteHistoryStore, StoreMode};
pub use memory::SessionMemory;
pub use sqlite::SqliteBackend;
pub use supabase::SupabaseBackend;
