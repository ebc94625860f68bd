//! Wire format for the persisted history log.
//!
//! The log is stored as a JSON array of `{"role", "content"}` objects. Rows
//! written by earlier deployments use the LangChain message dict shape
//! (`{"type": "human", "data": {"content": ...}}`); those decode too.

use rivalscope_common::{MessageRecord, Result, Role};
use serde::Deserialize;

pub fn encode_log(records: &[MessageRecord]) -> Result<String> {
    Ok(serde_json::to_string(records)?)
}

pub fn decode_log(raw: &str) -> Result<Vec<MessageRecord>> {
    let entries: Vec<StoredEntry> = serde_json::from_str(raw)?;
    Ok(entries.into_iter().map(StoredEntry::into_record).collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Plain {
        role: Role,
        content: String,
    },
    LangChain {
        #[serde(rename = "type")]
        kind: Role,
        data: LangChainData,
    },
}

#[derive(Deserialize)]
struct LangChainData {
    content: String,
}

impl StoredEntry {
    fn into_record(self) -> MessageRecord {
        match self {
            StoredEntry::Plain { role, content } => MessageRecord::new(role, content),
            StoredEntry::LangChain { kind, data } => MessageRecord::new(kind, data.content),
        }
    }
}
