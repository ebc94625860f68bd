use std::collections::HashSet;

use rivalscope_common::MessageRecord;

/// How many trailing records a write is compared against.
pub const DUPLICATE_WINDOW: usize = 2;

/// Keep only the first occurrence of each `(role, content)` pair, in order.
pub fn dedupe(records: &[MessageRecord]) -> Vec<MessageRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| seen.insert(*record))
        .cloned()
        .collect()
}

/// True when `candidate` already appears in the last `DUPLICATE_WINDOW` records of `log`.
pub fn is_recent_duplicate(log: &[MessageRecord], candidate: &MessageRecord) -> bool {
    let start = log.len().saturating_sub(DUPLICATE_WINDOW);
    log[start..].iter().any(|existing| existing == candidate)
}
