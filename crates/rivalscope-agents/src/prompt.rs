//! Prompt assembly from the stored conversation.

use rivalscope_common::{MessageRecord, Role};

use crate::providers::{ChatMessage, ChatRole};

pub const ADVISOR_PROMPT: &str = "You are a Competitive Intelligence Advisor. Help the user \
analyze competitors, market trends, and company news.";

const SUMMARY_ENTRY_CHARS: usize = 100;

const RECALL_QUERIES: [&str; 3] = [
    "what was my last question",
    "what was my last question?",
    "what did i ask last",
];

/// System prompt for a turn. With prior history the persona is told to use
/// the recent exchanges it is given.
pub fn build_system_prompt(base: &str, history: &[MessageRecord], max_exchanges: usize) -> String {
    if history.iter().all(MessageRecord::is_blank) {
        return base.to_string();
    }

    let summary = conversation_summary(history, max_exchanges);
    format!(
        "{base}\n\n\
         You maintain conversation context.\n\n\
         CHAT HISTORY SUMMARY:\n{summary}\n\n\
         When the user asks about previous questions or earlier parts of the conversation, \
         use the chat history above to answer. If asked what their last question was, reply \
         with the last question they asked according to the history."
    )
}

/// Readable digest of the last `max_exchanges` question/answer pairs.
pub fn conversation_summary(history: &[MessageRecord], max_exchanges: usize) -> String {
    let non_blank: Vec<&MessageRecord> = history.iter().filter(|r| !r.is_blank()).collect();
    if non_blank.is_empty() {
        return "No previous conversation history.".to_string();
    }

    let start = non_blank.len().saturating_sub(max_exchanges * 2);
    non_blank[start..]
        .iter()
        .map(|record| {
            let prefix = match record.role {
                Role::Human => "User asked: ",
                Role::Ai => "AI answered: ",
            };
            format!("{prefix}{}", truncate(&record.content, SUMMARY_ENTRY_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Most recent human message other than `current_query`.
pub fn last_user_question<'a>(history: &'a [MessageRecord], current_query: &str) -> Option<&'a str> {
    history
        .iter()
        .rev()
        .find(|r| r.role == Role::Human && r.content != current_query)
        .map(|r| r.content.as_str())
}

/// True for the handful of phrasings answered straight from history.
pub fn is_recall_query(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    RECALL_QUERIES.contains(&normalized.as_str())
}

/// Convert stored records into model messages, dropping blank entries.
pub fn history_to_messages(history: &[MessageRecord]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter(|r| !r.is_blank())
        .map(|r| {
            let role = match r.role {
                Role::Human => ChatRole::User,
                Role::Ai => ChatRole::Assistant,
            };
            ChatMessage::text(role, r.content.clone())
        })
        .collect()
}
