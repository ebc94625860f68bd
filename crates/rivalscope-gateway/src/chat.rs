use std::sync::Arc;

use rivalscope_agents::AgentRuntime;
use rivalscope_agents::prompt::{is_recall_query, last_user_question};
use rivalscope_common::MessageRecord;
use rivalscope_db::SessionMemory;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

const EMPTY_QUERY_REPLY: &str = "Please provide a valid question or request.";

/// Body of a `/chat` reply: exactly one of `response` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatReply {
    Response { response: String },
    Error { error: String },
}

impl ChatReply {
    pub fn response(text: impl Into<String>) -> Self {
        Self::Response {
            response: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { error: text.into() }
    }
}

/// One advisor turn per call, recorded in session memory.
pub struct ChatService {
    memory: SessionMemory,
    agent: Arc<AgentRuntime>,
    // Serializes read-history / run / append so concurrent turns can't interleave.
    turn_lock: Mutex<()>,
}

impl ChatService {
    pub fn new(memory: SessionMemory, agent: Arc<AgentRuntime>) -> Self {
        Self {
            memory,
            agent,
            turn_lock: Mutex::new(()),
        }
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn agent(&self) -> &AgentRuntime {
        &self.agent
    }

    #[instrument(skip(self, query), fields(session_id = %self.memory.session_id()))]
    pub async fn handle_query(&self, query: &str) -> ChatReply {
        if query.trim().is_empty() {
            return ChatReply::response(EMPTY_QUERY_REPLY);
        }

        let _turn = self.turn_lock.lock().await;
        let history = self.memory.get_messages().await;

        if is_recall_query(query)
            && let Some(previous) = last_user_question(&history, query)
        {
            info!("answering recall query from history");
            let answer = format!("Your last question was: \"{previous}\"");
            self.record_turn(query, &answer).await;
            return ChatReply::response(answer);
        }

        let answer = match self
            .agent
            .process_message(self.memory.session_id(), query, &history)
            .await
        {
            Ok(answer) => answer,
            Err(agent_err) => {
                warn!("agent run failed, retrying as plain completion: {}", agent_err);
                match self.agent.complete_plain(query).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!("plain completion failed: {}", e);
                        return ChatReply::error(e.to_string());
                    }
                }
            }
        };

        self.record_turn(query, &answer).await;
        ChatReply::response(answer)
    }

    async fn record_turn(&self, query: &str, answer: &str) {
        self.memory.add_message(MessageRecord::human(query)).await;
        self.memory.add_message(MessageRecord::ai(answer)).await;
    }
}
