use std::sync::Arc;

use futures::future::join_all;
use rivalscope_common::{Error, MessageRecord, Result};
use tracing::{info, instrument, warn};

use crate::prompt::{ADVISOR_PROMPT, build_system_prompt, history_to_messages};
use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolDefinition,
};
use crate::tools::{Tool, ToolContext, ToolOutput};

/// Maximum number of tool-use round-trips before the loop is forcibly stopped.
const MAX_TOOL_ITERATIONS: usize = 10;

/// The advisor agent: provider chain, lookup tools and the tool-use loop.
///
/// Built once at startup. Conversation context is passed in per call, so no
/// per-request rebuilding is needed to see fresh history.
pub struct AgentRuntime {
    providers: Vec<Arc<dyn LlmProvider>>,
    tools: Vec<Box<dyn Tool>>,
    system_prompt: String,
    max_tokens: u32,
    summary_exchanges: usize,
}

impl AgentRuntime {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            tools: Vec::new(),
            system_prompt: ADVISOR_PROMPT.to_string(),
            max_tokens: 2048,
            summary_exchanges: 3,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = prompt;
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = max_tokens;
    }

    pub fn set_summary_exchanges(&mut self, exchanges: usize) {
        self.summary_exchanges = exchanges;
    }

    /// The first registered provider is the default; later ones are fallbacks.
    pub fn register_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        info!("registered LLM provider: {}", provider.provider_id());
        self.providers.push(provider);
    }

    /// Return the IDs of all registered providers, default first.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.provider_id().to_string())
            .collect()
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        info!("registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    async fn complete_with_fallback(
        &self,
        request: &LlmRequest,
        start_index: usize,
    ) -> Result<(LlmResponse, usize)> {
        if self.providers.is_empty() {
            return Err(Error::Agent("no LLM provider configured".into()));
        }

        let mut index = start_index.min(self.providers.len() - 1);
        loop {
            let provider = &self.providers[index];
            match provider.complete(request).await {
                Ok(response) => {
                    if index > start_index {
                        info!(
                            "using fallback provider '{}' after retryable primary failure",
                            provider.provider_id()
                        );
                    }
                    return Ok((response, index));
                }
                Err(err) => {
                    if !is_retryable_provider_error(&err) || index + 1 >= self.providers.len() {
                        return Err(err);
                    }

                    warn!(
                        "provider '{}' failed with retryable error ({}); trying fallback '{}'",
                        provider.provider_id(),
                        err,
                        self.providers[index + 1].provider_id()
                    );
                    index += 1;
                }
            }
        }
    }

    /// Run one advisor turn: build the prompt from `history`, call the model,
    /// execute requested tools, and return the final answer text.
    #[instrument(skip(self, user_text, history), fields(history_len = history.len()))]
    pub async fn process_message(
        &self,
        session_id: &str,
        user_text: &str,
        history: &[MessageRecord],
    ) -> Result<String> {
        let system = build_system_prompt(&self.system_prompt, history, self.summary_exchanges);
        let tool_defs = self.tool_definitions();

        let mut messages = history_to_messages(history);
        messages.push(ChatMessage::text(ChatRole::User, user_text));

        let mut active_provider_idx = 0usize;
        for _iteration in 0..MAX_TOOL_ITERATIONS {
            let request = LlmRequest {
                model: String::new(),
                messages: messages.clone(),
                system: Some(system.clone()),
                max_tokens: Some(self.max_tokens),
                temperature: None,
                tools: tool_defs.clone(),
            };

            let (response, used_provider_idx) = self
                .complete_with_fallback(&request, active_provider_idx)
                .await?;
            active_provider_idx = used_provider_idx;

            let has_tool_use = response
                .content
                .iter()
                .any(|block| matches!(block, ContentBlock::ToolUse { .. }));

            if !has_tool_use {
                return non_empty(extract_text(&response.content));
            }

            // Append the assistant's response (including tool_use blocks) to history
            messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content: MessagePart::Parts(response.content.clone()),
            });

            let mut tool_results = Vec::new();
            for block in &response.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let context = ToolContext {
                        session_id: session_id.to_string(),
                    };
                    let output = match self.find_tool(name) {
                        Some(tool) => tool
                            .execute(&context, input.clone())
                            .await
                            .unwrap_or_else(|e| ToolOutput::error(e.to_string())),
                        None => ToolOutput::error(format!("unknown tool: {name}")),
                    };
                    if output.is_error {
                        warn!(tool = %name, "tool returned an error: {}", output.content);
                    }
                    tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content: output.content,
                    });
                }
            }

            // Append tool results as a user message
            messages.push(ChatMessage {
                role: ChatRole::User,
                content: MessagePart::Parts(tool_results),
            });
        }

        Err(Error::Agent(format!(
            "tool loop exceeded maximum of {MAX_TOOL_ITERATIONS} iterations"
        )))
    }

    /// Single model call with the persona prompt only: no tools, no history.
    pub async fn complete_plain(&self, user_text: &str) -> Result<String> {
        let request = LlmRequest {
            model: String::new(),
            messages: vec![ChatMessage::text(ChatRole::User, user_text)],
            system: Some(self.system_prompt.clone()),
            max_tokens: Some(self.max_tokens),
            temperature: None,
            tools: Vec::new(),
        };
        let (response, _) = self.complete_with_fallback(&request, 0).await?;
        non_empty(extract_text(&response.content))
    }

    pub async fn health_check_all(&self) -> Vec<(String, bool)> {
        let checks = self.providers.iter().map(|provider| async move {
            let healthy = provider.health_check().await.unwrap_or(false);
            (provider.provider_id().to_string(), healthy)
        });
        join_all(checks).await
    }
}

impl Default for AgentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(Error::Agent("model returned an empty response".into()));
    }
    Ok(text)
}

fn is_retryable_provider_error(error: &Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();

    if let Some(status) = extract_status_code(&message) {
        return matches!(status, 429 | 500 | 502 | 503 | 504);
    }

    let retryable_fragments = [
        "timed out",
        "timeout",
        "connection refused",
        "connection reset",
        "connection aborted",
        "temporarily unavailable",
        "dns error",
        "network error",
    ];

    retryable_fragments
        .iter()
        .any(|fragment| message.contains(fragment))
}

fn extract_status_code(message: &str) -> Option<u16> {
    for marker in ["status=", "status:", "status code", "status "] {
        let mut search_start = 0usize;
        while let Some(offset) = message[search_start..].find(marker) {
            let marker_start = search_start + offset;
            let after_marker = marker_start + marker.len();
            let remainder = message[after_marker..].trim_start();
            let digits: String = remainder
                .chars()
                .take_while(|ch| ch.is_ascii_digit())
                .collect();

            if digits.len() >= 3
                && let Ok(status) = digits[..3].parse::<u16>()
            {
                return Some(status);
            }

            search_start = after_marker;
        }
    }
    None
}

fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed list of responses, one per call.
    struct ScriptedProvider {
        id: &'static str,
        script: Mutex<Vec<Result<LlmResponse>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedProvider {
        fn new(id: &'static str, mut script: Vec<Result<LlmResponse>>) -> Self {
            script.reverse();
            Self {
                id,
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_id(&self) -> &str {
            self.id
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::Agent("script exhausted".into())))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct EchoTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "get_company_news"
        }

        fn description(&self) -> &'static str {
            "echo"
        }

        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn execute(
            &self,
            _context: &ToolContext,
            args: serde_json::Value,
        ) -> Result<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::success(format!("news for {}", args["company"])))
        }
    }

    fn text(t: &str) -> Result<LlmResponse> {
        Ok(LlmResponse {
            content: vec![ContentBlock::Text { text: t.into() }],
            model: "mock".into(),
            usage: None,
            stop_reason: Some("stop".into()),
        })
    }

    fn tool_call(name: &str) -> Result<LlmResponse> {
        Ok(LlmResponse {
            content: vec![ContentBlock::ToolUse {
                id: "call-1".into(),
                name: name.into(),
                input: serde_json::json!({ "company": "Acme" }),
            }],
            model: "mock".into(),
            usage: None,
            stop_reason: Some("tool_calls".into()),
        })
    }

    #[tokio::test]
    async fn history_is_sent_as_context() {
        let provider = Arc::new(ScriptedProvider::new("mock", vec![text("answer")]));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(provider.clone());

        let history = vec![
            MessageRecord::human("What is X?"),
            MessageRecord::ai("X is a company."),
        ];
        let reply = runtime
            .process_message("s", "And Y?", &history)
            .await
            .unwrap();
        assert_eq!(reply, "answer");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].messages.len(), 3);
        assert!(
            requests[0]
                .system
                .as_deref()
                .unwrap()
                .contains("User asked: What is X?")
        );
    }

    #[tokio::test]
    async fn tool_results_are_fed_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(ScriptedProvider::new(
            "mock",
            vec![tool_call("get_company_news"), text("Acme is expanding.")],
        ));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(provider.clone());
        runtime.register_tool(Box::new(EchoTool {
            calls: calls.clone(),
        }));

        let reply = runtime.process_message("s", "News?", &[]).await.unwrap();
        assert_eq!(reply, "Acme is expanding.");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let requests = provider.requests.lock().unwrap();
        let last = requests.last().unwrap();
        match &last.messages.last().unwrap().content {
            MessagePart::Parts(parts) => assert!(matches!(
                &parts[0],
                ContentBlock::ToolResult { content, .. } if content.contains("Acme")
            )),
            other => panic!("expected tool results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_reports_error_to_model() {
        let provider = Arc::new(ScriptedProvider::new(
            "mock",
            vec![tool_call("does_not_exist"), text("sorry")],
        ));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(provider.clone());

        assert_eq!(
            runtime.process_message("s", "hm", &[]).await.unwrap(),
            "sorry"
        );
    }

    #[tokio::test]
    async fn retryable_error_falls_back_to_next_provider() {
        let primary = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Err(Error::Agent("Gemini API error (status 503): busy".into()))],
        ));
        let secondary = Arc::new(ScriptedProvider::new("secondary", vec![text("from backup")]));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(primary);
        runtime.register_provider(secondary);

        assert_eq!(
            runtime.process_message("s", "q", &[]).await.unwrap(),
            "from backup"
        );
    }

    #[tokio::test]
    async fn non_retryable_error_is_returned() {
        let primary = Arc::new(ScriptedProvider::new(
            "primary",
            vec![Err(Error::Agent("Gemini API error (status 400): bad".into()))],
        ));
        let secondary = Arc::new(ScriptedProvider::new("secondary", vec![text("unused")]));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(primary);
        runtime.register_provider(secondary.clone());

        assert!(runtime.process_message("s", "q", &[]).await.is_err());
        assert!(secondary.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_model_text_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new("mock", vec![text("  ")]));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(provider);
        assert!(runtime.process_message("s", "q", &[]).await.is_err());
    }

    #[tokio::test]
    async fn plain_completion_has_no_tools_or_history() {
        let provider = Arc::new(ScriptedProvider::new("mock", vec![text("plain")]));
        let mut runtime = AgentRuntime::new();
        runtime.register_provider(provider.clone());
        runtime.register_tool(Box::new(EchoTool {
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        assert_eq!(runtime.complete_plain("hello").await.unwrap(), "plain");
        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some(ADVISOR_PROMPT));
    }

    #[tokio::test]
    async fn no_provider_is_an_error() {
        let runtime = AgentRuntime::new();
        assert!(runtime.process_message("s", "q", &[]).await.is_err());
    }

    #[test]
    fn status_codes_are_extracted() {
        assert_eq!(extract_status_code("api error (status 429): slow"), Some(429));
        assert_eq!(extract_status_code("status=503"), Some(503));
        assert_eq!(extract_status_code("no code here"), None);
        assert!(is_retryable_provider_error(&Error::Agent(
            "request failed: connection refused".into()
        )));
    }
}
