use std::sync::Arc;

use rivalscope_agents::tools::{CompanyNews, CompareCompetitors, SerperClient};
use rivalscope_agents::{AgentRuntime, GeminiProvider, LlmProvider, OpenAiProvider};
use rivalscope_config::{AppConfig, LlmProviderConfig, ProviderKind};
use rivalscope_db::SessionMemory;
use tracing::{info, warn};

use crate::chat::ChatService;
use crate::state::{AppState, SharedState};

/// Connect memory and build the agent once; the result is shared by every request.
pub async fn build_state(config: AppConfig) -> SharedState {
    let memory = SessionMemory::connect(&config.memory).await;
    info!(
        session_id = %memory.session_id(),
        mode = memory.mode().as_str(),
        "session memory ready"
    );

    let agent = build_agent_runtime(&config);
    let chat = ChatService::new(memory, Arc::new(agent));
    Arc::new(AppState::new(config, chat))
}

pub fn build_agent_runtime(config: &AppConfig) -> AgentRuntime {
    let mut runtime = AgentRuntime::new();

    if let Some(prompt) = config
        .agent
        .system_prompt
        .as_ref()
        .filter(|p| !p.trim().is_empty())
    {
        runtime.set_system_prompt(prompt.clone());
    }
    runtime.set_max_tokens(config.agent.max_tokens);
    runtime.set_summary_exchanges(config.agent.summary_exchanges);

    for entry in &config.llm {
        match build_provider(entry) {
            Some(provider) => runtime.register_provider(provider),
            None => warn!(
                "skipping LLM provider '{}': no API key configured",
                entry.name
            ),
        }
    }
    if runtime.provider_ids().is_empty() {
        warn!("no LLM provider available; chat requests will fail until one is configured");
    }

    match config
        .tools
        .serper_api_key
        .as_ref()
        .filter(|k| !k.trim().is_empty())
    {
        Some(key) => {
            let serper = SerperClient::new(key.clone(), config.tools.serper_base_url.clone());
            runtime.register_tool(Box::new(CompanyNews::new(
                serper.clone(),
                config.tools.news_results,
            )));
            runtime.register_tool(Box::new(CompareCompetitors::new(serper)));
        }
        None => info!("SERPER_API_KEY not set; lookup tools disabled"),
    }

    runtime
}

fn build_provider(entry: &LlmProviderConfig) -> Option<Arc<dyn LlmProvider>> {
    let api_key = entry.api_key.clone().filter(|k| !k.trim().is_empty())?;
    let provider: Arc<dyn LlmProvider> = match entry.provider {
        ProviderKind::Gemini => Arc::new(
            GeminiProvider::new(api_key, &entry.model, entry.base_url.clone())
                .with_temperature(entry.temperature),
        ),
        ProviderKind::Openai => Arc::new(
            OpenAiProvider::new(api_key, entry.base_url.clone())
                .with_model(entry.model.clone())
                .with_temperature(entry.temperature),
        ),
    };
    Some(provider)
}
