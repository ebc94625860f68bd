use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_ID: &str = "temp_session";
pub const DEFAULT_TABLE: &str = "chat_memory";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

/// Top-level configuration, usually read from `~/.rivalscope/config.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    /// Providers in priority order. The first entry is the default, the
    /// remaining ones are tried on retryable failures.
    pub llm: Vec<LlmProviderConfig>,
    pub memory: MemoryConfig,
    pub tools: ToolsConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub cors_allow_all: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allow_all: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl LlmProviderConfig {
    /// The Gemini setup used when no provider is configured explicitly.
    pub fn default_gemini(api_key: Option<String>) -> Self {
        Self {
            name: "gemini".to_string(),
            provider: ProviderKind::Gemini,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key,
            base_url: None,
            temperature: Some(0.3),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackendKind {
    #[default]
    Supabase,
    Sqlite,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: MemoryBackendKind,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub table: String,
    pub sqlite_path: Option<String>,
    pub session_id: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackendKind::default(),
            supabase_url: None,
            supabase_key: None,
            table: DEFAULT_TABLE.to_string(),
            sqlite_path: None,
            session_id: DEFAULT_SESSION_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub serper_api_key: Option<String>,
    pub serper_base_url: Option<String>,
    pub news_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            serper_api_key: None,
            serper_base_url: None,
            news_results: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    /// Number of recent question/answer pairs folded into the system prompt.
    pub summary_exchanges: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: 2048,
            summary_exchanges: 3,
        }
    }
}
