use std::path::{Path, PathBuf};

use rivalscope_common::{Error, Result};
use tracing::{debug, info};

use crate::model::{AppConfig, LlmProviderConfig, MemoryBackendKind, ProviderKind};

const CONFIG_FILE_NAME: &str = "config.yml";

/// Loads `AppConfig` from YAML, `.env` and the process environment.
///
/// Precedence, lowest first: built-in defaults, the YAML file, environment
/// variables.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// `~/.rivalscope`, or `./.rivalscope` when no home directory is known.
    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".rivalscope"))
            .unwrap_or_else(|| PathBuf::from(".rivalscope"))
    }

    pub fn load(&self) -> Result<AppConfig> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("loaded environment from {}", path.display());
        }

        let mut config = match &self.path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default_path = Self::default_config_dir().join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::read_file(&default_path)?
                } else {
                    debug!("no config file found, using defaults");
                    AppConfig::default()
                }
            }
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<AppConfig> {
        info!("loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        parse_yaml(&raw)
    }
}

pub fn parse_yaml(raw: &str) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid config file: {e}")))
}

/// Overlay well-known environment variables onto `config`.
///
/// `lookup` abstracts `std::env::var` so tests do not touch process state.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = get("RIVALSCOPE_HOST") {
        config.gateway.host = host;
    }
    if let Some(port) = get("RIVALSCOPE_PORT").and_then(|p| p.parse().ok()) {
        config.gateway.port = port;
    }

    if let Some(url) = get("SUPABASE_URL") {
        config.memory.supabase_url = Some(url);
    }
    if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY").or_else(|| get("SUPABASE_KEY")) {
        config.memory.supabase_key = Some(key);
    }

    if let Some(key) = get("SERPER_API_KEY") {
        config.tools.serper_api_key = Some(key);
    }

    let google_key = get("GOOGLE_API_KEY");
    let openai_key = get("OPENAI_API_KEY");

    if config.llm.is_empty() {
        config.llm.push(LlmProviderConfig::default_gemini(google_key.clone()));
    }
    for provider in &mut config.llm {
        if provider.api_key.is_some() {
            continue;
        }
        provider.api_key = match provider.provider {
            ProviderKind::Gemini => google_key.clone(),
            ProviderKind::Openai => openai_key.clone(),
        };
    }
}

pub fn validate(config: &AppConfig) -> Result<()> {
    for provider in &config.llm {
        if provider.model.trim().is_empty() {
            return Err(Error::Config(format!(
                "provider '{}' has an empty model",
                provider.name
            )));
        }
        if let Some(base) = &provider.base_url {
            url::Url::parse(base).map_err(|e| {
                Error::Config(format!("provider '{}' base_url is invalid: {e}", provider.name))
            })?;
        }
    }

    if config.memory.session_id.trim().is_empty() {
        return Err(Error::Config("memory.session_id must not be empty".into()));
    }

    if config.memory.backend == MemoryBackendKind::Supabase
        && let Some(url) = &config.memory.supabase_url
    {
        url::Url::parse(url)
            .map_err(|e| Error::Config(format!("memory.supabase_url is invalid: {e}")))?;
    }

    Ok(())
}
