use async_trait::async_trait;
use rivalscope_common::Result;

pub mod market;
pub mod news;
pub mod serper;

pub use market::CompareCompetitors;
pub use news::CompanyNews;
pub use serper::SerperClient;

/// Per-call information handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
}

/// Text fed back to the model as the tool result.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A function the model may call during a turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema for the arguments object.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}
