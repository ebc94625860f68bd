pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolDefinition, Usage,
};
pub use runtime::AgentRuntime;
