use std::collections::HashMap;

use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart, Usage,
};
use async_trait::async_trait;
use reqwest::Client;
use rivalscope_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini through the native `generateContent` API.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f64>,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: &str, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: normalize_model(model),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Accept both `gemini-1.5-flash` and `models/gemini-1.5-flash`.
fn normalize_model(model: &str) -> String {
    model.trim().trim_start_matches("models/").to_string()
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            normalize_model(&request.model)
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = self.convert_request(request)?;

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "Gemini API error (status {}): {error_text}",
                status.as_u16()
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("Failed to parse Gemini response: {e}")))?;

        convert_response(gemini_response, model)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await;

        match response {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

impl GeminiProvider {
    fn convert_request(&self, request: &LlmRequest) -> Result<GeminiRequest> {
        // Gemini has no tool call ids; results are matched back by function name.
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut contents = Vec::new();
        for msg in &request.messages {
            if let Some(content) = convert_message(msg, &mut call_names)? {
                contents.push(content);
            }
        }

        let system_instruction = request.system.as_ref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(text.clone())],
        });

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    })
                    .collect(),
            }])
        };

        Ok(GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: GenerationConfig {
                temperature: request.temperature.or(self.temperature),
                max_output_tokens: request.max_tokens,
            },
        })
    }
}

fn convert_message(
    msg: &ChatMessage,
    call_names: &mut HashMap<String, String>,
) -> Result<Option<GeminiContent>> {
    let role = match msg.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "model",
    };

    let parts = match &msg.content {
        MessagePart::Text(text) => vec![GeminiPart::text(text.clone())],
        MessagePart::Parts(blocks) => {
            let mut parts = Vec::with_capacity(blocks.len());
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => parts.push(GeminiPart::text(text.clone())),
                    ContentBlock::ToolUse { id, name, input } => {
                        call_names.insert(id.clone(), name.clone());
                        parts.push(GeminiPart {
                            function_call: Some(GeminiFunctionCall {
                                name: name.clone(),
                                args: input.clone(),
                            }),
                            ..GeminiPart::default()
                        });
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        let name = call_names.get(tool_use_id).cloned().ok_or_else(|| {
                            Error::Agent(format!("tool result '{tool_use_id}' has no matching call"))
                        })?;
                        parts.push(GeminiPart {
                            function_response: Some(GeminiFunctionResponse {
                                name,
                                response: json!({ "content": content }),
                            }),
                            ..GeminiPart::default()
                        });
                    }
                }
            }
            parts
        }
    };

    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(GeminiContent {
        role: Some(role.to_string()),
        parts,
    }))
}

fn convert_response(response: GeminiResponse, model: String) -> Result<LlmResponse> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::Agent("No candidates in Gemini response".to_string()))?;

    let mut content = Vec::new();
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    for (index, part) in parts.into_iter().enumerate() {
        if let Some(text) = part.text
            && !text.is_empty()
        {
            content.push(ContentBlock::Text { text });
        }
        if let Some(call) = part.function_call {
            content.push(ContentBlock::ToolUse {
                id: format!("{}-{index}", call.name),
                name: call.name,
                input: call.args,
            });
        }
    }

    Ok(LlmResponse {
        content,
        model: response.model_version.unwrap_or(model),
        usage: response.usage_metadata.map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        }),
        stop_reason: candidate.finish_reason,
    })
}

// Request Types
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// Response Types
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
