use rivalscope_agents::{
    ChatMessage, ChatRole, ContentBlock, GeminiProvider, LlmProvider, LlmRequest, OpenAiProvider,
    ToolDefinition,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(text: &str) -> LlmRequest {
    LlmRequest {
        model: String::new(),
        messages: vec![ChatMessage::text(ChatRole::User, text)],
        system: Some("You are an advisor.".into()),
        max_tokens: Some(256),
        temperature: None,
        tools: vec![ToolDefinition {
            name: "get_company_news".into(),
            description: "news".into(),
            input_schema: json!({ "type": "object" }),
        }],
    }
}

#[tokio::test]
async fn test_gemini_text_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash-latest:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "Who competes with Slack?" }] }],
            "systemInstruction": { "parts": [{ "text": "You are an advisor." }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Microsoft Teams." }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::new("g-key".into(), "gemini-1.5-flash-latest", Some(server.uri()));
    let response = provider.complete(&request("Who competes with Slack?")).await.unwrap();

    assert_eq!(
        response.content,
        vec![ContentBlock::Text {
            text: "Microsoft Teams.".into()
        }]
    );
    assert_eq!(response.usage.unwrap().output_tokens, 3);
}

#[tokio::test]
async fn test_gemini_function_call_becomes_tool_use() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{
                    "functionCall": { "name": "get_company_news", "args": { "company": "Slack" } }
                }] }
            }]
        })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new("g-key".into(), "gemini-1.5-flash-latest", Some(server.uri()));
    let response = provider.complete(&request("Slack news?")).await.unwrap();

    match &response.content[0] {
        ContentBlock::ToolUse { name, input, .. } => {
            assert_eq!(name, "get_company_news");
            assert_eq!(input["company"], "Slack");
        }
        other => panic!("expected tool use, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gemini_error_carries_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new("g-key".into(), "gemini-1.5-flash-latest", Some(server.uri()));
    let err = provider.complete(&request("hi")).await.unwrap_err();
    assert!(err.to_string().contains("status 429"));
}

#[tokio::test]
async fn test_openai_tool_calls_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer o-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                { "role": "system", "content": "You are an advisor." },
                { "role": "user", "content": "Slack news?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "get_company_news", "arguments": "{\"company\":\"Slack\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("o-key".into(), Some(server.uri()));
    let response = provider.complete(&request("Slack news?")).await.unwrap();

    assert_eq!(
        response.content,
        vec![ContentBlock::ToolUse {
            id: "call_1".into(),
            name: "get_company_news".into(),
            input: json!({ "company": "Slack" }),
        }]
    );
    assert_eq!(response.stop_reason.as_deref(), Some("tool_calls"));
}

#[tokio::test]
async fn test_health_check_reports_unreachable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("bad".into(), Some(server.uri()));
    assert!(!provider.health_check().await.unwrap());
}
