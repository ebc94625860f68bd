use rivalscope_agents::tools::{CompanyNews, CompareCompetitors, SerperClient, Tool, ToolContext};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context() -> ToolContext {
    ToolContext {
        session_id: "temp_session".into(),
    }
}

#[tokio::test]
async fn test_company_news_lists_headlines() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/news"))
        .and(header("X-API-KEY", "s-key"))
        .and(body_partial_json(json!({ "q": "Notion news", "num": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "news": [
                {
                    "title": "Notion launches AI assistant",
                    "link": "https://example.com/a",
                    "snippet": "The productivity company...",
                    "date": "2 days ago",
                    "source": "TechCrunch"
                },
                { "title": "Notion hires new CFO" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tool = CompanyNews::new(SerperClient::new("s-key".into(), Some(server.uri())), 3);
    let output = tool
        .execute(&context(), json!({ "company": "Notion" }))
        .await
        .unwrap();

    assert!(!output.is_error);
    assert!(output.content.starts_with("Latest news for Notion:"));
    assert!(output.content.contains("1. Notion launches AI assistant (TechCrunch, 2 days ago)"));
    assert!(output.content.contains("2. Notion hires new CFO"));
}

#[tokio::test]
async fn test_company_news_without_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "news": [] })))
        .mount(&server)
        .await;

    let tool = CompanyNews::new(SerperClient::new("s-key".into(), Some(server.uri())), 5);
    let output = tool
        .execute(&context(), json!({ "company": "Nobody Inc" }))
        .await
        .unwrap();
    assert_eq!(output.content, "No recent news found for Nobody Inc.");
}

#[tokio::test]
async fn test_search_api_error_is_tool_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let tool = CompanyNews::new(SerperClient::new("bad".into(), Some(server.uri())), 5);
    let err = tool
        .execute(&context(), json!({ "company": "Acme" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("403"));
}

#[tokio::test]
async fn test_compare_competitors_profiles_each_company() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "q": "Zoom pricing" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "knowledgeGraph": { "title": "Zoom", "type": "Software company", "description": "Video conferencing." },
            "organic": [{ "title": "Zoom plans", "link": "https://zoom.us/pricing", "snippet": "Free and Pro tiers." }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "q": "Webex pricing" })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tool = CompareCompetitors::new(SerperClient::new("s-key".into(), Some(server.uri())));
    let output = tool
        .execute(
            &context(),
            json!({ "companies": ["Zoom", "Webex", "zoom"], "aspect": "pricing" }),
        )
        .await
        .unwrap();

    assert!(output.content.starts_with("Competitor comparison (pricing):"));
    assert!(output.content.contains("## Zoom\n- Type: Software company"));
    assert!(output.content.contains("- Zoom plans: Free and Pro tiers."));
    assert!(output.content.contains("## Webex\n- No data available."));
    assert_eq!(output.content.matches("## ").count(), 2);
}
