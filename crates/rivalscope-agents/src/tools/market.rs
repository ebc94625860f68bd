use async_trait::async_trait;
use futures::future::join_all;
use rivalscope_common::{Error, Result};
use serde_json::json;
use tracing::{debug, warn};

use crate::tools::serper::{SearchResponse, SerperClient};
use crate::tools::{Tool, ToolContext, ToolOutput};

const MAX_COMPANIES: usize = 5;
const SNIPPETS_PER_COMPANY: usize = 3;
const DEFAULT_ASPECT: &str = "market position products pricing";

/// Side-by-side web overview of several competitors.
pub struct CompareCompetitors {
    serper: SerperClient,
}

impl CompareCompetitors {
    pub fn new(serper: SerperClient) -> Self {
        Self { serper }
    }
}

#[async_trait]
impl Tool for CompareCompetitors {
    fn name(&self) -> &'static str {
        "compare_competitors"
    }

    fn description(&self) -> &'static str {
        "Compare two or more competing companies. Returns a short profile of each company \
         gathered from web search, optionally focused on one aspect such as pricing, \
         market share or product lineup."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "companies": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Companies to compare (2 to 5 names)"
                },
                "aspect": {
                    "type": "string",
                    "description": "Optional focus of the comparison, e.g. 'pricing'"
                }
            },
            "required": ["companies"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let companies = parse_companies(&args)?;
        debug!(session_id = %context.session_id, ?companies, "comparing competitors");
        let aspect = args["aspect"]
            .as_str()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ASPECT);

        let searches = companies.iter().map(|company| {
            let query = format!("{company} {aspect}");
            async move { self.serper.search(&query, SNIPPETS_PER_COMPANY).await }
        });
        let results = join_all(searches).await;

        let mut out = format!("Competitor comparison ({aspect}):\n");
        for (company, result) in companies.iter().zip(results) {
            out.push_str(&format!("\n## {company}\n"));
            match result {
                Ok(response) => out.push_str(&profile(&response)),
                Err(e) => {
                    warn!("comparison lookup for '{}' failed: {}", company, e);
                    out.push_str("- No data available.\n");
                }
            }
        }
        Ok(ToolOutput::success(out))
    }
}

fn parse_companies(args: &serde_json::Value) -> Result<Vec<String>> {
    let raw = args["companies"]
        .as_array()
        .ok_or_else(|| Error::Tool("missing or invalid 'companies' argument".to_string()))?;

    let mut companies: Vec<String> = Vec::new();
    for value in raw {
        let Some(name) = value.as_str().map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        if !companies.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            companies.push(name.to_string());
        }
    }

    if companies.len() < 2 {
        return Err(Error::Tool(
            "need at least two distinct companies to compare".to_string(),
        ));
    }
    companies.truncate(MAX_COMPANIES);
    Ok(companies)
}

fn profile(response: &SearchResponse) -> String {
    let mut out = String::new();
    if let Some(kg) = &response.knowledge_graph {
        if let Some(kind) = &kg.kind {
            out.push_str(&format!("- Type: {kind}\n"));
        }
        if let Some(description) = &kg.description {
            out.push_str(&format!("- Overview: {description}\n"));
        }
    }
    for result in response.organic.iter().take(SNIPPETS_PER_COMPANY) {
        out.push_str(&format!("- {}: {}\n", result.title, result.snippet));
    }
    if out.is_empty() {
        out.push_str("- No data available.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companies_are_trimmed_and_deduplicated() {
        let parsed =
            parse_companies(&json!({ "companies": [" Notion ", "notion", "Coda", ""] })).unwrap();
        assert_eq!(parsed, vec!["Notion".to_string(), "Coda".to_string()]);
    }

    #[test]
    fn single_company_is_rejected() {
        assert!(parse_companies(&json!({ "companies": ["Notion"] })).is_err());
        assert!(parse_companies(&json!({ "companies": "Notion" })).is_err());
    }

    #[test]
    fn company_list_is_capped() {
        let parsed =
            parse_companies(&json!({ "companies": ["a", "b", "c", "d", "e", "f", "g"] })).unwrap();
        assert_eq!(parsed.len(), MAX_COMPANIES);
    }

    #[test]
    fn empty_search_profile_says_so() {
        let response = SearchResponse {
            knowledge_graph: None,
            organic: vec![],
        };
        assert_eq!(profile(&response), "- No data available.\n");
    }
}
