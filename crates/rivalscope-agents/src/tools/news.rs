use async_trait::async_trait;
use rivalscope_common::{Error, Result};
use serde_json::json;
use tracing::debug;

use crate::tools::serper::{NewsItem, SerperClient};
use crate::tools::{Tool, ToolContext, ToolOutput};

/// Upper bound on headlines regardless of configuration.
const MAX_RESULTS: usize = 10;

/// Looks up recent headlines about a company.
pub struct CompanyNews {
    serper: SerperClient,
    results: usize,
}

impl CompanyNews {
    pub fn new(serper: SerperClient, results: usize) -> Self {
        Self {
            serper,
            results: results.clamp(1, MAX_RESULTS),
        }
    }
}

#[async_trait]
impl Tool for CompanyNews {
    fn name(&self) -> &'static str {
        "get_company_news"
    }

    fn description(&self) -> &'static str {
        "Get the latest news headlines about a company. Use this for questions about recent \
         announcements, launches, funding, leadership changes or other developments."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "company": {
                    "type": "string",
                    "description": "Company name, e.g. 'Notion' or 'Stripe'"
                }
            },
            "required": ["company"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let company = args["company"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Tool("missing or invalid 'company' argument".to_string()))?;
        debug!(session_id = %context.session_id, company, "fetching company news");

        let items = self.serper.news(&format!("{company} news"), self.results).await?;
        if items.is_empty() {
            return Ok(ToolOutput::success(format!(
                "No recent news found for {company}."
            )));
        }

        Ok(ToolOutput::success(format_headlines(company, &items)))
    }
}

fn format_headlines(company: &str, items: &[NewsItem]) -> String {
    let mut out = format!("Latest news for {company}:\n");
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}", i + 1, item.title));
        let meta: Vec<&str> = [item.source.as_deref(), item.date.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !meta.is_empty() {
            out.push_str(&format!(" ({})", meta.join(", ")));
        }
        out.push('\n');
        if !item.snippet.is_empty() {
            out.push_str(&format!("   {}\n", item.snippet));
        }
        if !item.link.is_empty() {
            out.push_str(&format!("   {}\n", item.link));
        }
    }
    out
}
