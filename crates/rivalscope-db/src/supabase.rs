use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rivalscope_common::{Error, Result};
use serde_json::{Value, json};
use tracing::debug;

use crate::backend::RemoteBackend;

/// History table hosted on Supabase, reached through its PostgREST API.
///
/// Expects a table with at least `session_id` and `messages` columns.
#[derive(Clone)]
pub struct SupabaseBackend {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseBackend {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("supabase {operation} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "supabase {operation} failed with status {}: {body}",
                status.as_u16()
            )));
        }
        Ok(response)
    }

    async fn rows(&self, response: Response, operation: &str) -> Result<Vec<Value>> {
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| Error::Backend(format!("supabase {operation} returned invalid JSON: {e}")))
    }

    async fn row_exists(&self, session_id: &str) -> Result<bool> {
        let filter = format!("eq.{session_id}");
        let request = self
            .client
            .get(self.table_url())
            .query(&[("select", "session_id"), ("session_id", filter.as_str())]);
        let response = self.send(request, "lookup").await?;
        Ok(!self.rows(response, "lookup").await?.is_empty())
    }
}

#[async_trait]
impl RemoteBackend for SupabaseBackend {
    fn backend_id(&self) -> &str {
        "supabase"
    }

    async fn probe(&self) -> Result<()> {
        let request = self
            .client
            .get(self.table_url())
            .query(&[("select", "session_id"), ("limit", "1")]);
        self.send(request, "probe").await?;
        debug!(table = %self.table, "supabase table reachable");
        Ok(())
    }

    async fn select(&self, session_id: &str) -> Result<Option<String>> {
        let filter = format!("eq.{session_id}");
        let request = self
            .client
            .get(self.table_url())
            .query(&[("select", "messages"), ("session_id", filter.as_str())]);
        let response = self.send(request, "select").await?;
        let rows = self.rows(response, "select").await?;

        let messages = rows
            .into_iter()
            .next()
            .and_then(|mut row| row.get_mut("messages").map(Value::take));

        // `messages` is a text column in most deployments, jsonb in some.
        Ok(match messages {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) if raw.is_empty() => None,
            Some(Value::String(raw)) => Some(raw),
            Some(other) => Some(other.to_string()),
        })
    }

    async fn upsert(&self, session_id: &str, serialized_log: &str) -> Result<()> {
        if self.row_exists(session_id).await? {
            let filter = format!("eq.{session_id}");
            let request = self
                .client
                .patch(self.table_url())
                .query(&[("session_id", filter.as_str())])
                .header("Prefer", "return=minimal")
                .json(&json!({ "messages": serialized_log }));
            self.send(request, "update").await?;
            debug!(session_id, "updated existing history row");
        } else {
            let request = self
                .client
                .post(self.table_url())
                .header("Prefer", "return=minimal")
                .json(&json!({ "session_id": session_id, "messages": serialized_log }));
            self.send(request, "insert").await?;
            debug!(session_id, "inserted history row");
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let filter = format!("eq.{session_id}");
        let request = self
            .client
            .delete(self.table_url())
            .query(&[("session_id", filter.as_str())]);
        self.send(request, "delete").await?;
        Ok(())
    }
}
