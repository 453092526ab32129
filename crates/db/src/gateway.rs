//! Thin client for the hosted backend: PostgREST-style record CRUD under
//! `/rest/v1` and object storage under `/storage/v1`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use sejong_core::config::GatewayConfig;

use crate::repositories::RepositoryError;

/// Filter/order/limit parameters in PostgREST query-string form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn eq(mut self, column: &str, value: impl fmt::Display) -> Self {
        self.params.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// `column=in.("a","b")`. An empty list matches nothing.
    pub fn is_in<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let quoted: Vec<String> = values
            .into_iter()
            .map(|value| format!("\"{}\"", value.as_ref().replace('"', "\\\"")))
            .collect();
        self.params.push((column.to_string(), format!("in.({})", quoted.join(","))));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params.push(("order".to_string(), format!("{column}.{direction}")));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    anon_key: SecretString,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, RepositoryError> {
        let mut builder = Client::builder();
        if let Some(timeout_secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let http = builder.build().map_err(|error| RepositoryError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    pub fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.anon_key.expose_secret();
        request.header("apikey", key).bearer_auth(key)
    }

    /// Rows of `table` matching `query`. Rows that do not fit `T` are skipped
    /// with a warning so one bad record never hides the rest of a list.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, RepositoryError> {
        let response = self
            .authorize(self.http.get(self.rest_url(table)))
            .query(query.params())
            .send()
            .await?;
        let rows = read_rows(table, response).await?;
        Ok(decode_rows(table, rows))
    }

    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<T>, RepositoryError> {
        let rows = self.select::<T>(table, &query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert(&self, table: &str, body: &Value) -> Result<Vec<Value>, RepositoryError> {
        let response = self
            .authorize(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        read_rows(table, response).await
    }

    /// Filtered update. Returns the rows the backend actually changed, so an
    /// empty result means nothing matched the filter.
    pub async fn update(
        &self,
        table: &str,
        query: &Query,
        body: &Value,
    ) -> Result<Vec<Value>, RepositoryError> {
        let response = self
            .authorize(self.http.patch(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .query(query.params())
            .json(body)
            .send()
            .await?;
        let rows = read_rows(table, response).await?;
        debug!(
            event_name = "gateway.update.completed",
            table,
            matched_rows = rows.len(),
            "filtered update completed"
        );
        Ok(rows)
    }

    /// Uploads an object and returns its public URL.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, RepositoryError> {
        let response = self
            .authorize(self.http.post(self.object_url(bucket, path)))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Backend {
                status: status.as_u16(),
                message: backend_message(&body),
            });
        }
        Ok(self.public_url(bucket, path))
    }
}

async fn read_rows(table: &str, response: Response) -> Result<Vec<Value>, RepositoryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = backend_message(&body);
        warn!(
            event_name = "gateway.request.rejected",
            table,
            status = status.as_u16(),
            message = %message,
            "backend rejected request"
        );
        return Err(RepositoryError::Backend { status: status.as_u16(), message });
    }

    match response.json::<Value>().await {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(row @ Value::Object(_)) => Ok(vec![row]),
        Ok(other) => Err(RepositoryError::Decode(format!(
            "{table}: expected a JSON array of rows, got {other}"
        ))),
        Err(error) => Err(RepositoryError::Decode(format!("{table}: {error}"))),
    }
}

pub(crate) fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(
                    event_name = "gateway.row.undecodable",
                    table,
                    error = %error,
                    "skipping row that does not match the expected shape"
                );
                None
            }
        })
        .collect()
}

/// PostgREST and Storage both answer errors as `{"message": ...}`; anything
/// else is passed through, shortened.
fn backend_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

impl From<reqwest::Error> for RepositoryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Transport(format!("request timed out: {error}"));
        }
        Self::Transport(error.to_string())
    }
}

/// Holds the process-wide client. The first successful initialization wins;
/// later callers get the same client back.
#[derive(Debug, Default)]
pub struct GatewaySlot {
    cell: OnceCell<Arc<GatewayClient>>,
}

impl GatewaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_init(
        &self,
        config: &GatewayConfig,
    ) -> Result<Arc<GatewayClient>, RepositoryError> {
        self.cell
            .get_or_try_init(|| async { GatewayClient::new(config).map(Arc::new) })
            .await
            .cloned()
    }

    pub fn get(&self) -> Option<Arc<GatewayClient>> {
        self.cell.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sejong_core::config::GatewayConfig;

    use super::{backend_message, GatewayClient, GatewaySlot, Query};

    fn config(url: &str) -> GatewayConfig {
        GatewayConfig {
            url: url.to_string(),
            anon_key: "anon-test".to_string().into(),
            timeout_secs: None,
        }
    }

    #[test]
    fn query_renders_postgrest_filters() {
        let query = Query::new()
            .eq("id", "r-1")
            .is_in("status", ["pending", "approved"])
            .order("created_at", false)
            .limit(20);

        assert_eq!(
            query.params(),
            &[
                ("id".to_string(), "eq.r-1".to_string()),
                ("status".to_string(), "in.(\"pending\",\"approved\")".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn urls_are_derived_from_trimmed_base() {
        let client = GatewayClient::new(&config("https://project.supabase.co/")).expect("client");

        assert_eq!(client.rest_url("requests"), "https://project.supabase.co/rest/v1/requests");
        assert_eq!(
            client.public_url("receipt-files", "u-1/receipt_r-1_1.png"),
            "https://project.supabase.co/storage/v1/object/public/receipt-files/u-1/receipt_r-1_1.png"
        );
    }

    #[test]
    fn debug_output_hides_the_key() {
        let client = GatewayClient::new(&config("https://project.supabase.co")).expect("client");
        assert!(!format!("{client:?}").contains("anon-test"));
    }

    #[test]
    fn backend_message_prefers_the_json_message_field() {
        assert_eq!(
            backend_message(r#"{"code":"42501","message":"permission denied"}"#),
            "permission denied"
        );
        assert_eq!(backend_message("upstream timeout"), "upstream timeout");
    }

    #[tokio::test]
    async fn slot_initializes_once() {
        let slot = GatewaySlot::new();
        assert!(slot.get().is_none());

        let first = slot.get_or_init(&config("https://first.supabase.co")).await.expect("first");
        let second = slot.get_or_init(&config("https://second.supabase.co")).await.expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.base_url(), "https://first.supabase.co");
    }
}
