use futures_util::Stream;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{join_url, Config};
use crate::error::QueryError;
use crate::record::QueryRequest;
use crate::stream::{records, StreamItem};

/// `{status, message}` reply from the auxiliary endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone)]
pub struct QueryClient {
    client: Client,
    base_url: String,
    stream_url: String,
}

impl QueryClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.server_url.clone(),
            stream_url: config.stream_url(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the question and return the response body as decoded records.
    ///
    /// Records are produced as bytes arrive; the body is never buffered to
    /// completion first.
    pub async fn stream_query(
        &self,
        text: &str,
    ) -> Result<impl Stream<Item = StreamItem> + Send + 'static, QueryError> {
        let url = &self.stream_url;
        info!(%url, "submitting query");

        let request = QueryRequest {
            text: text.to_string(),
        };

        let response = self
            .client
            .post(url)
            .header("Cache-Control", "no-cache")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "query service rejected request");
            return Err(QueryError::Status { status, body });
        }

        Ok(records(response.bytes_stream()))
    }

    pub async fn health(&self) -> Result<ServiceStatus, QueryError> {
        let url = join_url(&self.base_url, "/health");
        let response = self.client.get(&url).send().await?;
        Self::status_reply(response).await
    }

    pub async fn clear_cache(&self) -> Result<ServiceStatus, QueryError> {
        let url = join_url(&self.base_url, "/clear-cache");
        let response = self.client.post(&url).send().await?;
        Self::status_reply(response).await
    }

    async fn status_reply(response: reqwest::Response) -> Result<ServiceStatus, QueryError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status { status, body });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
