//! Participants REST client
//!
//! Queries the participant registry:
//! - `GET /participants?fspId={id}` → one participant, or 404
//! - `GET /participants?fspIds={a,b}` → array of the known participants

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;

use quoting_domain::Participant;

use crate::ports::{ConnectorError, ParticipantService};

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HTTP adapter for [`ParticipantService`].
pub struct HttpParticipantClient {
    /// HTTP client
    client: Client,
    /// Registry base URL, without trailing slash
    base_url: String,
    /// Optional bearer token
    token: Option<String>,
    request_timeout: Duration,
}

impl HttpParticipantClient {
    /// Create a client for the registry at `base_url`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a GET and decode the body. A 404 yields `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ConnectorError> {
        let url = format!("{}/participants", self.base_url);
        let request = self.authorize(self.client.get(&url).query(query));

        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| ConnectorError::Timeout)?
            .map_err(|e| ConnectorError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.map_err(|e| ConnectorError::ParseError(e.to_string()))?;
        if !status.is_success() {
            return Err(ConnectorError::ApiError { status: status.as_u16(), msg: body });
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ConnectorError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl ParticipantService for HttpParticipantClient {
    async fn get_participant(&self, fsp_id: &str) -> Result<Option<Participant>, ConnectorError> {
        tracing::debug!(fsp_id, "Fetching participant");
        self.get_json(&[("fspId", fsp_id.to_string())]).await
    }

    async fn get_participants(
        &self,
        fsp_ids: &[String],
    ) -> Result<Vec<Participant>, ConnectorError> {
        if fsp_ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = fsp_ids.len(), "Fetching participants");
        let found: Option<Vec<Participant>> =
            self.get_json(&[("fspIds", fsp_ids.join(","))]).await?;
        Ok(found.unwrap_or_default())
    }
}
