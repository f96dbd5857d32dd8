//! Account lookup REST client
//!
//! - `GET /account-lookup/{partyType}/{partyId}?currency=` → `{"fspId": "..."}`, or 404
//! - `POST /account-lookup/bulk` with `{key: request}` → `{key: fspId | null}`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

use quoting_domain::FspId;

use crate::ports::{AccountLookupRequest, AccountLookupService, ConnectorError};

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    fsp_id: Option<FspId>,
}

/// HTTP adapter for [`AccountLookupService`].
pub struct HttpAccountLookupClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl HttpAccountLookupClient {
    /// Create a client for the account lookup service at `base_url`.
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

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String), ConnectorError> {
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = timeout(self.request_timeout, builder.send())
            .await
            .map_err(|_| ConnectorError::Timeout)?
            .map_err(|e| ConnectorError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ConnectorError::ParseError(e.to_string()))?;
        Ok((status, body))
    }
}

#[async_trait]
impl AccountLookupService for HttpAccountLookupClient {
    async fn lookup(
        &self,
        request: &AccountLookupRequest,
    ) -> Result<Option<FspId>, ConnectorError> {
        let url = format!(
            "{}/account-lookup/{}/{}",
            self.base_url, request.party_type, request.party_id
        );
        let mut builder = self.client.get(&url);
        if let Some(currency) = &request.currency {
            builder = builder.query(&[("currency", currency)]);
        }

        let (status, body) = self.send(builder).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ConnectorError::ApiError { status: status.as_u16(), msg: body });
        }

        let parsed: LookupResponse =
            serde_json::from_str(&body).map_err(|e| ConnectorError::ParseError(e.to_string()))?;
        Ok(parsed.fsp_id)
    }

    async fn bulk_lookup(
        &self,
        requests: &HashMap<String, AccountLookupRequest>,
    ) -> Result<HashMap<String, Option<FspId>>, ConnectorError> {
        if requests.is_empty() {
            return Ok(HashMap::new());
        }
        tracing::debug!(count = requests.len(), "Bulk account lookup");

        let url = format!("{}/account-lookup/bulk", self.base_url);
        let (status, body) = self.send(self.client.post(&url).json(requests)).await?;
        if !status.is_success() {
            return Err(ConnectorError::ApiError { status: status.as_u16(), msg: body });
        }

        serde_json::from_str(&body).map_err(|e| ConnectorError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/account-lookup/MSISDN/123"))
            .and(query_param("currency", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"fspId": "payeefsp"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpAccountLookupClient::new(server.uri(), None);
        let request = AccountLookupRequest::new("123", "MSISDN", Some("USD".to_string()));

        assert_eq!(client.lookup(&request).await.unwrap().as_deref(), Some("payeefsp"));
    }

    #[tokio::test]
    async fn test_lookup_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpAccountLookupClient::new(server.uri(), None);
        let request = AccountLookupRequest::new("999", "MSISDN", None);
        assert_eq!(client.lookup(&request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bulk_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/account-lookup/bulk"))
            .and(body_json(json!({
                "q1": {"partyId": "111", "partyType": "MSISDN", "currency": "USD"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"q1": "payeefsp"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpAccountLookupClient::new(server.uri(), None);
        let mut requests = HashMap::new();
        requests.insert(
            "q1".to_string(),
            AccountLookupRequest::new("111", "MSISDN", Some("USD".to_string())),
        );

        let result = client.bulk_lookup(&requests).await.unwrap();
        assert_eq!(result.get("q1").cloned().flatten().as_deref(), Some("payeefsp"));
    }

    #[tokio::test]
    async fn test_bulk_lookup_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpAccountLookupClient::new(server.uri(), None);
        let mut requests = HashMap::new();
        requests.insert("q1".to_string(), AccountLookupRequest::new("1", "MSISDN", None));

        assert!(client.bulk_lookup(&requests).await.is_err());
    }
}
