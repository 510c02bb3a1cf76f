//! HTTP client for the Dhan REST API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BrokerConfig;

/// Production Dhan HTTP API endpoint.
const BASE_HTTP_API_URL: &str = "https://api.dhan.co/v2";

/// Default HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Dhan API error.
#[derive(Debug, Error)]
#[error("dhan api error {code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credential rejected (401/403). Surfaced distinctly so callers can
    /// log it apart from transient failures.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Configuration for creating a new Client.
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(client_id: String, access_token: String) -> Self {
        Self {
            base_url: BASE_HTTP_API_URL.to_string(),
            client_id,
            access_token,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client for the Dhan REST API.
/// Handles header-token authentication, bounded timeouts, and error-body
/// parsing. No retries: one request per call.
pub struct Client {
    config: ClientConfig,
    http_client: HttpClient,
}

impl Client {
    /// Creates a new Dhan API client.
    pub fn new(config: ClientConfig) -> Self {
        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build http client");

        Self {
            config,
            http_client,
        }
    }

    /// Creates a new Dhan API client from broker config.
    pub fn from_config(broker_config: &BrokerConfig) -> Self {
        let mut config = ClientConfig::new(
            broker_config.client_id.clone(),
            broker_config.access_token.clone(),
        );
        if let Some(ref base_url) = broker_config.base_url {
            config.base_url = base_url.clone();
        }
        if !broker_config.timeout.is_zero() {
            config.timeout = broker_config.timeout;
        }
        Self::new(config)
    }

    /// The client id the broker expects inside order payloads.
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Sends a single HTTP request to the Dhan API.
    ///
    /// Every request carries the access token; Dhan has no unauthenticated
    /// endpoints we care about. The optional body is sent as JSON.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.config.base_url, endpoint);

        let mut headers = HeaderMap::new();
        headers.insert(
            "access-token",
            HeaderValue::from_str(&self.config.access_token)
                .map_err(|_| ClientError::Unauthorized("access token is not a valid header value".into()))?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let mut request = self.http_client.request(method.clone(), &url).headers(headers);

        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(method = %method, endpoint = %endpoint, "sending request");

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(self.parse_error_response(status, &body));
        }

        Ok(body.to_vec())
    }

    /// Creates a ClientError from an error response.
    fn parse_error_response(&self, status: StatusCode, body: &[u8]) -> ClientError {
        #[derive(Deserialize)]
        struct ErrorResponse {
            #[serde(alias = "errorCode")]
            code: Option<String>,
            #[serde(alias = "errorMessage")]
            message: Option<String>,
        }

        let api_err = match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(resp) => ApiError {
                code: resp.code.unwrap_or_else(|| status.as_u16().to_string()),
                message: resp
                    .message
                    .unwrap_or_else(|| String::from_utf8_lossy(body).to_string()),
            },
            Err(_) => ApiError {
                code: status.as_u16().to_string(),
                message: String::from_utf8_lossy(body).to_string(),
            },
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ClientError::Unauthorized(api_err.to_string());
        }

        warn!(code = %api_err.code, message = %api_err.message, "api error");

        ClientError::Api(api_err)
    }
}
