//! reqwest-backed implementation of the sync API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::transport::{
    DownloadRequest, DownloadResponse, ResolveConflictRequest, StateRequest, StateResponse,
    StoreStateRequest, SyncTransport, UploadRequest, UploadResponse,
};
use crate::error::{Error, Result};
use crate::models::SyncCheckpoint;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    FetchState,
    StoreState,
    Upload,
    Download,
    ResolveConflict,
}

impl Endpoint {
    fn route(self) -> (Method, &'static str) {
        match self {
            Self::FetchState => (Method::POST, "/sync/state"),
            Self::StoreState => (Method::PUT, "/sync/state"),
            Self::Upload => (Method::POST, "/sync/upload"),
            Self::Download => (Method::POST, "/sync/download"),
            Self::ResolveConflict => (Method::POST, "/sync/resolve-conflict"),
        }
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport for the API rooted at `base_url` (e.g. `https://app.example.com/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            access_token: None,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = normalize_text_option(Some(token.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        endpoint: Endpoint,
        body: &B,
    ) -> Result<reqwest::Response> {
        let (method, path) = endpoint.route();
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api(format!(
            "{path}: {}",
            parse_api_error(status, &body)
        )))
    }

    async fn send_json<B, R>(&self, endpoint: Endpoint, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self.send(endpoint, body).await?;
        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn fetch_state(&self, device_id: &str, tenant_id: &str) -> Result<SyncCheckpoint> {
        let response: StateResponse = self
            .send_json(
                Endpoint::FetchState,
                &StateRequest {
                    device_id,
                    tenant_id,
                },
            )
            .await?;
        Ok(response.into_checkpoint(device_id, tenant_id))
    }

    async fn store_state(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        self.send(
            Endpoint::StoreState,
            &StoreStateRequest {
                device_id: &checkpoint.device_id,
                tenant_id: &checkpoint.tenant_id,
                last_sync_generation: checkpoint.last_sync_generation,
            },
        )
        .await?;
        Ok(())
    }

    async fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadResponse> {
        self.send_json(Endpoint::Upload, request).await
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        self.send_json(Endpoint::Download, request).await
    }

    async fn resolve_conflict(&self, request: &ResolveConflictRequest) -> Result<()> {
        self.send(Endpoint::ResolveConflict, request).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("sync API base URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "sync API base URL must include http:// or https://".to_string(),
        ))
    }
}
