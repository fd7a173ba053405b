//! HTTP implementation of the remote store contract

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{EntityKind, SyncRecord};

use super::remote::{ConnectivityProbe, FetchWindow, PushOutcome, RemoteStore};

const PROBE_TIMEOUT_SECS: u64 = 4;
const FETCH_PAGE_SIZE: usize = 200;

/// Remote endpoint configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Server base URL (e.g. `https://fleet.example.com`)
    pub base_url: String,
    /// Bearer token, when the server requires one
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    /// Create a configuration, validating and normalizing the base URL.
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidInput(
                "server URL must include http:// or https://".to_string(),
            ));
        }
        Ok(Self {
            base_url,
            auth_token,
        })
    }
}

/// Remote store for one entity type over the server's REST listing/push
/// endpoints.
pub struct HttpRemoteStore<R> {
    client: reqwest::Client,
    config: RemoteConfig,
    entity: EntityKind,
    _marker: PhantomData<fn() -> R>,
}

impl<R> HttpRemoteStore<R> {
    /// Create a remote store for `entity`.
    pub fn new(config: RemoteConfig, entity: EntityKind) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            config,
            entity,
            _marker: PhantomData,
        })
    }

    fn listing_url(&self) -> String {
        format!("{}/v1/{}", self.config.base_url, self.entity.key())
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl<R> RemoteStore<R> for HttpRemoteStore<R>
where
    R: SyncRecord + Serialize + DeserializeOwned,
{
    async fn fetch_all(&self, window: FetchWindow) -> Result<Vec<R>> {
        let mut records = Vec::new();
        let mut offset = 0_usize;

        loop {
            let mut request = self
                .with_auth(self.client.get(self.listing_url()))
                .query(&[("limit", FETCH_PAGE_SIZE), ("offset", offset)]);
            if let FetchWindow::Since(since) = window {
                request = request.query(&[("updated_since", since)]);
            }

            let response = request.send().await?;
            let page: Vec<R> = check_status(response).await?.json().await?;
            let page_len = page.len();
            records.extend(page);

            if page_len < FETCH_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        tracing::debug!(
            "Fetched {} remote {} record(s)",
            records.len(),
            self.entity
        );
        Ok(records)
    }

    async fn push(&self, record: &R) -> Result<PushOutcome<R>> {
        let url = format!("{}/{}", self.listing_url(), record.record_id());
        let response = self
            .with_auth(self.client.post(url))
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Ok(PushOutcome::Rejected {
                message: parse_api_error(status, &body),
            });
        }

        let updated = check_status(response).await?.json::<R>().await?;
        Ok(PushOutcome::Accepted(updated))
    }
}

/// Connectivity probe against the server's health endpoint.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe for the configured server.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
                .build()?,
            url: format!("{}/v1/health", config.base_url),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!("Connectivity probe failed: {error}");
                false
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = parse_api_error(status, &body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(Error::Authentication(message))
    } else {
        Err(Error::Network(message))
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

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
