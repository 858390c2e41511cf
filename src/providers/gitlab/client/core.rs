use log::{debug, warn};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::GitLabConfig;
use crate::error::{ExporterError, Result};

const PAGE_SIZE: usize = 100;
const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// GitLab REST v4 client shared by every task.
pub struct GitLabClient {
    client: Client,
    api_url: Url,
    sign_in_url: Url,
    token: Option<String>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    retry_delay: Duration,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cilens-exporter/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(&config.url)
            .map_err(|e| ExporterError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| ExporterError::Config(format!("Invalid API base URL: {e}")))?;
        let sign_in_url = format!("{}/users/sign_in", config.url.trim_end_matches('/'));
        let sign_in_url = Url::parse(&sign_in_url)
            .map_err(|e| ExporterError::Config(format!("Invalid sign-in URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            sign_in_url,
            token: config.token.clone(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        })
    }

    /// Whether the instance serves its sign-in page within five seconds.
    pub async fn is_reachable(&self) -> bool {
        let request = self.client.get(self.sign_in_url.clone()).timeout(READINESS_TIMEOUT);
        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("GitLab readiness check got status {}", response.status());
                false
            }
            Err(e) => {
                warn!("GitLab is unreachable: {e}");
                false
            }
        }
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    /// `projects/<url-encoded path>/<path>` under the API root.
    pub(super) fn project_url(&self, project: &str, path: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/{path}", urlencoding::encode(project)))
            .map_err(|e| ExporterError::Config(format!("Invalid project URL: {e}")))
    }

    pub(super) fn api_url(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| ExporterError::Config(format!("Invalid API URL: {e}")))
    }

    pub(super) async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.get(url).await?.json().await?)
    }

    /// Follows `X-Next-Page` until the last page.
    pub(super) async fn get_paginated<T>(&self, url: Url) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page = String::from("1");

        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page);

            let response = self.get(page_url).await?;
            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .unwrap_or_default()
                .to_string();

            let mut batch: Vec<T> = response.json().await?;
            items.append(&mut batch);

            if next_page.is_empty() {
                break;
            }
            page = next_page;
        }

        Ok(items)
    }

    /// GET with automatic retry on network errors, rate limits and server errors.
    async fn get(&self, url: Url) -> Result<Response> {
        // One permit per logical request, retries included
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ExporterError::Config(format!("Request limiter closed: {e}")))?;

        let mut retry_count = 0;
        loop {
            debug!("GET {url}");
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    if retry_count >= self.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {}s ({}/{})...",
                        e,
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == 429 || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(ExporterError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.max_retries,
                    });
                }

                warn!(
                    "GitLab API error (status {status}). Waiting {} seconds before retry {}/{}...",
                    self.retry_delay.as_secs(),
                    retry_count + 1,
                    self.max_retries
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(ExporterError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(response);
        }
    }
}
