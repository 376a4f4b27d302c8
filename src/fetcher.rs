use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, StatusCode};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{info, warn};
use url::Url;

use crate::settings::Settings;

const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 120_000;

/// Loads pages: rendered through spider.cloud when an API key is set,
/// otherwise a plain GET.
pub struct Fetcher {
    client: Client,
    spider: Option<Spider>,
    max_retries: u32,
}

/// One failed attempt and whether trying again could help.
#[derive(Debug)]
struct Failure {
    message: String,
    retryable: bool,
}

impl Failure {
    fn fatal(message: impl Into<String>) -> Self {
        Failure {
            message: message.into(),
            retryable: false,
        }
    }

    fn from_status(status: u16) -> Self {
        Failure {
            message: format!("HTTP status {}", status),
            retryable: is_retryable_status(status),
        }
    }
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(&settings.user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        let spider = match &settings.spider_api_key {
            Some(key) => Some(
                Spider::new(Some(key.clone()))
                    .map_err(|e| anyhow!("Failed to create Spider client: {}", e))?,
            ),
            None => None,
        };

        Ok(Fetcher {
            client,
            spider,
            max_retries: settings.max_retries,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// HTML of `url`, retrying rate limits and server errors with exponential backoff.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let outcome = match &self.spider {
                Some(spider) => render(spider, url).await,
                None => self.get(url).await,
            };

            match outcome {
                Ok(html) => {
                    info!(
                        "Fetched {} ({} bytes) in {}ms",
                        url,
                        html.len(),
                        start.elapsed().as_millis()
                    );
                    return Ok(html);
                }
                Err(f) if f.retryable && attempt < self.max_retries => {
                    let backoff = backoff_for(attempt);
                    warn!(
                        "{} on {} (attempt {}/{}), backing off {:.1}s",
                        f.message,
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(f) => bail!("Failed to fetch {}: {}", url, f.message),
            }
        }
    }

    async fn get(&self, url: &str) -> Result<String, Failure> {
        let response = self.client.get(url).send().await.map_err(|e| Failure {
            retryable: e.is_timeout() || e.is_connect(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::from_status(status.as_u16()));
        }

        response.text().await.map_err(|e| Failure::fatal(e.to_string()))
    }
}

async fn render(spider: &Spider, url: &str) -> Result<String, Failure> {
    let params = RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        ..Default::default()
    };

    let response = spider
        .scrape_url(url, Some(params), "application/json")
        .await
        .map_err(|e| {
            let message = e.to_string();
            Failure {
                retryable: is_retryable_message(&message),
                message,
            }
        })?;

    let parsed: serde_json::Value = match response.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
        None => response,
    };
    let first = parsed.as_array().and_then(|arr| arr.first());

    let status = first
        .and_then(|obj| obj.get("status"))
        .and_then(|s| s.as_u64())
        .map(|s| s as u16);
    if let Some(status) = status.filter(|s| *s >= 400) {
        return Err(Failure::from_status(status));
    }

    first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| Failure::fatal("No content in spider response"))
}

fn is_retryable_status(status: u16) -> bool {
    StatusCode::from_u16(status)
        .map(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
        .unwrap_or(false)
}

fn is_retryable_message(message: &str) -> bool {
    ["429", "rate", "500", "502", "503", "504"]
        .iter()
        .any(|needle| message.contains(needle))
}

fn backoff_for(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid URL: {}", raw))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme {:?} in {}", url.scheme(), raw);
    }
    if url.host_str().map_or(true, str::is_empty) {
        bail!("URL has no host: {}", raw);
    }
    Ok(url)
}
