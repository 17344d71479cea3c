//! HTTP fetcher for result pages
//!
//! reqwest client with a direct governor rate limiter shared by every source
//! that goes through it. Only status and body are surfaced to the pipeline;
//! non-2xx responses are returned, not raised, so block detection can look at them.

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::services::{FetchedPage, PageFetcher};
use crate::infrastructure::config::HttpConfig;
use crate::infrastructure::pipeline_error::FetchError;

pub struct HttpFetcher {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn request_headers(url: &str, headers: &[(String, String)]) -> Result<HeaderMap, FetchError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("bad header name {name}: {e}"),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("bad header value for {name}: {e}"),
            })?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedPage, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let extra = Self::request_headers(url, headers)?;

        self.rate_limiter.until_ready().await;
        info!("Fetching URL: {}", url);

        let response = self
            .client
            .get(parsed)
            .headers(extra)
            .send()
            .await
            .map_err(|e| classify(url, self.config.timeout_secs, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify(url, self.config.timeout_secs, e))?;

        debug!("Fetched {} ({}, {} bytes)", url, status, body.len());
        Ok(FetchedPage { status, body })
    }
}

fn classify(url: &str, timeout_secs: u64, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_secs,
        }
    } else if error.is_builder() {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        FetchError::transport(url, error)
    }
}
