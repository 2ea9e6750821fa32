use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TierError;
use crate::links::search_url;
use crate::models::Source;
use crate::scrapers::extract::CardExtractor;
use crate::scrapers::traits::OfferTier;
use crate::scrapers::types::{RawOffer, SearchRequest};

pub const DEFAULT_ENDPOINT: &str = "https://api.scraperapi.com/";
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Wait before attempt `attempt + 1`, given `attempt` attempts already failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Longest a full retry sequence can take when every attempt runs to `per_attempt`.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        (1..attempts).fold(per_attempt.saturating_mul(attempts), |total, attempt| {
            total.saturating_add(self.delay_after(attempt))
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Rendering-proxy connection settings
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub endpoint: String,
    pub api_key: String,
    pub country_code: String,
    pub render: bool,
    pub premium: bool,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            country_code: "us".to_string(),
            render: true,
            premium: true,
            request_timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
        }
    }
}

enum Failure {
    Retryable(TierError),
    Fatal(TierError),
}

/// Client for the remote rendering proxy
pub struct ProxyClient {
    client: Client,
    settings: ProxySettings,
}

impl ProxyClient {
    pub fn new(settings: ProxySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, settings })
    }

    pub fn is_configured(&self) -> bool {
        !self.settings.api_key.trim().is_empty()
    }

    /// Proxy request URL for `target`; carries the API key, so never log it.
    pub fn request_url(&self, target: &Url) -> Result<Url, TierError> {
        let mut url = Url::parse(&self.settings.endpoint)
            .map_err(|e| TierError::Unavailable(format!("invalid proxy endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api_key", &self.settings.api_key)
            .append_pair("url", target.as_str())
            .append_pair("render", bool_param(self.settings.render))
            .append_pair("premium", bool_param(self.settings.premium))
            .append_pair("country_code", &self.settings.country_code);
        Ok(url)
    }

    /// Fetches the rendered page, retrying transport errors, 429 and 5xx with backoff.
    pub async fn fetch_page(&self, target: &Url) -> Result<String, TierError> {
        if !self.is_configured() {
            return Err(TierError::Unavailable("no proxy API key configured".into()));
        }
        let request_url = self.request_url(target)?;
        let retry = &self.settings.retry;
        let max_attempts = retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Proxy attempt {}/{} for {}", attempt, max_attempts, target);

            match self.attempt(&request_url).await {
                Ok(body) => {
                    info!("✅ Proxy returned {} bytes for {}", body.len(), target);
                    return Ok(body);
                }
                Err(Failure::Fatal(err)) => {
                    warn!("Proxy request failed permanently: {}", err);
                    return Err(err);
                }
                Err(Failure::Retryable(err)) if attempt >= max_attempts => {
                    warn!("Proxy gave up after {} attempts: {}", attempt, err);
                    return Err(err);
                }
                Err(Failure::Retryable(err)) => {
                    let delay = retry.delay_after(attempt);
                    warn!("Proxy attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, request_url: &Url) -> Result<String, Failure> {
        let response = self
            .client
            .get(request_url.clone())
            .send()
            .await
            .map_err(|e| Failure::Retryable(TierError::Transport(e.without_url().to_string())))?;

        let status = response.status();
        if status == StatusCode::OK {
            return response
                .text()
                .await
                .map_err(|e| Failure::Retryable(TierError::Transport(e.without_url().to_string())));
        }

        let err = TierError::Transport(format!("proxy returned status {status}"));
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(Failure::Retryable(err))
        } else {
            Err(Failure::Fatal(err))
        }
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Proxy tier: fetch the search page through the rendering proxy and extract its cards.
pub struct ProxyTier {
    client: ProxyClient,
    extractor: CardExtractor,
}

impl ProxyTier {
    pub fn new(settings: ProxySettings) -> Result<Self> {
        Ok(Self {
            client: ProxyClient::new(settings)?,
            extractor: CardExtractor::new()?,
        })
    }
}

#[async_trait]
impl OfferTier for ProxyTier {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawOffer>, TierError> {
        let target = search_url(request);
        info!("Fetching {} through rendering proxy", target);

        let body = self.client.fetch_page(&target).await?;
        let mut rng = rand::thread_rng();
        Ok(self.extractor.extract(&body, request, &mut rng))
    }

    fn source(&self) -> Source {
        Source::Proxy
    }
}
