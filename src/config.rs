use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::scrapers::browser::BrowserOptions;
use crate::scrapers::cache::DEFAULT_PREFIX;
use crate::scrapers::proxy::ProxySettings;
use crate::scrapers::types::DEFAULT_CURRENCY;

/// Live worker subprocess settings
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub enabled: bool,
    pub headless: bool,
    pub use_proxy: bool,
    /// Binary to spawn; the running executable when unset
    pub program: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            use_proxy: false,
            program: None,
            timeout: Duration::from_secs(180),
        }
    }
}

/// Everything needed to assemble the tier chain
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub live: LiveSettings,
    pub proxy: ProxySettings,
    pub proxy_timeout: Duration,
    pub cache_dirs: Vec<PathBuf>,
    pub cache_prefix: String,
    pub cache_timeout: Duration,
    pub synthetic_timeout: Duration,
    pub currency: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            live: LiveSettings::default(),
            proxy: ProxySettings::default(),
            proxy_timeout: Duration::from_secs(150),
            cache_dirs: vec![PathBuf::from(".")],
            cache_prefix: DEFAULT_PREFIX.to_string(),
            cache_timeout: Duration::from_secs(5),
            synthetic_timeout: Duration::from_secs(5),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl AcquisitionConfig {
    /// Defaults overlaid with whatever `LODGING_*` and `SCRAPER_API_KEY` variables are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(key) = var("SCRAPER_API_KEY") {
            config.proxy.api_key = key;
        }
        if let Some(endpoint) = var("LODGING_PROXY_ENDPOINT") {
            config.proxy.endpoint = endpoint;
        }
        if let Some(country) = var("LODGING_PROXY_COUNTRY") {
            config.proxy.country_code = country;
        }
        if let Some(secs) = parsed::<u64>("LODGING_PROXY_TIMEOUT_SECS")? {
            config.proxy_timeout = Duration::from_secs(secs);
        }
        let retry_budget = config.proxy.retry.worst_case(config.proxy.request_timeout);
        if retry_budget > config.proxy_timeout {
            warn!(
                "Proxy tier timeout {:?} is shorter than its retry budget {:?}",
                config.proxy_timeout, retry_budget
            );
        }

        if let Some(dirs) = env::var_os("LODGING_CACHE_DIRS") {
            config.cache_dirs = env::split_paths(&dirs).collect();
        }
        if let Some(prefix) = var("LODGING_CACHE_PREFIX") {
            config.cache_prefix = prefix;
        }

        if let Some(enabled) = flag("LODGING_LIVE_ENABLED")? {
            config.live.enabled = enabled;
        }
        if let Some(headless) = flag("LODGING_HEADLESS")? {
            config.live.headless = headless;
        }
        config.live.use_proxy = var("LODGING_BROWSER_PROXY").is_some();
        if let Some(program) = var("LODGING_WORKER_BIN") {
            config.live.program = Some(PathBuf::from(program));
        }
        if let Some(secs) = parsed::<u64>("LODGING_LIVE_TIMEOUT_SECS")? {
            config.live.timeout = Duration::from_secs(secs);
        }

        if let Some(currency) = var("LODGING_CURRENCY") {
            config.currency = currency.to_uppercase();
        }

        Ok(config)
    }
}

/// Browser settings for a worker process.
///
/// The proxy server is only used when the coordinator passed the proxy flag.
pub fn browser_options(headless: bool, use_proxy: bool) -> Result<BrowserOptions> {
    let mut options = BrowserOptions {
        headless,
        ..BrowserOptions::default()
    };

    if use_proxy {
        options.proxy_server = var("LODGING_BROWSER_PROXY");
    }
    if let Some(secs) = parsed::<u64>("LODGING_SETTLE_SECS")? {
        options.settle_delay = Duration::from_secs(secs.clamp(3, 5));
    }

    Ok(options)
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|v| v.parse::<T>().with_context(|| format!("Invalid value for {key}: {v}")))
        .transpose()
}

fn flag(key: &str) -> Result<Option<bool>> {
    var(key)
        .map(|v| parse_flag(&v).with_context(|| format!("Invalid value for {key}: {v}")))
        .transpose()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
