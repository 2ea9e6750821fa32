use std::ffi::OsStr;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::links::search_url;
use crate::scrapers::extract::CardExtractor;
use crate::scrapers::proxy::USER_AGENT;
use crate::scrapers::types::{RawOffer, SearchRequest};

pub const VIEWPORT: (u32, u32) = (1366, 768);

/// Flags for running Chrome inside containers and other restricted sandboxes
const CHROME_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

/// The sign-in banner shown to anonymous visitors on top of the results
const DISMISS_INTERSTITIAL: &str = r#"
    (() => {
        const button = document.querySelector('button[aria-label="Dismiss sign-in info."], button[aria-label*="Dismiss"]');
        if (button) { button.click(); return true; }
        return false;
    })()
"#;

const SCROLL_TO_MIDDLE: &str = "window.scrollTo(0, document.body.scrollHeight / 2)";

/// Launch and pacing settings for the live browser
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Upstream proxy Chrome should route through, e.g. `http://host:port`
    pub proxy_server: Option<String>,
    pub navigation_timeout: Duration,
    /// Pause after the scroll so lazily rendered cards can appear
    pub settle_delay: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy_server: None,
            navigation_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(4),
        }
    }
}

/// Browser-based scraper for search results using headless Chrome
pub struct LiveBrowserScraper {
    browser: Browser,
    extractor: CardExtractor,
    options: BrowserOptions,
}

impl LiveBrowserScraper {
    /// Launch a browser configured to look like an ordinary desktop Chrome
    pub fn launch(options: BrowserOptions) -> Result<Self> {
        info!("Launching headless Chrome (headless: {})...", options.headless);

        let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
        let launch_options = LaunchOptions::default_builder()
            .headless(options.headless)
            .sandbox(false)
            .window_size(Some(VIEWPORT))
            .args(args)
            .proxy_server(options.proxy_server.as_deref())
            .idle_browser_timeout(options.navigation_timeout * 2)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(launch_options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            extractor: CardExtractor::new()?,
            options,
        })
    }

    /// Load the search-results page and extract up to `request.max_offers` cards.
    ///
    /// One scroll and one fixed settle delay; there is no retry loop here.
    pub fn scrape(&self, request: &SearchRequest) -> Result<Vec<RawOffer>> {
        let url = search_url(request);
        let tab = self.browser.new_tab().context("Failed to open tab")?;
        tab.set_default_timeout(self.options.navigation_timeout);

        tab.enable_stealth_mode()
            .context("Failed to patch automation fingerprint")?;
        tab.set_user_agent(USER_AGENT, Some("en-US,en;q=0.9"), Some("MacIntel"))
            .context("Failed to set user agent")?;

        info!("Opening search page for {}...", request.destination.raw);
        debug!("Navigating to {}", url);
        tab.navigate_to(url.as_str())?;
        tab.wait_until_navigated()?;
        self.wait_for_idle(&tab)?;

        if let Err(e) = tab.evaluate(SCROLL_TO_MIDDLE, false) {
            debug!("Scroll failed: {}", e);
        }
        info!("Waiting {:?} for lazy content...", self.options.settle_delay);
        thread::sleep(self.options.settle_delay);

        match tab.evaluate(DISMISS_INTERSTITIAL, false) {
            Ok(result) if result.value == Some(serde_json::Value::Bool(true)) => {
                debug!("Dismissed sign-in interstitial");
            }
            Ok(_) => {}
            Err(e) => debug!("Interstitial check failed: {}", e),
        }

        let html_result = tab.evaluate("document.documentElement.outerHTML", false)?;
        let html = match html_result.value {
            Some(value) => value.as_str().unwrap_or_default().to_string(),
            None => {
                warn!("Could not get HTML from page");
                String::new()
            }
        };

        if html.is_empty() {
            bail!("search page rendered no HTML");
        }
        debug!("Captured {} bytes of rendered HTML", html.len());

        let mut rng = rand::thread_rng();
        Ok(self.extractor.extract(&html, request, &mut rng))
    }

    /// Polls until the document reports itself complete, standing in for a network-idle
    /// signal.
    fn wait_for_idle(&self, tab: &Tab) -> Result<()> {
        let deadline = Instant::now() + self.options.navigation_timeout;
        loop {
            let state = tab.evaluate("document.readyState", false)?;
            if state.value.as_ref().and_then(|v| v.as_str()) == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("page never finished loading");
            }
            thread::sleep(Duration::from_millis(250));
        }
    }
}
