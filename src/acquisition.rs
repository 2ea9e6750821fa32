use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, TierError};
use crate::models::{DestinationQuery, Offer, Source};
use crate::scrapers::cache::{CacheScanner, CacheTier};
use crate::scrapers::normalizer::normalize;
use crate::scrapers::proxy::ProxyTier;
use crate::scrapers::synthetic::SyntheticTier;
use crate::scrapers::traits::OfferTier;
use crate::scrapers::types::{DateRange, Party, SearchRequest, DEFAULT_CURRENCY};
use crate::scrapers::worker::LiveScrapeTier;

struct TierSlot {
    tier: Arc<dyn OfferTier>,
    timeout: Duration,
}

/// Runs the tier chain for one destination and returns the first non-empty result.
pub struct Acquisition {
    tiers: Vec<TierSlot>,
    currency: String,
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            tiers: Vec::new(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Registers a tier. Attempt order comes from [`OfferTier::source`], not from call order.
    pub fn with_tier(mut self, tier: Arc<dyn OfferTier>, timeout: Duration) -> Self {
        self.tiers.push(TierSlot { tier, timeout });
        self.tiers.sort_by_key(|slot| slot.tier.source());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Builds the standard chain. The proxy tier needs an API key and the live tier can be
    /// switched off; the cache and synthetic tiers are always present.
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self> {
        let mut acquisition = Self::new().with_currency(config.currency.clone());

        if config.live.enabled {
            let program = match &config.live.program {
                Some(program) => program.clone(),
                None => std::env::current_exe().context("Failed to locate worker binary")?,
            };
            let tier = LiveScrapeTier::new(program, config.live.headless, config.live.use_proxy);
            acquisition = acquisition.with_tier(Arc::new(tier), config.live.timeout);
        }

        if config.proxy.api_key.trim().is_empty() {
            info!("No proxy API key configured, skipping proxy tier");
        } else {
            let tier = ProxyTier::new(config.proxy.clone())?;
            acquisition = acquisition.with_tier(Arc::new(tier), config.proxy_timeout);
        }

        let scanner =
            CacheScanner::with_prefix(config.cache_dirs.clone(), config.cache_prefix.clone());
        Ok(acquisition
            .with_tier(Arc::new(CacheTier::new(scanner)), config.cache_timeout)
            .with_tier(Arc::new(SyntheticTier::new()), config.synthetic_timeout))
    }

    /// Sources of the registered tiers, in attempt order
    pub fn sources(&self) -> Vec<Source> {
        self.tiers.iter().map(|slot| slot.tier.source()).collect()
    }

    pub async fn acquire_offers(
        &self,
        destination: &str,
        stay: Option<DateRange>,
        party: Option<Party>,
        max_offers: Option<usize>,
    ) -> Result<Vec<Offer>, AcquisitionError> {
        let query = DestinationQuery::parse(destination).ok_or(AcquisitionError::EmptyDestination)?;
        let request = SearchRequest::new(query)
            .with_stay(stay)
            .with_party(party)
            .with_max_offers(max_offers)
            .with_currency(self.currency.clone());

        self.acquire(&request).await
    }

    /// Tries each tier in order; the first one that normalizes to at least one offer wins.
    pub async fn acquire(&self, request: &SearchRequest) -> Result<Vec<Offer>, AcquisitionError> {
        let destination = &request.destination.raw;
        info!("🔍 Acquiring up to {} offers for {}", request.max_offers, destination);

        for slot in &self.tiers {
            let source = slot.tier.source();
            let started = Instant::now();

            let outcome = match tokio::time::timeout(slot.timeout, slot.tier.fetch(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TierError::Timeout(slot.timeout)),
            };

            match outcome {
                Ok(raw) => {
                    let mut offers = normalize(raw, source, request);
                    offers.retain(Offer::is_well_formed);
                    if offers.is_empty() {
                        info!("{} tier returned nothing usable for {}", source, destination);
                        continue;
                    }
                    info!(
                        "✅ {} offers for {} from {} tier in {:?}",
                        offers.len(),
                        destination,
                        source,
                        started.elapsed()
                    );
                    return Ok(offers);
                }
                Err(e) => {
                    warn!("{} tier failed for {}: {}", source, destination, e);
                }
            }
        }

        Err(AcquisitionError::Exhausted {
            destination: destination.clone(),
        })
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn tiers_are_ordered_by_source() {
        let scanner = CacheScanner::new(vec![PathBuf::from(".")]);
        let acquisition = Acquisition::new()
            .with_tier(Arc::new(SyntheticTier::seeded(1)), Duration::from_secs(5))
            .with_tier(Arc::new(CacheTier::new(scanner)), Duration::from_secs(5));
        assert_eq!(acquisition.sources(), vec![Source::Cache, Source::Synthetic]);
    }

    #[test]
    fn config_without_key_or_live_skips_those_tiers() {
        let mut config = AcquisitionConfig::default();
        config.live.enabled = false;
        let acquisition = Acquisition::from_config(&config).unwrap();
        assert_eq!(acquisition.sources(), vec![Source::Cache, Source::Synthetic]);

        config.proxy.api_key = "key".into();
        config.live.program = Some(PathBuf::from("/usr/bin/true"));
        config.live.enabled = true;
        let acquisition = Acquisition::from_config(&config).unwrap();
        assert_eq!(
            acquisition.sources(),
            vec![Source::Live, Source::Proxy, Source::Cache, Source::Synthetic]
        );
    }

    #[tokio::test]
    async fn blank_destination_is_rejected() {
        let acquisition = Acquisition::new()
            .with_tier(Arc::new(SyntheticTier::seeded(1)), Duration::from_secs(5));
        assert!(matches!(
            acquisition.acquire_offers("  ", None, None, None).await,
            Err(AcquisitionError::EmptyDestination)
        ));
    }

    #[tokio::test]
    async fn no_tiers_means_exhausted() {
        let result = Acquisition::new()
            .acquire_offers("Oslo, Norway", None, None, Some(3))
            .await;
        assert!(matches!(result, Err(AcquisitionError::Exhausted { .. })));
    }
}
