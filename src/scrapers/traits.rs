use async_trait::async_trait;

use crate::error::TierError;
use crate::models::Source;
use crate::scrapers::types::{RawOffer, SearchRequest};

/// One acquisition strategy in the coordinator's fallback chain.
///
/// Tiers return raw, unvalidated records; the coordinator normalizes them and tags them
/// with [`OfferTier::source`].
#[async_trait]
pub trait OfferTier: Send + Sync {
    /// Fetch offers for the request
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawOffer>, TierError>;

    /// Provenance label stamped on every offer this tier yields
    fn source(&self) -> Source;
}
