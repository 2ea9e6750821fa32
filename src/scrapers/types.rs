use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{DestinationQuery, Estimated, Geolocation};

pub const DEFAULT_MAX_OFFERS: usize = 10;
pub const DEFAULT_CURRENCY: &str = "USD";

/// Stay window, ISO-8601 dates on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// Tonight through tomorrow morning
    pub fn tonight() -> Self {
        let today = Utc::now().date_naive();
        Self::new(today, today + Duration::days(1))
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::tonight()
    }
}

/// Party composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub adults: u32,
    pub rooms: u32,
}

impl Default for Party {
    fn default() -> Self {
        Self { adults: 2, rooms: 1 }
    }
}

/// Everything a tier needs to look up offers for one call
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub destination: DestinationQuery,
    pub stay: DateRange,
    pub party: Party,
    pub max_offers: usize,
    pub currency: String,
}

impl SearchRequest {
    pub fn new(destination: DestinationQuery) -> Self {
        Self {
            destination,
            stay: DateRange::default(),
            party: Party::default(),
            max_offers: DEFAULT_MAX_OFFERS,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_stay(mut self, stay: Option<DateRange>) -> Self {
        if let Some(stay) = stay {
            self.stay = stay;
        }
        self
    }

    pub fn with_party(mut self, party: Option<Party>) -> Self {
        if let Some(party) = party {
            self.party = party;
        }
        self
    }

    /// Caps the result size, never below one offer
    pub fn with_max_offers(mut self, max_offers: Option<usize>) -> Self {
        self.max_offers = max_offers.unwrap_or(DEFAULT_MAX_OFFERS).max(1);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// Offer as a tier produced it, before validation.
///
/// Cache files written by earlier scraper generations use several shapes, so every field is
/// optional and a few legacy spellings are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOffer {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub rating: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub stars: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub review_count: Option<f64>,
    pub images: Vec<String>,
    /// Single-image shape used by some older result files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(alias = "link", alias = "url")]
    pub booking_url: Option<String>,
    pub address: Option<String>,
    pub location: Option<Geolocation>,
    pub amenities: Vec<String>,
    pub description: Option<String>,
    pub scraped_at: Option<String>,
    /// Free-form provenance label written by the producer; informational only
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<RawDetails>,
    pub estimated: Estimated,
}

/// Nested `details` block of older result files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDetails {
    #[serde(deserialize_with = "lenient_number")]
    pub review_count: Option<f64>,
    pub address: Option<String>,
    pub photos: Vec<String>,
}

impl RawOffer {
    /// Review count from the top level or the legacy `details` block
    pub fn review_count(&self) -> Option<f64> {
        self.review_count
            .or_else(|| self.details.as_ref().and_then(|d| d.review_count))
    }

    pub fn address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| self.details.as_ref().and_then(|d| d.address.as_deref()))
    }

    /// All image URLs in order: `images`, then `image`, then `details.photos`
    pub fn image_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.images.clone();
        urls.extend(self.image.clone());
        if let Some(details) = &self.details {
            urls.extend(details.photos.iter().cloned());
        }

        let mut seen = std::collections::HashSet::new();
        urls.into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect()
    }
}

/// Accepts `120`, `120.5`, `"120"`, `"$1,240"` or `"4.5/5"`; anything else becomes `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => parse_leading_number(&s),
        _ => None,
    })
}

fn parse_leading_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}
