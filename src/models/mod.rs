use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tier that produced an offer, ordered by acquisition priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Live,
    Proxy,
    Cache,
    Synthetic,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Live => "live",
            Source::Proxy => "proxy",
            Source::Cache => "cache",
            Source::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nightly price with its currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

/// Coordinates of a property, `(0, 0)` when unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geolocation {
    pub lat: f64,
    pub lng: f64,
}

impl Geolocation {
    pub fn is_unknown(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

/// Marks fields whose values were substituted by a heuristic rather than read from a page.
///
/// `record` is set when the whole offer was fabricated: every synthetic-tier offer, and
/// live-tier offers the worker generated after its own extraction failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Estimated {
    pub price: bool,
    pub rating: bool,
    pub review_count: bool,
    pub record: bool,
}

impl Estimated {
    pub fn any(&self) -> bool {
        self.price || self.rating || self.review_count || self.record
    }
}

/// Canonical lodging offer handed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub name: String,
    pub price: Price,
    pub rating: f32,
    pub star_class: u8,
    pub review_count: u32,
    pub images: Vec<String>,
    pub address: String,
    pub geolocation: Geolocation,
    pub amenities: BTreeSet<String>,
    pub description: String,
    pub booking_url: String,
    pub source: Source,
    pub scraped_at: DateTime<Utc>,
    pub estimated: Estimated,
}

impl Offer {
    /// Checks the invariants every offer must hold before it reaches a caller.
    pub fn is_well_formed(&self) -> bool {
        let url_ok = url::Url::parse(&self.booking_url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);

        !self.name.trim().is_empty()
            && self.price.amount > 0.0
            && (0.0..=5.0).contains(&self.rating)
            && !self.images.is_empty()
            && url_ok
    }
}

/// Normalized destination key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationQuery {
    /// Destination as typed by the caller, trimmed
    pub raw: String,
    /// First comma-delimited segment
    pub city: String,
    /// Last comma-delimited segment, empty when the destination has a single segment
    pub country: String,
}

impl DestinationQuery {
    /// Splits `"Paris, France"` style input into city and country tokens.
    ///
    /// Returns `None` when the destination is empty after trimming.
    pub fn parse(destination: &str) -> Option<Self> {
        let raw = destination.trim();
        if raw.is_empty() {
            return None;
        }

        let segments: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let city = segments.first().copied().unwrap_or(raw).to_string();
        let country = if segments.len() > 1 {
            segments.last().copied().unwrap_or_default().to_string()
        } else {
            String::new()
        };

        Some(Self {
            raw: raw.to_string(),
            city,
            country,
        })
    }
}
