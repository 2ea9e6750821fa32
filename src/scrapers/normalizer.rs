use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use crate::links::BookingLink;
use crate::models::{Offer, Price, Source};
use crate::scrapers::extract::is_placeholder_name;
use crate::scrapers::types::{RawOffer, SearchRequest};

pub const PLACEHOLDER_IMAGE: &str =
    "https://images.unsplash.com/photo-1566073771259-6a8506099945?w=800&h=600&fit=crop&q=80";

/// Rating assumed for records that carry none
const DEFAULT_RATING: f64 = 4.0;

fn is_absolute_http(candidate: &str) -> bool {
    Url::parse(candidate.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

/// Maps one tier's raw records onto validated offers tagged with `source`.
///
/// Records without a usable name or with a non-positive price are dropped, duplicates by
/// (name, address) keep their first occurrence, and at most `request.max_offers` survive.
pub fn normalize(raw: Vec<RawOffer>, source: Source, request: &SearchRequest) -> Vec<Offer> {
    let query = &request.destination;
    let now = Utc::now();
    let total = raw.len();

    let mut seen = HashSet::new();
    let mut ids = HashSet::new();
    let mut offers = Vec::new();

    for record in raw {
        if offers.len() >= request.max_offers {
            break;
        }

        let name = record.name.as_deref().unwrap_or_default().trim().to_string();
        if is_placeholder_name(&name) {
            continue;
        }

        let amount = match record.price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => continue,
        };

        let address = record
            .address()
            .map(|a| a.trim().to_string())
            .unwrap_or_else(|| query.raw.clone());

        if !seen.insert((name.to_lowercase(), address.to_lowercase())) {
            continue;
        }

        let index = offers.len();
        let mut estimated = record.estimated;

        let rating = match record.rating {
            Some(r) if r.is_finite() => r.clamp(0.0, 5.0),
            _ => {
                estimated.rating = true;
                DEFAULT_RATING
            }
        };

        let star_class = match record.stars {
            Some(s) if (1.0..=5.0).contains(&s) => s.floor() as u8,
            _ => rating.floor() as u8,
        };

        let review_count = record
            .review_count()
            .filter(|c| c.is_finite() && *c >= 0.0)
            .map(|c| c.min(f64::from(u32::MAX)) as u32)
            .unwrap_or(0);

        let mut images: Vec<String> = record
            .image_urls()
            .into_iter()
            .filter(|u| is_absolute_http(u))
            .collect();
        if images.is_empty() {
            images.push(PLACEHOLDER_IMAGE.to_string());
        }

        let booking_url = match record.booking_url.as_deref().map(str::trim) {
            Some(link) if is_absolute_http(link) => link.to_string(),
            _ => BookingLink::new(&name, &query.city, &query.country, index)
                .stay(request.stay)
                .party(request.party)
                .to_url()
                .into(),
        };

        let mut id = record
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}_{}", source, now.timestamp_millis(), index));
        if !ids.insert(id.clone()) {
            id = format!("{id}_{index}");
            ids.insert(id.clone());
        }

        let currency = record
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| request.currency.clone());

        let scraped_at = record
            .scraped_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(now);

        let amenities: BTreeSet<String> = record
            .amenities
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        let description = record
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Accommodation in {}", query.raw));

        offers.push(Offer {
            id,
            name,
            price: Price { amount, currency },
            rating: ((rating * 10.0).round() / 10.0) as f32,
            star_class,
            review_count,
            images,
            address,
            geolocation: record.location.unwrap_or_default(),
            amenities,
            description,
            booking_url,
            source,
            scraped_at,
            estimated,
        });
    }

    debug!(
        "Normalized {} of {} {} records",
        offers.len(),
        total,
        source
    );
    offers
}
