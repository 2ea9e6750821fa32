use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::TierError;
use crate::links::BookingLink;
use crate::models::{Estimated, Geolocation, Source};
use crate::scrapers::traits::OfferTier;
use crate::scrapers::types::{RawOffer, SearchRequest};

const VOCABULARY: &[&str] = &[
    "Grand",
    "Plaza",
    "Central",
    "Express Inn",
    "Garden",
    "Business",
    "Royal",
    "City",
    "Boutique",
    "Riverside",
];

const IMAGES: &[&str] = &[
    "https://cf.bstatic.com/xdata/images/hotel/square600/510565710.webp?k=dff438e940e280b0b5740485b7a0a6b9bd9adfa97f59a835c7f98536bc137080&o=",
    "https://cf.bstatic.com/xdata/images/hotel/square600/583993655.webp?k=ee897e371b17460203379ef7f5cd2eadff8a1cc5e49adc139c7ef70f1c118b09&o=",
    "https://cf.bstatic.com/xdata/images/hotel/square600/749265489.webp?k=7b8f592ffd657941e29fd267a71249fd888ef5423c0d5dd2a2a8d4b3fb805725&o=",
    "https://cf.bstatic.com/xdata/images/hotel/square600/466342927.webp?k=bc1b367a952139347afddd3217bd15ce43db3c00b2a19fde05d3ca917c4d4f8a&o=",
    "https://cf.bstatic.com/xdata/images/hotel/square600/721372627.webp?k=4469790c9c740c74ff890e2ddc86bce5331a2eda5f0d13e534578cb9d35d53b5&o=",
];

const CITY_COORDINATES: &[(&str, f64, f64)] = &[
    ("bali", -8.3405, 115.0920),
    ("bangkok", 13.7563, 100.5018),
    ("dubai", 25.2048, 55.2708),
    ("london", 51.5074, -0.1278),
    ("new york", 40.7128, -74.0060),
    ("paris", 48.8566, 2.3522),
    ("singapore", 1.3521, 103.8198),
    ("tokyo", 35.6762, 139.6503),
];

const BASE_PRICE: u32 = 80;
const PRICE_STEP: u32 = 30;
const PRICE_NOISE: u32 = 100;

fn city_coordinates(city: &str) -> Geolocation {
    let key = city.trim().to_lowercase();
    CITY_COORDINATES
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, lat, lng)| Geolocation { lat: *lat, lng: *lng })
        .unwrap_or_default()
}

/// Template name for slot `index`, alternating "Grand Paris Hotel" / "Paris Plaza" order.
fn template_name(city: &str, index: usize) -> String {
    let word = VOCABULARY[index % VOCABULARY.len()];
    let base = if index % 2 == 0 {
        format!("{word} {city} Hotel")
    } else {
        format!("{city} {word}")
    };

    match index / VOCABULARY.len() {
        0 => base,
        round => format!("{base} {}", round + 1),
    }
}

/// Builds `request.max_offers` plausible records for the destination.
pub fn generate<R: Rng>(request: &SearchRequest, rng: &mut R) -> Vec<RawOffer> {
    let query = &request.destination;
    let scraped_at = Utc::now();
    let location = city_coordinates(&query.city);
    let address = if query.country.is_empty() {
        query.city.clone()
    } else {
        format!("{}, {}", query.city, query.country)
    };

    (0..request.max_offers)
        .map(|index| {
            let name = template_name(&query.city, index);
            let band = (index % VOCABULARY.len()) as u32;
            let price = BASE_PRICE + PRICE_STEP * band + rng.gen_range(0..PRICE_NOISE);
            let rating = (rng.gen_range(3.5f64..=5.0) * 10.0).round() / 10.0;
            let booking_url = BookingLink::new(&name, &query.city, &query.country, index)
                .stay(request.stay)
                .party(request.party)
                .to_url();

            RawOffer {
                id: Some(format!("synthetic_{}_{}", scraped_at.timestamp_millis(), index)),
                price: Some(f64::from(price)),
                currency: Some(request.currency.clone()),
                rating: Some(rating),
                stars: Some(rating.floor()),
                review_count: Some(f64::from(rng.gen_range(100u32..2100))),
                images: vec![IMAGES[index % IMAGES.len()].to_string()],
                booking_url: Some(booking_url.into()),
                address: Some(address.clone()),
                location: Some(location),
                amenities: ["WiFi", "Air Conditioning", "Free Breakfast"]
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
                description: Some(format!("Comfortable accommodation in {}", query.raw)),
                scraped_at: Some(scraped_at.to_rfc3339()),
                source: Some(Source::Synthetic.to_string()),
                estimated: Estimated {
                    price: true,
                    rating: true,
                    review_count: true,
                    record: true,
                },
                name: Some(name),
                ..RawOffer::default()
            }
        })
        .collect()
}

/// Terminal tier: never fails, never comes back empty.
pub struct SyntheticTier {
    rng: Mutex<StdRng>,
}

impl SyntheticTier {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible output for tests and demos
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SyntheticTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OfferTier for SyntheticTier {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawOffer>, TierError> {
        info!(
            "📋 Generating {} synthetic offers for {}",
            request.max_offers, request.destination.raw
        );
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(generate(request, &mut *rng))
    }

    fn source(&self) -> Source {
        Source::Synthetic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DestinationQuery;

    fn request(destination: &str, max: usize) -> SearchRequest {
        SearchRequest::new(DestinationQuery::parse(destination).unwrap()).with_max_offers(Some(max))
    }

    #[test]
    fn alternates_word_order() {
        assert_eq!(template_name("Paris", 0), "Grand Paris Hotel");
        assert_eq!(template_name("Paris", 1), "Paris Plaza");
        assert_eq!(template_name("Paris", 3), "Paris Express Inn");
        assert_eq!(template_name("Paris", 10), "Grand Paris Hotel 2");
        assert_eq!(template_name("Paris", 6), "Royal Paris Hotel");
        assert_eq!(template_name("Paris", 9), "Paris Riverside");
    }

    #[test]
    fn generates_requested_count_with_valid_ranges() {
        let mut rng = StdRng::seed_from_u64(42);
        let offers = generate(&request("Paris, France", 12), &mut rng);

        assert_eq!(offers.len(), 12);
        for (index, offer) in offers.iter().enumerate() {
            let price = offer.price.unwrap();
            let band = (index % VOCABULARY.len()) as f64;
            assert!(price >= 80.0 + 30.0 * band && price < 180.0 + 30.0 * band);

            let rating = offer.rating.unwrap();
            assert!((3.5..=5.0).contains(&rating));
            assert_eq!(offer.stars, Some(rating.floor()));
            assert!(offer.booking_url.as_deref().unwrap().contains("/hotel/fr/"));
            assert!(offer.estimated.record);
        }

        let names: std::collections::HashSet<_> = offers.iter().map(|o| o.name.clone()).collect();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn known_city_gets_coordinates() {
        let mut rng = StdRng::seed_from_u64(1);
        let offers = generate(&request("Tokyo, Japan", 1), &mut rng);
        let location = offers[0].location.unwrap();
        assert!((location.lat - 35.6762).abs() < 1e-9);

        let offers = generate(&request("Ulaanbaatar, Mongolia", 1), &mut rng);
        assert!(offers[0].location.unwrap().is_unknown());
        assert!(offers[0].booking_url.as_deref().unwrap().contains("/hotel/mongolia/"));
    }

    #[tokio::test]
    async fn seeded_tier_is_reproducible() {
        let request = request("Lisbon, Portugal", 5);
        let a = SyntheticTier::seeded(9).fetch(&request).await.unwrap();
        let b = SyntheticTier::seeded(9).fetch(&request).await.unwrap();
        let prices = |offers: &[RawOffer]| offers.iter().map(|o| o.price).collect::<Vec<_>>();
        assert_eq!(prices(&a), prices(&b));
    }
}
