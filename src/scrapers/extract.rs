use anyhow::{anyhow, Result};
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::links::{search_url, BOOKING_BASE};
use crate::models::Estimated;
use crate::scrapers::types::{RawOffer, SearchRequest};

/// Structural marker of one search result
pub const CARD_SELECTOR: &str = r#"[data-testid="property-card"]"#;

/// Image host the result cards are served from
pub const ASSET_DOMAIN: &str = "bstatic.com";

const PLACEHOLDER_NAMES: &[&str] = &["hotel name not found", "not found", "n/a"];

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e}"))
}

/// True for names scrapers emit when a title could not be read.
pub fn is_placeholder_name(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    lowered.is_empty() || PLACEHOLDER_NAMES.contains(&lowered.as_str())
}

/// Turns a rendered search-results page into raw offers.
///
/// Used by both the live worker and the proxy tier so the two paths extract identically.
pub struct CardExtractor {
    card: Selector,
    title: Selector,
    title_fallback: Selector,
    price: Selector,
    review_score: Selector,
    stars: Selector,
    address: Selector,
    image: Selector,
    title_link: Selector,
    hotel_link: Selector,
    price_re: Regex,
    rating_re: Regex,
    reviews_re: Regex,
}

impl CardExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            card: selector(CARD_SELECTOR)?,
            title: selector(r#"[data-testid="title"]"#)?,
            title_fallback: selector("h3")?,
            price: selector(r#"[data-testid="price-and-discounted-price"], [class*="price"]"#)?,
            review_score: selector(r#"[data-testid="review-score"]"#)?,
            stars: selector(
                r#"[data-testid="rating-stars"] > span, [data-testid="rating-squares"] > span"#,
            )?,
            address: selector(r#"[data-testid="address"]"#)?,
            image: selector("img")?,
            title_link: selector(r#"a[data-testid="title-link"]"#)?,
            hotel_link: selector(r#"a[href*="/hotel/"]"#)?,
            price_re: Regex::new(r"(?:US\$|[$€£¥]|USD|EUR|GBP)\s?(\d[\d,]*)")?,
            rating_re: Regex::new(r"(\d+(?:[.,]\d+)?)")?,
            reviews_re: Regex::new(r"(?i)(\d[\d,]*)\s+reviews?")?,
        })
    }

    /// Extracts up to `request.max_offers` cards.
    ///
    /// Missing price, rating or review count are replaced by plausible random values and
    /// flagged in [`Estimated`]; cards without a usable name are skipped.
    pub fn extract<R: Rng>(
        &self,
        html: &str,
        request: &SearchRequest,
        rng: &mut R,
    ) -> Vec<RawOffer> {
        let document = Html::parse_document(html);
        let cards: Vec<ElementRef> = document.select(&self.card).collect();
        info!("Found {} result cards in HTML", cards.len());

        let scraped_at = Utc::now();
        let mut offers = Vec::new();

        for (idx, card) in cards.into_iter().enumerate() {
            if offers.len() >= request.max_offers {
                break;
            }

            let name = self.name(card);
            if is_placeholder_name(&name) {
                debug!("Skipped card {}: no usable name", idx);
                continue;
            }

            let mut estimated = Estimated::default();

            let price = match self.price(card) {
                Some(price) => price,
                None => {
                    estimated.price = true;
                    f64::from(rng.gen_range(100u32..400))
                }
            };

            let score_text = self.text_of(card, &self.review_score);
            let rating = match self.rating(&score_text) {
                Some(rating) => rating,
                None => {
                    estimated.rating = true;
                    rng.gen_range(3.0..=5.0)
                }
            };

            let review_count = match self.review_count(card, &score_text) {
                Some(count) => count,
                None => {
                    estimated.review_count = true;
                    f64::from(rng.gen_range(50u32..1050))
                }
            };

            let stars = card.select(&self.stars).count();
            let address = self.text_of(card, &self.address);

            offers.push(RawOffer {
                id: Some(format!("bk_{}_{}", scraped_at.timestamp_millis(), idx)),
                name: Some(name),
                price: Some(price),
                currency: Some(request.currency.clone()),
                rating: Some((rating * 10.0).round() / 10.0),
                stars: (1..=5).contains(&stars).then_some(stars as f64),
                review_count: Some(review_count),
                images: self.images(card),
                booking_url: Some(self.link(card, request)),
                address: (!address.is_empty()).then_some(address),
                amenities: self.amenities(card),
                description: Some(format!("Accommodation in {}", request.destination.raw)),
                scraped_at: Some(scraped_at.to_rfc3339()),
                estimated,
                ..RawOffer::default()
            });
        }

        info!("Extracted {} offers from result cards", offers.len());
        offers
    }

    fn text_of(&self, card: ElementRef, selector: &Selector) -> String {
        card.select(selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default()
    }

    fn name(&self, card: ElementRef) -> String {
        let name = self.text_of(card, &self.title);
        if name.is_empty() {
            self.text_of(card, &self.title_fallback)
        } else {
            name
        }
    }

    /// Last currency-prefixed amount in the price block, which is the discounted one when
    /// a struck-through original is also shown.
    fn price(&self, card: ElementRef) -> Option<f64> {
        let text = self.text_of(card, &self.price);
        self.price_re
            .captures_iter(&text)
            .filter_map(|caps| caps[1].replace(',', "").parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .last()
    }

    /// Review scores are shown out of ten; ratings are stored out of five.
    ///
    /// The "N reviews" phrase shares the block, so it is cut out before looking for a score.
    fn rating(&self, score_text: &str) -> Option<f64> {
        let score_only = self.reviews_re.replace_all(score_text, " ");
        let caps = self.rating_re.captures(&score_only)?;
        let score: f64 = caps[1].replace(',', ".").parse().ok()?;
        match score {
            s if s > 0.0 && s <= 5.0 => Some(s),
            s if s > 5.0 && s <= 10.0 => Some(s / 2.0),
            _ => None,
        }
    }

    fn review_count(&self, card: ElementRef, score_text: &str) -> Option<f64> {
        let card_text;
        let text = if self.reviews_re.is_match(score_text) {
            score_text
        } else {
            card_text = collapse_whitespace(&card.text().collect::<String>());
            &card_text
        };
        let caps = self.reviews_re.captures(text)?;
        caps[1].replace(',', "").parse().ok()
    }

    fn images(&self, card: ElementRef) -> Vec<String> {
        let mut images = Vec::new();
        for img in card.select(&self.image) {
            let src = img
                .value()
                .attr("src")
                .filter(|s| s.contains(ASSET_DOMAIN))
                .or_else(|| img.value().attr("data-src"))
                .filter(|s| s.contains(ASSET_DOMAIN));
            if let Some(src) = src {
                if !images.iter().any(|i| i == src) {
                    images.push(src.to_string());
                }
            }
        }
        images
    }

    /// Title anchor, then any property href, then the search page itself.
    fn link(&self, card: ElementRef, request: &SearchRequest) -> String {
        let href = card
            .select(&self.title_link)
            .chain(card.select(&self.hotel_link))
            .filter_map(|a| a.value().attr("href"))
            .find(|href| !href.trim().is_empty());

        href.and_then(absolutize)
            .unwrap_or_else(|| search_url(request).into())
    }

    fn amenities(&self, card: ElementRef) -> Vec<String> {
        let text = card.text().collect::<String>().to_lowercase();
        [
            ("breakfast included", "Breakfast included"),
            ("free cancellation", "Free cancellation"),
            ("no prepayment", "No prepayment needed"),
            ("free wifi", "Free WiFi"),
        ]
        .into_iter()
        .filter(|(needle, _)| text.contains(needle))
        .map(|(_, label)| label.to_string())
        .collect()
    }
}

fn absolutize(href: &str) -> Option<String> {
    let base = Url::parse(BOOKING_BASE).ok()?;
    let url = base.join(href.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.into())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
