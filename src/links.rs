//! Deep-link and search-URL construction for the inventory site.
//!
//! Every tier falls back to [`booking_url`] when a record has no usable link, so the
//! parameter set here is the contract affiliate tracking downstream relies on.

use url::Url;

use crate::scrapers::types::{DateRange, Party, SearchRequest};

pub const BOOKING_BASE: &str = "https://www.booking.com";
pub const AFFILIATE_ID: &str = "304142";
pub const AFFILIATE_LABEL: &str = "gen173nr-10CAQoggJCHXNlYXJjaF9rdWFsYSBsdW1wdXIsIG1hbGF5c2lhSDNYBGihAYgBAZgBM7gBB8gBDNgBA-gBAfgBAYgCAagCAbgC9Yy6xgbAAgHSAiRlYTc0NTdlMC1kNTczLTQ4ZTAtYTE0Ni01NDBiZTMwNjgwNWbYAgHgAgE";

const COUNTRY_CODES: &[(&str, &str)] = &[
    ("argentina", "ar"),
    ("australia", "au"),
    ("austria", "at"),
    ("belgium", "be"),
    ("brazil", "br"),
    ("canada", "ca"),
    ("china", "cn"),
    ("czech republic", "cz"),
    ("czechia", "cz"),
    ("denmark", "dk"),
    ("egypt", "eg"),
    ("england", "gb"),
    ("finland", "fi"),
    ("france", "fr"),
    ("germany", "de"),
    ("greece", "gr"),
    ("hungary", "hu"),
    ("iceland", "is"),
    ("india", "in"),
    ("indonesia", "id"),
    ("iraq", "iq"),
    ("ireland", "ie"),
    ("italy", "it"),
    ("japan", "jp"),
    ("jordan", "jo"),
    ("kenya", "ke"),
    ("malaysia", "my"),
    ("mexico", "mx"),
    ("morocco", "ma"),
    ("netherlands", "nl"),
    ("new zealand", "nz"),
    ("norway", "no"),
    ("peru", "pe"),
    ("philippines", "ph"),
    ("poland", "pl"),
    ("portugal", "pt"),
    ("qatar", "qa"),
    ("saudi arabia", "sa"),
    ("singapore", "sg"),
    ("south africa", "za"),
    ("south korea", "kr"),
    ("korea", "kr"),
    ("spain", "es"),
    ("sweden", "se"),
    ("switzerland", "ch"),
    ("thailand", "th"),
    ("turkey", "tr"),
    ("türkiye", "tr"),
    ("uae", "ae"),
    ("united arab emirates", "ae"),
    ("uk", "gb"),
    ("united kingdom", "gb"),
    ("united states", "us"),
    ("usa", "us"),
    ("vietnam", "vn"),
];

/// ISO 3166-1 alpha-2 code for a country name, case-insensitive
pub fn country_code(country: &str) -> Option<&'static str> {
    let key = country.trim().to_lowercase();
    COUNTRY_CODES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| *code)
}

/// Path segment identifying the country: the ISO code when known, else a slug.
fn country_segment(city: &str, country: &str) -> String {
    if let Some(code) = country_code(country) {
        return code.to_string();
    }
    if !country.trim().is_empty() {
        return slugify(country);
    }
    // City-states are commonly typed without a country
    country_code(city)
        .map(str::to_string)
        .unwrap_or_else(|| slugify(city))
}

/// Builder for a property deep link.
#[derive(Debug, Clone)]
pub struct BookingLink<'a> {
    hotel_name: &'a str,
    city: &'a str,
    country: &'a str,
    result_index: usize,
    stay: DateRange,
    party: Party,
}

impl<'a> BookingLink<'a> {
    pub fn new(hotel_name: &'a str, city: &'a str, country: &'a str, result_index: usize) -> Self {
        Self {
            hotel_name,
            city,
            country,
            result_index,
            stay: DateRange::default(),
            party: Party::default(),
        }
    }

    pub fn stay(mut self, stay: DateRange) -> Self {
        self.stay = stay;
        self
    }

    pub fn party(mut self, party: Party) -> Self {
        self.party = party;
        self
    }

    pub fn to_url(&self) -> Url {
        let mut name_slug = slugify(self.hotel_name);
        if name_slug.is_empty() {
            name_slug = "hotel".to_string();
        }
        let mut country = country_segment(self.city, self.country);
        if country.is_empty() {
            country = "xx".to_string();
        }

        let mut url = Url::parse(BOOKING_BASE).expect("BOOKING_BASE is a valid URL");
        url.set_path(&format!("/hotel/{country}/{name_slug}.html"));

        let position = (self.result_index + 1).to_string();
        let adults = self.party.adults.to_string();
        url.query_pairs_mut()
            .append_pair("aid", AFFILIATE_ID)
            .append_pair("label", AFFILIATE_LABEL)
            .append_pair("checkin", &self.stay.check_in.to_string())
            .append_pair("checkout", &self.stay.check_out.to_string())
            .append_pair("group_adults", &adults)
            .append_pair("req_adults", &adults)
            .append_pair("no_rooms", &self.party.rooms.to_string())
            .append_pair("group_children", "0")
            .append_pair("req_children", "0")
            .append_pair("hpos", &position)
            .append_pair("hapos", &position)
            .append_pair("sr_order", "popularity")
            .append_pair("from", "searchresults");
        url
    }
}

/// Deep link for a property using the default stay and party.
pub fn booking_url(hotel_name: &str, city: &str, country: &str, result_index: usize) -> String {
    BookingLink::new(hotel_name, city, country, result_index)
        .to_url()
        .into()
}

/// Search-results page for a request; this is what the live worker and the proxy fetch.
pub fn search_url(request: &SearchRequest) -> Url {
    let mut url = Url::parse(BOOKING_BASE).expect("BOOKING_BASE is a valid URL");
    url.set_path("/searchresults.html");
    url.query_pairs_mut()
        .append_pair("ss", &request.destination.raw)
        .append_pair("checkin", &request.stay.check_in.to_string())
        .append_pair("checkout", &request.stay.check_out.to_string())
        .append_pair("group_adults", &request.party.adults.to_string())
        .append_pair("group_children", "0")
        .append_pair("no_rooms", &request.party.rooms.to_string())
        .append_pair("selected_currency", &request.currency);
    url
}

/// Lowercase ASCII slug with `-` separators.
pub fn slugify(text: &str) -> String {
    let folded = fold_diacritics(text).to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Replaces accented Latin letters with their base letter.
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ą' => out.push('A'),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'ç' | 'ć' | 'č' => out.push('c'),
            'Ç' | 'Ć' | 'Č' => out.push('C'),
            'ď' | 'đ' => out.push('d'),
            'Ď' | 'Đ' => out.push('D'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => out.push('E'),
            'ğ' => out.push('g'),
            'Ğ' => out.push('G'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'İ' => out.push('I'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            'ñ' | 'ń' | 'ň' => out.push('n'),
            'Ñ' | 'Ń' | 'Ň' => out.push('N'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => out.push('O'),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ř' => out.push('r'),
            'Ř' => out.push('R'),
            'ś' | 'š' | 'ş' => out.push('s'),
            'Ś' | 'Š' | 'Ş' => out.push('S'),
            'ß' => out.push_str("ss"),
            'ť' | 'ţ' => out.push('t'),
            'Ť' | 'Ţ' => out.push('T'),
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => out.push('U'),
            'ý' | 'ÿ' => out.push('y'),
            'Ý' | 'Ÿ' => out.push('Y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            'Ź' | 'Ż' | 'Ž' => out.push('Z'),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DestinationQuery;
    use chrono::NaiveDate;

    #[test]
    fn deep_link_carries_country_code_and_position() {
        let url = booking_url("Grand Paris Hotel", "Paris", "France", 2);
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.path(), "/hotel/fr/grand-paris-hotel.html");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("aid"), Some(AFFILIATE_ID));
        assert_eq!(get("hpos"), Some("3"));
        assert_eq!(get("hapos"), Some("3"));
        assert_eq!(get("group_adults"), Some("2"));
        assert_eq!(get("no_rooms"), Some("1"));
    }

    #[test]
    fn unknown_country_is_slugified() {
        let url = booking_url("Hotel Ωmega", "Zanzibar City", "Tanzania United Republic", 0);
        assert!(url.contains("/hotel/tanzania-united-republic/hotel-mega.html"));
    }

    #[test]
    fn city_state_without_country_resolves() {
        let url = booking_url("Marina Bay Sands", "Singapore", "", 0);
        assert!(url.contains("/hotel/sg/marina-bay-sands.html"));
    }

    #[test]
    fn explicit_stay_and_party_are_encoded() {
        let stay = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 11, 16).unwrap(),
            NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
        );
        let url = BookingLink::new("Hotel Gracery", "Tokyo", "Japan", 0)
            .stay(stay)
            .party(Party { adults: 3, rooms: 2 })
            .to_url();
        let query = url.query().unwrap();
        assert!(query.contains("checkin=2026-11-16"));
        assert!(query.contains("checkout=2026-11-20"));
        assert!(query.contains("group_adults=3"));
        assert!(query.contains("no_rooms=2"));
    }

    #[test]
    fn search_url_encodes_destination() {
        let request = SearchRequest::new(DestinationQuery::parse("São Paulo, Brazil").unwrap());
        let url = search_url(&request);
        assert_eq!(url.path(), "/searchresults.html");
        assert!(url.as_str().contains("ss=S%C3%A3o+Paulo%2C+Brazil"));
        assert!(url.as_str().contains("selected_currency=USD"));
    }

    #[test]
    fn slugify_folds_and_collapses() {
        assert_eq!(slugify("  Hôtel  de l'Université!! "), "hotel-de-l-universite");
        assert_eq!(fold_diacritics("Zürich Straße"), "Zurich Strasse");
    }
}
