use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::TierError;
use crate::links::fold_diacritics;
use crate::models::Source;
use crate::scrapers::traits::OfferTier;
use crate::scrapers::types::{RawOffer, SearchRequest};

pub const DEFAULT_PREFIX: &str = "booking_hotels_";

/// Every non-alphanumeric ASCII character becomes `_`, the naming scheme existing result
/// files use.
fn underscore_non_alnum(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Punctuation removed, whitespace runs collapsed to a single `_`.
fn strip_and_collapse(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Candidate file stems for a destination, most likely first, without duplicates.
pub fn candidate_stems(destination: &str) -> Vec<String> {
    let folded = fold_diacritics(destination);
    let passes = [
        underscore_non_alnum(destination),
        strip_and_collapse(destination),
        underscore_non_alnum(&folded),
        strip_and_collapse(&folded),
    ];

    let mut seen = HashSet::new();
    let mut stems = Vec::new();
    for stem in passes.iter().flat_map(|s| [s.clone(), s.to_lowercase()]) {
        if !stem.trim_matches('_').is_empty() && seen.insert(stem.clone()) {
            stems.push(stem);
        }
    }
    stems
}

/// Recovers result sets that earlier scraper runs left on disk.
///
/// Read-only: nothing here ever writes or evicts files.
#[derive(Debug, Clone)]
pub struct CacheScanner {
    dirs: Vec<PathBuf>,
    prefix: String,
}

impl CacheScanner {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self::with_prefix(dirs, DEFAULT_PREFIX)
    }

    pub fn with_prefix(dirs: Vec<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dirs,
            prefix: prefix.into(),
        }
    }

    pub fn candidate_filenames(&self, destination: &str) -> Vec<String> {
        candidate_stems(destination)
            .into_iter()
            .map(|stem| format!("{}{}.json", self.prefix, stem))
            .collect()
    }

    /// First non-empty, parseable result set for the destination.
    ///
    /// Exact candidate names are tried in every directory before falling back to a loose
    /// directory scan. Unreadable or malformed files count as misses.
    pub async fn scan(&self, request: &SearchRequest) -> Vec<RawOffer> {
        let destination = &request.destination;
        let mut tried = HashSet::new();

        for dir in &self.dirs {
            for filename in self.candidate_filenames(&destination.raw) {
                let path = dir.join(&filename);
                tried.insert(path.clone());
                if let Some(offers) = read_result_file(&path).await {
                    info!("💾 Cache hit for {}: {}", destination.raw, path.display());
                    return offers;
                }
            }
        }

        let needles = loose_needles(&destination.city);
        if needles.is_empty() {
            return Vec::new();
        }

        for dir in &self.dirs {
            for path in matching_files(dir, &needles).await {
                if tried.contains(&path) {
                    continue;
                }
                if let Some(offers) = read_result_file(&path).await {
                    info!("💾 Loose cache hit for {}: {}", destination.raw, path.display());
                    return offers;
                }
            }
        }

        debug!("No cached results for {}", destination.raw);
        Vec::new()
    }
}

/// Lower-cased forms of the first destination segment a filename may contain.
fn loose_needles(city: &str) -> Vec<String> {
    let lowered = city.trim().to_lowercase();
    let folded = fold_diacritics(&lowered);
    let mut needles = vec![
        lowered.clone(),
        lowered.replace(char::is_whitespace, "_"),
        folded.replace(char::is_whitespace, "_"),
        underscore_non_alnum(&folded),
    ];
    needles.retain(|n| !n.trim_matches('_').is_empty());
    needles.dedup();
    needles
}

async fn matching_files(dir: &Path, needles: &[String]) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cache directory {} unreadable: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut matches = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped scanning {}: {}", dir.display(), e);
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.ends_with(".json") && needles.iter().any(|n| name.contains(n.as_str())) {
            matches.push(entry.path());
        }
    }

    matches.sort();
    matches
}

async fn read_result_file(path: &Path) -> Option<Vec<RawOffer>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Could not read cache file {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Vec<RawOffer>>(&content) {
        Ok(offers) if !offers.is_empty() => Some(offers),
        Ok(_) => {
            debug!("Cache file {} holds no records", path.display());
            None
        }
        Err(e) => {
            warn!("Ignoring malformed cache file {}: {}", path.display(), e);
            None
        }
    }
}

/// Disk-cache tier
pub struct CacheTier {
    scanner: CacheScanner,
}

impl CacheTier {
    pub fn new(scanner: CacheScanner) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl OfferTier for CacheTier {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawOffer>, TierError> {
        Ok(self.scanner.scan(request).await)
    }

    fn source(&self) -> Source {
        Source::Cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DestinationQuery;

    const RECORDS: &str = r#"[{ "name": "Hotel Gracery Shinjuku", "price": 120, "rating": 4.1 }]"#;

    fn request(destination: &str) -> SearchRequest {
        SearchRequest::new(DestinationQuery::parse(destination).unwrap())
    }

    #[test]
    fn stems_cover_every_convention() {
        let stems = candidate_stems("Zürich, Switzerland");
        assert_eq!(
            stems,
            vec![
                "Z_rich__Switzerland",
                "z_rich__switzerland",
                "Zürich_Switzerland",
                "zürich_switzerland",
                "Zurich__Switzerland",
                "zurich__switzerland",
                "Zurich_Switzerland",
                "zurich_switzerland",
            ]
        );
    }

    #[test]
    fn filenames_use_prefix() {
        let scanner = CacheScanner::new(vec![]);
        assert_eq!(
            scanner.candidate_filenames("Tokyo, Japan")[0],
            "booking_hotels_Tokyo__Japan.json"
        );
    }

    #[tokio::test]
    async fn finds_exact_candidate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("booking_hotels_Tokyo__Japan.json"), RECORDS).unwrap();

        let scanner = CacheScanner::new(vec![dir.path().to_path_buf()]);
        let offers = scanner.scan(&request("Tokyo, Japan")).await;
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].name.as_deref(), Some("Hotel Gracery Shinjuku"));
    }

    #[tokio::test]
    async fn folds_diacritics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("booking_hotels_zurich_switzerland.json"), RECORDS).unwrap();

        let scanner = CacheScanner::new(vec![dir.path().to_path_buf()]);
        assert_eq!(scanner.scan(&request("Zürich, Switzerland")).await.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_loose_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hotels_new_york_2024-11-16.json"), RECORDS).unwrap();
        std::fs::write(dir.path().join("new_york_notes.txt"), RECORDS).unwrap();

        let scanner = CacheScanner::new(vec![dir.path().to_path_buf()]);
        assert_eq!(scanner.scan(&request("New York, USA")).await.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_and_empty_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let truncated = r#"[{"name": "Hot"#;
        std::fs::write(dir.path().join("booking_hotels_Tokyo__Japan.json"), truncated).unwrap();
        std::fs::write(dir.path().join("booking_hotels_tokyo_japan.json"), "[]").unwrap();

        let scanner = CacheScanner::new(vec![dir.path().to_path_buf()]);
        assert!(scanner.scan(&request("Tokyo, Japan")).await.is_empty());
    }

    #[tokio::test]
    async fn later_candidate_wins_after_corrupt_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("booking_hotels_Tokyo__Japan.json"), "not json").unwrap();
        std::fs::write(dir.path().join("booking_hotels_Tokyo_Japan.json"), RECORDS).unwrap();

        let scanner = CacheScanner::new(vec![dir.path().to_path_buf()]);
        assert_eq!(scanner.scan(&request("Tokyo, Japan")).await.len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_is_a_miss() {
        let scanner = CacheScanner::new(vec![PathBuf::from("/definitely/not/here")]);
        assert!(scanner.scan(&request("Paris, France")).await.is_empty());
    }
}
