pub mod browser;
pub mod cache;
pub mod extract;
pub mod normalizer;
pub mod proxy;
pub mod synthetic;
pub mod traits;
pub mod types;
pub mod worker;

pub use browser::LiveBrowserScraper;
pub use cache::{CacheScanner, CacheTier};
pub use proxy::{ProxyClient, ProxyTier};
pub use synthetic::SyntheticTier;
pub use traits::OfferTier;
pub use types::{DateRange, Party, RawOffer, SearchRequest};
pub use worker::{LiveScrapeTier, WorkerPayload};
