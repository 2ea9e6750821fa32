pub mod acquisition;
pub mod config;
pub mod error;
pub mod links;
pub mod models;
pub mod scrapers;

pub use acquisition::Acquisition;
pub use config::AcquisitionConfig;
pub use error::{AcquisitionError, TierError};
pub use models::{Offer, Source};
