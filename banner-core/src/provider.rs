use crate::{
    config::SourceConfig, error::FetchError, model::StationConfig,
    provider::meteocat::MeteocatSource,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod meteocat;

/// Somewhere station pages can be retrieved from.
#[async_trait]
pub trait StationSource: Send + Sync + Debug {
    /// Public URL of the station page, recorded in the snapshot.
    fn station_url(&self, station: &StationConfig) -> String;

    /// Retrieve the raw page for one station. A single attempt; retries are
    /// the caller's business.
    async fn fetch_page(&self, station: &StationConfig) -> Result<String, FetchError>;
}

/// Construct the configured source.
pub fn source_from_config(config: &SourceConfig) -> anyhow::Result<Box<dyn StationSource>> {
    Ok(Box::new(MeteocatSource::new(config)?))
}
