//! Core library for the XEMA weather banner.
//!
//! This crate defines:
//! - Configuration (stations, paths, fetch and render settings)
//! - Typed station, measurement and snapshot records
//! - Decimal rounding and extraction of daily readings from station pages
//! - The station source abstraction and the meteo.cat implementation
//! - Snapshot and history persistence, and banner rendering
//!
//! It is used by `banner-cli`, but can also be reused by other binaries.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod history;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod rounding;
pub mod store;

pub use config::Config;
pub use error::{ExtractError, FetchError, RenderError, StoreError};
pub use model::{Measurement, MeasurementSet, Snapshot, StationConfig, StationResult};
pub use provider::{StationSource, source_from_config};
pub use rounding::round_half_up;
