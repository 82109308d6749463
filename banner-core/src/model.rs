use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::rounding::round_str;

/// Placeholder written wherever a measurement is unavailable.
pub const SENTINEL: &str = "-";

/// Current on-disk snapshot format.
pub const SNAPSHOT_VERSION: &str = "2.0";

/// One XEMA station as configured by the operator.
///
/// Built only through [`StationConfig::new`] (also used when deserializing),
/// so every instance has a non-empty alphanumeric code and non-empty names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStation")]
pub struct StationConfig {
    pub code: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Deserialize)]
struct RawStation {
    code: String,
    name: String,
    display_name: String,
}

impl TryFrom<RawStation> for StationConfig {
    type Error = anyhow::Error;

    fn try_from(raw: RawStation) -> Result<Self, Self::Error> {
        StationConfig::new(raw.code, raw.name, raw.display_name)
    }
}

impl StationConfig {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let code = code.into().trim().to_string();
        let name = name.into().trim().to_string();
        let display_name = display_name.into().trim().to_string();

        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!("Invalid station code '{code}': expected a non-empty alphanumeric code");
        }
        if name.is_empty() {
            anyhow::bail!("Station '{code}' has an empty name");
        }
        if display_name.is_empty() {
            anyhow::bail!("Station '{code}' has an empty display_name");
        }

        Ok(Self { code, name, display_name })
    }
}

/// A single reading, or the "no data" sentinel.
///
/// Serialized as a bare JSON number, or as `"-"` when missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Measurement {
    Value(f64),
    #[default]
    Missing,
}

impl Measurement {
    pub fn is_missing(&self) -> bool {
        matches!(self, Measurement::Missing)
    }
}

impl From<Option<f64>> for Measurement {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Measurement::Missing, Measurement::Value)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Value(v) => write!(f, "{v:.1}"),
            Measurement::Missing => f.write_str(SENTINEL),
        }
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Measurement::Value(v) => serializer.serialize_f64(*v),
            Measurement::Missing => serializer.serialize_str(SENTINEL),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMeasurement {
    Number(f64),
    Text(String),
    Null(()),
}

impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawMeasurement::deserialize(deserializer)?;

        Ok(match raw {
            RawMeasurement::Number(v) => Measurement::Value(v),
            RawMeasurement::Null(()) => Measurement::Missing,
            RawMeasurement::Text(s) => {
                let trimmed = s.trim();
                // Older snapshots stored readings as strings; anything that
                // does not parse is treated as absent rather than as zero.
                if trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
                    Measurement::Value(round_str(Some(trimmed), 1))
                } else {
                    Measurement::Missing
                }
            }
        })
    }
}

/// Daily maximum temperature, minimum temperature and accumulated rainfall.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementSet {
    #[serde(rename = "TX", default)]
    pub tx: Measurement,
    #[serde(rename = "TN", default)]
    pub tn: Measurement,
    #[serde(rename = "PPT", default)]
    pub ppt: Measurement,
}

impl MeasurementSet {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_missing() && self.tn.is_missing() && self.ppt.is_missing()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub name: String,
    pub last_fetched: DateTime<Utc>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one station for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationResult {
    pub success: bool,
    pub values: MeasurementSet,
    pub metadata: StationMetadata,
}

impl StationResult {
    pub fn succeeded(
        station: &StationConfig,
        values: MeasurementSet,
        url: String,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            values,
            metadata: StationMetadata {
                name: station.display_name.clone(),
                last_fetched: fetched_at,
                url,
                error: None,
            },
        }
    }

    /// A failed result never carries partial values.
    pub fn failed(
        station: &StationConfig,
        error: impl Into<String>,
        url: String,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: false,
            values: MeasurementSet::missing(),
            metadata: StationMetadata {
                name: station.display_name.clone(),
                last_fetched: fetched_at,
                url,
                error: Some(error.into()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub last_updated: DateTime<Utc>,
    pub source: String,
    pub stations_count: usize,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    SNAPSHOT_VERSION.to_string()
}

/// All station results of one fetch run, keyed by station code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub stations: BTreeMap<String, StationResult>,
}

impl Snapshot {
    pub fn new(source: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                last_updated: generated_at,
                source: source.into(),
                stations_count: 0,
                version: default_version(),
            },
            stations: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, code: impl Into<String>, result: StationResult) {
        self.stations.insert(code.into(), result);
        self.metadata.stations_count = self.stations.len();
    }

    pub fn get(&self, code: &str) -> Option<&StationResult> {
        self.stations.get(code)
    }

    pub fn success_count(&self) -> usize {
        self.stations.values().filter(|r| r.success).count()
    }

    pub fn failed_codes(&self) -> Vec<&str> {
        self.stations
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(code, _)| code.as_str())
            .collect()
    }

    pub fn has_successes(&self) -> bool {
        self.success_count() > 0
    }
}
