use anyhow::{Context, Result, anyhow, bail};
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::model::StationConfig;

/// Where and how station pages are fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Label recorded in the snapshot metadata.
    pub name: String,
    /// Station page URL; the station code is passed as `?codi=<code>`.
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    /// Pause between consecutive stations.
    pub politeness_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "meteocat_web_scraping".to_string(),
            base_url: "https://www.meteo.cat/observacions/xema/dades".to_string(),
            user_agent: concat!("xema-banner/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 20,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            politeness_delay_ms: 2_000,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }
}

/// Files read and written by the pipeline. Relative paths resolve against
/// the working directory of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub snapshot: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
    /// Byte-identical copy of `output` for static hosting.
    pub mirror: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("data/latest_weather.json"),
            template: PathBuf::from("banner_template.html"),
            output: PathBuf::from("banner_output.html"),
            mirror: Some(PathBuf::from("docs/index.html")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Offset of the broadcast's civil time from UTC. Fixed, no DST.
    pub utc_offset_minutes: i32,
    pub begin_marker: String,
    pub end_marker: String,
    pub source_label: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 60,
            begin_marker: "<!-- STATIONS:BEGIN -->".to_string(),
            end_marker: "<!-- STATIONS:END -->".to_string(),
            source_label: "Font: https://www.meteo.cat/".to_string(),
        }
    }
}

impl RenderConfig {
    /// `None` when the configured offset is a day or more.
    pub fn offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: false, dir: PathBuf::from("data/history"), max_entries: 365 }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [source]
/// politeness_delay_ms = 2000
///
/// [[stations]]
/// code = "XJ"
/// name = "GIRONA"
/// display_name = "GIRONA"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default = "default_stations")]
    pub stations: Vec<StationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            paths: PathsConfig::default(),
            render: RenderConfig::default(),
            history: HistoryConfig::default(),
            stations: default_stations(),
        }
    }
}

impl Config {
    /// Load config from `path`, or from the platform config directory when
    /// `path` is `None`. Only a missing platform file yields the built-in
    /// defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let path = Self::config_file_path()?;
                if !path.exists() {
                    log::debug!("No config file at {}, using built-in defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("cat", "xema-banner", "banner")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.stations.is_empty() {
            bail!("No stations configured");
        }

        let mut seen = HashSet::new();
        for station in &self.stations {
            if !seen.insert(station.code.as_str()) {
                bail!("Station code '{}' is configured more than once", station.code);
            }
        }

        if self.source.max_attempts == 0 {
            bail!("source.max_attempts must be at least 1");
        }
        if self.history.max_entries == 0 {
            bail!("history.max_entries must be at least 1");
        }

        if self.render.offset().is_none() {
            bail!("render.utc_offset_minutes {} is out of range", self.render.utc_offset_minutes);
        }

        if self.render.begin_marker.trim().is_empty() || self.render.end_marker.trim().is_empty() {
            bail!("Template markers must not be empty");
        }
        if self.render.begin_marker == self.render.end_marker {
            bail!("render.begin_marker and render.end_marker must differ");
        }

        Ok(())
    }

}

const DEFAULT_STATIONS: &[(&str, &str, &str)] = &[
    ("XJ", "GIRONA", "GIRONA"),
    ("UO", "FORNELLS_DE_LA_SELVA", "FORNELLS DE LA SELVA"),
    ("DN", "ANGLÈS", "ANGLES"),
    ("DJ", "BANYOLES", "BANYOLES"),
    ("X4", "BARCELONA", "BARCELONA - EL RAVAL"),
    ("UN", "CASSÀ_DE_LA_SELVA", "CASSA DE LA SELVA"),
    ("MS", "CASTELLAR_DE_NHUG", "CASTELLAR DE N'HUG - EL CLOT DEL MORO"),
    ("J5", "DARNIUS", "PANTA DE DARNIUS - BOADELLA"),
    ("DP", "DAS", "DAS - AERODROM"),
    ("XL", "EL_PRAT_DE_LLOBREGAT", "EL PRAT DE LLOBREGAT"),
    ("XK", "FOGARS_DE_MONTCLÚS", "FOGARS DE MONTCLUS - PUIG SESOLLES (1.668 M)"),
    ("CD", "LA_SEU_DURGELL", "LA SEU D'URGELL - BELLESTAR"),
    ("VK", "LLEIDA", "LLEIDA - RAIMAT"),
    ("Z3", "MERANGES", "MERANGES - MALNIU (2.230 M)"),
    ("YB", "OLOT", "OLOT"),
    ("YP", "PALAFRUGELL", "PALAFRUGELL"),
    ("DG", "QUERALBS", "QUERALBS - NURIA (1.971 M)"),
    ("D4", "ROSES", "ROSES"),
    ("CI", "SANT_PAU_DE_SEGÚRIES", "SANT PAU DE SEGURIES"),
    ("ZC", "SETCASES", "SETCASES - ULLDETER (2.413 M)"),
    ("XH", "SORT", "SORT"),
    ("XE", "TARRAGONA", "TARRAGONA - COMPLEX EDUCATIU"),
    ("XO", "VIC", "VIC"),
    ("VS", "VIELHA_E_MIJARAN", "VIELHA E MIJARAN - LAC REDON (2.247 M)"),
    ("D7", "VINEBRE", "VINEBRE"),
];

/// The stations shown on air when no config file overrides them.
pub fn default_stations() -> Vec<StationConfig> {
    DEFAULT_STATIONS
        .iter()
        .filter_map(|(code, name, display)| StationConfig::new(*code, *name, *display).ok())
        .collect()
}
