use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use velomap_common::{FilterCriteria, Location, PriceRange};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// City center the view starts at and returns to on reset
    #[serde(default = "default_center")]
    pub default_center: Location,

    #[serde(default = "default_zoom")]
    pub default_zoom: u8,

    /// Zoom used when a search hit is picked
    #[serde(default = "default_search_pick_zoom")]
    pub search_pick_zoom: u8,

    /// Zoom used after a successful geolocation
    #[serde(default = "default_locate_zoom")]
    pub locate_zoom: u8,

    #[serde(default = "default_geolocation_timeout_ms")]
    pub geolocation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_only_available")]
    pub only_available: bool,

    #[serde(default = "default_max_price")]
    pub max_price: f64,

    #[serde(default)]
    pub price_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassConfig {
    #[serde(default)]
    pub enable: bool,

    #[serde(default = "default_overpass_url")]
    pub url: String,

    /// Value of the OSM `name` tag of the admin area to query
    #[serde(default = "default_overpass_area")]
    pub area: String,

    #[serde(default = "default_overpass_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_true")]
    pub mock_primary: bool,

    #[serde(default = "default_true")]
    pub mock_secondary: bool,

    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    #[serde(default = "default_refresh_interval_minutes")]
    pub refresh_interval_minutes: u64,

    #[serde(default)]
    pub overpass: Option<OverpassConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub map: MapConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_center() -> Location {
    Location::new(52.3730, 4.8930)
}

fn default_zoom() -> u8 {
    14
}

fn default_search_pick_zoom() -> u8 {
    16
}

fn default_locate_zoom() -> u8 {
    15
}

fn default_geolocation_timeout_ms() -> u64 {
    5000
}

fn default_min_query_len() -> usize {
    2
}

fn default_max_results() -> usize {
    5
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_only_available() -> bool {
    true
}

fn default_max_price() -> f64 {
    50.0
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_overpass_area() -> String {
    "Amsterdam".to_string()
}

fn default_overpass_timeout_seconds() -> u64 {
    60
}

fn default_simulated_delay_ms() -> u64 {
    800
}

fn default_refresh_interval_minutes() -> u64 {
    5
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: default_center(),
            default_zoom: default_zoom(),
            search_pick_zoom: default_search_pick_zoom(),
            locate_zoom: default_locate_zoom(),
            geolocation_timeout_ms: default_geolocation_timeout_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_len: default_min_query_len(),
            max_results: default_max_results(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            only_available: default_only_available(),
            max_price: default_max_price(),
            price_floor: 0.0,
        }
    }
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: default_overpass_url(),
            area: default_overpass_area(),
            timeout_seconds: default_overpass_timeout_seconds(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            mock_primary: true,
            mock_secondary: true,
            simulated_delay_ms: default_simulated_delay_ms(),
            refresh_interval_minutes: default_refresh_interval_minutes(),
            overpass: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            map: MapConfig::default(),
            search: SearchConfig::default(),
            filter: FilterConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Criteria the filter panel starts with and returns to on clear
    pub fn default_criteria(&self) -> FilterCriteria {
        FilterCriteria {
            only_available: self.only_available,
            price_range: PriceRange::new(self.price_floor, self.max_price),
            ..Default::default()
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

pub static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file was missing; built-in defaults apply
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Report the source; call once logging is up
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                tracing::info!("Loaded configuration from {}", path.display())
            }
            ConfigSource::Defaults(path) => {
                tracing::warn!("Config file {} not found, using defaults", path.display())
            }
        }
    }
}

impl AppConfig {
    /// Read `path`, or defaults when it does not exist; a malformed file is an error
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::from_file(path)?, ConfigSource::File(path.to_path_buf())))
        } else {
            Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())))
        }
    }
}

/// Load the configuration into `CONFIG`
///
/// Runs before logging exists, so the returned source is for the caller
/// to log afterwards.
pub fn read_config(path: impl AsRef<Path>) -> anyhow::Result<(&'static AppConfig, ConfigSource)> {
    let (config, source) = AppConfig::load(path)?;
    Ok((CONFIG.get_or_init(|| config), source))
}
