use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub crossover: CrossoverConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub legacy: LegacyConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrossoverConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: f64,
    #[serde(default = "default_item_types")]
    pub item_types: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            item_types: default_item_types(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_window_hours() -> f64 {
    4.0
}
fn default_item_types() -> Vec<String> {
    vec!["PSScene3Band".to_string()]
}
fn default_max_pages() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_tiles_url")]
    pub tiles_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Status codes the provider uses to say "slow down".
    #[serde(default = "default_rate_limit_statuses")]
    pub rate_limit_statuses: Vec<u16>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            tiles_url: default_tiles_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            rate_limit_statuses: default_rate_limit_statuses(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.planet.com/data/v1/quick-search".to_string()
}
fn default_tiles_url() -> String {
    "https://tiles0.planet.com/v1/experimental/tiles".to_string()
}
fn default_api_key_env() -> String {
    "PLANET_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    10_000
}
fn default_rate_limit_statuses() -> Vec<u16> {
    vec![429]
}

#[derive(Debug, Deserialize, Clone)]
pub struct LegacyConfig {
    #[serde(default = "default_browse_url")]
    pub browse_url: String,
    #[serde(default = "default_legacy_item_type")]
    pub item_type: String,
    #[serde(default = "default_legacy_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            browse_url: default_browse_url(),
            item_type: default_legacy_item_type(),
            timeout_secs: default_legacy_timeout_secs(),
        }
    }
}

fn default_browse_url() -> String {
    "https://earthexplorer.usgs.gov/browse/gisready/eo-1/hyp".to_string()
}
fn default_legacy_item_type() -> String {
    "EO1_HYP_PUB".to_string()
}
fn default_legacy_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_group_attempts")]
    pub group_attempts: u32,
    #[serde(default = "default_matte")]
    pub matte: [u8; 3],
    #[serde(default)]
    pub matte_tolerance: u8,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_max_mosaic_pixels")]
    pub max_mosaic_pixels: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: default_thumbnail_width(),
            concurrency: default_concurrency(),
            group_attempts: default_group_attempts(),
            matte: default_matte(),
            matte_tolerance: 0,
            overwrite: false,
            max_mosaic_pixels: default_max_mosaic_pixels(),
        }
    }
}

fn default_thumbnail_width() -> u32 {
    500
}
fn default_concurrency() -> usize {
    4
}
fn default_group_attempts() -> u32 {
    2
}
fn default_matte() -> [u8; 3] {
    [0, 0, 0]
}
fn default_max_mosaic_pixels() -> u64 {
    100_000_000
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.crossover.window_hours > 0.0 && self.crossover.window_hours.is_finite()) {
            bail!("crossover.window_hours must be a positive number of hours");
        }
        if self.crossover.item_types.is_empty() {
            bail!("crossover.item_types must name at least one item type");
        }
        if self.crossover.max_pages == 0 {
            bail!("crossover.max_pages must be >= 1");
        }
        if self.catalog.api_key_env.trim().is_empty() {
            bail!("catalog.api_key_env must name an environment variable");
        }
        if self.catalog.backoff_base_ms > self.catalog.backoff_max_ms {
            bail!("catalog.backoff_base_ms must be <= catalog.backoff_max_ms");
        }
        if self.render.thumbnail_width == 0 {
            bail!("render.thumbnail_width must be > 0");
        }
        if self.render.concurrency == 0 {
            bail!("render.concurrency must be >= 1");
        }
        if self.render.group_attempts == 0 {
            bail!("render.group_attempts must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}
