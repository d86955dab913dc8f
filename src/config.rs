//! Site configuration module.
//!
//! Handles loading, validating, and merging `folio.toml`. The stock defaults
//! are serialized to a TOML table and the user's file is merged on top of
//! it key-by-key, so a config file only needs the values it overrides.
//!
//! ## Config File Location
//!
//! `folio.toml` lives in the site root, next to `index.html`:
//!
//! ```text
//! site/
//! ├── folio.toml
//! ├── index.html
//! ├── offline.html
//! ├── site.webmanifest
//! └── sw.js              # emitted by `folio sw script --write`
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! id = "folio"                       # Cache name prefix
//! origin = "http://localhost:8080"   # Origin the service worker runs under
//! pages = ["index.html", "resume.html", "now.html", "404.html"]
//!
//! [cache]
//! version = "1.0.0"                  # Bump to roll over the cache generation
//! offline_url = "/offline.html"
//! precache = ["/", "/index.html", "/icon.png", "/site.webmanifest", "/offline.html"]
//! script_path = "/sw.js"
//! store_dir = ".folio-cache"
//! # fetch_timeout_ms = 5000          # Omit for no timeout
//!
//! [budget]                           # Kilobytes
//! document = 50
//! script = 20
//! stylesheet = 30
//! image = 200
//! total = 300
//! # file = "budget.json"             # Lighthouse budget file, overrides the above
//!
//! [server]
//! port = 8080
//! watch = ["html", "css", "js", "json"]
//! poll_ms = 500
//!
//! [images]
//! sources = ["icon.png"]
//! formats = ["webp"]
//! quality = 85
//!
//! [og]
//! brand = "FOLIO"
//! output_dir = "cards"
//!
//! [fix_html]
//! files = ["index.html"]
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default config file name inside the site root.
pub const CONFIG_FILENAME: &str = "folio.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `folio.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site identity and the pages the tools operate on.
    pub site: SiteSection,
    /// Offline cache controller settings.
    pub cache: CacheConfig,
    /// Performance budget limits in kilobytes.
    pub budget: BudgetConfig,
    /// Dev server settings.
    pub server: ServerConfig,
    /// Image optimizer settings.
    pub images: ImagesConfig,
    /// Open-Graph card generator settings.
    pub og: OgConfig,
    /// HTML fixer settings.
    pub fix_html: FixHtmlConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.id.is_empty() || self.site.id.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(
                "site.id must be non-empty and contain no whitespace".into(),
            ));
        }
        if url::Url::parse(&self.site.origin).is_err() {
            return Err(ConfigError::Validation(format!(
                "site.origin is not a valid URL: {}",
                self.site.origin
            )));
        }
        if !is_semver(&self.cache.version) {
            return Err(ConfigError::Validation(format!(
                "cache.version must look like MAJOR.MINOR.PATCH, got {:?}",
                self.cache.version
            )));
        }
        if !self.cache.offline_url.starts_with('/') {
            return Err(ConfigError::Validation(
                "cache.offline_url must be an absolute path".into(),
            ));
        }
        if !self.cache.precache.contains(&self.cache.offline_url) {
            return Err(ConfigError::Validation(format!(
                "cache.precache must include the offline page {}",
                self.cache.offline_url
            )));
        }
        if !self.cache.script_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "cache.script_path must be an absolute path".into(),
            ));
        }
        if self.cache.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "cache.fetch_timeout_ms must be positive (omit it to disable)".into(),
            ));
        }
        let limits = [
            ("document", self.budget.document),
            ("script", self.budget.script),
            ("stylesheet", self.budget.stylesheet),
            ("image", self.budget.image),
            ("total", self.budget.total),
        ];
        for (name, value) in limits {
            if value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "budget.{name} must be positive"
                )));
            }
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".into()));
        }
        if self.server.poll_ms == 0 {
            return Err(ConfigError::Validation(
                "server.poll_ms must be non-zero".into(),
            ));
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.formats.is_empty() {
            return Err(ConfigError::Validation(
                "images.formats must not be empty".into(),
            ));
        }
        for card in &self.og.cards {
            if !is_hex_color(&card.color) {
                return Err(ConfigError::Validation(format!(
                    "og card {} has invalid color {:?} (expected #rrggbb)",
                    card.filename, card.color
                )));
            }
        }
        Ok(())
    }

    /// Versioned cache generation name: `<site-id>-v<version>`.
    pub fn cache_name(&self) -> String {
        cache_name(&self.site.id, &self.cache.version)
    }
}

/// Build a cache generation name from a site identifier and version.
pub fn cache_name(site_id: &str, version: &str) -> String {
    format!("{site_id}-v{version}")
}

fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

pub(crate) fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Site identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    /// Identifier used as the cache name prefix.
    pub id: String,
    /// Origin the service worker runs under (scheme, host, port).
    pub origin: String,
    /// HTML pages (relative to the site root) checked by `budget` and `check`.
    pub pages: Vec<String>,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            id: "folio".to_string(),
            origin: "http://localhost:8080".to_string(),
            pages: vec![
                "index.html".to_string(),
                "resume.html".to_string(),
                "now.html".to_string(),
                "404.html".to_string(),
            ],
        }
    }
}

/// Offline cache controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Semantic version embedded in the cache name.
    pub version: String,
    /// Page served for failed navigations.
    pub offline_url: String,
    /// URLs fetched and stored at install time, in order.
    pub precache: Vec<String>,
    /// Path the page registers the service worker script at.
    pub script_path: String,
    /// Directory (relative to the site root) holding on-disk generations.
    pub store_dir: String,
    /// Optional timeout for live network fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            offline_url: "/offline.html".to_string(),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/icon.png".to_string(),
                "/site.webmanifest".to_string(),
                "/offline.html".to_string(),
            ],
            script_path: "/sw.js".to_string(),
            store_dir: ".folio-cache".to_string(),
            fetch_timeout_ms: None,
        }
    }
}

/// Performance budget, in kilobytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    pub document: f64,
    pub script: f64,
    pub stylesheet: f64,
    pub image: f64,
    pub total: f64,
    /// Lighthouse-style `budget.json`; its entries override the values above.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            document: 50.0,
            script: 20.0,
            stylesheet: 30.0,
            image: 200.0,
            total: 300.0,
            file: None,
        }
    }
}

/// Dev server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// File extensions that trigger a live reload when changed.
    pub watch: Vec<String>,
    /// Watcher polling interval.
    pub poll_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            watch: ["html", "css", "js", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
            poll_ms: 500,
        }
    }
}

/// Output format produced by the image optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Webp,
    Avif,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }
}

/// Image optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Images to convert, relative to the site root.
    pub sources: Vec<String>,
    /// Formats written next to each source.
    pub formats: Vec<ImageFormat>,
    /// Lossy encoding quality (AVIF). WebP output is lossless.
    pub quality: u32,
    /// Maximum number of parallel workers. Defaults to the CPU count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            sources: vec!["icon.png".to_string()],
            formats: vec![ImageFormat::Webp],
            quality: 85,
            max_processes: None,
        }
    }
}

/// Resolve the effective worker count: `min(max_processes, cores)`.
pub fn effective_threads(config: &ImagesConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Open-Graph card generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OgConfig {
    /// Brand mark printed in the corner of every card.
    pub brand: String,
    /// Output directory, relative to the site root.
    pub output_dir: String,
    pub cards: Vec<CardConfig>,
}

impl Default for OgConfig {
    fn default() -> Self {
        Self {
            brand: "FOLIO".to_string(),
            output_dir: "cards".to_string(),
            cards: vec![CardConfig {
                filename: "og-home.html".to_string(),
                title: "Portfolio".to_string(),
                subtitle: "Home".to_string(),
                description: "Selected work and writing.".to_string(),
                color: "#2563eb".to_string(),
            }],
        }
    }
}

/// A single social card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardConfig {
    pub filename: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    /// Accent color for the background gradient (`#rrggbb`).
    pub color: String,
}

/// HTML fixer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixHtmlConfig {
    pub files: Vec<String>,
}

impl Default for FixHtmlConfig {
    fn default() -> Self {
        Self {
            files: vec!["index.html".to_string()],
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `folio.toml` from the site root (or an explicit file).
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<SiteConfig, ConfigError> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("config file not found: {}", p.display()),
                )));
            }
            p.to_path_buf()
        }
        None => root.join(CONFIG_FILENAME),
    };
    resolve_config(load_raw_config(&path)?)
}

/// Returns a fully-commented stock `folio.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# folio configuration
# ===================
# Every key is optional. Values shown are the defaults.

[site]
# Identifier used as the cache name prefix: "<id>-v<version>".
id = "folio"
# Origin the service worker runs under. Requests to this origin are
# fetched with credentials; everything else must be https.
origin = "http://localhost:8080"
# Pages checked by `folio budget` and `folio check`. Missing pages are skipped.
pages = ["index.html", "resume.html", "now.html", "404.html"]

[cache]
# Bump whenever the precache list or the fetch policy changes; the next
# activation deletes every other generation.
version = "1.0.0"
# Served in place of any navigation that fails while offline.
# Must be part of the precache list.
offline_url = "/offline.html"
# Fetched and stored at install time. One failure aborts the install.
precache = ["/", "/index.html", "/icon.png", "/site.webmanifest", "/offline.html"]
# Where the page registers the service worker.
script_path = "/sw.js"
# On-disk generations used by `folio sw` (relative to the site root).
store_dir = ".folio-cache"
# Live fetches slower than this are treated as network errors.
# fetch_timeout_ms = 5000

[budget]
# Kilobytes per page.
document = 50
script = 20
stylesheet = 30
image = 200
total = 300
# Lighthouse budget file; its resourceSizes override the values above.
# file = "budget.json"

[server]
# Also settable with the PORT environment variable or --port.
port = 8080
# Changes to files with these extensions trigger a live reload.
watch = ["html", "css", "js", "json"]
# How often the watcher scans the site, in milliseconds.
poll_ms = 500

[images]
# Images converted by `folio optimize-images`, relative to the site root.
sources = ["icon.png"]
# Output formats: "webp" (lossless) and/or "avif" (lossy, uses quality).
formats = ["webp"]
quality = 85
# Parallel workers. Omit for one per CPU core.
# max_processes = 4

[og]
# Brand mark shown on every card.
brand = "FOLIO"
# Where card HTML files are written, relative to the site root.
output_dir = "cards"

[[og.cards]]
filename = "og-home.html"
title = "Portfolio"
subtitle = "Home"
description = "Selected work and writing."
color = "#2563eb"

[fix_html]
# Files normalized by `folio fix-html` when none are given on the command line.
files = ["index.html"]
"##
}
