//! Renders the browser-side `sw.js` for the configured cache policy.
//!
//! The script mirrors [`CacheController`](super::CacheController): atomic
//! precache on install, sweep and claim on activate, GET-only cache-first
//! fetches with the offline page as the navigation fallback. Values are
//! substituted into `static/sw.js` as JSON literals, so any string the
//! config accepts is safe to embed.

use crate::config::SiteConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TEMPLATE: &str = include_str!("../../static/sw.js");

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn render(config: &SiteConfig) -> Result<String, ScriptError> {
    let timeout = match config.cache.fetch_timeout_ms {
        Some(ms) => ms.to_string(),
        None => "null".to_string(),
    };
    Ok(TEMPLATE
        .replace("__VERSION__", &serde_json::to_string(&config.cache.version)?)
        .replace("__CACHE_NAME__", &serde_json::to_string(&config.cache_name())?)
        .replace(
            "__OFFLINE_URL__",
            &serde_json::to_string(&config.cache.offline_url)?,
        )
        .replace(
            "__PRECACHE__",
            &serde_json::to_string_pretty(&config.cache.precache)?,
        )
        .replace("__FETCH_TIMEOUT_MS__", &timeout))
}

/// Where `sw.js` lives in the site directory.
pub fn script_file(root: &Path, config: &SiteConfig) -> PathBuf {
    root.join(config.cache.script_path.trim_start_matches('/'))
}

/// Render and write the script to its configured path.
pub fn write(root: &Path, config: &SiteConfig) -> Result<PathBuf, ScriptError> {
    let path = script_file(root, config);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, render(config)?)?;
    tracing::info!(path = %path.display(), cache = %config.cache_name(), "wrote service worker");
    Ok(path)
}

/// Page snippet that registers the worker.
pub fn registration_snippet(script_path: &str) -> Result<String, ScriptError> {
    Ok(format!(
        "if ('serviceWorker' in navigator) {{\n  window.addEventListener('load', () => {{\n    navigator.serviceWorker.register({});\n  }});\n}}\n",
        serde_json::to_string(script_path)?
    ))
}
