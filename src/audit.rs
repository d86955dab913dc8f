//! Static site checks: page markup, web manifest, offline cache wiring.
//!
//! Every rule produces [`Finding`]s tagged with a severity. The audit
//! passes when there are no [`Severity::Error`] findings; warnings are
//! advice.
//!
//! ## Rules
//!
//! | Target | Rule | Severity |
//! |--------|------|----------|
//! | page | `<!DOCTYPE html>` first | error |
//! | page | `<html lang>` | error |
//! | page | non-empty `<title>` | error |
//! | page | `<meta charset="utf-8">` | error |
//! | page | viewport with `width=device-width`, zoom not disabled | error |
//! | page | description meta (over 50 chars) | error / warning |
//! | page | manifest link | warning |
//! | page | exactly one `<h1>` | error |
//! | page | every `<img>` has `alt` | error |
//! | page | `target="_blank"` links carry `rel="noopener"` (`noreferrer` advised) | error / warning |
//! | page | root-relative links resolve to a file | warning |
//! | index | registers the worker at `cache.script_path` | error |
//! | manifest | name, short_name, start_url, display, colors, icons | error |
//! | cache | every precache URL and the offline page exist | error |
//! | cache | generated worker present and current | warning |
//!
//! Markup is inspected with regular expressions, not a DOM: enough for
//! hand-written pages, not a validator.

use crate::config::{SiteConfig, is_hex_color};
use crate::site::{self, Resolution};
use crate::sw::script;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "site.webmanifest";

const DISPLAY_MODES: &[&str] = &["fullscreen", "standalone", "minimal-ui", "browser"];
const ORIENTATIONS: &[&str] = &[
    "any",
    "natural",
    "landscape",
    "portrait",
    "portrait-primary",
    "portrait-secondary",
    "landscape-primary",
    "landscape-secondary",
];

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Script(#[from] script::ScriptError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    /// File the finding is about.
    pub target: String,
    /// Short rule identifier, e.g. `img-alt`.
    pub rule: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Files that were inspected.
    pub checked: Vec<String>,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn passed(&self) -> bool {
        self.errors() == 0
    }

    pub fn has(&self, rule: &str) -> bool {
        self.findings.iter().any(|f| f.rule == rule)
    }
}

/// Collects findings for one target.
struct Findings<'a> {
    target: &'a str,
    out: Vec<Finding>,
}

impl<'a> Findings<'a> {
    fn new(target: &'a str) -> Self {
        Self {
            target,
            out: Vec::new(),
        }
    }

    fn push(&mut self, severity: Severity, rule: &'static str, message: impl Into<String>) {
        self.out.push(Finding {
            severity,
            target: self.target.to_string(),
            rule,
            message: message.into(),
        });
    }

    fn error(&mut self, rule: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, rule, message);
    }

    fn warn(&mut self, rule: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, rule, message);
    }
}

// =============================================================================
// Markup scanning
// =============================================================================

/// An opening tag with its attributes (names lowercased).
#[derive(Debug)]
struct Tag {
    attrs: HashMap<String, String>,
}

impl Tag {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn has(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }
}

/// Tag names the page rules look at.
const TAG_NAMES: [&str; 6] = ["html", "meta", "link", "h1", "img", "a"];

struct Markup {
    attr: Regex,
    title: Regex,
    tags: Vec<(&'static str, Regex)>,
}

impl Markup {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            attr: Regex::new(
                r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
            )?,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            tags: TAG_NAMES
                .iter()
                .map(|name| Regex::new(&format!(r"(?is)<{name}\b([^>]*)>")).map(|re| (*name, re)))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Every opening `<name …>` tag in the document. `name` must be one of
    /// [`TAG_NAMES`].
    fn tags(&self, html: &str, name: &str) -> Vec<Tag> {
        let Some((_, re)) = self.tags.iter().find(|(n, _)| *n == name) else {
            return Vec::new();
        };
        re.captures_iter(html)
            .map(|c| {
                let raw = c.get(1).map_or("", |m| m.as_str());
                let attrs = self
                    .attr
                    .captures_iter(raw)
                    .map(|a| {
                        let value = a
                            .get(2)
                            .or_else(|| a.get(3))
                            .or_else(|| a.get(4))
                            .map_or("", |m| m.as_str());
                        (a[1].to_ascii_lowercase(), value.to_string())
                    })
                    .collect();
                Tag { attrs }
            })
            .collect()
    }

    fn meta_named<'t>(tags: &'t [Tag], name: &str) -> Option<&'t Tag> {
        tags.iter()
            .find(|t| t.attr("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

fn rel_contains(tag: &Tag, token: &str) -> bool {
    tag.attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case(token)))
}

// =============================================================================
// Page rules
// =============================================================================

fn audit_page(
    root: &Path,
    page: &str,
    html: &str,
    markup: &Markup,
) -> Vec<Finding> {
    let mut f = Findings::new(page);

    if !html
        .trim_start_matches('\u{feff}')
        .trim_start()
        .get(..15)
        .is_some_and(|s| s.eq_ignore_ascii_case("<!DOCTYPE html>"))
    {
        f.error("doctype", "document must start with <!DOCTYPE html>");
    }

    let html_tags = markup.tags(html, "html");
    if !html_tags
        .first()
        .and_then(|t| t.attr("lang"))
        .is_some_and(|l| !l.trim().is_empty())
    {
        f.error("html-lang", "<html> needs a lang attribute");
    }

    let title = markup
        .title
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    if title.as_deref().is_none_or(str::is_empty) {
        f.error("title", "missing or empty <title>");
    }

    let metas = markup.tags(html, "meta");
    if !metas
        .iter()
        .any(|t| t.attr("charset").is_some_and(|c| c.eq_ignore_ascii_case("utf-8")))
    {
        f.error("charset", "missing <meta charset=\"utf-8\">");
    }

    match Markup::meta_named(&metas, "viewport").and_then(|t| t.attr("content")) {
        None => f.error("viewport", "missing viewport meta"),
        Some(content) => {
            let content = content.to_ascii_lowercase().replace(' ', "");
            if !content.contains("width=device-width") {
                f.error("viewport", "viewport must include width=device-width");
            }
            if content.contains("user-scalable=no") || content.contains("user-scalable=0") {
                f.error("viewport", "viewport must not disable zooming");
            }
        }
    }

    match Markup::meta_named(&metas, "description").and_then(|t| t.attr("content")) {
        None => f.error("description", "missing description meta"),
        Some(d) if d.chars().count() <= 50 => {
            f.warn("description", "description should be longer than 50 characters")
        }
        Some(_) => {}
    }

    let links = markup.tags(html, "link");
    if !links.iter().any(|t| rel_contains(t, "manifest")) {
        f.warn("manifest-link", "no <link rel=\"manifest\">");
    }

    let h1_count = markup.tags(html, "h1").len();
    if h1_count != 1 {
        f.error("single-h1", format!("expected exactly one <h1>, found {h1_count}"));
    }

    for img in markup.tags(html, "img") {
        if !img.has("alt") {
            let src = img.attr("src").unwrap_or("?");
            f.error("img-alt", format!("<img src=\"{src}\"> has no alt attribute"));
        }
    }

    for a in markup.tags(html, "a") {
        let href = a.attr("href").unwrap_or("");
        if a.attr("target").is_some_and(|t| t.eq_ignore_ascii_case("_blank")) {
            if !rel_contains(&a, "noopener") {
                f.error("blank-noopener", format!("link to {href} opens a new tab without rel=\"noopener\""));
            } else if !rel_contains(&a, "noreferrer") {
                f.warn("blank-noreferrer", format!("link to {href} should also set noreferrer"));
            }
        }
        if href.starts_with('/')
            && !href.starts_with("//")
            && !matches!(site::resolve(root, href), Resolution::File(_))
        {
            f.warn("internal-link", format!("link target {href} does not exist"));
        }
    }

    f.out
}

fn audit_registration(page: &str, html: &str, script_path: &str) -> Vec<Finding> {
    let mut f = Findings::new(page);
    let file = script_path.trim_start_matches('/');
    if !html.contains("navigator.serviceWorker.register") {
        f.error("sw-registration", "index page does not register a service worker");
    } else if !html.contains(file) {
        f.error(
            "sw-registration",
            format!("service worker registration does not reference {script_path}"),
        );
    }
    f.out
}

// =============================================================================
// Manifest rules
// =============================================================================

fn str_field<'v>(manifest: &'v Value, key: &str) -> Option<&'v str> {
    manifest.get(key).and_then(Value::as_str)
}

fn is_size(value: &str) -> bool {
    value
        .split_once('x')
        .is_some_and(|(w, h)| {
            !w.is_empty()
                && !h.is_empty()
                && w.chars().all(|c| c.is_ascii_digit())
                && h.chars().all(|c| c.is_ascii_digit())
        })
}

fn audit_manifest(root: &Path, content: &str) -> Vec<Finding> {
    let mut f = Findings::new(MANIFEST_FILE);
    let manifest: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            f.error("manifest-json", format!("not valid JSON: {e}"));
            return f.out;
        }
    };

    if str_field(&manifest, "name").is_none_or(|n| n.trim().is_empty()) {
        f.error("manifest-name", "missing name");
    }
    match str_field(&manifest, "short_name") {
        None => f.error("manifest-short-name", "missing short_name"),
        Some(s) if s.chars().count() >= 15 => {
            f.error("manifest-short-name", "short_name should be under 15 characters")
        }
        Some(_) => {}
    }
    match str_field(&manifest, "start_url") {
        Some(u) if u.starts_with('/') || u.starts_with("http://") || u.starts_with("https://") => {}
        _ => f.error("manifest-start-url", "start_url must be root-relative or http(s)"),
    }
    match str_field(&manifest, "display") {
        Some(d) if DISPLAY_MODES.contains(&d) => {
            if d != "standalone" && d != "fullscreen" {
                f.warn("manifest-display", format!("display \"{d}\"; standalone is preferred"));
            }
        }
        _ => f.error(
            "manifest-display",
            format!("display must be one of {}", DISPLAY_MODES.join(", ")),
        ),
    }
    for key in ["theme_color", "background_color"] {
        if !str_field(&manifest, key).is_some_and(is_hex_color) {
            f.error("manifest-color", format!("{key} must be #rrggbb"));
        }
    }
    if let Some(o) = str_field(&manifest, "orientation")
        && !ORIENTATIONS.contains(&o)
    {
        f.warn("manifest-orientation", format!("unknown orientation \"{o}\""));
    }
    if let Some(shortcuts) = manifest.get("shortcuts").and_then(Value::as_array) {
        for s in shortcuts {
            let url = str_field(s, "url").unwrap_or("");
            if !url.starts_with('/') {
                f.error("manifest-shortcut", format!("shortcut url {url:?} must be root-relative"));
            }
        }
    }

    let icons = manifest
        .get("icons")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if icons.is_empty() {
        f.error("manifest-icons", "no icons");
        return f.out;
    }
    for (i, icon) in icons.iter().enumerate() {
        let src = str_field(icon, "src").unwrap_or("");
        if src.is_empty() {
            f.error("manifest-icons", format!("icon {i} has no src"));
        } else if !src.starts_with("http") && !root.join(src.trim_start_matches('/')).is_file() {
            f.warn("manifest-icon-file", format!("icon file {src} not found"));
        }
        if !str_field(icon, "type").is_some_and(|t| t.starts_with("image/")) {
            f.error("manifest-icons", format!("icon {i} type must be image/*"));
        }
        if !str_field(icon, "sizes").is_some_and(is_size) {
            f.error("manifest-icons", format!("icon {i} sizes must be NxN"));
        }
    }
    let has_size = |size: &str| {
        icons
            .iter()
            .any(|i| str_field(i, "sizes").is_some_and(|s| s.split_whitespace().any(|v| v == size)))
    };
    for size in ["192x192", "512x512"] {
        if !has_size(size) {
            f.error("manifest-icons", format!("no {size} icon"));
        }
    }
    if !icons
        .iter()
        .any(|i| str_field(i, "purpose").is_some_and(|p| p.contains("maskable")))
    {
        f.error("manifest-icons", "no maskable icon");
    }
    f.out
}

// =============================================================================
// Offline cache wiring
// =============================================================================

fn audit_cache(root: &Path, config: &SiteConfig) -> Result<Vec<Finding>, AuditError> {
    let mut f = Findings::new("folio.toml");
    let mut urls: Vec<&str> = config.cache.precache.iter().map(String::as_str).collect();
    if !urls.contains(&config.cache.offline_url.as_str()) {
        urls.push(&config.cache.offline_url);
    }
    for url in urls.into_iter().filter(|u| u.starts_with('/')) {
        if !matches!(site::resolve(root, url), Resolution::File(_)) {
            f.error("precache-file", format!("precached {url} has no file in the site"));
        }
    }

    let script_file = script::script_file(root, config);
    let script_target = config.cache.script_path.trim_start_matches('/').to_string();
    let mut sf = Findings::new(&script_target);
    match fs::read_to_string(&script_file) {
        Err(_) => sf.warn(
            "sw-script",
            "service worker missing; run `folio sw script --write`",
        ),
        Ok(existing) if existing != script::render(config)? => sf.warn(
            "sw-script",
            "service worker is out of date; run `folio sw script --write`",
        ),
        Ok(_) => {}
    }

    let mut out = f.out;
    out.extend(sf.out);
    Ok(out)
}

/// Run every rule against the site root.
pub fn audit_site(root: &Path, config: &SiteConfig) -> Result<AuditReport, AuditError> {
    let markup = Markup::compile()?;
    let mut report = AuditReport::default();

    for page in &config.site.pages {
        let Ok(html) = fs::read_to_string(root.join(page)) else {
            continue;
        };
        report.checked.push(page.clone());
        report.findings.extend(audit_page(root, page, &html, &markup));
        if page == "index.html" {
            report
                .findings
                .extend(audit_registration(page, &html, &config.cache.script_path));
        }
    }

    match fs::read_to_string(root.join(MANIFEST_FILE)) {
        Ok(content) => {
            report.checked.push(MANIFEST_FILE.to_string());
            report.findings.extend(audit_manifest(root, &content));
        }
        Err(_) => report.findings.push(Finding {
            severity: Severity::Error,
            target: MANIFEST_FILE.to_string(),
            rule: "manifest-missing",
            message: "no web manifest in the site root".to_string(),
        }),
    }

    report.findings.extend(audit_cache(root, config)?);
    tracing::debug!(
        errors = report.errors(),
        warnings = report.warnings(),
        "audit complete"
    );
    Ok(report)
}
