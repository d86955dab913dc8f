//! Performance budget checker.
//!
//! Measures each configured page and compares it against per-resource
//! limits in kilobytes:
//!
//! | Resource | Measured as |
//! |----------|-------------|
//! | document | size of the HTML file |
//! | script | bytes of inline `<script>…</script>` blocks, tags included |
//! | stylesheet | bytes of inline `<style>…</style>` blocks, tags included |
//! | image | sum of file sizes of `<img src>` targets (`data:` URLs skipped) |
//! | total | sum of the four |
//!
//! The inline measurements are approximations: external scripts and
//! stylesheets are not followed, and inline blocks are counted in UTF-8
//! bytes. A browser-side count of string length (UTF-16 code units) comes
//! out lower for non-ASCII text. Every value is rounded to two decimals
//! before comparing, and the total is the sum of the rounded parts.
//!
//! Limits come from `[budget]` in `folio.toml`, optionally overridden by a
//! Lighthouse-style `budget.json`:
//!
//! ```json
//! [{ "resourceSizes": [{ "resourceType": "script", "budget": 20 }] }]
//! ```

use crate::config::SiteConfig;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid budget file {path}: {source}")]
    BudgetFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("budget file {0} has no resourceSizes entry")]
    EmptyBudgetFile(String),
    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Document,
    Script,
    Stylesheet,
    Image,
    Total,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        Self::Document,
        Self::Script,
        Self::Stylesheet,
        Self::Image,
        Self::Total,
    ];

    fn from_lighthouse(name: &str) -> Option<Self> {
        match name {
            "document" => Some(Self::Document),
            "script" => Some(Self::Script),
            "stylesheet" => Some(Self::Stylesheet),
            "image" => Some(Self::Image),
            "total" => Some(Self::Total),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Document => "Document",
            Self::Script => "Script",
            Self::Stylesheet => "Stylesheet",
            Self::Image => "Image",
            Self::Total => "Total",
        })
    }
}

/// Five numbers, one per resource type. Used for both limits and sizes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sizes {
    pub document: f64,
    pub script: f64,
    pub stylesheet: f64,
    pub image: f64,
    pub total: f64,
}

impl Sizes {
    pub fn get(&self, resource: ResourceType) -> f64 {
        match resource {
            ResourceType::Document => self.document,
            ResourceType::Script => self.script,
            ResourceType::Stylesheet => self.stylesheet,
            ResourceType::Image => self.image,
            ResourceType::Total => self.total,
        }
    }

    fn set(&mut self, resource: ResourceType, value: f64) {
        match resource {
            ResourceType::Document => self.document = value,
            ResourceType::Script => self.script = value,
            ResourceType::Stylesheet => self.stylesheet = value,
            ResourceType::Image => self.image = value,
            ResourceType::Total => self.total = value,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseBudget {
    #[serde(default)]
    resource_sizes: Vec<ResourceSize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSize {
    resource_type: String,
    budget: f64,
}

/// Resolve the limits: `[budget]` values, overridden by the budget file.
pub fn load_budgets(root: &Path, config: &SiteConfig) -> Result<Sizes, BudgetError> {
    let inline = &config.budget;
    let mut budgets = Sizes {
        document: inline.document,
        script: inline.script,
        stylesheet: inline.stylesheet,
        image: inline.image,
        total: inline.total,
    };

    let Some(file) = &inline.file else {
        return Ok(budgets);
    };
    let content = fs::read_to_string(root.join(file))?;
    let parsed: Vec<LighthouseBudget> =
        serde_json::from_str(&content).map_err(|source| BudgetError::BudgetFile {
            path: file.clone(),
            source,
        })?;
    let first = parsed
        .into_iter()
        .next()
        .ok_or_else(|| BudgetError::EmptyBudgetFile(file.clone()))?;
    for entry in first.resource_sizes {
        match ResourceType::from_lighthouse(&entry.resource_type) {
            Some(resource) => budgets.set(resource, entry.budget),
            None => tracing::debug!(resource = %entry.resource_type, "ignoring unknown budget type"),
        }
    }
    Ok(budgets)
}

/// Round to two decimals, as sizes are displayed.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn kb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

struct Patterns {
    script: Regex,
    style: Regex,
    img: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            script: Regex::new(r"(?i)<script[^>]*>[\s\S]*?</script>")?,
            style: Regex::new(r"(?i)<style[^>]*>[\s\S]*?</style>")?,
            img: Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#)?,
        })
    }
}

fn file_kb(path: &Path) -> f64 {
    fs::metadata(path).map(|m| kb(m.len())).unwrap_or(0.0)
}

fn measure(root: &Path, page: &Path, patterns: &Patterns) -> Result<Sizes, BudgetError> {
    let html = fs::read_to_string(page)?;
    let inline_kb = |re: &Regex| re.find_iter(&html).map(|m| kb(m.len() as u64)).sum::<f64>();

    let image: f64 = patterns
        .img
        .captures_iter(&html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|src| !src.starts_with("data:"))
        .map(|src| {
            let path = src.split(['?', '#']).next().unwrap_or(src);
            file_kb(&root.join(path.trim_start_matches('/')))
        })
        .sum();

    let mut sizes = Sizes {
        document: round2(file_kb(page)),
        script: round2(inline_kb(&patterns.script)),
        stylesheet: round2(inline_kb(&patterns.style)),
        image: round2(image),
        total: 0.0,
    };
    sizes.total = round2(sizes.document + sizes.script + sizes.stylesheet + sizes.image);
    Ok(sizes)
}

/// Result of comparing one resource against its limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub resource: ResourceType,
    pub size: f64,
    pub budget: f64,
    pub within: bool,
    /// `size / budget` as a rounded percentage.
    pub percentage: u32,
}

pub fn check(resource: ResourceType, size: f64, budget: f64) -> Check {
    Check {
        resource,
        size,
        budget,
        within: size <= budget,
        percentage: (size / budget * 100.0).round() as u32,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub page: String,
    pub sizes: Sizes,
    pub checks: Vec<Check>,
}

impl PageReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.within)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetReport {
    pub pages: Vec<PageReport>,
    /// Configured pages that do not exist.
    pub skipped: Vec<String>,
}

impl BudgetReport {
    pub fn passed(&self) -> bool {
        self.pages.iter().all(PageReport::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.pages.iter().filter(|p| p.passed()).count()
    }
}

/// Check a single page against the given limits.
pub fn check_page(root: &Path, page: &str, budgets: &Sizes) -> Result<PageReport, BudgetError> {
    let patterns = Patterns::compile()?;
    page_report(root, page, budgets, &patterns)
}

fn page_report(
    root: &Path,
    page: &str,
    budgets: &Sizes,
    patterns: &Patterns,
) -> Result<PageReport, BudgetError> {
    let sizes = measure(root, &root.join(page), patterns)?;
    let checks = ResourceType::ALL
        .iter()
        .map(|&r| check(r, sizes.get(r), budgets.get(r)))
        .collect();
    Ok(PageReport {
        page: page.to_string(),
        sizes,
        checks,
    })
}

/// Check every page in `site.pages`. Missing pages are skipped.
pub fn check_site(root: &Path, config: &SiteConfig) -> Result<BudgetReport, BudgetError> {
    let budgets = load_budgets(root, config)?;
    let patterns = Patterns::compile()?;
    let mut report = BudgetReport::default();
    for page in &config.site.pages {
        if !root.join(page).is_file() {
            tracing::debug!(page, "skipping missing page");
            report.skipped.push(page.clone());
            continue;
        }
        let page_report = page_report(root, page, &budgets, &patterns)?;
        if !page_report.passed() {
            tracing::warn!(page, "over budget");
        }
        report.pages.push(page_report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn budgets() -> Sizes {
        Sizes {
            document: 50.0,
            script: 20.0,
            stylesheet: 30.0,
            image: 200.0,
            total: 300.0,
        }
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    #[test]
    fn measures_inline_blocks_and_images() {
        let tmp = TempDir::new().unwrap();
        let script = format!("<script>{}</script>", "a".repeat(1024 - 17));
        let style = format!("<STYLE media=\"all\">{}</STYLE>", "b".repeat(2048 - 27));
        let html = format!(
            "<html><head>{script}{style}</head><body>\
             <img src=\"/photo.jpg\" alt=\"p\">\
             <img src='data:image/png;base64,AAAA' alt=\"inline\">\
             <img alt=\"missing\" src=\"gone.png\"></body></html>"
        );
        fs::write(tmp.path().join("index.html"), &html).unwrap();
        fs::write(tmp.path().join("photo.jpg"), vec![0u8; 10 * 1024]).unwrap();

        let report = check_page(tmp.path(), "index.html", &budgets()).unwrap();
        assert_eq!(report.sizes.script, 1.0);
        assert_eq!(report.sizes.stylesheet, 2.0);
        assert_eq!(report.sizes.image, 10.0);
        assert_eq!(report.sizes.document, round2(html.len() as f64 / 1024.0));
        assert_eq!(
            report.sizes.total,
            round2(report.sizes.document + 1.0 + 2.0 + 10.0)
        );
        assert!(report.passed());
    }

    #[test]
    fn query_string_on_image_src_is_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("index.html"),
            r#"<img src="icon.png?v=3" alt="i">"#,
        )
        .unwrap();
        fs::write(tmp.path().join("icon.png"), vec![0u8; 2048]).unwrap();
        let report = check_page(tmp.path(), "index.html", &budgets()).unwrap();
        assert_eq!(report.sizes.image, 2.0);
    }

    #[test]
    fn check_percentage_and_boundary() {
        let c = check(ResourceType::Script, 20.0, 20.0);
        assert!(c.within);
        assert_eq!(c.percentage, 100);

        let c = check(ResourceType::Image, 250.0, 200.0);
        assert!(!c.within);
        assert_eq!(c.percentage, 125);

        assert_eq!(check(ResourceType::Document, 1.0, 3.0).percentage, 33);
    }

    #[test]
    fn oversized_script_fails_page() {
        let tmp = TempDir::new().unwrap();
        let html = format!("<script>{}</script>", "x".repeat(30 * 1024));
        fs::write(tmp.path().join("index.html"), html).unwrap();
        let report = check_page(tmp.path(), "index.html", &budgets()).unwrap();
        assert!(!report.passed());
        let failing: Vec<_> = report
            .checks
            .iter()
            .filter(|c| !c.within)
            .map(|c| c.resource)
            .collect();
        assert_eq!(failing, vec![ResourceType::Script]);
    }

    // =========================================================================
    // Site-level
    // =========================================================================

    #[test]
    fn missing_pages_are_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "<h1>hi</h1>").unwrap();
        let report = check_site(tmp.path(), &SiteConfig::default()).unwrap();
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.skipped, vec!["resume.html", "now.html", "404.html"]);
        assert!(report.passed());
        assert_eq!(report.passed_count(), 1);
    }

    #[test]
    fn one_failing_page_fails_the_site() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(tmp.path().join("now.html"), "x".repeat(60 * 1024)).unwrap();
        let report = check_site(tmp.path(), &SiteConfig::default()).unwrap();
        assert!(!report.passed());
        assert_eq!(report.passed_count(), 1);
    }

    #[test]
    fn lighthouse_file_overrides_inline_limits() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("budget.json"),
            r#"[{"resourceSizes": [
                {"resourceType": "script", "budget": 5},
                {"resourceType": "third-party", "budget": 1}
            ]}]"#,
        )
        .unwrap();
        let mut config = SiteConfig::default();
        config.budget.file = Some("budget.json".to_string());

        let budgets = load_budgets(tmp.path(), &config).unwrap();
        assert_eq!(budgets.script, 5.0);
        assert_eq!(budgets.document, 50.0);
    }

    #[test]
    fn malformed_budget_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("budget.json"), "{not json").unwrap();
        let mut config = SiteConfig::default();
        config.budget.file = Some("budget.json".to_string());
        assert!(matches!(
            load_budgets(tmp.path(), &config),
            Err(BudgetError::BudgetFile { .. })
        ));

        fs::write(tmp.path().join("budget.json"), "[]").unwrap();
        assert!(matches!(
            load_budgets(tmp.path(), &config),
            Err(BudgetError::EmptyBudgetFile(_))
        ));
    }
}
