//! HTML validator appeasement.
//!
//! Rewrites `<br />`-style void elements to `<br>`, strips trailing
//! whitespace from every line and makes sure the file ends with a newline.
//! The rewrite is idempotent; a file that is already clean is left
//! untouched on disk.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Elements that never have content or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "meta", "link", "br", "hr", "img", "input", "area", "base", "col", "embed", "param", "source",
    "track", "wbr",
];

#[derive(Error, Debug)]
pub enum FixError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixResult {
    pub file: String,
    pub changed: bool,
}

pub struct HtmlFixer {
    void_tags: Vec<(Regex, String)>,
}

impl HtmlFixer {
    pub fn new() -> Result<Self, FixError> {
        let void_tags = VOID_ELEMENTS
            .iter()
            .map(|el| Ok((Regex::new(&format!(r"<{el}([^>]*?)\s*/>"))?, format!("<{el}${{1}}>"))))
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self { void_tags })
    }

    /// Apply every fix to a document.
    pub fn fix(&self, html: &str) -> String {
        let mut out = html.to_string();
        for (re, replacement) in &self.void_tags {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        let mut out = out
            .split('\n')
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Fix a file in place, writing only if something changed.
    pub fn fix_file(&self, root: &Path, file: &str) -> Result<FixResult, FixError> {
        let path = root.join(file);
        let io_err = |source| FixError::Io {
            path: path.clone(),
            source,
        };
        let original = fs::read_to_string(&path).map_err(io_err)?;
        let fixed = self.fix(&original);
        let changed = fixed != original;
        if changed {
            fs::write(&path, fixed).map_err(io_err)?;
            tracing::info!(file, "fixed HTML");
        }
        Ok(FixResult {
            file: file.to_string(),
            changed,
        })
    }
}

/// Fix each file; the first failure stops the run.
pub fn fix_files(root: &Path, files: &[String]) -> Result<Vec<FixResult>, FixError> {
    let fixer = HtmlFixer::new()?;
    files.iter().map(|f| fixer.fix_file(root, f)).collect()
}
