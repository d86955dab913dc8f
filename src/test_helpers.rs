//! Shared test utilities.
//!
//! `fixtures/site/` is a small site that passes every audit rule. Tests get
//! a private copy they can break on purpose.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixture_site();
//! std::fs::remove_file(tmp.path().join("offline.html")).unwrap();
//! ```

use std::path::Path;
use tempfile::TempDir;

/// The fixture's `index.html`: clean under every page rule.
pub const GOOD_PAGE: &str = include_str!("../fixtures/site/index.html");

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` into a fresh temp directory.
pub fn setup_fixture_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_fixture_site(tmp.path());
    tmp
}

/// Copy `fixtures/site/` into `dst`, minus its `folio.toml` so callers
/// choose their own configuration.
pub fn write_fixture_site(dst: &Path) {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, dst).unwrap();
    let _ = std::fs::remove_file(dst.join("folio.toml"));
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// Assertions
// =========================================================================

/// Assert every `needle` occurs in `haystack`, in order.
pub fn assert_in_order(haystack: &str, needles: &[&str]) {
    let mut from = 0;
    for needle in needles {
        match haystack[from..].find(needle) {
            Some(pos) => from += pos + needle.len(),
            None => panic!("{needle:?} not found after byte {from} in:\n{haystack}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_copy_has_site_files_without_config() {
        let tmp = setup_fixture_site();
        for file in ["index.html", "offline.html", "site.webmanifest", "icon.png", "icon-512.png"] {
            assert!(tmp.path().join(file).is_file(), "missing {file}");
        }
        assert!(!tmp.path().join("folio.toml").exists());
    }

    #[test]
    fn in_order_accepts_ordered_needles() {
        assert_in_order("a b c", &["a", "c"]);
    }

    #[test]
    #[should_panic]
    fn in_order_rejects_reversed_needles() {
        assert_in_order("a b c", &["c", "a"]);
    }
}
