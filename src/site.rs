//! URL path → file resolution inside the site root.
//!
//! Shared by the dev server and by [`SiteFetcher`](crate::sw::SiteFetcher),
//! so the cache controller precaches exactly what the dev server would
//! serve for the same URL.

use std::path::{Path, PathBuf};

/// Outcome of resolving a request path against the site root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    /// The path tried to escape the site root.
    Forbidden,
    NotFound,
}

/// Resolve a URL path (`/`, `/resume`, `/img/a.png?v=2`) to a file.
///
/// - `/` maps to `index.html`; a directory maps to its `index.html`.
/// - Query strings and fragments are ignored.
/// - Any `..` segment is forbidden.
/// - A missing file is retried with `.html` appended (`/resume` → `resume.html`).
pub fn resolve(root: &Path, url_path: &str) -> Resolution {
    let path = url_path.split(['?', '#']).next().unwrap_or("");
    let rel = path.trim_start_matches('/');

    if rel.split(['/', '\\']).any(|segment| segment == "..") {
        return Resolution::Forbidden;
    }

    let candidate = if rel.is_empty() {
        root.join("index.html")
    } else {
        root.join(rel)
    };

    if candidate.is_file() {
        return Resolution::File(candidate);
    }
    if candidate.is_dir() {
        let index = candidate.join("index.html");
        return if index.is_file() {
            Resolution::File(index)
        } else {
            Resolution::NotFound
        };
    }
    if candidate.extension().and_then(|e| e.to_str()) != Some("html") {
        let with_html = PathBuf::from(format!("{}.html", candidate.display()));
        if with_html.is_file() {
            return Resolution::File(with_html);
        }
    }
    Resolution::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "home").unwrap();
        fs::write(tmp.path().join("resume.html"), "cv").unwrap();
        fs::create_dir_all(tmp.path().join("blog")).unwrap();
        fs::write(tmp.path().join("blog/index.html"), "blog").unwrap();
        fs::write(tmp.path().join("blog/post.txt"), "txt").unwrap();
        tmp
    }

    #[test]
    fn root_maps_to_index() {
        let tmp = site();
        assert_eq!(
            resolve(tmp.path(), "/"),
            Resolution::File(tmp.path().join("index.html"))
        );
    }

    #[test]
    fn extensionless_path_falls_back_to_html() {
        let tmp = site();
        assert_eq!(
            resolve(tmp.path(), "/resume"),
            Resolution::File(tmp.path().join("resume.html"))
        );
    }

    #[test]
    fn directory_maps_to_its_index() {
        let tmp = site();
        assert_eq!(
            resolve(tmp.path(), "/blog/"),
            Resolution::File(tmp.path().join("blog/index.html"))
        );
    }

    #[test]
    fn query_and_fragment_ignored() {
        let tmp = site();
        assert_eq!(
            resolve(tmp.path(), "/blog/post.txt?v=3#top"),
            Resolution::File(tmp.path().join("blog/post.txt"))
        );
    }

    #[test]
    fn traversal_is_forbidden() {
        let tmp = site();
        assert_eq!(resolve(tmp.path(), "/../etc/passwd"), Resolution::Forbidden);
        assert_eq!(resolve(tmp.path(), "/blog/../../x"), Resolution::Forbidden);
    }

    #[test]
    fn missing_file_not_found() {
        let tmp = site();
        assert_eq!(resolve(tmp.path(), "/nope.png"), Resolution::NotFound);
        assert_eq!(resolve(tmp.path(), "/nope"), Resolution::NotFound);
    }
}
