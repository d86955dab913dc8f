//! Polling file watcher.
//!
//! Each poll walks the site root and compares modification times against
//! the previous snapshot. Hidden directories, `node_modules`, `target` and
//! the cache store are never descended into.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

type Snapshot = BTreeMap<PathBuf, SystemTime>;

const ALWAYS_SKIPPED: &[&str] = &["node_modules", "target"];

pub struct Watcher {
    root: PathBuf,
    extensions: Vec<String>,
    skipped: Vec<String>,
    interval: Duration,
    snapshot: Snapshot,
}

impl Watcher {
    /// Start watching; the first snapshot is taken immediately.
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: &[String],
        store_dir: &str,
        interval: Duration,
    ) -> Self {
        let mut skipped: Vec<String> = ALWAYS_SKIPPED.iter().map(|s| s.to_string()).collect();
        skipped.push(store_dir.trim_matches('/').to_string());
        let mut watcher = Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            skipped,
            interval,
            snapshot: Snapshot::new(),
        };
        watcher.snapshot = watcher.scan();
        watcher
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn watched_files(&self) -> usize {
        self.snapshot.len()
    }

    fn is_watched(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|w| w.eq_ignore_ascii_case(e)))
    }

    fn scan(&self) -> Snapshot {
        let walker = WalkDir::new(&self.root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !self.skipped.iter().any(|s| s.as_str() == name)
        });

        walker
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && self.is_watched(e.path()))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((e.into_path(), modified))
            })
            .collect()
    }

    /// Files added, modified or removed since the last poll.
    pub fn poll(&mut self) -> Vec<PathBuf> {
        let current = self.scan();
        let mut changed: Vec<PathBuf> = current
            .iter()
            .filter(|(path, mtime)| self.snapshot.get(*path) != Some(*mtime))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            self.snapshot
                .keys()
                .filter(|path| !current.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        self.snapshot = current;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn watcher(root: &Path) -> Watcher {
        let exts = ["html", "css", "js", "json"].map(String::from);
        Watcher::new(root, &exts, ".folio-cache", Duration::from_millis(10))
    }

    fn touch_later(path: &Path, content: &str) {
        // Some filesystems only keep second-resolution mtimes
        let before = fs::metadata(path).and_then(|m| m.modified()).ok();
        fs::write(path, content).unwrap();
        if let Some(before) = before {
            let file = fs::File::options().write(true).open(path).unwrap();
            file.set_modified(before + Duration::from_secs(2)).unwrap();
        }
    }

    #[test]
    fn nothing_changed_between_polls() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "a").unwrap();
        let mut w = watcher(tmp.path());
        assert_eq!(w.watched_files(), 1);
        assert!(w.poll().is_empty());
    }

    #[test]
    fn detects_modified_added_and_removed() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("index.html");
        let style = tmp.path().join("style.css");
        fs::write(&index, "a").unwrap();
        fs::write(&style, "a").unwrap();
        let mut w = watcher(tmp.path());

        touch_later(&index, "b");
        assert_eq!(w.poll(), vec![index.clone()]);

        let script = tmp.path().join("app.js");
        fs::write(&script, "x").unwrap();
        fs::remove_file(&style).unwrap();
        assert_eq!(w.poll(), vec![script, style]);
    }

    #[test]
    fn ignores_unwatched_extensions() {
        let tmp = TempDir::new().unwrap();
        let mut w = watcher(tmp.path());
        fs::write(tmp.path().join("photo.png"), "png").unwrap();
        assert!(w.poll().is_empty());
    }

    #[test]
    fn skips_hidden_vendor_and_store_dirs() {
        let tmp = TempDir::new().unwrap();
        for dir in [".git", "node_modules", "target", ".folio-cache/site-v1", "css"] {
            let d = tmp.path().join(dir);
            fs::create_dir_all(&d).unwrap();
            fs::write(d.join("x.json"), "{}").unwrap();
        }
        let w = watcher(tmp.path());
        assert_eq!(w.watched_files(), 1, "only css/x.json is watched");
    }

    #[test]
    fn custom_store_dir_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("sw-store");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("index.json"), "{}").unwrap();
        let exts = ["json".to_string()];
        let w = Watcher::new(tmp.path(), &exts, "sw-store", Duration::from_millis(10));
        assert_eq!(w.watched_files(), 0);
    }
}
