//! Browser tests for the generated `sw.js`: install, activate, control,
//! strict cache-first.
//!
//! Headless Chrome loads the fixture site from the dev server (service
//! workers require HTTP, not file://).
//!
//! Run with: `cargo test --test browser_sw -- --ignored`

use folio::config::{SiteConfig, load_config};
use folio::server::DevServer;
use folio::sw::script;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::Path;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// ===========================================================================
// Site + server setup
// ===========================================================================

struct TestSite {
    _dir: TempDir,
    url: String,
    config: SiteConfig,
}

fn copy_dir(src: &Path, dst: &Path) {
    for entry in std::fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let to = dst.join(entry.file_name());
        if entry.path().is_dir() {
            std::fs::create_dir_all(&to).unwrap();
            copy_dir(&entry.path(), &to);
        } else {
            std::fs::copy(entry.path(), to).unwrap();
        }
    }
}

/// Copy the fixture site, write its `sw.js`, serve it on a free port.
fn start_site() -> TestSite {
    let dir = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir(&fixtures, dir.path());

    let config = load_config(dir.path(), None).unwrap();
    script::write(dir.path(), &config).unwrap();

    let server = DevServer::bind(dir.path(), 0, &config.cache.offline_url).unwrap();
    let url = format!("http://{}", server.local_addr().unwrap());
    thread::spawn(move || server.serve());

    TestSite {
        _dir: dir,
        url,
        config,
    }
}

fn browser() -> &'static Browser {
    static B: OnceLock<Browser> = OnceLock::new();
    B.get_or_init(|| {
        Browser::new(LaunchOptions {
            window_size: Some((1280, 800)),
            ..Default::default()
        })
        .expect("failed to launch Chrome")
    })
}

/// Wait for the service worker to reach the `activated` state.
/// Panics after 10 s if the SW never activates (install/activate failed).
fn wait_for_sw(tab: &Tab) {
    tab.evaluate(
        r#"Promise.race([
            navigator.serviceWorker.ready.then((reg) => {
                const sw = reg.active;
                if (sw && sw.state === 'activated') return 'ok';
                return new Promise((resolve) => {
                    sw.addEventListener('statechange', () => {
                        if (sw.state === 'activated') resolve('ok');
                    });
                });
            }),
            new Promise((_, reject) =>
                setTimeout(() => reject('SW activation timeout (10 s)'), 10000)
            ),
        ])"#,
        true,
    )
    .expect("service worker failed to activate");
}

fn load_controlled(site: &TestSite) -> std::sync::Arc<Tab> {
    let tab = browser().new_tab().unwrap();
    tab.navigate_to(&site.url)
        .unwrap()
        .wait_until_navigated()
        .unwrap();
    wait_for_sw(&tab);
    thread::sleep(Duration::from_millis(300));
    tab
}

fn eval_bool(tab: &Tab, js: &str) -> bool {
    tab.evaluate(js, true)
        .unwrap()
        .value
        .unwrap()
        .as_bool()
        .unwrap()
}

fn cached_paths(tab: &Tab, cache_name: &str) -> Vec<String> {
    let js = format!(
        r#"(async () => {{
            const cache = await caches.open('{cache_name}');
            const keys = await cache.keys();
            return JSON.stringify(keys.map(r => new URL(r.url).pathname));
        }})()"#
    );
    let result = tab.evaluate(&js, true).unwrap();
    serde_json::from_str(result.value.unwrap().as_str().unwrap()).unwrap()
}

// ===========================================================================
// Install + activate
// ===========================================================================

#[test]
#[ignore]
fn sw_activates_on_first_load() {
    let site = start_site();
    let tab = browser().new_tab().unwrap();
    tab.navigate_to(&site.url)
        .unwrap()
        .wait_until_navigated()
        .unwrap();

    wait_for_sw(&tab);
}

#[test]
#[ignore]
fn sw_precaches_every_configured_url() {
    let site = start_site();
    let tab = load_controlled(&site);

    let paths = cached_paths(&tab, &site.config.cache_name());
    for url in &site.config.cache.precache {
        assert!(paths.contains(url), "{url} not precached, got: {paths:?}");
    }
}

#[test]
#[ignore]
fn sw_claims_page_without_reload() {
    let site = start_site();
    let tab = load_controlled(&site);

    assert!(
        eval_bool(&tab, "!!navigator.serviceWorker.controller"),
        "clients.claim should hand the first page to the worker"
    );
}

// ===========================================================================
// Fetch policy
// ===========================================================================

#[test]
#[ignore]
fn sw_does_not_cache_network_responses() {
    let site = start_site();
    let tab = load_controlled(&site);

    assert!(eval_bool(&tab, "fetch('/icon-512.png').then(r => r.ok)"));
    thread::sleep(Duration::from_millis(300));

    let paths = cached_paths(&tab, &site.config.cache_name());
    assert!(
        !paths.contains(&"/icon-512.png".to_string()),
        "live responses must not be written to the cache"
    );
}

#[test]
#[ignore]
fn sw_serves_precached_manifest() {
    let site = start_site();
    let tab = load_controlled(&site);

    assert!(eval_bool(
        &tab,
        "fetch('/site.webmanifest').then(r => r.json()).then(m => m.short_name === 'Example')"
    ));
}
