//! The offline cache controller: install / activate / fetch.
//!
//! ```text
//!  Unregistered ──install──▶ Installing ──ok──▶ Installed ──activate──▶ Activating ──▶ Active
//!                                │
//!                                └──any precache failure──▶ Redundant
//! ```
//!
//! A new version is a new controller instance. It installs its own
//! generation while the old instance keeps serving from the old one; the
//! new instance's activation sweep then deletes every generation but its
//! own. The generation name is the only coordination between instances.
//!
//! # Fetch policy
//!
//! 1. Non-GET → declined (passes through untouched).
//! 2. Neither same-origin nor `https` → declined.
//! 3. Hit in the current generation → served from cache, no network.
//! 4. Miss → live fetch; credentials only for same-origin requests.
//! 5. Live fetch failed → cached offline page for navigations, the error
//!    otherwise.
//!
//! Network responses are never written back: the generation is exactly
//! the precache list for its whole life. Fetching never creates a
//! generation either; once a newer version has swept this one away, a
//! stale instance goes straight to the network.

use super::fetcher::{FetchError, Fetcher};
use super::request::{Credentials, Method, Request, Response, cache_key};
use super::storage::{CacheStorage, StorageError, Store};
use crate::config::SiteConfig;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Lifecycle state of one controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unregistered,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    /// Controlling clients and handling fetches.
    Active,
    /// Install failed; this instance will never activate.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unregistered => "unregistered",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        })
    }
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("cannot {event} while {state}")]
    InvalidTransition {
        event: &'static str,
        state: LifecycleState,
    },
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("precache failed for {url}: {reason}")]
    Precache { url: String, reason: String },
    #[error("cache generation {0} is not installed")]
    NotInstalled(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// The runtime that hosts the controller (the browser, or the CLI).
#[async_trait]
pub trait LifecycleHost: Send + Sync {
    /// Let the freshly installed version activate without waiting for
    /// clients of the old version to close.
    async fn skip_waiting(&self);

    /// Take control of every open client immediately.
    async fn claim_clients(&self);
}

/// Host that only records lifecycle signals in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHost;

#[async_trait]
impl LifecycleHost for TracingHost {
    async fn skip_waiting(&self) {
        tracing::debug!("skip waiting");
    }

    async fn claim_clients(&self) {
        tracing::debug!("clients claimed");
    }
}

/// Everything the controller needs to know about the site.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Name of this version's generation.
    pub cache_name: String,
    /// Origin the controller runs under.
    pub origin: Url,
    /// Paths or absolute URLs stored at install time.
    pub precache: Vec<String>,
    /// Page served for failed navigations.
    pub offline_url: String,
    /// Live fetches taking longer than this fail as a network error.
    pub fetch_timeout: Option<Duration>,
}

impl ControllerSettings {
    pub fn from_config(config: &SiteConfig) -> Result<Self, ControllerError> {
        let origin = Url::parse(&config.site.origin).map_err(|source| {
            ControllerError::InvalidUrl {
                url: config.site.origin.clone(),
                source,
            }
        })?;
        Ok(Self {
            cache_name: config.cache_name(),
            origin,
            precache: config.cache.precache.clone(),
            offline_url: config.cache.offline_url.clone(),
            fetch_timeout: config.cache.fetch_timeout_ms.map(Duration::from_millis),
        })
    }

    /// Resolve a configured path or URL against the origin.
    pub fn resolve(&self, url: &str) -> Result<Url, ControllerError> {
        self.origin
            .join(url)
            .map_err(|source| ControllerError::InvalidUrl {
                url: url.to_string(),
                source,
            })
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// Only same-origin or `https` URLs are ever read from or written to
    /// the cache.
    pub fn is_cacheable(&self, url: &Url) -> bool {
        self.is_same_origin(url) || url.scheme() == "https"
    }

    /// Credentials sent with a live fetch: same-origin only.
    pub fn credentials_for(&self, url: &Url) -> Credentials {
        if self.is_same_origin(url) {
            Credentials::SameOrigin
        } else {
            Credentials::Omit
        }
    }
}

/// Why a request was passed through without handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    /// The controller is not active.
    NotControlling,
    /// Only GET is intercepted.
    Method(Method),
    /// Cross-origin and not `https`.
    Origin,
}

/// Result of intercepting a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; the request goes to the network untouched.
    Declined(DeclineReason),
    Cached(Response),
    Network(Response),
    /// The live fetch failed and the navigation got the offline page.
    OfflineFallback(Response),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Declined(_) => None,
            Self::Cached(r) | Self::Network(r) | Self::OfflineFallback(r) => Some(r),
        }
    }
}

/// What an install stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache_name: String,
    /// Stored keys with their status and body size, in precache order.
    pub entries: Vec<(String, u16, usize)>,
}

/// What an activation sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_name: String,
    pub deleted: Vec<String>,
    /// Generations that could not be deleted; retried on the next activation.
    pub failed: Vec<(String, String)>,
}

/// Delete every generation except `current`. Idempotent.
///
/// Failures are collected, not returned: a stale generation that survives
/// is harmless and the next activation tries again.
pub async fn sweep<S: CacheStorage>(storage: &S, current: &str) -> SweepReport {
    let mut report = SweepReport {
        cache_name: current.to_string(),
        ..SweepReport::default()
    };
    let names = match storage.keys().await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "could not list cache generations");
            report.failed.push(("*".to_string(), e.to_string()));
            return report;
        }
    };
    for name in names.into_iter().filter(|n| n != current) {
        match storage.delete(&name).await {
            Ok(_) => {
                tracing::info!(cache = %name, "deleted stale generation");
                report.deleted.push(name);
            }
            Err(e) => {
                tracing::warn!(cache = %name, error = %e, "could not delete stale generation");
                report.failed.push((name, e.to_string()));
            }
        }
    }
    report
}

/// One controller instance, bound to one cache generation.
pub struct CacheController<S, F, H> {
    settings: ControllerSettings,
    storage: S,
    fetcher: F,
    host: H,
    state: LifecycleState,
}

impl<S, F, H> CacheController<S, F, H>
where
    S: CacheStorage,
    F: Fetcher,
    H: LifecycleHost,
{
    pub fn new(settings: ControllerSettings, storage: S, fetcher: F, host: H) -> Self {
        Self {
            settings,
            storage,
            fetcher,
            host,
            state: LifecycleState::Unregistered,
        }
    }

    /// Re-attach to a generation installed earlier, as a browser does when
    /// it restarts a worker.
    ///
    /// The instance is [`LifecycleState::Active`] only if storage records
    /// this generation as activated; otherwise it is
    /// [`LifecycleState::Installed`] and still has to run `on_activate`.
    pub async fn resume(
        settings: ControllerSettings,
        storage: S,
        fetcher: F,
        host: H,
    ) -> Result<Self, ControllerError> {
        let installed = storage.keys().await?;
        if !installed.contains(&settings.cache_name) {
            return Err(ControllerError::NotInstalled(settings.cache_name));
        }
        let activated = storage.active().await?.as_ref() == Some(&settings.cache_name);
        let mut controller = Self::new(settings, storage, fetcher, host);
        controller.state = if activated {
            LifecycleState::Active
        } else {
            LifecycleState::Installed
        };
        Ok(controller)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn expect_state(
        &self,
        expected: LifecycleState,
        event: &'static str,
    ) -> Result<(), ControllerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ControllerError::InvalidTransition {
                event,
                state: self.state,
            })
        }
    }

    /// Fetch every precache URL and store it in this version's generation.
    ///
    /// All-or-nothing: every URL is fetched before the generation is
    /// opened, so one failure leaves no generation behind and the instance
    /// becomes [`LifecycleState::Redundant`].
    pub async fn on_install(&mut self) -> Result<InstallReport, ControllerError> {
        self.expect_state(LifecycleState::Unregistered, "install")?;
        self.state = LifecycleState::Installing;
        tracing::info!(
            cache = %self.settings.cache_name,
            urls = self.settings.precache.len(),
            "installing"
        );

        match self.install_generation().await {
            Ok(report) => {
                self.host.skip_waiting().await;
                self.state = LifecycleState::Installed;
                tracing::info!(cache = %report.cache_name, "installed");
                Ok(report)
            }
            Err(e) => {
                self.state = LifecycleState::Redundant;
                tracing::warn!(cache = %self.settings.cache_name, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn install_generation(&self) -> Result<InstallReport, ControllerError> {
        let mut fetched = Vec::with_capacity(self.settings.precache.len());
        for entry in &self.settings.precache {
            let url = self.settings.resolve(entry)?;
            if !self.settings.is_cacheable(&url) {
                return Err(ControllerError::Precache {
                    url: url.to_string(),
                    reason: "neither same-origin nor https".to_string(),
                });
            }
            let request =
                Request::get(url.clone()).with_credentials(self.settings.credentials_for(&url));
            let response =
                self.live_fetch(&request)
                    .await
                    .map_err(|e| ControllerError::Precache {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
            if !response.is_ok() {
                return Err(ControllerError::Precache {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            tracing::debug!(url = %url, status = response.status, "precached");
            fetched.push((request.cache_key(), response));
        }

        let store = self.storage.open(&self.settings.cache_name).await?;
        let mut entries = Vec::with_capacity(fetched.len());
        for (key, response) in fetched {
            entries.push((key.clone(), response.status, response.body.len()));
            store.put(&key, response).await?;
        }
        Ok(InstallReport {
            cache_name: self.settings.cache_name.clone(),
            entries,
        })
    }

    /// Delete every other generation, then claim clients.
    pub async fn on_activate(&mut self) -> Result<SweepReport, ControllerError> {
        self.expect_state(LifecycleState::Installed, "activate")?;
        self.state = LifecycleState::Activating;

        let report = sweep(&self.storage, &self.settings.cache_name).await;
        self.storage.set_active(&self.settings.cache_name).await?;
        self.host.claim_clients().await;
        self.state = LifecycleState::Active;
        tracing::info!(
            cache = %self.settings.cache_name,
            deleted = report.deleted.len(),
            "activated"
        );
        Ok(report)
    }

    /// Intercept one request. See the module docs for the policy.
    pub async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome, ControllerError> {
        if self.state != LifecycleState::Active {
            return Ok(FetchOutcome::Declined(DeclineReason::NotControlling));
        }
        if request.method != Method::Get {
            return Ok(FetchOutcome::Declined(DeclineReason::Method(request.method)));
        }
        if !self.settings.is_cacheable(&request.url) {
            return Ok(FetchOutcome::Declined(DeclineReason::Origin));
        }

        let store = match self.storage.open_existing(&self.settings.cache_name).await {
            Ok(Some(store)) => Some(store),
            Ok(None) => {
                tracing::warn!(cache = %self.settings.cache_name, "generation gone, going to network");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache unavailable, going to network");
                None
            }
        };
        if let Some(store) = &store {
            match store.lookup(&request.cache_key()).await {
                Ok(Some(cached)) => {
                    tracing::debug!(url = %request.url, "cache hit");
                    return Ok(FetchOutcome::Cached(cached));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %request.url, error = %e, "cache lookup failed"),
            }
        }

        let outgoing = request
            .clone()
            .with_credentials(self.settings.credentials_for(&request.url));
        match self.live_fetch(&outgoing).await {
            Ok(response) => Ok(FetchOutcome::Network(response)),
            Err(e) if request.is_navigation() => {
                tracing::info!(url = %request.url, error = %e, "navigation failed, serving offline page");
                let offline_key = cache_key(&self.settings.resolve(&self.settings.offline_url)?);
                let page = match &store {
                    Some(store) => store.lookup(&offline_key).await.ok().flatten(),
                    None => None,
                };
                match page {
                    Some(page) => Ok(FetchOutcome::OfflineFallback(page)),
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn live_fetch(&self, request: &Request) -> Result<Response, FetchError> {
        match self.settings.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(request))
                .await
                .map_err(|_| FetchError::Timeout(limit))?,
            None => self.fetcher.fetch(request).await,
        }
    }
}
