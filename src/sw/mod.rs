//! Offline cache controller for the site.
//!
//! A versioned cache-first worker: on install it precaches a fixed list of
//! URLs into a generation named `<site-id>-v<version>`; on activate it
//! deletes every other generation and takes control of open clients; on
//! fetch it serves GET requests from the current generation, falls back to
//! the network on a miss and to the cached offline page when a navigation
//! cannot reach the network.
//!
//! | Module | Role |
//! |--------|------|
//! | [`controller`] | Lifecycle state machine and fetch policy |
//! | [`request`] | Request/response snapshots, cache keys |
//! | [`storage`] | `CacheStorage` / `Store` traits, in-memory storage |
//! | [`disk`] | Content-addressed on-disk storage for the CLI |
//! | [`fetcher`] | Network seam: site directory host, simulated outage |
//! | [`script`] | The equivalent browser `sw.js` |
//!
//! The browser script and the Rust controller implement the same policy.
//! The Rust side exists so the policy can be exercised and tested without a
//! browser, and so `folio sw` can show what a visitor would be served.

pub mod controller;
pub mod disk;
pub mod fetcher;
pub mod request;
pub mod script;
pub mod storage;

pub use controller::{
    CacheController, ControllerError, ControllerSettings, DeclineReason, FetchOutcome,
    InstallReport, LifecycleHost, LifecycleState, SweepReport, TracingHost, sweep,
};
pub use disk::{DirStorage, DirStore};
pub use fetcher::{FetchError, Fetcher, OfflineFetcher, SiteFetcher};
pub use request::{Credentials, Method, Request, RequestMode, Response, cache_key};
pub use storage::{CacheStorage, MemoryStorage, MemoryStore, StorageError, Store};
