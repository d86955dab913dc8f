//! # Folio
//!
//! Tooling for a hand-written static portfolio site. The site itself is plain
//! HTML, one web manifest and a service worker; `folio` is everything around
//! it: the offline cache policy, a live-reload dev server, and the checks and
//! generators that keep the pages fast and well-formed.
//!
//! # The Offline Cache Controller
//!
//! The centre of the crate is [`sw`], the service-worker cache lifecycle
//! written as an explicit state machine:
//!
//! ```text
//! Unregistered → Installing → Installed → Activating → Active
//!                     │
//!                     └─ precache failed → Redundant
//! ```
//!
//! Browser globals (`caches`, `fetch`, `skipWaiting`, `clients.claim`) are
//! injected as traits, so the same policy runs against in-memory fakes in
//! tests, against the site directory from the CLI (`folio sw`), and is
//! emitted as the `sw.js` the browser actually runs ([`sw::script`]).
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sw`] | Cache controller, storage and network seams, `sw.js` emitter |
//! | [`server`] | Dev server with WebSocket live reload and a polling file watcher |
//! | [`site`] | URL path → file resolution shared by the server and the site fetcher |
//! | [`mime`] | Extension → content type table |
//! | [`budget`] | Per-page size budgets (document, inline script/style, images) |
//! | [`audit`] | Page, manifest and service-worker wiring checks |
//! | [`htmlfix`] | Void-element and whitespace normalizer |
//! | [`cards`] | Open-Graph card HTML rendered with Maud |
//! | [`optimize`] | WebP/AVIF conversion of site images, `<picture>` snippets |
//! | [`imaging`] | Image backend trait and the pure-Rust implementation |
//! | [`config`] | `folio.toml` loading, merging with stock defaults, validation |
//! | [`output`] | CLI output formatting for every command |
//!
//! # Design Decisions
//!
//! ## All-or-Nothing Install
//!
//! Every precache URL is fetched before the generation is opened. A single
//! failure leaves no half-filled cache behind and the controller becomes
//! `Redundant`; the previous version keeps serving.
//!
//! ## Strict Cache-First
//!
//! Cached responses are returned without a freshness check and network
//! responses are never written back. A new deploy bumps `cache.version`,
//! which names a new generation; activation deletes the old one.
//!
//! ## No Node Toolchain
//!
//! The site's helper scripts (dev server, budget check, image conversion,
//! card generation) live in one statically linked binary. Image encoding is
//! pure Rust, so there is nothing to install besides `folio`.

pub mod audit;
pub mod budget;
pub mod cards;
pub mod config;
pub mod htmlfix;
pub mod imaging;
pub mod mime;
pub mod optimize;
pub mod output;
pub mod server;
pub mod site;
pub mod sw;

#[cfg(test)]
pub(crate) mod test_helpers;
