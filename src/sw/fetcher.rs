//! Network seam for the cache controller.
//!
//! [`Fetcher`] replaces the browser's `fetch()`. Two implementations ship:
//!
//! - [`SiteFetcher`]: the static content host. Answers requests for the
//!   configured origin straight from the site directory; any other origin
//!   is unreachable.
//! - [`OfflineFetcher`]: every request fails, as if the network were down.

use super::request::{Method, Request, Response};
use crate::site::{self, Resolution};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Performs live network fetches.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Serves the site directory as if it were the origin server.
#[derive(Debug, Clone)]
pub struct SiteFetcher {
    root: PathBuf,
    origin: Url,
}

impl SiteFetcher {
    pub fn new(root: impl Into<PathBuf>, origin: Url) -> Self {
        Self {
            root: root.into(),
            origin,
        }
    }
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if request.url.origin() != self.origin.origin() {
            return Err(FetchError::Unreachable(
                request.url.host_str().unwrap_or("<none>").to_string(),
            ));
        }

        let response = match site::resolve(&self.root, request.url.path()) {
            Resolution::File(path) => {
                let body = if request.method == Method::Head {
                    Vec::new()
                } else {
                    std::fs::read(&path)?
                };
                Response::new(200, body).with_header("content-type", crate::mime::content_type(&path))
            }
            Resolution::Forbidden => Response::new(403, "Forbidden"),
            Resolution::NotFound => Response::new(404, "Not Found"),
        };
        Ok(response)
    }
}

/// A network that is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        Err(FetchError::Network(format!("offline: {}", request.url)))
    }
}
