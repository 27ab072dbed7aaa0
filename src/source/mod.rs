//! Remote webcam sources and the fetch abstraction.
//!
//! This module defines the [`Source`] type (one polled camera) and the
//! [`Fetcher`] trait that performs the actual HTTP work.  The concrete
//! network implementation lives in [`http`].
//!
//! ## For contributors
//!
//! The poller only ever talks to a `Fetcher`, so tests can substitute an
//! in-memory implementation without touching the network.  If you need a
//! different transport (a proxy, a local mirror, ...), implement `Fetcher`
//! for it and hand it to [`crate::poll::Poller::new`].

mod http;

// Re-export the public API of this module so callers can write
// `use crate::source::{Fetcher, HttpFetcher, Source};`
pub use http::HttpFetcher;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Host suffix every netzcam project is served under.
const NETZCAM_DOMAIN: &str = "netzcam.net";

/// One polled webcam, identified by name inside a project namespace.
///
/// Sources are immutable once configured.  They order and hash by
/// `(project, name)` so they can key the poller's state map directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Source {
    pub project: String,
    pub name: String,
}

/// The two resources a source publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrls {
    /// Marker text that changes whenever a new snapshot is available.
    pub text_url: String,
    /// The snapshot itself.
    pub image_url: String,
}

impl Source {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }

    /// Derive the marker and image URLs for this source.
    ///
    /// No validation is performed: a bogus project or name simply produces a
    /// URL that fails to fetch.
    pub fn urls(&self) -> SourceUrls {
        let base = format!(
            "https://{}.{NETZCAM_DOMAIN}/out/{}",
            self.project, self.name
        );
        SourceUrls {
            text_url: format!("{base}.txt"),
            image_url: format!("{base}.jpg"),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

/// Single-attempt HTTP GET primitive used by the poller.
///
/// Both operations return `None` when the resource is unavailable: any
/// status other than 200, a transport error, or a timeout.  Implementations
/// must never panic or surface errors past this boundary; the poller treats
/// `None` as "skip this source for the current tick".
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a resource as UTF-8 text.
    async fn fetch_text(&self, url: &str) -> Option<String>;

    /// Fetch a resource as raw bytes.
    async fn fetch_binary(&self, url: &str) -> Option<Bytes>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
