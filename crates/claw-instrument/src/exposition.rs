//! Scrape endpoint support.
//!
//! [`ScrapeHandler`] turns a registry into HTTP-ready responses without
//! depending on any particular HTTP stack: feed it the request's `Accept`
//! header and copy the returned body and content type into your response.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use claw_instrument::exposition::ScrapeHandler;
//! use claw_instrument::{Collector, Counter, Registry};
//!
//! let collector = Arc::new(Collector::new("app"));
//! let jobs = Counter::with_collector("jobs_total", "Jobs processed.", &collector).unwrap();
//! jobs.inc();
//!
//! let registry = Arc::new(Registry::new());
//! registry.register_collector(collector).unwrap();
//!
//! let handler = ScrapeHandler::new(registry);
//! let response = handler.handle(None).unwrap();
//! assert!(response.content_type.starts_with("text/plain"));
//! assert!(String::from_utf8_lossy(response.body_bytes()).contains("jobs_total 1"));
//! ```

use std::borrow::Borrow;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ExpositionConfig;
use crate::encoding::Format;
use crate::error::Result;
use crate::registry::Registry;

/// Serves scrapes of one registry.
#[derive(Debug, Clone)]
pub struct ScrapeHandler<R: Borrow<Registry> = Arc<Registry>> {
    registry: R,
    config: ExpositionConfig,
}

impl ScrapeHandler<&'static Registry> {
    /// Creates a handler over [`Registry::global`].
    #[must_use]
    pub fn global() -> Self {
        Self::new(Registry::global())
    }
}

impl<R: Borrow<Registry>> ScrapeHandler<R> {
    /// Creates a handler with the default configuration.
    pub fn new(registry: R) -> Self {
        Self::with_config(registry, ExpositionConfig::default())
    }

    /// Creates a handler with `config`.
    pub const fn with_config(registry: R, config: ExpositionConfig) -> Self {
        Self { registry, config }
    }

    /// Collects the registry and renders it.
    ///
    /// `accept` is the request's `Accept` header. Without one, the
    /// configured format is used.
    ///
    /// # Errors
    ///
    /// Returns the collection or formatting error that failed the scrape.
    pub fn handle(&self, accept: Option<&str>) -> Result<ScrapeResponse> {
        let format = accept.map_or(self.config.format, |header| Format::negotiate(Some(header)));
        let config = ExpositionConfig {
            format,
            ..self.config.clone()
        };

        match self.registry().encode_with(&config) {
            Ok(body) => {
                debug!(%format, bytes = body.len(), "served scrape");
                Ok(ScrapeResponse {
                    body,
                    content_type: format.content_type(),
                    format,
                })
            }
            Err(err) => {
                warn!(%format, error = %err, "scrape failed");
                Err(err)
            }
        }
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &Registry {
        self.registry.borrow()
    }

    /// Returns the handler configuration.
    pub const fn config(&self) -> &ExpositionConfig {
        &self.config
    }
}

/// A rendered scrape.
#[derive(Debug, Clone)]
pub struct ScrapeResponse {
    /// Encoded metrics.
    pub body: Vec<u8>,
    /// The Content-Type header value.
    pub content_type: &'static str,
    /// The format `body` is encoded in.
    pub format: Format,
}

impl ScrapeResponse {
    /// Returns the body as bytes.
    #[must_use]
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Writes the body to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.body)
    }
}
