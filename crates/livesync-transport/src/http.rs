//! HTTP pull transport
//!
//! Fetches a source's JSON document with a GET request.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use livesync_core::domain::FetchDescriptor;
//! use livesync_core::ports::IPullTransport;
//! use livesync_transport::HttpPullTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = HttpPullTransport::new(Duration::from_secs(10))?
//!     .with_base_url("https://dashboard.example.com")?;
//! let stats = transport.fetch(&FetchDescriptor::new("/api/stats")).await?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use livesync_core::config::PullConfig;
use livesync_core::domain::{FetchDescriptor, PullError};
use livesync_core::ports::IPullTransport;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::TransportError;

/// `IPullTransport` over HTTP
///
/// Relative source URLs are resolved against the base URL; absolute ones
/// are used as-is.
pub struct HttpPullTransport {
    client: Client,
    base_url: Option<Url>,
    bearer_token: Option<String>,
}

impl HttpPullTransport {
    /// Creates a transport whose requests time out after `timeout`
    ///
    /// # Errors
    /// `TransportError::Client` if the TLS backend cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: None,
            bearer_token: None,
        })
    }

    /// Builds a transport from the `pull` section of the configuration
    ///
    /// # Errors
    /// `TransportError::Client` or `TransportError::InvalidUrl`
    pub fn from_config(config: &PullConfig) -> Result<Self, TransportError> {
        let mut transport = Self::new(Duration::from_secs(config.timeout_secs))?;
        if let Some(base_url) = &config.base_url {
            transport = transport.with_base_url(base_url)?;
        }
        if let Some(token) = &config.bearer_token {
            transport = transport.with_bearer_token(token.clone());
        }
        Ok(transport)
    }

    /// Sets the URL relative source URLs are joined onto
    ///
    /// # Errors
    /// `TransportError::InvalidUrl` unless `base_url` is an absolute http(s) URL
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, TransportError> {
        let mut url = Url::parse(base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "{base_url}: expected http or https"
            )));
        }
        // Without a trailing slash, joining replaces the last path segment
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.base_url = Some(url);
        Ok(self)
    }

    /// Sends `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Resolves a source URL to the URL actually requested
    ///
    /// # Errors
    /// `PullError::Transport` for unparsable URLs, or relative URLs
    /// without a base URL
    pub fn resolve(&self, url: &str) -> Result<Url, PullError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base
                    .join(url)
                    .map_err(|e| PullError::Transport(format!("{url}: {e}"))),
                None => Err(PullError::Transport(format!(
                    "{url}: relative URL without a base URL"
                ))),
            },
            Err(e) => Err(PullError::Transport(format!("{url}: {e}"))),
        }
    }
}

#[async_trait]
impl IPullTransport for HttpPullTransport {
    async fn fetch(&self, descriptor: &FetchDescriptor) -> Result<Value, PullError> {
        let url = self.resolve(&descriptor.url)?;
        debug!(url = %url, "Fetching source");

        let mut request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed");
            PullError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Source returned error status");
            return Err(PullError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PullError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| PullError::Decode(e.to_string()))
    }
}
