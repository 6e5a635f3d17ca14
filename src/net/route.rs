//! Destination identity.
//!
//! A [`Route`] is the key for both connection pooling and per-destination
//! circuit state. Two requests share a route when scheme, host and effective
//! port all match.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

/// Error returned when a URL cannot be turned into a route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// A network destination (scheme + host + port).
///
/// Cheap to clone; the host is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Route {
    scheme: Scheme,
    host: Arc<str>,
    port: u16,
}

/// Supported URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl Route {
    /// Build a route from its parts.
    pub fn new(scheme: Scheme, host: impl Into<Arc<str>>, port: u16) -> Self {
        let host: Arc<str> = host.into();
        Self {
            scheme,
            host: Arc::from(host.to_ascii_lowercase()),
            port,
        }
    }

    /// Parse a route from a URL string, filling in the scheme's default port.
    pub fn parse(input: &str) -> Result<Self, RouteError> {
        let url = Url::parse(input).map_err(|e| RouteError::InvalidUrl(format!("{input}: {e}")))?;
        Self::from_url(&url)
    }

    /// Derive the route of an already parsed URL.
    pub fn from_url(url: &Url) -> Result<Self, RouteError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(RouteError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| RouteError::MissingHost(url.to_string()))?;
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self::new(scheme, host, port))
    }

    /// Derive the route of a request URI.
    pub fn from_uri(uri: &http::Uri) -> Result<Self, RouteError> {
        Self::parse(&uri.to_string())
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, suitable for `TcpStream::connect` and the `Host` header.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host.trim_matches(|c| c == '[' || c == ']'), self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())
    }
}
