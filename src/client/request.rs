//! Outbound request model.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, HOST};
use http::{HeaderMap, Method, Uri};
use http_body_util::Full;

use crate::net::{Route, RouteError};

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// Response type returned by the executor: the head plus the fully read body.
pub type Response = http::Response<Bytes>;

/// Error building a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid URI {uri}: {message}")]
    InvalidUri { uri: String, message: String },

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

/// Whether a request may be sent more than once.
///
/// Declared by the caller; never inferred from the method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Idempotency {
    #[default]
    NonIdempotent,
    Idempotent,
    /// Idempotent by way of a server-side deduplication key.
    Keyed(String),
}

impl Idempotency {
    pub fn is_retry_eligible(&self) -> bool {
        !matches!(self, Idempotency::NonIdempotent)
    }
}

/// One logical HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    idempotency: Idempotency,
    route: Route,
}

impl Request {
    /// Build a request for an absolute `http(s)://` URI.
    pub fn new(method: Method, uri: &str) -> Result<Self, RequestError> {
        let parsed: Uri = uri.parse().map_err(|e: http::uri::InvalidUri| RequestError::InvalidUri {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        let route = Route::from_uri(&parsed)?;
        Ok(Self {
            method,
            uri: parsed,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            idempotency: Idempotency::default(),
            route,
        })
    }

    pub fn get(uri: &str) -> Result<Self, RequestError> {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Result<Self, RequestError> {
        Self::new(Method::POST, uri)
    }

    pub fn put(uri: &str) -> Result<Self, RequestError> {
        Self::new(Method::PUT, uri)
    }

    pub fn delete(uri: &str) -> Result<Self, RequestError> {
        Self::new(Method::DELETE, uri)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, RequestError> {
        let name =
            HeaderName::try_from(name).map_err(|e| RequestError::InvalidHeader(e.to_string()))?;
        let value =
            HeaderValue::try_from(value).map_err(|e| RequestError::InvalidHeader(e.to_string()))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Declare the request safe to repeat.
    pub fn idempotent(mut self) -> Self {
        if !matches!(self.idempotency, Idempotency::Keyed(_)) {
            self.idempotency = Idempotency::Idempotent;
        }
        self
    }

    /// Attach an idempotency key; the request becomes retry-eligible and
    /// carries the key in the `Idempotency-Key` header.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency = Idempotency::Keyed(key.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn idempotency(&self) -> &Idempotency {
        &self.idempotency
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Wire form for one attempt: origin-form target, `Host` and, for keyed
    /// requests, `Idempotency-Key`.
    pub(crate) fn to_http(&self, route: &Route) -> Result<http::Request<Full<Bytes>>, http::Error> {
        let target = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut builder = http::Request::builder().method(self.method.clone()).uri(target);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
            if !headers.contains_key(HOST) {
                headers.insert(HOST, HeaderValue::try_from(host_header(route))?);
            }
            if let Idempotency::Keyed(key) = &self.idempotency {
                headers.insert(IDEMPOTENCY_KEY, HeaderValue::try_from(key.as_str())?);
            }
        }
        builder.body(Full::new(self.body.clone()))
    }
}

fn host_header(route: &Route) -> String {
    if route.port() == route.scheme().default_port() {
        route.host().to_string()
    } else {
        route.authority()
    }
}
