//! Cross-origin request handling
//!
//! [`CorsLayer`] wraps a router. Preflight `OPTIONS` requests are answered
//! by the layer itself with the methods the matched route allows; every
//! other response gets the `Access-Control-*` headers attached.
//!
//! Allowed methods are derived from the router rather than configured: no
//! route registers an `OPTIONS` handler, so routing an `OPTIONS` request
//! to a registered path yields the route's method-not-allowed reply and its
//! `Allow` header without running a handler. Paths with no route reach the
//! router's fallback instead; the lookup request carries a [`MethodLookup`]
//! extension so the fallback can answer it cheaply.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    response::Response,
};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

/// Request extension marking the `OPTIONS` request the layer routes to
/// discover a path's allowed methods
#[derive(Debug, Clone, Copy)]
pub struct MethodLookup;

/// Headers allowed when none are configured
pub const DEFAULT_ALLOW_HEADERS: &str =
    "Origin, X-Requested-With, Content-Type, Accept, Authorization";

/// Preflight cache lifetime when none is configured (6 hours)
pub const DEFAULT_MAX_AGE_SECS: u64 = 21600;

/// Which origins may make cross-origin requests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "OriginSpec", into = "OriginSpec")]
pub enum AllowedOrigin {
    /// Any origin (`*`)
    #[default]
    Wildcard,
    /// Exactly one origin
    Single(String),
    /// A fixed set of origins
    List(Vec<String>),
}

impl AllowedOrigin {
    /// Header value for `Access-Control-Allow-Origin`
    pub fn render(&self) -> String {
        match self {
            Self::Wildcard => "*".to_string(),
            Self::Single(origin) => origin.clone(),
            Self::List(origins) => origins.join(", "),
        }
    }
}

/// Wire form of [`AllowedOrigin`]: a string or a list of strings
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OriginSpec {
    One(String),
    Many(Vec<String>),
}

impl From<OriginSpec> for AllowedOrigin {
    fn from(spec: OriginSpec) -> Self {
        match spec {
            OriginSpec::One(origin) if origin.trim() == "*" => Self::Wildcard,
            OriginSpec::One(origin) => Self::Single(origin),
            OriginSpec::Many(origins) => Self::List(origins),
        }
    }
}

impl From<AllowedOrigin> for OriginSpec {
    fn from(origin: AllowedOrigin) -> Self {
        match origin {
            AllowedOrigin::Wildcard => Self::One("*".to_string()),
            AllowedOrigin::Single(origin) => Self::One(origin),
            AllowedOrigin::List(origins) => Self::Many(origins),
        }
    }
}

/// CORS settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins
    #[serde(default)]
    pub origins: AllowedOrigin,

    /// Explicit allowed methods; derived from the routes when unset
    #[serde(default)]
    pub methods: Option<Vec<String>>,

    /// Explicit allowed headers; [`DEFAULT_ALLOW_HEADERS`] when unset
    #[serde(default)]
    pub headers: Option<Vec<String>>,

    /// Preflight cache lifetime in seconds
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Attach headers to non-preflight responses too
    #[serde(default = "default_true")]
    pub attach_to_all: bool,

    /// Answer `OPTIONS` requests without routing them to a handler
    #[serde(default = "default_true")]
    pub automatic_options: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::new(AllowedOrigin::Wildcard)
    }
}

impl CorsConfig {
    /// Settings for the given origins with everything else defaulted
    pub fn new(origins: AllowedOrigin) -> Self {
        Self {
            origins,
            methods: None,
            headers: None,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            attach_to_all: true,
            automatic_options: true,
        }
    }

    /// Use an explicit method list instead of deriving it per route
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.methods = Some(methods.into_iter().map(|m| m.as_str().to_string()).collect());
        self
    }

    /// Use an explicit header list instead of the default set
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    /// Preflight cache lifetime, rounded down to whole seconds
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = max_age.as_secs();
        self
    }

    pub fn attach_to_all(mut self, attach: bool) -> Self {
        self.attach_to_all = attach;
        self
    }

    pub fn automatic_options(mut self, automatic: bool) -> Self {
        self.automatic_options = automatic;
        self
    }
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

fn default_true() -> bool {
    true
}

/// Invalid CORS settings
#[derive(Debug, Error)]
pub enum CorsError {
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("{field} value {value:?} is not a valid header value")]
    InvalidHeaderValue { field: &'static str, value: String },
}

/// Upper-case, de-duplicate, sort, and join methods with `", "`
pub fn render_methods<I, S>(methods: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    methods
        .into_iter()
        .map(|m| m.as_ref().trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

fn header_value(field: &'static str, value: String) -> Result<HeaderValue, CorsError> {
    HeaderValue::from_str(&value).map_err(|_| CorsError::InvalidHeaderValue { field, value })
}

/// Pre-rendered header values
#[derive(Debug)]
struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: Option<HeaderValue>,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
    attach_to_all: bool,
    automatic_options: bool,
}

impl CorsPolicy {
    fn from_config(config: &CorsConfig) -> Result<Self, CorsError> {
        let allow_methods = match &config.methods {
            Some(methods) => {
                for method in methods {
                    Method::from_bytes(method.trim().as_bytes())
                        .map_err(|_| CorsError::InvalidMethod(method.clone()))?;
                }
                Some(header_value("allow-methods", render_methods(methods))?)
            }
            None => None,
        };

        let allow_headers = match &config.headers {
            Some(headers) => header_value(
                "allow-headers",
                headers
                    .iter()
                    .map(|h| h.trim().to_uppercase())
                    .collect::<Vec<_>>()
                    .join(", "),
            )?,
            None => HeaderValue::from_static(DEFAULT_ALLOW_HEADERS),
        };

        Ok(Self {
            allow_origin: header_value("allow-origin", config.origins.render())?,
            allow_methods,
            allow_headers,
            max_age: HeaderValue::from(config.max_age_secs),
            attach_to_all: config.attach_to_all,
            automatic_options: config.automatic_options,
        })
    }

    /// Methods to advertise given a route's `Allow` header
    fn methods_from_allow(&self, allow: &HeaderValue) -> Option<HeaderValue> {
        let allow = allow.to_str().ok()?;
        let mut methods: Vec<&str> = allow
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect();
        if methods.is_empty() {
            return None;
        }
        if self.automatic_options {
            methods.push(Method::OPTIONS.as_str());
        }
        HeaderValue::from_str(&render_methods(methods)).ok()
    }

    fn apply(&self, headers: &mut HeaderMap, allow_methods: Option<HeaderValue>) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        if let Some(methods) = allow_methods {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
    }
}

/// Layer that applies a [`CorsConfig`] to a service
#[derive(Debug, Clone)]
pub struct CorsLayer {
    policy: Arc<CorsPolicy>,
}

impl CorsLayer {
    /// Validate the settings and pre-render the header values
    pub fn new(config: &CorsConfig) -> Result<Self, CorsError> {
        Ok(Self {
            policy: Arc::new(CorsPolicy::from_config(config)?),
        })
    }

    /// Any origin, derived methods, default headers
    pub fn permissive() -> Self {
        Self {
            policy: Arc::new(CorsPolicy {
                allow_origin: HeaderValue::from_static("*"),
                allow_methods: None,
                allow_headers: HeaderValue::from_static(DEFAULT_ALLOW_HEADERS),
                max_age: HeaderValue::from(DEFAULT_MAX_AGE_SECS),
                attach_to_all: true,
                automatic_options: true,
            }),
        }
    }
}

impl<S> Layer<S> for CorsLayer {
    type Service = Cors<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cors {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service produced by [`CorsLayer`]
#[derive(Debug, Clone)]
pub struct Cors<S> {
    inner: S,
    policy: Arc<CorsPolicy>,
}

impl<S> Service<Request<Body>> for Cors<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // `self.inner` is the instance that was polled ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();

        Box::pin(async move {
            let method = req.method().clone();
            let uri = req.uri().clone();
            let lookup = inner.clone();

            let response = inner.call(req).await?;

            if method == Method::OPTIONS && policy.automatic_options {
                let derived = response
                    .headers()
                    .get(header::ALLOW)
                    .and_then(|allow| policy.methods_from_allow(allow));

                let mut response = match derived {
                    Some(allow) => {
                        debug!("Answered preflight for {}", uri.path());
                        preflight_response(allow)
                    }
                    // Nothing is routed at this path
                    None => response,
                };

                let methods = policy.allow_methods.clone().or_else(|| {
                    response.headers().get(header::ALLOW).cloned()
                });
                policy.apply(response.headers_mut(), methods);
                return Ok(response);
            }

            if !policy.attach_to_all && method != Method::OPTIONS {
                return Ok(response);
            }

            let methods = match &policy.allow_methods {
                Some(methods) => Some(methods.clone()),
                None => lookup_allowed_methods(lookup, uri, &policy).await,
            };

            let mut response = response;
            policy.apply(response.headers_mut(), methods);
            Ok(response)
        })
    }
}

/// Empty 200 carrying the route's allowed methods
fn preflight_response(allow: HeaderValue) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(header::ALLOW, allow);
    response
}

/// Route an `OPTIONS` request for `uri` and read back the `Allow` header
async fn lookup_allowed_methods<S>(service: S, uri: Uri, policy: &CorsPolicy) -> Option<HeaderValue>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible>,
{
    let mut request = Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .body(Body::empty())
        .ok()?;
    request.extensions_mut().insert(MethodLookup);

    let response = service.oneshot(request).await.ok()?;
    response
        .headers()
        .get(header::ALLOW)
        .and_then(|allow| policy.methods_from_allow(allow))
}
