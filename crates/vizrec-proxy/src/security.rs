//! Validation of the recognition service URL
//!
//! Requests carry caller API keys in their query string, so the configured
//! service URL must not point at plaintext or internal endpoints unless
//! explicitly allowed for local development.

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Service URL rejections
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("URL scheme '{0}' is not allowed, only HTTPS is permitted")]
    InvalidScheme(String),

    #[error("Host '{0}' is blocked: local and internal addresses are not allowed")]
    BlockedHost(String),

    #[error("Service URL must have a host")]
    MissingHost,
}

/// Hostnames never accepted as a service endpoint
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "metadata.google.internal",
    "metadata.goog",
];

/// Which endpoints are acceptable
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlPolicy {
    /// Accept `http://` and local or private hosts (development only)
    pub allow_insecure: bool,
}

impl UrlPolicy {
    /// Policy that accepts anything parseable with a host
    pub fn insecure() -> Self {
        Self {
            allow_insecure: true,
        }
    }
}

/// Parse and check a service URL against the policy
pub fn validate_service_url(url_str: &str, policy: UrlPolicy) -> Result<Url, SecurityError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => {}
        "http" if policy.allow_insecure => {}
        scheme => return Err(SecurityError::InvalidScheme(scheme.to_string())),
    }

    let host = url.host_str().ok_or(SecurityError::MissingHost)?;
    if policy.allow_insecure {
        return Ok(url);
    }

    let host_lower = host.to_lowercase();
    let blocked_name = BLOCKED_HOSTNAMES
        .iter()
        .any(|blocked| host_lower == *blocked || host_lower.ends_with(&format!(".{}", blocked)));
    if blocked_name {
        return Err(SecurityError::BlockedHost(host.to_string()));
    }

    // IPv6 hosts come back bracketed
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_internal(&ip) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }
    }

    Ok(url)
}

/// Loopback, private, carrier-grade NAT, link-local, or unspecified
fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || (a == 100 && (b & 0xC0) == 64)
                || a == 0
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}
