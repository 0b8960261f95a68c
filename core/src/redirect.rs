//! Manual redirect resolution.
//!
//! When the engine is not allowed to follow redirects, a 3xx response with a
//! `Location` header is resolved here: the location is split into its
//! components, the adapter decides whether the current identity still
//! applies, and the original request is rewritten for the new target.
//!
//! # Design
//! All three steps are pure functions over owned data. The hop loop and the
//! construction of one-off adapters live in `client`, which keeps this
//! module testable without an engine. Ports are only recorded when the
//! location spells them out, since both identity comparison and the `Host`
//! header depend on that distinction.

use ureq::http::Uri;

use crate::config::{AdapterIdentity, Protocol};
use crate::error::ApiError;
use crate::http::HttpRequest;

/// Components of a `Location` header value.
///
/// `port` is only set when the location spells it out. `path` always starts
/// with `/` and includes the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
}

/// Where the follow-up request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Same server: reuse the current adapter.
    Reuse,
    /// Different server: build a one-off adapter for this identity.
    Switch(AdapterIdentity),
}

/// Split a `Location` value.
///
/// Absolute URLs are parsed as URIs. A scheme-relative `//host[:port]/path`
/// names a server but leaves the scheme to the current adapter. A value
/// starting with `/` is a path on the current server, a bare `?query`
/// replaces the query of `current_path`, and anything else is resolved
/// against the directory of `current_path`.
pub fn parse_location(location: &str, current_path: &str) -> Result<RedirectTarget, ApiError> {
    let location = location.trim();

    if location.contains("://") {
        return parse_authority(location, location);
    }
    if location.starts_with("//") {
        // Placeholder scheme so `Uri` accepts the authority; dropped below.
        let mut target = parse_authority(&format!("http:{location}"), location)?;
        target.scheme = None;
        return Ok(target);
    }

    let base = current_path.split('?').next().unwrap_or_default();
    let path = if location.is_empty() {
        "/".to_string()
    } else if location.starts_with('/') {
        location.to_string()
    } else if location.starts_with('?') {
        let base = if base.is_empty() { "/" } else { base };
        format!("{base}{location}")
    } else {
        let dir = base.rfind('/').map_or("/", |idx| &base[..=idx]);
        format!("{dir}{location}")
    };

    Ok(RedirectTarget {
        scheme: None,
        host: None,
        port: None,
        path,
    })
}

fn parse_authority(uri: &str, location: &str) -> Result<RedirectTarget, ApiError> {
    let uri: Uri = uri
        .parse()
        .map_err(|e| ApiError::Parse(format!("invalid location {location:?}: {e}")))?;
    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::Parse(format!("location {location:?} has no host")))?;
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| pq.starts_with('/'))
        .unwrap_or("/");
    Ok(RedirectTarget {
        scheme: uri.scheme_str().map(str::to_ascii_lowercase),
        host: Some(host.to_string()),
        port: uri.port_u16(),
        path: path.to_string(),
    })
}

/// Decide whether `target` can be served by the adapter owning `current`.
///
/// A new identity keeps the current trust anchor. Without an explicit port
/// it gets 443 for https and CouchDB's 5984 otherwise.
pub fn resolve(target: &RedirectTarget, current: &AdapterIdentity) -> Resolution {
    let Some(host) = &target.host else {
        return Resolution::Reuse;
    };

    let protocol = target
        .scheme
        .as_deref()
        .map_or(current.protocol, Protocol::from_scheme);
    let identity = AdapterIdentity {
        host: host.clone(),
        port: target.port.unwrap_or_else(|| protocol.default_port()),
        protocol,
        trust_anchor: current.trust_anchor.clone(),
    };

    if identity.is_equivalent(current) {
        Resolution::Reuse
    } else {
        Resolution::Switch(identity)
    }
}

/// `Host` header value for a target with a host: `host[:port]`.
pub fn host_header(target: &RedirectTarget) -> Option<String> {
    let host = target.host.as_ref()?;
    Some(match target.port {
        Some(port) => format!("{host}:{port}"),
        None => host.clone(),
    })
}

/// Rewrite `request` for the redirect target.
///
/// Method, body and headers carry over. A target naming a host also sets
/// `Host` and drops any per-call host/port override.
pub fn follow_up(request: &HttpRequest, target: &RedirectTarget) -> HttpRequest {
    let mut next = request.clone();
    next.path = target.path.clone();
    if let Some(host) = host_header(target) {
        next.set_header("Host", host);
        next.host_override = None;
        next.port_override = None;
    }
    next
}
