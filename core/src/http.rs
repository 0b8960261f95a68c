//! HTTP request and response types exchanged with the adapter.
//!
//! # Design
//! `HttpRequest` is what a higher-level document operation hands to
//! `CouchAdapter::execute`. `HttpResponse` is what comes back once the raw
//! bytes from the engine have been parsed and classified. Both are plain
//! owned data so they can be built in tests without touching the network.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    /// CouchDB's document copy verb.
    Copy,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Copy => "COPY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "COPY" => Ok(HttpMethod::Copy),
            other => Err(ApiError::InvalidConfig(format!("unsupported method: {other}"))),
        }
    }
}

/// One request against the database server.
///
/// `path` is server-relative and starts with `/`. The host and port
/// overrides apply to this request only; the adapter's own identity is left
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub host_override: Option<String>,
    pub port_override: Option<u16>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            host_override: None,
            port_override: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host_override = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }

    /// First header whose name matches case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every header matching `name` with a single entry, or append
    /// one if none matched. The first match keeps its position.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut replaced = false;
        self.headers.retain_mut(|(k, v)| {
            if !k.eq_ignore_ascii_case(name) {
                return true;
            }
            if replaced {
                return false;
            }
            *k = name.to_string();
            *v = value.clone();
            replaced = true;
            true
        });
        if !replaced {
            self.headers.push((name.to_string(), value));
        }
    }
}

/// Response body, either as received or decoded from JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Raw(Vec<u8>),
    Json(serde_json::Value),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Raw(_) => None,
        }
    }

    /// Raw bytes, or `None` once the body has been decoded.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Raw(bytes) => Some(bytes),
            ResponseBody::Json(_) => None,
        }
    }

    /// Raw body as UTF-8 text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Raw(bytes) if bytes.is_empty())
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Raw(Vec::new())
    }
}

/// A parsed HTTP response.
///
/// Header names are lower-cased; when a header repeats, the last value wins.
/// `cookies` is only populated when the server sent `Set-Cookie`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub version: String,
    pub status_line: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: Option<BTreeMap<String, String>>,
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Header lookup; `name` may be in any case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.as_ref()?.get(name).map(String::as_str)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}
