//! The seam between the adapter and the native HTTP engine.
//!
//! # Design
//! `HttpEngine` performs exactly one exchange and returns the complete raw
//! response (status line, headers, blank line, body). Everything after that
//! point, parsing, classification and redirects, stays in the adapter so it
//! can be exercised with a scripted engine in tests.
//!
//! `UreqEngine` is the production implementation. It builds a fresh ureq
//! agent per call so no connection outlives the request.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ureq::http;
use ureq::tls::{Certificate, RootCerts, TlsConfig};

use crate::error::TransportError;
use crate::http::HttpMethod;

/// Redirect budget handed to the engine when it is allowed to follow.
const ENGINE_MAX_REDIRECTS: u32 = 10;

/// How the engine should treat TLS for an https URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    Plain,
    /// Encrypt without verifying the peer.
    Unverified,
    /// Verify the peer and its hostname against `trust_anchor`.
    Verified { trust_anchor: PathBuf },
}

/// Everything the engine needs for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub read_write_timeout: Option<Duration>,
    pub follow_redirects: bool,
    /// False for HEAD: the engine must not try to read a body.
    pub fetch_body: bool,
    pub tls: TlsMode,
}

/// Failures reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("{message}")]
    Failed { code: Option<i32>, message: String },

    /// The engine produced neither a response nor an error.
    #[error("no response and no error")]
    Unexplained,
}

impl From<EngineError> for TransportError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ConnectionRefused => TransportError::ConnectionRefused,
            EngineError::Failed { code, message } => TransportError::Other { code, message },
            EngineError::Unexplained => TransportError::Unknown,
        }
    }
}

/// A synchronous "perform one HTTP request" capability.
pub trait HttpEngine: Send + Sync {
    fn perform(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError>;
}

impl<E: HttpEngine + ?Sized> HttpEngine for Arc<E> {
    fn perform(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        (**self).perform(request)
    }
}

/// Blocking engine backed by ureq.
#[derive(Debug, Clone, Default)]
pub struct UreqEngine;

impl UreqEngine {
    pub fn new() -> Self {
        Self
    }

    fn agent_for(&self, request: &EngineRequest) -> Result<ureq::Agent, EngineError> {
        let builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .timeout_connect(request.connect_timeout)
            .timeout_global(request.read_write_timeout)
            .tls_config(tls_config(&request.tls)?);

        let builder = if request.follow_redirects {
            builder.max_redirects(ENGINE_MAX_REDIRECTS)
        } else {
            builder.max_redirects(0).max_redirects_will_error(false)
        };

        Ok(builder.build().new_agent())
    }
}

impl HttpEngine for UreqEngine {
    fn perform(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        let agent = self.agent_for(request)?;

        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = match &request.body {
            Some(body) => {
                let req = builder.body(body.as_bytes().to_vec()).map_err(request_error)?;
                agent.run(req)
            }
            None => {
                let req = builder.body(()).map_err(request_error)?;
                agent.run(req)
            }
        };

        let response = result.map_err(map_ureq_error)?;
        render_response(response, request.fetch_body)
    }
}

fn tls_config(mode: &TlsMode) -> Result<TlsConfig, EngineError> {
    match mode {
        TlsMode::Plain => Ok(TlsConfig::builder().build()),
        TlsMode::Unverified => Ok(TlsConfig::builder().disable_verification(true).build()),
        TlsMode::Verified { trust_anchor } => {
            let pem = std::fs::read(trust_anchor).map_err(|e| EngineError::Failed {
                code: e.raw_os_error(),
                message: format!("cannot read trust anchor {}: {e}", trust_anchor.display()),
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| EngineError::Failed {
                code: None,
                message: format!("invalid trust anchor {}: {e}", trust_anchor.display()),
            })?;
            Ok(TlsConfig::builder()
                .root_certs(RootCerts::Specific(Arc::new(vec![cert])))
                .build())
        }
    }
}

/// Serialize ureq's response back into raw HTTP/1.x bytes.
fn render_response(
    mut response: http::Response<ureq::Body>,
    fetch_body: bool,
) -> Result<Vec<u8>, EngineError> {
    let status = response.status();
    let mut raw = format!(
        "{:?} {} {}\r\n",
        response.version(),
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .into_bytes();

    for (name, value) in response.headers() {
        raw.extend_from_slice(name.as_str().as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"\r\n");

    if fetch_body {
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(map_ureq_error)?;
        raw.extend_from_slice(&body);
    }

    Ok(raw)
}

fn request_error(err: http::Error) -> EngineError {
    EngineError::Failed {
        code: None,
        message: format!("invalid request: {err}"),
    }
}

fn map_ureq_error(err: ureq::Error) -> EngineError {
    let io_err = match &err {
        ureq::Error::Io(e) => Some(e),
        other => io_source(other),
    };
    if io_err.is_some_and(|e| e.kind() == io::ErrorKind::ConnectionRefused) {
        return EngineError::ConnectionRefused;
    }
    EngineError::Failed {
        code: io_err.and_then(io::Error::raw_os_error),
        message: err.to_string(),
    }
}

/// First `io::Error` in the source chain.
fn io_source<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        current = e.source();
    }
    None
}
