//! The adapter: executes requests against one database server.
//!
//! # Design
//! `CouchAdapter` is built once by `AdapterBuilder` and never mutated
//! afterwards, so it can be shared between threads whenever its engine can.
//! Each `execute` call turns the `HttpRequest` into an `EngineRequest`,
//! hands it to the engine, parses the raw bytes and classifies the result.
//!
//! In `RedirectMode::Manual` a 3xx with a `Location` is resolved here rather
//! than returned: same-origin targets reuse this adapter, anything else gets
//! a one-off adapter that inherits timeouts, TLS trust and decoding. Hops
//! run in a loop capped by `max_redirects`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::config::{
    AdapterConfig, AdapterIdentity, BodyDecoding, Protocol, RedirectMode, TimeoutConfig,
    TimeoutSettings, DEFAULT_HOST, DEFAULT_MAX_REDIRECTS, DEFAULT_PORT,
};
use crate::engine::{EngineRequest, HttpEngine, TlsMode, UreqEngine};
use crate::error::{ApiError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::parser::parse_response;
use crate::redirect::{self, Resolution};

/// Synchronous transport adapter for a CouchDB-style server.
#[derive(Debug)]
pub struct CouchAdapter<E = UreqEngine> {
    identity: AdapterIdentity,
    timeouts: TimeoutConfig,
    decoding: BodyDecoding,
    redirect_mode: RedirectMode,
    max_redirects: usize,
    engine: Arc<E>,
}

impl CouchAdapter<UreqEngine> {
    /// Adapter with default settings talking plain HTTP to `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        AdapterBuilder::new(host, port).build()
    }

    pub fn builder(host: &str, port: u16) -> AdapterBuilder<UreqEngine> {
        AdapterBuilder::new(host, port)
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, ApiError> {
        Ok(AdapterBuilder::from_config(config)?.build())
    }
}

impl<E: HttpEngine> CouchAdapter<E> {
    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    /// Current timeouts in their serializable form.
    pub fn timeouts(&self) -> TimeoutSettings {
        self.timeouts.settings()
    }

    pub fn using_encryption(&self) -> bool {
        self.identity.protocol == Protocol::Https
    }

    pub fn decoding(&self) -> BodyDecoding {
        self.decoding
    }

    pub fn redirect_mode(&self) -> RedirectMode {
        self.redirect_mode
    }

    /// Execute `request` and return the classified response.
    ///
    /// Fails with `ApiError::Transport` when the engine cannot complete the
    /// exchange, `ApiError::Parse` for malformed responses and
    /// `ApiError::Database` when the server reports an error.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut request = request;
        let mut hop_adapter: Option<CouchAdapter<E>> = None;
        let mut hops = 0;

        loop {
            let adapter = hop_adapter.as_ref().unwrap_or(self);
            let response = adapter.exchange(&request)?;

            let location = match self.redirect_mode {
                RedirectMode::Manual if response.is_redirect() => response.header("location"),
                _ => None,
            };
            let Some(location) = location else {
                return classify(response, request.method, adapter.decoding);
            };

            if hops >= self.max_redirects {
                warn!(hops, location, "redirect limit reached");
                return Err(ApiError::TooManyRedirects(hops));
            }
            hops += 1;

            let target = redirect::parse_location(location, &request.path)?;
            let next_adapter = match redirect::resolve(&target, &adapter.identity) {
                Resolution::Reuse => None,
                Resolution::Switch(identity) => Some(adapter.with_identity(identity)),
            };
            info!(
                status = response.status,
                location,
                reuse = next_adapter.is_none(),
                "following redirect"
            );

            request = redirect::follow_up(&request, &target);
            if next_adapter.is_some() {
                hop_adapter = next_adapter;
            }
        }
    }

    /// Engine request for `request` as this adapter would send it.
    pub fn engine_request(&self, request: &HttpRequest) -> EngineRequest {
        let host = request
            .host_override
            .as_deref()
            .unwrap_or(&self.identity.host);
        let port = request.port_override.unwrap_or(self.identity.port);
        let url = format!(
            "{}://{}:{}{}",
            self.identity.protocol.scheme(),
            host,
            port,
            request.path
        );

        let mut headers = Vec::with_capacity(request.headers.len() + 1);
        headers.push(("Connection".to_string(), "close".to_string()));
        headers.extend(request.headers.iter().cloned());

        let tls = match (self.identity.protocol, &self.identity.trust_anchor) {
            (Protocol::Http, _) => TlsMode::Plain,
            (Protocol::Https, None) => TlsMode::Unverified,
            (Protocol::Https, Some(path)) => TlsMode::Verified {
                trust_anchor: path.clone(),
            },
        };

        EngineRequest {
            url,
            method: request.method,
            headers,
            body: request.body.clone(),
            connect_timeout: self.timeouts.connect_duration(),
            read_write_timeout: self.timeouts.read_write_duration(),
            follow_redirects: self.redirect_mode == RedirectMode::Engine,
            fetch_body: request.method != HttpMethod::Head,
            tls,
        }
    }

    /// One round-trip: engine call plus parsing, no classification.
    fn exchange(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let engine_request = self.engine_request(request);
        debug!(method = %request.method, url = %engine_request.url, "executing request");

        let raw = self
            .engine
            .perform(&engine_request)
            .map_err(TransportError::from)?;
        let response = parse_response(&raw, request.method)?;

        debug!(status = response.status, "received response");
        Ok(response)
    }

    fn with_identity(&self, identity: AdapterIdentity) -> CouchAdapter<E> {
        CouchAdapter {
            identity,
            timeouts: self.timeouts,
            decoding: self.decoding,
            redirect_mode: self.redirect_mode,
            max_redirects: self.max_redirects,
            engine: Arc::clone(&self.engine),
        }
    }
}

/// Builds a `CouchAdapter`. Setters that validate return `Result`.
#[derive(Debug)]
pub struct AdapterBuilder<E = UreqEngine> {
    identity: AdapterIdentity,
    timeouts: TimeoutConfig,
    decoding: BodyDecoding,
    redirect_mode: RedirectMode,
    max_redirects: usize,
    engine: Arc<E>,
}

impl Default for AdapterBuilder<UreqEngine> {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl AdapterBuilder<UreqEngine> {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            identity: AdapterIdentity::new(host, port),
            timeouts: TimeoutConfig::new(),
            decoding: BodyDecoding::default(),
            redirect_mode: RedirectMode::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            engine: Arc::new(UreqEngine::new()),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, ApiError> {
        Ok(Self::new(&config.host, config.port)
            .timeouts_from(&config.timeouts)?
            .use_encryption(config.tls)
            .trust_anchor(config.trust_anchor.clone())
            .decoding(config.decoding)
            .redirect_mode(config.redirect_mode)
            .max_redirects(config.max_redirects))
    }
}

impl<E: HttpEngine> AdapterBuilder<E> {
    /// Swap the HTTP engine.
    pub fn engine<F: HttpEngine>(self, engine: F) -> AdapterBuilder<F> {
        self.shared_engine(Arc::new(engine))
    }

    /// Swap the HTTP engine for one that is shared with other adapters.
    pub fn shared_engine<F: HttpEngine>(self, engine: Arc<F>) -> AdapterBuilder<F> {
        AdapterBuilder {
            identity: self.identity,
            timeouts: self.timeouts,
            decoding: self.decoding,
            redirect_mode: self.redirect_mode,
            max_redirects: self.max_redirects,
            engine,
        }
    }

    /// Connect timeout in whole seconds, at least one.
    pub fn open_timeout(mut self, seconds: u32) -> Result<Self, ApiError> {
        self.timeouts.set_open(seconds)?;
        Ok(self)
    }

    /// Timeout for the whole exchange. `seconds` may be 0 only when
    /// `microseconds` is not.
    pub fn read_write_timeout(mut self, seconds: u64, microseconds: u64) -> Result<Self, ApiError> {
        self.timeouts.set_read_write(seconds, microseconds)?;
        Ok(self)
    }

    /// Apply timeouts previously taken from `CouchAdapter::timeouts`.
    pub fn timeouts_from(mut self, settings: &TimeoutSettings) -> Result<Self, ApiError> {
        self.timeouts.apply_settings(settings)?;
        Ok(self)
    }

    pub fn use_encryption(mut self, on: bool) -> Self {
        self.identity.protocol = if on { Protocol::Https } else { Protocol::Http };
        self
    }

    /// CA file used to verify the server; `None` disables verification.
    pub fn trust_anchor(mut self, path: Option<PathBuf>) -> Self {
        self.identity.trust_anchor = path;
        self
    }

    pub fn decoding(mut self, decoding: BodyDecoding) -> Self {
        self.decoding = decoding;
        self
    }

    pub fn redirect_mode(mut self, mode: RedirectMode) -> Self {
        self.redirect_mode = mode;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn build(self) -> CouchAdapter<E> {
        CouchAdapter {
            identity: self.identity,
            timeouts: self.timeouts,
            decoding: self.decoding,
            redirect_mode: self.redirect_mode,
            max_redirects: self.max_redirects,
            engine: self.engine,
        }
    }
}
