//! Adapter configuration: server identity, timeouts, TLS trust and the
//! per-adapter policies read once per call.
//!
//! # Design
//! Everything here is plain data validated on construction. A `CouchAdapter`
//! owns one `AdapterIdentity` and one `TimeoutConfig` and never mutates them;
//! changing configuration means building a new adapter.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
/// CouchDB's conventional port.
pub const DEFAULT_PORT: u16 = 5984;
pub const DEFAULT_TLS_PORT: u16 = 443;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Wire protocol spoken to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Maps a URL scheme to a protocol. Anything other than `https` is plain.
    pub fn from_scheme(scheme: &str) -> Self {
        if scheme.eq_ignore_ascii_case("https") {
            Protocol::Https
        } else {
            Protocol::Http
        }
    }

    /// Port assumed when a redirect target names a host but no port.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => DEFAULT_PORT,
            Protocol::Https => DEFAULT_TLS_PORT,
        }
    }
}

/// Where an adapter sends its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterIdentity {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// CA file used to verify the server. Without one, TLS peers are not
    /// verified.
    pub trust_anchor: Option<PathBuf>,
}

impl AdapterIdentity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Http,
            trust_anchor: None,
        }
    }

    /// Same host, port and protocol. The trust anchor is not compared.
    pub fn is_equivalent(&self, other: &AdapterIdentity) -> bool {
        self.host == other.host && self.port == other.port && self.protocol == other.protocol
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

/// Read/write timeout split into whole seconds and extra microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWriteTimeout {
    pub seconds: u64,
    pub microseconds: u64,
}

/// Connect and read/write timeouts. Unset means the engine's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutConfig {
    open: Option<u32>,
    read_write: Option<ReadWriteTimeout>,
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect timeout. Must be at least one second.
    pub fn set_open(&mut self, seconds: u32) -> Result<(), ApiError> {
        if seconds < 1 {
            return Err(ApiError::InvalidConfig(
                "open timeout expects a positive number of seconds".to_string(),
            ));
        }
        self.open = Some(seconds);
        Ok(())
    }

    /// Sets the read/write timeout. `seconds` may only be 0 when
    /// `microseconds` is non-zero, and the pair must fit in a `Duration`.
    pub fn set_read_write(&mut self, seconds: u64, microseconds: u64) -> Result<(), ApiError> {
        if microseconds == 0 && seconds < 1 {
            return Err(ApiError::InvalidConfig(
                "read/write timeout expects a positive number of seconds".to_string(),
            ));
        }
        if combined_duration(seconds, microseconds).is_none() {
            return Err(ApiError::InvalidConfig(format!(
                "read/write timeout of {seconds}s + {microseconds}us is out of range"
            )));
        }
        self.read_write = Some(ReadWriteTimeout {
            seconds,
            microseconds,
        });
        Ok(())
    }

    pub fn open(&self) -> Option<u32> {
        self.open
    }

    pub fn read_write(&self) -> Option<ReadWriteTimeout> {
        self.read_write
    }

    pub fn connect_duration(&self) -> Option<Duration> {
        self.open.map(|s| Duration::from_secs(u64::from(s)))
    }

    pub fn read_write_duration(&self) -> Option<Duration> {
        self.read_write
            .and_then(|rw| combined_duration(rw.seconds, rw.microseconds))
    }

    /// Snapshot of the current values, suitable for `apply_settings` on
    /// another adapter.
    pub fn settings(&self) -> TimeoutSettings {
        TimeoutSettings {
            open: self.open,
            rw_seconds: self.read_write.map(|rw| rw.seconds),
            rw_microseconds: self.read_write.map(|rw| rw.microseconds),
        }
    }

    /// Applies whichever values `settings` carries. A missing
    /// `rw_microseconds` counts as zero.
    pub fn apply_settings(&mut self, settings: &TimeoutSettings) -> Result<(), ApiError> {
        if let Some(open) = settings.open {
            self.set_open(open)?;
        }
        if let Some(seconds) = settings.rw_seconds {
            self.set_read_write(seconds, settings.rw_microseconds.unwrap_or(0))?;
        }
        Ok(())
    }
}

fn combined_duration(seconds: u64, microseconds: u64) -> Option<Duration> {
    Duration::from_secs(seconds).checked_add(Duration::from_micros(microseconds))
}

/// Flat, serializable form of `TimeoutConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSettings {
    #[serde(default)]
    pub open: Option<u32>,
    #[serde(default)]
    pub rw_seconds: Option<u64>,
    #[serde(default)]
    pub rw_microseconds: Option<u64>,
}

/// Whether JSON response bodies are handed back decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyDecoding {
    #[default]
    Structured,
    Raw,
}

/// Who follows 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// The HTTP engine follows redirects itself.
    Engine,
    /// The adapter resolves `Location` and re-issues the request, keeping
    /// the caller's headers.
    #[default]
    Manual,
}

/// Declarative adapter configuration, loadable from the environment or any
/// serde source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub trust_anchor: Option<PathBuf>,
    pub timeouts: TimeoutSettings,
    pub decoding: BodyDecoding,
    pub redirect_mode: RedirectMode,
    pub max_redirects: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: false,
            trust_anchor: None,
            timeouts: TimeoutSettings::default(),
            decoding: BodyDecoding::default(),
            redirect_mode: RedirectMode::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl AdapterConfig {
    /// Reads `COUCH_*` variables; anything unset keeps its default.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `COUCH_HOST` | `host` |
    /// | `COUCH_PORT` | `port` |
    /// | `COUCH_TLS` | `tls` (`true`/`false`) |
    /// | `COUCH_TRUST_ANCHOR` | `trust_anchor` |
    /// | `COUCH_OPEN_TIMEOUT` | `timeouts.open` |
    /// | `COUCH_RW_TIMEOUT_SECS` | `timeouts.rw_seconds` |
    /// | `COUCH_RW_TIMEOUT_MICROS` | `timeouts.rw_microseconds` |
    /// | `COUCH_FOLLOW_REDIRECTS` | `redirect_mode` (`true` selects `Engine`) |
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("COUCH_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "COUCH_PORT")? {
            config.port = port;
        }
        if let Some(tls) = parse_var(&lookup, "COUCH_TLS")? {
            config.tls = tls;
        }
        if let Some(path) = lookup("COUCH_TRUST_ANCHOR") {
            config.trust_anchor = Some(PathBuf::from(path));
        }
        config.timeouts.open = parse_var(&lookup, "COUCH_OPEN_TIMEOUT")?;
        config.timeouts.rw_seconds = parse_var(&lookup, "COUCH_RW_TIMEOUT_SECS")?;
        config.timeouts.rw_microseconds = parse_var(&lookup, "COUCH_RW_TIMEOUT_MICROS")?;
        if let Some(follow) = parse_var::<bool, _>(&lookup, "COUCH_FOLLOW_REDIRECTS")? {
            config.redirect_mode = if follow {
                RedirectMode::Engine
            } else {
                RedirectMode::Manual
            };
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ApiError::InvalidConfig(format!("{key}: cannot parse {raw:?}"))),
    }
}
