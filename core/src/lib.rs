//! Synchronous transport adapter for a CouchDB-style document database.
//!
//! # Overview
//! `CouchAdapter::execute` runs one HTTP request against the configured
//! server, parses the raw response and classifies failures into transport
//! errors, malformed responses and database errors. Higher-level document
//! operations build `HttpRequest` values and consume `HttpResponse` values.
//!
//! # Design
//! - The adapter is frozen once built; `AdapterBuilder` is the only way to
//!   configure timeouts, TLS trust, decoding and redirect handling.
//! - The HTTP engine sits behind the `HttpEngine` trait and returns raw
//!   response bytes, so parsing and classification are deterministic and
//!   testable without a network.
//! - With `RedirectMode::Manual` the adapter follows 3xx responses itself,
//!   carrying the caller's headers across hosts.

pub mod classify;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod parser;
pub mod redirect;

pub use client::{AdapterBuilder, CouchAdapter};
pub use config::{
    AdapterConfig, AdapterIdentity, BodyDecoding, Protocol, RedirectMode, TimeoutConfig,
    TimeoutSettings,
};
pub use engine::{EngineError, EngineRequest, HttpEngine, TlsMode, UreqEngine};
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ResponseBody};
