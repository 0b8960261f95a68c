//! Error types for the transport adapter.
//!
//! # Design
//! A request fails because the engine could not complete the exchange
//! (`Transport`), because the bytes it returned are not a well-formed
//! response (`Parse`), or because the server answered with an
//! application-level error (`Database`). Configuration problems are reported
//! before any request is made (`InvalidConfig`). Nothing is retried; the only
//! automatic continuation is redirect following, which is capped
//! (`TooManyRedirects`).

/// Transport-level failures reported by the HTTP engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    /// Any other engine failure. `code` is the OS error code when the engine
    /// surfaced one.
    #[error("transport error: {message}")]
    Other { code: Option<i32>, message: String },

    #[error("engine returned nothing without explanation")]
    Unknown,
}

/// Errors returned by `CouchAdapter::execute` and adapter configuration.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response bytes could not be parsed.
    #[error("malformed response: {0}")]
    Parse(String),

    /// The server reported an error for the request.
    #[error("{message}")]
    Database { message: String, status: u16 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),
}

impl ApiError {
    /// HTTP status of a database error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Database { status, .. } => Some(*status),
            _ => None,
        }
    }
}
