//! Error types for descriptor construction and network operations.
//!
//! # Design
//! `OperationError` has one variant per failure class a caller reacts to
//! differently: the transport could not complete the exchange, the transport
//! completed without the parts a response needs, the body did not have the
//! expected shape, or the operation was never attempted because the
//! descriptor does not allow it. Nothing below ever degrades into an empty
//! value; every failure reaches the caller through the `Err` side of an
//! outcome.

use std::fmt;

use thiserror::Error;

use crate::http::HttpMethod;

/// Boxed error reported by a transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by every `Loader` operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Connection, DNS, TLS, timeout or local I/O failure reported by the
    /// transport.
    #[error("transport failed: {0}")]
    Transport(#[source] BoxError),

    /// The transport finished without an error but also without a usable
    /// response.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The response body could not be decoded into the requested type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The operation was refused before any I/O was attempted.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl OperationError {
    pub fn transport(err: impl Into<BoxError>) -> Self {
        OperationError::Transport(err.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, OperationError::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, OperationError::Protocol(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, OperationError::Decode(_))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, OperationError::Precondition(_))
    }

    /// Short, stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Transport(_) => "transport",
            OperationError::Protocol(_) => "protocol",
            OperationError::Decode(_) => "decode",
            OperationError::Precondition(_) => "precondition",
        }
    }
}

/// Which parts of a response the transport failed to supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Body,
    Meta,
    BodyAndMeta,
}

impl Missing {
    pub(crate) fn from_presence(has_body: bool, has_meta: bool) -> Option<Self> {
        match (has_body, has_meta) {
            (true, true) => None,
            (false, true) => Some(Missing::Body),
            (true, false) => Some(Missing::Meta),
            (false, false) => Some(Missing::BodyAndMeta),
        }
    }
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Body => f.write_str("body"),
            Missing::Meta => f.write_str("response metadata"),
            Missing::BodyAndMeta => f.write_str("body and response metadata"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The completion reported neither an error nor a complete response.
    #[error("bad server response: missing {missing}")]
    BadServerResponse { missing: Missing },

    /// The transport released the completion callback without calling it.
    #[error("bad server response: transport dropped the completion without resolving it")]
    CompletionDropped,
}

/// A body that could not be decoded into the requested type.
#[derive(Debug, Error)]
#[error("could not decode response as {type_name}: {message}")]
pub struct DecodeError {
    pub type_name: &'static str,
    pub message: String,
    /// 1-based position of the failure, when the parser reports one.
    pub line: Option<usize>,
    pub column: Option<usize>,
    #[source]
    pub source: Option<BoxError>,
}

impl DecodeError {
    pub fn new(type_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_name,
            message: message.into(),
            line: None,
            column: None,
            source: None,
        }
    }

    pub(crate) fn from_json<T>(err: serde_json::Error) -> Self {
        let (line, column) = match err.line() {
            0 => (None, None),
            line => (Some(line), Some(err.column())),
        };
        Self {
            type_name: std::any::type_name::<T>(),
            message: err.to_string(),
            line,
            column,
            source: Some(Box::new(err)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("{actual} request cannot be used here, {expected} required")]
    MethodNotAllowed {
        expected: HttpMethod,
        actual: HttpMethod,
    },
}

/// Errors raised while assembling a `RequestDescriptor`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {name:?}")]
    InvalidHeaderValue { name: String },

    #[error("unknown HTTP method {0:?}")]
    UnknownMethod(String),
}
