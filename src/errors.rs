//! Error taxonomy for every subsystem.
//!
//! Each enum here maps to one of the "fails with" sections in the component
//! design: `ParseError` for the connection FSM's framing layer, and a
//! `thiserror`-derived enum per higher-level subsystem so callers embedding
//! this library can match on the exact failure instead of a boxed `dyn
//! Error`.

use crate::http::{query, types::Version};
use std::io;

#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("invalid HTTP method")]
    InvalidMethod,

    #[error("invalid URL format")]
    InvalidUrl,
    #[error("invalid query string: {0:?}")]
    Query(query::Error),

    #[error("invalid HTTP version")]
    InvalidVersion,
    #[error("HTTP version not supported")]
    UnsupportedVersion,

    #[error("invalid header format")]
    InvalidHeader,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("invalid connection header")]
    InvalidConnection,

    #[error("request body too large")]
    BodyTooLarge,
    #[error("body length mismatch: expected {expected}, available {available}")]
    BodyMismatch { expected: usize, available: usize },
    #[error("unexpected request body of {0} bytes")]
    UnexpectedBody(usize),

    #[error("service temporarily unavailable")]
    ServiceUnavailable,
    #[error("I/O error: {0}")]
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        pub(crate) const fn as_http(
            &self,
            version: Version,
            json: bool,
        ) -> &'static [u8] {
            match (json, self, version) { $(
                (true, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (true, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
            )* }.as_bytes()
        }
    };
}

impl ParseError {
    http_errors! {
        InvalidMethod: "400 Bad Request", "55"
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;

        InvalidUrl: "400 Bad Request", "51"
            => r#"{"error":"Invalid URL format","code":"INVALID_URL"}"#;
        Query: "400 Bad Request", "55"
            => r#"{"error":"Invalid query string","code":"INVALID_QUERY"}"#;

        InvalidVersion: "400 Bad Request", "57"
            => r#"{"error":"Invalid HTTP version","code":"INVALID_VERSION"}"#;
        UnsupportedVersion: "505 HTTP Version Not Supported", "67"
            => r#"{"error":"HTTP version not supported","code":"UNSUPPORTED_VERSION"}"#;

        InvalidHeader: "400 Bad Request", "57"
            => r#"{"error":"Invalid header format","code":"INVALID_HEADER"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        InvalidContentLength: "400 Bad Request", "66"
            => r#"{"error":"Invalid Content-Length","code":"INVALID_CONTENT_LENGTH"}"#;
        InvalidConnection: "400 Bad Request", "65"
            => r#"{"error":"Invalid Connection header","code":"INVALID_CONNECTION"}"#;

        BodyTooLarge: "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        BodyMismatch: "400 Bad Request", "55"
            => r#"{"error":"Body length mismatch","code":"BODY_MISMATCH"}"#;
        UnexpectedBody: "400 Bad Request", "60"
            => r#"{"error":"Unexpected request body","code":"UNEXPECTED_BODY"}"#;

        ServiceUnavailable: "503 Service Unavailable", "72"
            => r#"{"error":"Service temporarily unavailable","code":"SERVICE_UNAVAILABLE"}"#;
        Io: "503 Service Unavailable", "48"
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
    }
}

impl From<query::Error> for ParseError {
    fn from(err: query::Error) -> Self {
        ParseError::Query(err)
    }
}
impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failures from route registration, lookup, and drop (`vhost::registry`).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("route pattern is not valid regex: {0}")]
    BadPattern(#[from] regex::Error),
    #[error("route is built-in and cannot be dropped")]
    BuiltIn,
    #[error("no route matches method and pattern")]
    NotFound,
}

/// Failures from vhost dispatch (`dispatcher`).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("virtual host {0:?} already exists")]
    DuplicateVhost(String),
    #[error("cannot add virtual host {0:?} after the dispatcher has initialized")]
    AlreadyInitialized(String),
    #[error("no `[default]` virtual host configured")]
    NoDefaultVhost,
}

/// Failures from the executor / worker pool.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("invalid executor sizing: base={base}, hard_max={hard_max}")]
    InvalidSizing { base: usize, hard_max: usize },
    #[error("handler panicked during request handling")]
    HandlerPanicked,
}

/// Failures from the dynamic module loader.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to open shared library {path:?}: {source}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },
    #[error("symbol {0:?} missing from module")]
    MissingSymbol(&'static str),
    #[error("module_init returned non-zero status {0}")]
    InitFailed(i32),
}

/// Failures from settings (config) reload.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
