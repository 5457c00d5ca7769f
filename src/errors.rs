//! Error types for secret reference parsing and resolution
//!
//! Failures come in two tiers:
//!
//! - [`Error`] describes what went wrong with a [`Secret`](crate::Secret):
//!   a malformed reference, an unknown backend, or a backend call that failed.
//! - [`BackendError`] is what a single [`Backend`](crate::Backend) returns
//!   from `resolve`. It is wrapped into [`Error::Resolve`] together with the
//!   backend name once it reaches a `Secret`.
//!
//! Nothing here carries a resolved secret value. Messages name the backend,
//! and sometimes the variable or key that was looked up, but never the result.
//!
//! # Example
//!
//! ```
//! use secret_ref::{Error, Secret};
//!
//! let secret = Secret::parse("no-backend-here");
//! match secret.parse_error() {
//!     Some(Error::IncorrectFormat) => println!("forgot the `<backend>:` prefix"),
//!     Some(other) => println!("parse failed: {other}"),
//!     None => println!("ok"),
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error describing why a secret reference could not be parsed or resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The whole-string form has no `:` separating backend and locator
    #[error("incorrect format. use <backend>:<locator>")]
    IncorrectFormat,

    /// A `{{` was opened but never closed
    #[error("unterminated reference at byte {position}. use [text]{{{{backend:locator}}}}[text]")]
    UnterminatedReference {
        /// Byte offset of the opening `{{`
        position: usize,
    },

    /// The reference names a backend the registry does not know
    #[error("unregistered backend: {0}")]
    UnregisteredBackend(String),

    /// A backend failed to resolve its locator
    #[error("{backend}: {source}")]
    Resolve {
        /// Name the backend was registered under
        backend: String,
        /// Failure reported by the backend
        source: BackendError,
    },

    /// Literal segments and references went out of step during reassembly
    #[error("parser produced {segments} literal segments for {references} references")]
    Inconsistent {
        /// Number of literal segments
        segments: usize,
        /// Number of references
        references: usize,
    },

    /// A validation rule received something other than a `Secret`
    #[error("invalid type: expected Secret")]
    InvalidType,

    /// A reference is not bound to any backend
    #[error("invalid value format. use <backend>:<locator>")]
    Unbound,

    /// Several failures, in reference order
    #[error("{0}")]
    Multiple(ErrorList),
}

impl Error {
    /// Collapse a list of failures: nothing for an empty list, the error
    /// itself for a single entry, [`Error::Multiple`] otherwise
    pub fn from_list(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(ErrorList(errors))),
        }
    }

    /// The individual failures behind this error
    ///
    /// For [`Error::Multiple`] these are the aggregated members; any other
    /// error yields itself.
    pub fn errors(&self) -> &[Error] {
        match self {
            Error::Multiple(list) => list.as_slice(),
            other => std::slice::from_ref(other),
        }
    }

    /// Whether the failure happened while parsing rather than resolving
    pub fn is_parse_error(&self) -> bool {
        match self {
            Error::IncorrectFormat
            | Error::UnterminatedReference { .. }
            | Error::UnregisteredBackend(_) => true,
            Error::Multiple(list) => list.iter().all(Error::is_parse_error),
            _ => false,
        }
    }

    /// The backend failure, when this is a single resolution error
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Error::Resolve { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Ordered collection of failures
///
/// Renders as the members joined with `"; "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    /// Number of failures in the list
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the failures in order
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    /// Borrow the failures as a slice
    pub fn as_slice(&self) -> &[Error] {
        &self.0
    }

    /// Take the failures out of the list
    pub fn into_inner(self) -> Vec<Error> {
        self.0
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl From<Vec<Error>> for ErrorList {
    fn from(errors: Vec<Error>) -> Self {
        ErrorList(errors)
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Failure reported by a backend while resolving a locator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Environment variable is unset or empty
    #[error("unable to read OS environment variable: {0}")]
    EnvNotSet(String),

    /// Locator is empty or not in the backend's syntax
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// Locator is well formed but points at nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Local I/O failure
    #[error("io: {0}")]
    Io(String),

    /// Remote service answered with an error status
    #[error("http {status}: {message} (req={request_id:?})")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error message from the service, or a generic one
        message: String,
        /// Request ID sent with the request
        request_id: Option<String>,
    },

    /// Connection or DNS failure
    #[error("network: {0}")]
    Network(String),

    /// Request deadline exceeded
    #[error("timeout")]
    Timeout,

    /// Response body could not be decoded
    #[error("deserialize: {0}")]
    Deserialize(String),

    /// Decryption or key handling failure
    #[error("crypto: {0}")]
    Crypto(String),

    /// Backend is misconfigured or not initialized
    #[error("config: {0}")]
    Config(String),
}

impl BackendError {
    /// Check if the failure is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            BackendError::Network(_) => true,
            BackendError::Timeout => true,
            _ => false,
        }
    }

    /// Get the HTTP status code if this is an HTTP error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_connect() || err.is_request() {
            BackendError::Network(err.to_string())
        } else if err.is_decode() {
            BackendError::Deserialize(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Http {
                status: status.as_u16(),
                message: err.to_string(),
                request_id: None,
            }
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Deserialize(err.to_string())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}
