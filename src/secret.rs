//! Parsed, re-resolvable secret values
//!
//! A [`Secret`] is built once (usually by deserializing a configuration
//! field) and resolved on every [`Secret::get`]. Building it never fails:
//! malformed references and unknown backends are recorded and reported by
//! [`Secret::parse_error`], backend failures by [`Secret::internal_error`].
//! Callers that skip those checks get an empty or partial string.
//!
//! Resolution is lazy. Nothing is looked up until the first `get`, and every
//! `get` calls each bound backend again, left to right.

use crate::backend::Backend;
use crate::errors::Error;
use crate::parser::{self, Scan};
use crate::registry::Registry;
use parking_lot::Mutex;
use secrecy::SecretString;
use std::fmt;
use tracing::{debug, trace, warn};

/// One reference inside a [`Secret`], bound to its own backend instance
pub struct Reference {
    backend_name: String,
    locator: String,
    backend: Option<Mutex<Box<dyn Backend>>>,
    bind_error: Option<Error>,
}

impl Reference {
    fn bind(registry: &Registry, reference: &str) -> Self {
        let (backend_name, locator) = match parser::split_reference(reference) {
            Ok(parts) => parts,
            Err(e) => {
                return Self {
                    backend_name: String::new(),
                    locator: reference.to_string(),
                    backend: None,
                    bind_error: Some(e),
                }
            }
        };

        let (backend, bind_error) = match registry.lookup(backend_name) {
            Some(backend) => (Some(Mutex::new(backend)), None),
            None => (None, Some(Error::UnregisteredBackend(backend_name.to_string()))),
        };

        Self {
            backend_name: backend_name.to_string(),
            locator: locator.to_string(),
            backend,
            bind_error,
        }
    }

    /// Name of the backend this reference asked for
    ///
    /// Empty when the reference had no `:` separator.
    pub fn backend(&self) -> &str {
        &self.backend_name
    }

    /// Backend-specific locator
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Whether a backend instance is bound to this reference
    pub fn is_bound(&self) -> bool {
        self.backend.is_some()
    }

    /// Why binding failed, if it did
    pub fn bind_error(&self) -> Option<&Error> {
        self.bind_error.as_ref()
    }

    /// Resolve now, recording any failure into `errors`; failures resolve
    /// to an empty string
    fn resolve(&self, errors: &mut Vec<Error>) -> String {
        if let Some(e) = &self.bind_error {
            errors.push(e.clone());
            return String::new();
        }
        let Some(backend) = &self.backend else {
            errors.push(Error::Unbound);
            return String::new();
        };

        match backend.lock().resolve(&self.locator) {
            Ok(value) => value,
            Err(source) => {
                debug!(
                    backend = %self.backend_name,
                    status = ?source.status_code(),
                    retryable = source.is_retryable(),
                    "secret reference failed to resolve"
                );
                errors.push(Error::Resolve {
                    backend: self.backend_name.clone(),
                    source,
                });
                String::new()
            }
        }
    }
}

impl Clone for Reference {
    /// The clone gets a fresh backend instance, not a copy of this one's state
    fn clone(&self) -> Self {
        Self {
            backend_name: self.backend_name.clone(),
            locator: self.locator.clone(),
            backend: self
                .backend
                .as_ref()
                .map(|b| Mutex::new(b.lock().clone_box())),
            bind_error: self.bind_error.clone(),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("backend", &self.backend_name)
            .field("locator", &"****")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A configuration value made of one or more secret references
///
/// # Example
///
/// ```
/// use secret_ref::Secret;
///
/// let secret = Secret::parse("A{{raw:B}}C{{raw:D}}E");
/// assert_eq!(secret.get(), "ABCDE");
/// assert_eq!(secret.literals(), ["A", "C", "E"]);
///
/// let broken = Secret::parse("{{nope:x}}{{raw:y}}");
/// assert_eq!(broken.get(), "y");
/// assert!(broken.parse_error().is_some());
/// assert!(broken.internal_error().is_some());
/// ```
pub struct Secret {
    source: String,
    single: bool,
    literals: Vec<String>,
    references: Vec<Reference>,
    parse_error: Option<Error>,
    last_errors: Mutex<Vec<Error>>,
}

impl Secret {
    /// Parse `source` against the current registry
    ///
    /// See [`Registry::current`].
    pub fn parse(source: &str) -> Self {
        Self::parse_with(&Registry::current(), source)
    }

    /// Parse `source`, binding references against `registry`
    pub fn parse_with(registry: &Registry, source: &str) -> Self {
        let mut secret = Self {
            source: source.to_string(),
            single: false,
            literals: Vec::new(),
            references: Vec::new(),
            parse_error: None,
            last_errors: Mutex::new(Vec::new()),
        };

        match parser::scan(source) {
            Ok(Scan::Single(reference)) => {
                secret.single = true;
                let bound = Reference::bind(registry, reference);
                match bound.bind_error.clone() {
                    Some(e) => secret.parse_error = Some(e),
                    None => secret.references.push(bound),
                }
            }
            Ok(Scan::Template { literals, spans }) => {
                secret.literals = literals.into_iter().map(str::to_string).collect();
                secret.references = spans
                    .iter()
                    .map(|span| Reference::bind(registry, span.inner))
                    .collect();
            }
            Err(e) => secret.parse_error = Some(e),
        }

        match secret.parse_error() {
            Some(e) => debug!(error = %e, "secret reference parsed with errors"),
            None => trace!(
                single = secret.single,
                backends = ?secret.references.iter().map(Reference::backend).collect::<Vec<_>>(),
                "secret reference parsed"
            ),
        }
        secret
    }

    /// Resolve every reference and assemble the value
    ///
    /// Backends are called again on each call, in left-to-right order.
    /// References that fail contribute an empty string; check
    /// [`Secret::internal_error`] afterwards. A value that failed to parse
    /// returns its source unchanged.
    pub fn get(&self) -> String {
        let mut errors = Vec::new();
        let value = self.assemble(&mut errors);
        *self.last_errors.lock() = errors;
        value
    }

    /// [`Secret::get`] wrapped so the value stays out of logs and debug output
    pub fn get_secret(&self) -> SecretString {
        SecretString::new(self.get())
    }

    fn assemble(&self, errors: &mut Vec<Error>) -> String {
        if self.parse_error.is_some() && self.references.is_empty() {
            return self.source.clone();
        }

        if self.single {
            return match self.references.first() {
                Some(reference) => reference.resolve(errors),
                None => self.source.clone(),
            };
        }

        if self.literals.len() != self.references.len() + 1 {
            let err = Error::Inconsistent {
                segments: self.literals.len(),
                references: self.references.len(),
            };
            warn!(error = %err, "secret reference parser produced an inconsistent result");
            errors.push(err);
            return self.source.clone();
        }

        let mut out = String::with_capacity(self.source.len());
        for (literal, reference) in self.literals.iter().zip(&self.references) {
            out.push_str(literal);
            out.push_str(&reference.resolve(errors));
        }
        if let Some(tail) = self.literals.last() {
            out.push_str(tail);
        }
        out
    }

    /// The original, unparsed string
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the whole string is a single `backend:locator` reference
    pub fn is_single(&self) -> bool {
        self.single
    }

    /// Literal text around the references, in order
    ///
    /// Empty for the single-reference form.
    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    /// References in scan order
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// The parse failure, or every malformed or unbound reference
    pub fn parse_error(&self) -> Option<Error> {
        if let Some(e) = &self.parse_error {
            return Some(e.clone());
        }
        Error::from_list(
            self.references
                .iter()
                .filter_map(|r| r.bind_error.clone())
                .collect(),
        )
    }

    /// Failures from the most recent [`Secret::get`]
    ///
    /// `None` before the first `get`.
    pub fn internal_error(&self) -> Option<Error> {
        Error::from_list(self.last_errors.lock().clone())
    }

    /// Human-readable error: the parse error if any, else the internal error,
    /// else empty
    pub fn error_message(&self) -> String {
        self.parse_error()
            .or_else(|| self.internal_error())
            .map(|e| e.to_string())
            .unwrap_or_default()
    }
}

impl Clone for Secret {
    /// The clone re-binds fresh backend instances and has no recorded
    /// resolution errors
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            single: self.single,
            literals: self.literals.clone(),
            references: self.references.clone(),
            parse_error: self.parse_error.clone(),
            last_errors: Mutex::new(Vec::new()),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("single", &self.single)
            .field("references", &self.references)
            .field("parse_error", &self.parse_error())
            .finish()
    }
}
