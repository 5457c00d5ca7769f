//! The contract every secret source implements
//!
//! A backend is registered once under a name as a *prototype*. Each reference
//! that names it receives its own instance via [`Backend::clone_box`], so any
//! state a backend keeps (a memoized environment read, a session token) stays
//! private to that one reference.
//!
//! # Example
//!
//! ```
//! use secret_ref::{Backend, BackendError, Registry, Secret};
//!
//! #[derive(Debug, Clone)]
//! struct Upper;
//!
//! impl Backend for Upper {
//!     fn clone_box(&self) -> Box<dyn Backend> {
//!         Box::new(Upper)
//!     }
//!
//!     fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
//!         if locator.is_empty() {
//!             return Err(BackendError::InvalidLocator("empty".to_string()));
//!         }
//!         Ok(locator.to_uppercase())
//!     }
//! }
//!
//! let registry = Registry::with_builtins();
//! registry.register("upper", Upper);
//! let secret = Secret::parse_with(&registry, "user-{{upper:admin}}");
//! assert_eq!(secret.get(), "user-ADMIN");
//! ```

use crate::errors::BackendError;
use std::fmt;

/// A named source able to turn a locator into a secret value
pub trait Backend: Send + Sync + fmt::Debug {
    /// Create a new instance carrying the same static configuration
    /// (keys, endpoints) but none of this instance's runtime state.
    ///
    /// Must never hand back `self`: two references resolving concurrently
    /// must not observe each other.
    fn clone_box(&self) -> Box<dyn Backend>;

    /// Look up the value behind `locator`
    ///
    /// All I/O a backend performs happens here. An empty or malformed
    /// locator is an error, never a panic.
    fn resolve(&mut self, locator: &str) -> Result<String, BackendError>;
}

impl Backend for Box<dyn Backend> {
    fn clone_box(&self) -> Box<dyn Backend> {
        (**self).clone_box()
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        (**self).resolve(locator)
    }
}
