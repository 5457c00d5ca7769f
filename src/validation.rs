//! Config-time check that a secret reference actually resolves
//!
//! Deserialization accepts any string, so a typo in a backend name or a
//! missing environment variable only shows up as an empty value later.
//! [`RequiredSecret`] turns those into errors while the configuration is being
//! validated.
//!
//! # Example
//!
//! ```
//! use secret_ref::{validate_required_secret, Secret};
//! use validator::Validate;
//!
//! #[derive(serde::Deserialize, Validate)]
//! struct Config {
//!     #[validate(custom(function = "validate_required_secret"))]
//!     password: Secret,
//! }
//!
//! let config: Config = serde_json::from_str(r#"{"password":"nope:x"}"#).unwrap();
//! assert!(config.validate().is_err());
//! ```

use crate::errors::{Error, Result};
use crate::secret::Secret;
use std::any::Any;
use std::borrow::Cow;
use validator::ValidationError;

const DEFAULT_MESSAGE: &str = "cannot be blank";
const VALIDATION_CODE: &str = "required_secret";

/// Rule requiring a [`Secret`] to parse, bind and resolve without errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSecret {
    message: String,
}

impl Default for RequiredSecret {
    fn default() -> Self {
        Self {
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

impl RequiredSecret {
    /// Rule with the default message
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to the rule's message, separated by `": "`
    pub fn message(mut self, message: &str) -> Self {
        if self.message.is_empty() {
            self.message = message.to_string();
        } else {
            self.message = format!("{}: {}", self.message, message);
        }
        self
    }

    /// The rule's message
    pub fn message_text(&self) -> &str {
        &self.message
    }

    /// Check `value`, which must be a [`Secret`]
    ///
    /// Fails with [`Error::InvalidType`] for anything else, with the parse
    /// error if parsing failed, with [`Error::Unbound`] if a reference has no
    /// backend, and otherwise with whatever a fresh [`Secret::get`] reports.
    pub fn validate(&self, value: &dyn Any) -> Result<()> {
        let secret = value.downcast_ref::<Secret>().ok_or(Error::InvalidType)?;

        if let Some(e) = secret.parse_error() {
            return Err(e);
        }
        if secret.references().is_empty() || !secret.references().iter().all(|r| r.is_bound()) {
            return Err(Error::Unbound);
        }

        let _ = secret.get();
        match secret.internal_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// [`RequiredSecret::validate`] shaped for the `validator` crate
    pub fn check(&self, secret: &Secret) -> std::result::Result<(), ValidationError> {
        self.validate(secret).map_err(|e| {
            let mut err = ValidationError::new(VALIDATION_CODE);
            err.message = Some(Cow::Owned(format!("{}: {}", self.message, e)));
            err
        })
    }
}

/// `#[validate(custom(function = "validate_required_secret"))]` hook using
/// the default [`RequiredSecret`] rule
pub fn validate_required_secret(secret: &Secret) -> std::result::Result<(), ValidationError> {
    RequiredSecret::new().check(secret)
}
