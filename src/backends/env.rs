use crate::backend::Backend;
use crate::errors::BackendError;
use std::env::VarError;

fn read_var(name: &str) -> Result<String, BackendError> {
    if name.is_empty() {
        return Err(BackendError::InvalidLocator(
            "environment variable name is empty".to_string(),
        ));
    }
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        Err(VarError::NotUnicode(_)) => Err(BackendError::Config(format!(
            "environment variable {} is not valid UTF-8",
            name
        ))),
        _ => Err(BackendError::EnvNotSet(name.to_string())),
    }
}

/// Environment variable backend that remembers its first successful read
///
/// Later calls on the same instance return the remembered value even if the
/// variable changes. Each reference gets its own instance, so the memo never
/// answers for a different variable.
#[derive(Debug, Clone, Default)]
pub struct EnvBackend {
    cached: Option<String>,
}

impl EnvBackend {
    /// Create a backend with nothing remembered yet
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for EnvBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(EnvBackend::new())
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }
        let value = read_var(locator)?;
        self.cached = Some(value.clone());
        Ok(value)
    }
}

/// Environment variable backend that reads the variable on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct DynEnvBackend;

impl Backend for DynEnvBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(DynEnvBackend)
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        read_var(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_memoizes_first_read() {
        std::env::set_var("SREF_ENV_MEMO", "first");
        let mut backend = EnvBackend::new();
        assert_eq!(backend.resolve("SREF_ENV_MEMO").unwrap(), "first");

        std::env::set_var("SREF_ENV_MEMO", "second");
        assert_eq!(backend.resolve("SREF_ENV_MEMO").unwrap(), "first");

        let mut fresh = backend.clone_box();
        assert_eq!(fresh.resolve("SREF_ENV_MEMO").unwrap(), "second");
        std::env::remove_var("SREF_ENV_MEMO");
    }

    #[test]
    #[serial]
    fn test_env_does_not_memoize_failure() {
        std::env::remove_var("SREF_ENV_LATE");
        let mut backend = EnvBackend::new();
        assert_eq!(
            backend.resolve("SREF_ENV_LATE"),
            Err(BackendError::EnvNotSet("SREF_ENV_LATE".to_string()))
        );

        std::env::set_var("SREF_ENV_LATE", "now");
        assert_eq!(backend.resolve("SREF_ENV_LATE").unwrap(), "now");
        std::env::remove_var("SREF_ENV_LATE");
    }

    #[test]
    #[serial]
    fn test_dynenv_tracks_changes() {
        std::env::set_var("SREF_DYNENV", "first");
        let mut backend = DynEnvBackend;
        assert_eq!(backend.resolve("SREF_DYNENV").unwrap(), "first");

        std::env::set_var("SREF_DYNENV", "second");
        assert_eq!(backend.resolve("SREF_DYNENV").unwrap(), "second");

        std::env::remove_var("SREF_DYNENV");
        assert!(backend.resolve("SREF_DYNENV").is_err());
    }

    #[test]
    #[serial]
    fn test_empty_value_is_unset() {
        std::env::set_var("SREF_ENV_EMPTY", "");
        assert!(matches!(
            EnvBackend::new().resolve("SREF_ENV_EMPTY"),
            Err(BackendError::EnvNotSet(_))
        ));
        assert!(matches!(
            DynEnvBackend.resolve("SREF_ENV_EMPTY"),
            Err(BackendError::EnvNotSet(_))
        ));
        std::env::remove_var("SREF_ENV_EMPTY");
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_non_utf8_value_is_not_reported_unset() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("SREF_ENV_BYTES", OsStr::from_bytes(&[0x66, 0x6f, 0xff]));
        assert!(matches!(
            EnvBackend::new().resolve("SREF_ENV_BYTES"),
            Err(BackendError::Config(msg)) if msg.contains("not valid UTF-8")
        ));
        assert!(matches!(
            DynEnvBackend.resolve("SREF_ENV_BYTES"),
            Err(BackendError::Config(_))
        ));
        std::env::remove_var("SREF_ENV_BYTES");
    }

    #[test]
    fn test_empty_name_is_invalid() {
        assert!(matches!(
            DynEnvBackend.resolve(""),
            Err(BackendError::InvalidLocator(_))
        ));
    }
}
