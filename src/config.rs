use crate::errors::BackendError;
use secrecy::SecretString;
use std::time::Duration;

fn validate_url(url: &str, what: &str) -> Result<String, BackendError> {
    let url = url.trim_end_matches('/');
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(BackendError::Config(format!(
            "{} must start with http:// or https://",
            what
        )));
    }
    Ok(url.to_string())
}

fn hours(hours: u64, what: &str) -> Result<Duration, BackendError> {
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            BackendError::Config(format!("Vault {} of {} hours is too large", what, hours))
        })
}

/// etcd v2 backend configuration
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    /// Base URL of the etcd server
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Number of retries
    pub retries: u32,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_ETCD_URL.to_string(),
            timeout: Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            retries: crate::DEFAULT_RETRIES,
        }
    }
}

/// Builder for [`EtcdConfig`]
#[derive(Debug)]
pub struct EtcdBuilder {
    url: String,
    timeout_ms: u64,
    retries: u32,
}

impl EtcdBuilder {
    /// Create a new builder for the etcd server at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: crate::DEFAULT_TIMEOUT_MS,
            retries: crate::DEFAULT_RETRIES,
        }
    }

    /// Set the request timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the number of retries for failed requests
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<EtcdConfig, BackendError> {
        Ok(EtcdConfig {
            url: validate_url(&self.url, "etcd URL")?,
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
        })
    }
}

/// Vault backend configuration
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub address: String,
    /// Token used to create child tokens
    pub token: SecretString,
    /// KV mount path, without trailing `/`
    pub secret_path: String,
    /// Lifetime requested for child tokens
    pub token_ttl: Duration,
    /// Age after which the child token is replaced; zero disables refresh
    pub token_refresh: Duration,
    /// Request timeout
    pub timeout: Duration,
    /// Number of retries
    pub retries: u32,
}

/// Builder for [`VaultConfig`]
///
/// # Example
///
/// ```
/// use secret_ref::VaultBuilder;
///
/// let config = VaultBuilder::new("http://127.0.0.1:8200")
///     .token("root")
///     .secret_path("kv/data/")
///     .token_ttl_hours(6)
///     .build()
///     .unwrap();
/// assert_eq!(config.secret_path, "kv/data");
/// ```
#[derive(Debug)]
pub struct VaultBuilder {
    address: String,
    token: Option<SecretString>,
    secret_path: String,
    token_ttl_hours: u64,
    token_refresh_hours: u64,
    timeout_ms: u64,
    retries: u32,
}

impl VaultBuilder {
    /// Create a new builder for the Vault server at `address`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            secret_path: crate::DEFAULT_VAULT_SECRET_PATH.to_string(),
            token_ttl_hours: crate::DEFAULT_TOKEN_TTL_HOURS,
            token_refresh_hours: crate::DEFAULT_TOKEN_REFRESH_HOURS,
            timeout_ms: crate::DEFAULT_TIMEOUT_MS,
            retries: crate::DEFAULT_RETRIES,
        }
    }

    /// Create a builder from `VAULT_ADDR` and `VAULT_TOKEN`
    ///
    /// Falls back to [`DEFAULT_VAULT_ADDR`](crate::DEFAULT_VAULT_ADDR) when
    /// `VAULT_ADDR` is unset.
    pub fn from_env() -> Self {
        let address =
            std::env::var("VAULT_ADDR").unwrap_or_else(|_| crate::DEFAULT_VAULT_ADDR.to_string());
        Self::new(address).token_from_env("VAULT_TOKEN")
    }

    /// Set the token used to log in
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into()));
        self
    }

    /// Read the login token from environment variable `var`, if set
    pub fn token_from_env(mut self, var: &str) -> Self {
        if let Ok(token) = std::env::var(var) {
            self.token = Some(SecretString::new(token));
        }
        self
    }

    /// Set the KV mount path (default `secret/data`)
    pub fn secret_path(mut self, path: impl Into<String>) -> Self {
        self.secret_path = path.into();
        self
    }

    /// Set the child token lifetime in hours
    pub fn token_ttl_hours(mut self, hours: u64) -> Self {
        self.token_ttl_hours = hours;
        self
    }

    /// Set the child token refresh interval in hours; zero disables refresh
    pub fn token_refresh_hours(mut self, hours: u64) -> Self {
        self.token_refresh_hours = hours;
        self
    }

    /// Set the request timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the number of retries for failed requests
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<VaultConfig, BackendError> {
        let token = self.token.ok_or_else(|| {
            BackendError::Config(
                "Vault token is required. Use .token() or .token_from_env()".to_string(),
            )
        })?;

        let secret_path = self.secret_path.trim_matches('/').to_string();
        if secret_path.is_empty() {
            return Err(BackendError::Config("Vault secret path is empty".to_string()));
        }

        Ok(VaultConfig {
            address: validate_url(&self.address, "Vault address")?,
            token,
            secret_path,
            token_ttl: hours(self.token_ttl_hours, "token TTL")?,
            token_refresh: hours(self.token_refresh_hours, "token refresh interval")?,
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
        })
    }
}
