use crate::backend::Backend;
use crate::config::VaultConfig;
use crate::errors::BackendError;
use crate::transport::Transport;
use crate::util::encode_key_path;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
const CREATE_TOKEN_PATH: &str = "/v1/auth/token/create";
const HEALTH_PATH: &str = "/v1/sys/health";

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug)]
struct Session {
    token: SecretString,
    issued_at: OffsetDateTime,
}

/// Reads fields from a Vault KV (v2) mount
///
/// The locator is `<path>?<field>`: `vault:/app/db?password` reads
/// `GET {address}/v1/{secret_path}/app/db` and returns `data.data.password`.
/// Non-string field values are rendered as JSON text.
///
/// [`VaultBackend::connect`] trades the configured token for a child token
/// and checks server health. All clones share that session; the child token
/// is replaced once it is older than the configured refresh interval, and
/// once more if the server rejects it.
///
/// # Example
///
/// ```no_run
/// use secret_ref::backends::{VaultBackend, VAULT};
/// use secret_ref::{Registry, Secret, VaultBuilder};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = VaultBuilder::from_env().build()?;
/// let registry = Registry::with_builtins();
/// registry.register(VAULT, VaultBackend::connect(config)?);
///
/// let secret = Secret::parse_with(&registry, "vault:/app/db?password");
/// println!("{}", secret.get());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VaultBackend {
    config: Arc<VaultConfig>,
    transport: Transport,
    session: Arc<Mutex<Session>>,
}

impl fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultBackend")
            .field("address", &self.config.address)
            .field("secret_path", &self.config.secret_path)
            .finish()
    }
}

impl VaultBackend {
    /// Log in and check the server is healthy
    pub fn connect(config: VaultConfig) -> Result<Self, BackendError> {
        let transport = Transport::new(config.timeout, config.retries);
        let session = login(&transport, &config)?;

        let health_url = format!("{}{}", config.address, HEALTH_PATH);
        let _ = transport.execute(|http| http.get(&health_url))?;
        debug!(address = %config.address, "connected to vault");

        Ok(Self {
            config: Arc::new(config),
            transport,
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// When the current child token was issued
    pub fn token_issued_at(&self) -> OffsetDateTime {
        self.session.lock().issued_at
    }

    /// Replace the child token now
    pub fn refresh_token(&self) -> Result<(), BackendError> {
        let session = login(&self.transport, &self.config)?;
        *self.session.lock() = session;
        debug!("vault token refreshed");
        Ok(())
    }

    fn current_token(&self) -> SecretString {
        let refresh = self.config.token_refresh;
        let stale = {
            let session = self.session.lock();
            !refresh.is_zero() && refresh_due(session.issued_at, refresh, OffsetDateTime::now_utc())
        };
        if stale {
            if let Err(e) = self.refresh_token() {
                warn!(error = %e, "failed to refresh vault token");
            }
        }
        self.session.lock().token.clone()
    }

    fn read(&self, path: &str, field: &str) -> Result<String, BackendError> {
        let full_path = format!("{}{}", self.config.secret_path, path);
        let url = format!("{}/v1/{}", self.config.address, encode_key_path(&full_path));

        let fetch = |token: &SecretString| {
            self.transport.execute(|http| {
                http.get(&url)
                    .header(VAULT_TOKEN_HEADER, token.expose_secret().as_str())
            })
        };

        let response = match fetch(&self.current_token()) {
            Err(BackendError::Http { status: 401 | 403, .. }) => {
                warn!("vault rejected token, attempting refresh");
                self.refresh_token()?;
                fetch(&self.current_token())
            }
            other => other,
        }
        .map_err(|e| match e {
            BackendError::Http { status: 404, .. } => {
                BackendError::NotFound(format!("vault path {}", full_path))
            }
            other => other,
        })?;

        let body: Value = response.json()?;
        let data = body
            .get("data")
            .and_then(|d| d.get("data"))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                BackendError::Deserialize(format!("data block not exists in key '{}'", full_path))
            })?;

        match data.get(field) {
            None | Some(Value::Null) => Err(BackendError::NotFound(format!(
                "field {} in vault path {}",
                field, full_path
            ))),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
        }
    }
}

/// Whether a token issued at `issued_at` is due for refresh at `now`; an
/// interval past the end of the calendar never comes due
fn refresh_due(issued_at: OffsetDateTime, refresh: Duration, now: OffsetDateTime) -> bool {
    time::Duration::try_from(refresh)
        .ok()
        .and_then(|refresh| issued_at.checked_add(refresh))
        .is_some_and(|due| now >= due)
}

fn login(transport: &Transport, config: &VaultConfig) -> Result<Session, BackendError> {
    let url = format!("{}{}", config.address, CREATE_TOKEN_PATH);
    let body = json!({
        "ttl": format!("{}s", config.token_ttl.as_secs()),
        "renewable": true,
    });

    let response = transport.execute(|http| {
        http.post(&url)
            .header(VAULT_TOKEN_HEADER, config.token.expose_secret().as_str())
            .json(&body)
    })?;

    let login: LoginResponse = response.json()?;
    if login.auth.client_token.is_empty() {
        return Err(BackendError::Config(
            "vault returned an empty client token".to_string(),
        ));
    }

    Ok(Session {
        token: SecretString::new(login.auth.client_token),
        issued_at: OffsetDateTime::now_utc(),
    })
}

fn split_locator(locator: &str) -> Result<(String, &str), BackendError> {
    let invalid = || {
        BackendError::InvalidLocator("incorrect key format. use \"/<path>?<field>\"".to_string())
    };

    let mut parts = locator.split('?');
    let (path, field) = match (parts.next(), parts.next(), parts.next()) {
        (Some(path), Some(field), None) => (path, field),
        _ => return Err(invalid()),
    };
    if path.is_empty() || field.is_empty() {
        return Err(invalid());
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    Ok((path, field))
}

impl Backend for VaultBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(self.clone())
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        let (path, field) = split_locator(locator)?;
        self.read(&path, field)
    }
}
