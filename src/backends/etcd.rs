use crate::backend::Backend;
use crate::config::EtcdConfig;
use crate::errors::BackendError;
use crate::transport::Transport;
use crate::util::encode_key_path;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct V2Response {
    node: V2Node,
}

#[derive(Deserialize)]
struct V2Node {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
}

/// Reads keys through the etcd v2 keys API
///
/// The locator is the key path, e.g. `etcd2:messages/db_pass` reads
/// `GET {url}/v2/keys/messages/db_pass`.
#[derive(Debug, Clone)]
pub struct EtcdBackend {
    config: EtcdConfig,
    transport: Transport,
}

impl EtcdBackend {
    /// Create a backend for the configured etcd server
    ///
    /// No connection is made until the first key is resolved.
    pub fn new(config: EtcdConfig) -> Self {
        let transport = Transport::new(config.timeout, config.retries);
        Self { config, transport }
    }

    /// The configuration this backend was created with
    pub fn config(&self) -> &EtcdConfig {
        &self.config
    }
}

impl Backend for EtcdBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(self.clone())
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        let key = locator.trim_start_matches('/');
        if key.is_empty() {
            return Err(BackendError::InvalidLocator("etcd key is empty".to_string()));
        }

        let url = format!("{}/v2/keys/{}", self.config.url, encode_key_path(key));
        debug!(backend = "etcd2", "reading etcd key");

        let response = self
            .transport
            .execute(|http| http.get(&url))
            .map_err(|e| match e {
                BackendError::Http { status: 404, .. } => {
                    BackendError::NotFound(format!("etcd key {}", key))
                }
                other => other,
            })?;

        let body: V2Response = response.json()?;
        if body.node.dir {
            return Err(BackendError::InvalidLocator(format!(
                "etcd key {} is a directory",
                key
            )));
        }
        body.node
            .value
            .ok_or_else(|| BackendError::NotFound(format!("etcd key {} has no value", key)))
    }
}
