//! Blocking HTTP execution shared by the remote backends
//!
//! The HTTP client is built on first use and shared between every clone of a
//! backend, so registering a remote backend costs nothing until a reference
//! to it is resolved.

use crate::errors::BackendError;
use crate::util::{generate_request_id, header_str};
use backoff::{retry_notify, ExponentialBackoff};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::StatusCode;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, trace};

const USER_AGENT_PREFIX: &str = "secret-ref-rust";

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub(crate) struct Transport {
    timeout: Duration,
    retries: u32,
    http: Arc<OnceLock<HttpClient>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

impl Transport {
    pub(crate) fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            timeout,
            retries,
            http: Arc::new(OnceLock::new()),
        }
    }

    fn client(&self) -> Result<&HttpClient, BackendError> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }

        let client = HttpClient::builder()
            .user_agent(format!("{}/{}", USER_AGENT_PREFIX, crate::VERSION))
            .timeout(self.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| BackendError::Config(format!("Failed to build HTTP client: {}", e)))?;

        // Lost races keep the first client
        let _ = self.http.set(client);
        self.http
            .get()
            .ok_or_else(|| BackendError::Config("HTTP client unavailable".to_string()))
    }

    /// Send the request built by `build`, retrying transient failures with
    /// exponential backoff. Non-success statuses come back as
    /// [`BackendError::Http`].
    pub(crate) fn execute<F>(&self, build: F) -> Result<Response, BackendError>
    where
        F: Fn(&HttpClient) -> RequestBuilder,
    {
        let client = self.client()?;
        let max_retries = self.retries;

        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            randomization_factor: 0.3,
            multiplier: 2.0,
            max_interval: Duration::from_secs(10),
            ..Default::default()
        };
        backoff.max_elapsed_time = if max_retries > 0 {
            Some(Duration::from_secs(60))
        } else {
            Some(Duration::from_millis(0))
        };

        let mut attempt: u32 = 0;
        let result = retry_notify(
            backoff,
            || {
                let current = attempt;
                attempt += 1;

                let request_id = generate_request_id();
                let response = build(client)
                    .header(REQUEST_ID_HEADER, request_id.as_str())
                    .send();

                let error = match response {
                    Ok(response) if response.status().is_success() => return Ok(response),
                    Ok(response) => error_from_response(response, request_id),
                    Err(e) => BackendError::from(e),
                };

                if error.is_retryable() && current < max_retries {
                    debug!(status = ?error.status_code(), attempt = current + 1, "retrying request");
                    Err(backoff::Error::transient(error))
                } else {
                    Err(backoff::Error::Permanent(error))
                }
            },
            |_: BackendError, dur: Duration| {
                trace!(delay = ?dur, "retry scheduled");
            },
        );

        result.map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

/// Turn an error response into [`BackendError::Http`], picking the message
/// out of etcd (`message`) or Vault (`errors`) bodies when present
fn error_from_response(response: Response, request_id: String) -> BackendError {
    let status = response.status();
    let request_id = header_str(response.headers(), REQUEST_ID_HEADER).or(Some(request_id));
    let message = response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|body| error_message(&body))
        .unwrap_or_else(|| default_message(status));

    BackendError::Http {
        status: status.as_u16(),
        message,
        request_id,
    }
}

fn error_message(body: &serde_json::Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }
    let errors: Vec<&str> = body
        .get("errors")?
        .as_array()?
        .iter()
        .filter_map(|e| e.as_str())
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join(", "))
    }
}

fn default_message(status: StatusCode) -> String {
    format!("HTTP error {}", status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(&json!({"errorCode": 100, "message": "Key not found"})),
            Some("Key not found".to_string())
        );
        assert_eq!(
            error_message(&json!({"errors": ["permission denied", "bad path"]})),
            Some("permission denied, bad path".to_string())
        );
        assert_eq!(error_message(&json!({"errors": []})), None);
        assert_eq!(error_message(&json!({"other": 1})), None);
    }

    #[test]
    fn test_default_message() {
        assert_eq!(default_message(StatusCode::BAD_GATEWAY), "HTTP error 502");
    }
}
