//! etcd v2 backend against a mock server
//!
//! The backend blocks, so every resolve (and every drop of a backend) runs on
//! a blocking thread while the mock server runs on the async runtime.

use secret_ref::backends::{EtcdBackend, ETCD};
use secret_ref::{BackendError, EtcdBuilder, Registry, Secret};
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn registry(uri: &str, retries: u32) -> Registry {
    let config = EtcdBuilder::new(uri)
        .timeout_ms(2000)
        .retries(retries)
        .build()
        .expect("valid etcd config");
    let registry = Registry::new();
    registry.register(ETCD, EtcdBackend::new(config));
    registry
}

/// Resolve `reference` on a blocking thread, returning the value and the
/// rendered internal error
async fn resolve(uri: String, retries: u32, reference: &'static str) -> (String, Option<String>) {
    tokio::task::spawn_blocking(move || {
        let secret = Secret::parse_with(&registry(&uri, retries), reference);
        let value = secret.get();
        (value, secret.internal_error().map(|e| e.to_string()))
    })
    .await
    .expect("blocking task panicked")
}

fn key_body(key: &str, value: &str) -> serde_json::Value {
    json!({
        "action": "get",
        "node": {
            "key": key,
            "value": value,
            "modifiedIndex": 7,
            "createdIndex": 7
        }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reads_key() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/messages/db_pass"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key_body("/messages/db_pass", "hunter2")))
        .expect(2)
        .mount(&server)
        .await;

    let (value, error) = resolve(server.uri(), 0, "etcd2:messages/db_pass").await;
    assert_eq!(value, "hunter2");
    assert_eq!(error, None);

    // Leading slash is accepted
    let (value, _) = resolve(server.uri(), 0, "etcd2:/messages/db_pass").await;
    assert_eq!(value, "hunter2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_template_reads_each_key() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/db/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key_body("/db/user", "admin")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/db/pass"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key_body("/db/pass", "pw")))
        .mount(&server)
        .await;

    let (value, error) = resolve(
        server.uri(),
        0,
        "postgres://{{etcd2:db/user}}:{{etcd2:db/pass}}@localhost/app",
    )
    .await;
    assert_eq!(value, "postgres://admin:pw@localhost/app");
    assert_eq!(error, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_key_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorCode": 100,
            "message": "Key not found",
            "cause": "/missing",
            "index": 7
        })))
        .mount(&server)
        .await;

    let (value, error) = resolve(server.uri(), 0, "etcd2:missing").await;
    assert_eq!(value, "");
    assert_eq!(error.as_deref(), Some("etcd2: not found: etcd key missing"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_directory_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "get",
            "node": {"key": "/messages", "dir": true, "nodes": []}
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        let mut backend = EtcdBackend::new(EtcdBuilder::new(uri).retries(0).build().unwrap());
        backend_resolve(&mut backend, "messages")
    })
    .await
    .unwrap();
    assert!(matches!(result, Err(BackendError::InvalidLocator(_))));
}

fn backend_resolve(backend: &mut EtcdBackend, key: &str) -> Result<String, BackendError> {
    use secret_ref::Backend;
    backend.resolve(key)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retries_transient_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key_body("/flaky", "ok")))
        .mount(&server)
        .await;

    let (value, error) = resolve(server.uri(), 2, "etcd2:flaky").await;
    assert_eq!(value, "ok");
    assert_eq!(error, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_retry_when_disabled() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/keys/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (value, error) = resolve(server.uri(), 0, "etcd2:down").await;
    assert_eq!(value, "");
    assert!(error.unwrap().starts_with("etcd2: http 503"));
}

#[test]
fn test_empty_key_is_invalid() {
    let mut backend = EtcdBackend::new(Default::default());
    assert!(matches!(
        backend_resolve(&mut backend, "/"),
        Err(BackendError::InvalidLocator(_))
    ));
}

/// Collects formatted log output
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_logs_omit_key() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("secret_ref=trace"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let error = tracing::subscriber::with_default(subscriber, || {
        // Nothing listens on port 1, so the read fails after logging
        let secret = Secret::parse_with(
            &registry("http://127.0.0.1:1", 1),
            "prefix-{{etcd2:team/very-private-key-name}}",
        );
        assert_eq!(secret.get(), "prefix-");
        secret.internal_error()
    });
    assert!(error.is_some());

    let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("reading etcd key"), "logs: {logs}");
    assert!(logs.contains("secret reference failed to resolve"), "logs: {logs}");
    assert!(!logs.contains("very-private-key-name"), "logs: {logs}");
}
