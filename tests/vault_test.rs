//! Vault KV backend against a mock server

use secret_ref::backends::{VaultBackend, VAULT};
use secret_ref::{BackendError, Registry, Secret, VaultBuilder, VaultConfig};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn config(uri: &str) -> VaultConfig {
    VaultBuilder::new(uri)
        .token("root-token")
        .secret_path("/secret/data/")
        .timeout_ms(2000)
        .retries(0)
        .build()
        .expect("valid vault config")
}

async fn mount_login(server: &MockServer, child: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/create"))
        .and(header("X-Vault-Token", "root-token"))
        .and(body_partial_json(json!({"ttl": "10800s", "renewable": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {"client_token": child, "lease_duration": 10800, "renewable": true}
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_health(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/sys/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "initialized": true,
            "sealed": false
        })))
        .mount(server)
        .await;
}

async fn mount_db_secret(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app/db"))
        .and(header("X-Vault-Token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "data": {"password": "hunter2", "port": 5432, "unset": null},
                "metadata": {"version": 3}
            }
        })))
        .mount(server)
        .await;
}

/// Connect, resolve each reference and return `(value, error)` pairs
async fn resolve_all(uri: String, references: &'static [&'static str]) -> Vec<(String, Option<String>)> {
    tokio::task::spawn_blocking(move || {
        let registry = Registry::new();
        registry.register(VAULT, VaultBackend::connect(config(&uri)).expect("vault connect"));
        references
            .iter()
            .map(|reference| {
                let secret = Secret::parse_with(&registry, reference);
                let value = secret.get();
                (value, secret.internal_error().map(|e| e.to_string()))
            })
            .collect()
    })
    .await
    .expect("blocking task panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reads_fields() {
    let server = MockServer::start().await;
    mount_login(&server, "child-1", 1).await;
    mount_health(&server).await;
    mount_db_secret(&server, "child-1").await;

    let results = resolve_all(
        server.uri(),
        &[
            "vault:/app/db?password",
            "vault:app/db?port",
            "jdbc://db:{{vault:/app/db?port}}/x?pw={{vault:/app/db?password}}",
        ],
    )
    .await;

    assert_eq!(results[0], ("hunter2".to_string(), None));
    assert_eq!(results[1], ("5432".to_string(), None));
    assert_eq!(results[2], ("jdbc://db:5432/x?pw=hunter2".to_string(), None));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_field_and_path() {
    let server = MockServer::start().await;
    mount_login(&server, "child-1", 1).await;
    mount_health(&server).await;
    mount_db_secret(&server, "child-1").await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app/none"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
        .mount(&server)
        .await;

    let results = resolve_all(
        server.uri(),
        &[
            "vault:/app/db?nope",
            "vault:/app/db?unset",
            "vault:/app/none?password",
            "vault:/app/db",
        ],
    )
    .await;

    assert_eq!(results[0].0, "");
    assert_eq!(
        results[0].1.as_deref(),
        Some("vault: not found: field nope in vault path secret/data/app/db")
    );
    assert!(results[1].1.as_deref().unwrap().contains("not found"));
    assert_eq!(
        results[2].1.as_deref(),
        Some("vault: not found: vault path secret/data/app/none")
    );
    assert!(results[3].1.as_deref().unwrap().contains("invalid locator"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relogin_after_forbidden() {
    let server = MockServer::start().await;
    mount_login(&server, "child-1", 2).await;
    mount_health(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app/db"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": ["permission denied"]
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_db_secret(&server, "child-1").await;

    let results = resolve_all(server.uri(), &["vault:/app/db?password"]).await;
    assert_eq!(results[0], ("hunter2".to_string(), None));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refresh_token_replaces_session() {
    let server = MockServer::start().await;
    mount_login(&server, "child-1", 2).await;
    mount_health(&server).await;

    let uri = server.uri();
    let (before, after) = tokio::task::spawn_blocking(move || {
        let backend = VaultBackend::connect(config(&uri)).expect("vault connect");
        let before = backend.token_issued_at();
        std::thread::sleep(std::time::Duration::from_millis(5));
        backend.refresh_token().expect("refresh");
        (before, backend.token_issued_at())
    })
    .await
    .unwrap();

    assert!(after > before);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_fails_on_rejected_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/token/create"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": ["permission denied"]
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || VaultBackend::connect(config(&uri)).map(|_| ()))
        .await
        .unwrap();

    match result {
        Err(BackendError::Http { status, message, .. }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "permission denied");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_far_future_refresh_interval_still_resolves() {
    let server = MockServer::start().await;
    mount_login(&server, "child-1", 1).await;
    mount_health(&server).await;
    mount_db_secret(&server, "child-1").await;

    let uri = server.uri();
    let value = tokio::task::spawn_blocking(move || {
        let config = VaultBuilder::new(uri)
            .token("root-token")
            .token_refresh_hours(1_000_000_000)
            .retries(0)
            .build()
            .expect("valid vault config");
        let registry = Registry::new();
        registry.register(VAULT, VaultBackend::connect(config).expect("vault connect"));
        Secret::parse_with(&registry, "vault:/app/db?password").get()
    })
    .await
    .expect("blocking task panicked");

    assert_eq!(value, "hunter2");
}

#[test]
fn test_builder_requires_token() {
    assert!(VaultBuilder::new("http://127.0.0.1:8200").build().is_err());
    assert!(VaultBuilder::new("http://127.0.0.1:8200")
        .token("t")
        .secret_path("/")
        .build()
        .is_err());
}
