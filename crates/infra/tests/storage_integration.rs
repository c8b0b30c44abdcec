//! Integration tests for the object-storage gateway client
//!
//! Uses wiremock to stand in for the gateway and a real resilience manager
//! in front of it, so failure paths exercise the full managed pipeline.

use std::sync::Arc;
use std::time::Duration;

use snipvault_common::resilience::{
    AvailabilityState, MockClock, ResilienceConfig, ResilienceError, ResilienceManager,
};
use snipvault_infra::config::StorageConfig;
use snipvault_infra::errors::InfraError;
use snipvault_infra::storage::StorageClient;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Route managed-pipeline logs into the test harness output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("snipvault_infra=debug,snipvault_common=debug")
        .with_test_writer()
        .try_init();
}

fn manager(threshold: u32) -> Arc<ResilienceManager<MockClock>> {
    let config = ResilienceConfig::builder()
        .max_retries(1)
        .retry_interval(Duration::from_millis(10))
        .circuit_breaker_threshold(threshold)
        .build()
        .expect("Failed to build config");
    Arc::new(ResilienceManager::with_clock(config, MockClock::new()).expect("manager"))
}

fn client_for(server: &MockServer, manager: Arc<ResilienceManager<MockClock>>) -> StorageClient<MockClock> {
    let config = StorageConfig {
        endpoint: server.address().to_string(),
        bucket: "snippets".to_string(),
        access_token: Some("test-token".to_string()),
        use_tls: false,
    };
    StorageClient::new(config, manager).expect("Failed to build storage client")
}

#[tokio::test(flavor = "multi_thread")]
async fn put_and_get_round_trip() {
    init_tracing();
    let server = MockServer::start().await;
    let content = b"fn main() { println!(\"hi\"); }".to_vec();

    Mock::given(method("PUT"))
        .and(path("/snippets/gists/a1b2/main.rs"))
        .and(body_bytes(content.clone()))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/snippets/gists/a1b2/main.rs"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let manager = manager(10);
    let client = client_for(&server, Arc::clone(&manager));
    let caller = CancellationToken::new();

    client.put_object(&caller, "gists/a1b2/main.rs", content.clone()).await.expect("put");
    let fetched = client.get_object(&caller, "gists/a1b2/main.rs").await.expect("get");
    assert_eq!(fetched, content);
    assert_eq!(manager.state(), AvailabilityState::Healthy);
    assert_eq!(manager.snapshot().total_operations, 2);

    manager.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ensure_bucket_accepts_already_exists() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/snippets"))
        .respond_with(ResponseTemplate::new(409).set_body_string("bucket exists"))
        .mount(&server)
        .await;

    let manager = manager(10);
    let client = client_for(&server, Arc::clone(&manager));

    client.ensure_bucket(&CancellationToken::new()).await.expect("ensure_bucket");
    assert_eq!(manager.state(), AvailabilityState::Healthy);
    assert_eq!(manager.snapshot().failed_operations, 0);

    manager.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn list_objects_passes_prefix_and_parses_entries() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snippets"))
        .and(query_param("prefix", "gists/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "objects": [
                { "key": "gists/a1b2/main.rs", "size": 29 },
                { "key": "gists/c3d4/notes.md", "size": 120 },
            ]
        })))
        .mount(&server)
        .await;

    let manager = manager(10);
    let client = client_for(&server, Arc::clone(&manager));

    let entries =
        client.list_objects(&CancellationToken::new(), Some("gists/")).await.expect("list");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, "gists/a1b2/main.rs");
    assert_eq!(entries[1].size, 120);

    manager.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_object_accepts_no_content() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/snippets/gists/a1b2/main.rs"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let manager = manager(10);
    let client = client_for(&server, Arc::clone(&manager));

    client.remove_object(&CancellationToken::new(), "gists/a1b2/main.rs").await.expect("remove");
    manager.close().await;
}

/// A gateway that keeps answering 5xx drives the manager through recovery
/// into `Failed`, then trips the breaker on the next failure.
#[tokio::test(flavor = "multi_thread")]
async fn server_errors_feed_the_circuit_breaker() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snippets/gists/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
        .mount(&server)
        .await;

    let manager = manager(2);
    let client = client_for(&server, Arc::clone(&manager));
    let caller = CancellationToken::new();

    let first = client.get_object(&caller, "gists/broken").await;
    assert!(matches!(
        first,
        Err(InfraError::Resilience(ResilienceError::RecoveryFailed))
    ));
    assert_eq!(manager.state(), AvailabilityState::Failed);

    let second = client.get_object(&caller, "gists/broken").await;
    assert!(matches!(
        second,
        Err(InfraError::Resilience(ResilienceError::CircuitOpen))
    ));
    assert_eq!(manager.state(), AvailabilityState::CircuitOpen);
    assert_eq!(manager.snapshot().circuit_breaks, 1);

    manager.close().await;
}

/// A transient gateway error heals through recovery: the failing first
/// attempt feeds the failure counter, the recovery re-invocation succeeds,
/// and the caller still receives the object's content.
#[tokio::test(flavor = "multi_thread")]
async fn transient_gateway_error_heals_through_recovery() {
    init_tracing();
    let server = MockServer::start().await;
    let content = b"# notes".to_vec();
    Mock::given(method("GET"))
        .and(path("/snippets/gists/flaky.md"))
        .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/snippets/gists/flaky.md"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let manager = manager(10);
    let client = client_for(&server, Arc::clone(&manager));

    let fetched =
        client.get_object(&CancellationToken::new(), "gists/flaky.md").await.expect("get");
    assert_eq!(fetched, content);
    assert_eq!(manager.state(), AvailabilityState::Healthy);
    assert_eq!(manager.snapshot().failed_operations, 1);

    manager.close().await;
}
