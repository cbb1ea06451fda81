//! Durable destination and failure-path tests
//!
//! Outputs are written to the in-memory store (or a temp directory) and read
//! back to check what actually landed.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard::backend::{BackendRegistry, MemoryBackend};
use switchyard::{
    BranchOutput, CaseConfig, DestinationBackend, DestinationConfig, InputSpec, RouterConfig,
    SwitchError, SwitchRequest, SwitchRouter,
};
use tempfile::TempDir;

fn people() -> Vec<Value> {
    vec![
        json!({"id": 1, "lastName": "Doe"}),
        json!({"id": 2, "lastName": "Johnson"}),
        json!({"id": 3, "lastName": "Jones"}),
    ]
}

fn cases() -> Vec<CaseConfig> {
    vec![
        CaseConfig::expression(r#"x.lastName == "Doe""#),
        CaseConfig::default_case(),
    ]
}

fn memory_router(store: &Arc<MemoryBackend>, config: RouterConfig) -> SwitchRouter {
    let config = RouterConfig {
        destination_backend: DestinationBackend::Memory,
        ..config
    };
    let backends = BackendRegistry::new().with_store("memory", store.clone());
    SwitchRouter::new(config).with_backends(backends)
}

fn stored_json(store: &MemoryBackend, output: &BranchOutput) -> Value {
    let object = output.stored().expect("stored output");
    let body = store.get(&object.container, &object.key).expect("object exists");
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_outputs_stored_in_memory_store() {
    let store = Arc::new(MemoryBackend::new());
    let router = memory_router(&store, RouterConfig::default());

    let request = SwitchRequest::new(InputSpec::Records(people()), cases())
        .with_destination("results", "switch/run-1/");
    let response = router.handle(request).await.unwrap();

    assert_eq!(response.data.len(), 2);
    assert_eq!(stored_json(&store, &response.data[0]), json!([people()[0]]));
    assert_eq!(
        stored_json(&store, &response.data[1]),
        json!([people()[1], people()[2]])
    );

    // Each case gets its own key under the prefix
    let keys = store.keys("results");
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.starts_with("switch/run-1/")));

    let uri = serde_json::to_value(&response).unwrap()["data"][0].clone();
    assert!(uri.as_str().unwrap().starts_with("memory://results/switch/run-1/"));
}

#[tokio::test]
async fn test_outputs_stored_on_local_filesystem() {
    let root = TempDir::new().unwrap();
    let router = SwitchRouter::from_config(RouterConfig {
        destination_backend: DestinationBackend::Local,
        local_root: Some(root.path().to_path_buf()),
        ..Default::default()
    })
    .await
    .unwrap();

    let request = SwitchRequest::new(InputSpec::Records(people()), cases())
        .with_destination("results", "out-");
    let response = router.handle(request).await.unwrap();

    for output in &response.data {
        let object = output.stored().unwrap();
        let path = root.path().join("results").join(&object.key);
        let stored: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert!(stored.is_array());
    }
}

#[tokio::test]
async fn test_local_destination_cannot_escape_root() {
    let root = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let router = SwitchRouter::from_config(RouterConfig {
        destination_backend: DestinationBackend::Local,
        local_root: Some(root.path().to_path_buf()),
        ..Default::default()
    })
    .await
    .unwrap();

    let destinations = [
        ("results".to_string(), format!("{}/escaped-", outside.path().display())),
        ("results".to_string(), "../../escaped-".to_string()),
        (outside.path().display().to_string(), "escaped-".to_string()),
        ("..".to_string(), "escaped-".to_string()),
    ];
    for (bucket, prefix) in destinations {
        let request = SwitchRequest::new(InputSpec::Records(people()), cases())
            .with_destination(bucket.as_str(), prefix.as_str());
        let err = router.route(request).await.unwrap_err();
        assert!(err.is_config(), "{} / {} gave {}", bucket, prefix, err);
    }

    assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_case_with_no_matches_stores_empty_array() {
    let store = Arc::new(MemoryBackend::new());
    let router = memory_router(&store, RouterConfig::default());

    let request = SwitchRequest::new(
        InputSpec::Records(people()),
        vec![CaseConfig::expression("x.id > 100")],
    )
    .with_destination("results", "empty/");
    let response = router.handle(request).await.unwrap();

    assert_eq!(stored_json(&store, &response.data[0]), json!([]));
}

#[tokio::test]
async fn test_missing_destination_fields_are_config_errors() {
    let store = Arc::new(MemoryBackend::new());
    let router = memory_router(&store, RouterConfig::default());

    let mut request = SwitchRequest::new(InputSpec::Records(people()), cases());
    request.durable_destination = Some(DestinationConfig {
        bucket_name: Some("results".to_string()),
        ..Default::default()
    });
    let err = router.route(request.clone()).await.unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("s3.keyPrefix"));

    request.durable_destination = Some(DestinationConfig {
        key_prefix: Some("p/".to_string()),
        ..Default::default()
    });
    let err = router.route(request).await.unwrap_err();
    assert!(err.to_string().contains("s3.bucketName"));

    assert!(store.keys("results").is_empty());
}

#[tokio::test]
async fn test_upload_failure_fails_run() {
    let store = Arc::new(MemoryBackend::new());
    store.fail_uploads("bucket is read-only");
    let router = memory_router(&store, RouterConfig::default());

    let request = SwitchRequest::new(InputSpec::Records(people()), cases())
        .with_destination("results", "p/");
    let err = router.route(request).await.unwrap_err();

    assert!(err.is_sink());
    assert!(err.to_string().contains("bucket is read-only"));
    assert_eq!(err.exit_code(), switchyard::error::EXIT_FATAL);
}

#[tokio::test]
async fn test_upload_rejected_while_streaming_aborts_run() {
    let store = Arc::new(MemoryBackend::new());
    store.reject_uploads("quota exceeded");
    let router = memory_router(
        &store,
        RouterConfig {
            channel_capacity: 1,
            ..Default::default()
        },
    );

    // Far more records than the broadcaster and upload channels can buffer
    let records: Vec<Value> = (0..500).map(|i| json!({"id": i, "lastName": "Doe"})).collect();
    let request = SwitchRequest::new(
        InputSpec::Records(records),
        vec![
            CaseConfig::always_run(),
            CaseConfig::expression(r#"x.lastName == "Doe""#),
            CaseConfig::default_case(),
        ],
    )
    .with_destination("results", "p/");

    let err = tokio::time::timeout(Duration::from_secs(10), router.route(request))
        .await
        .expect("run did not hang")
        .unwrap_err();

    assert!(err.is_sink(), "unexpected error {}", err);
    assert!(err.to_string().contains("quota exceeded"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.keys("results").is_empty());
}

#[tokio::test]
async fn test_slow_store_completes_after_deadline() {
    let store = Arc::new(MemoryBackend::new());
    store.delay_uploads(Duration::from_secs(5));
    let router = memory_router(
        &store,
        RouterConfig {
            durability_timeout_ms: 100,
            ..Default::default()
        },
    );

    let request = SwitchRequest::new(InputSpec::Records(people()), cases())
        .with_destination("results", "slow/");

    let started = Instant::now();
    let response = router.handle(request).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));

    // References are handed out even though the store has not confirmed them
    for output in &response.data {
        let object = output.stored().unwrap();
        assert_eq!(object.container, "results");
        assert!(object.key.starts_with("slow/"));
    }
}

#[tokio::test]
async fn test_source_read_failure_fails_run() {
    let store = Arc::new(MemoryBackend::new().with_read_chunk_size(8));
    store.insert_with_read_error("in", "partial.json", &br#"[{"id": 1}, {"id": 2}, {"#[..]);
    let router = memory_router(&store, RouterConfig::default());

    let request = SwitchRequest::new(
        InputSpec::Location("memory://in/partial.json".to_string()),
        vec![CaseConfig::always_run()],
    )
    .with_destination("results", "p/");
    let err = router.route(request).await.unwrap_err();

    assert!(matches!(err, SwitchError::Source(_)));
    // The partial output never became an object
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.keys("results").is_empty());
}

#[tokio::test]
async fn test_malformed_source_fails_run() {
    let store = Arc::new(MemoryBackend::new());
    store.insert("in", "object.json", &br#"{"id": 1}"#[..]);
    let router = memory_router(&store, RouterConfig::default());

    let request = SwitchRequest::new(
        InputSpec::Location("memory://in/object.json".to_string()),
        cases(),
    );
    assert!(router.route(request).await.unwrap_err().is_source());
}

#[tokio::test]
async fn test_missing_source_object_fails_run() {
    let router = SwitchRouter::new(RouterConfig::default());
    let request = SwitchRequest::new(
        InputSpec::Location("/nonexistent/switchyard/input.json".to_string()),
        cases(),
    );
    assert!(router.route(request).await.unwrap_err().is_source());
}
