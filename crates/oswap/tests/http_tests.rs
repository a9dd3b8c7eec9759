use async_std::task;
use serde_json::{json, Value};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

/// A running `oswap serve`, killed when dropped.
struct Worker {
    child: Child,
    base_url: String,
    models: TempDir,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawns the worker on `port` with an empty model directory and waits for it
/// to answer health checks.
async fn setup_test_server(port: u16) -> Worker {
    let models = tempfile::tempdir().expect("Failed to create model dir");
    let addr = format!("127.0.0.1:{}", port);

    let child = Command::new(env!("CARGO_BIN_EXE_oswap"))
        .args(["serve", "--addr", &addr])
        .env("MODEL_DIR", models.path())
        .env("FETCH_TIMEOUT_SECS", "5")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start oswap");

    let worker = Worker {
        child,
        base_url: format!("http://{}", addr),
        models,
    };
    for _ in 0..50 {
        task::sleep(Duration::from_millis(200)).await;
        if surf::get(format!("{}/health", worker.base_url)).await.is_ok() {
            return worker;
        }
    }
    panic!("Server failed to start within timeout");
}

async fn run(worker: &Worker, envelope: Value) -> Value {
    let mut response = surf::post(format!("{}/run", worker.base_url))
        .body_json(&envelope)
        .expect("Failed to encode envelope")
        .await
        .expect("Failed to reach worker");
    assert_eq!(response.status(), 200);
    response.body_json().await.expect("Response is not JSON")
}

#[async_std::test]
async fn test_health_and_version() {
    let worker = setup_test_server(9311).await;

    let health: Value = surf::get(format!("{}/health", worker.base_url))
        .recv_json()
        .await
        .expect("Failed to get health");
    assert_eq!(health["status"], "ok");
    assert!(health["uptime"].is_u64());

    let version = run(&worker, json!({ "input": {} })).await;
    assert_eq!(version["status"], "ok");
    assert_eq!(version["versions"]["api"], "1");
}

#[async_std::test]
async fn test_errors_are_envelopes() {
    let worker = setup_test_server(9312).await;

    let unknown = run(&worker, json!({ "input": { "op": "bogus" } })).await;
    assert_eq!(unknown["status"], "error");
    assert_eq!(unknown["kind"], "dispatch");

    let no_model = run(
        &worker,
        json!({ "input": {
            "op": "swap",
            "source_url": "http://127.0.0.1:9/s.png",
            "target_url": "http://127.0.0.1:9/t.png"
        }}),
    )
    .await;
    assert_eq!(no_model["kind"], "resource");

    let mut garbage = surf::post(format!("{}/run", worker.base_url))
        .body_string("{not json".to_string())
        .await
        .expect("Failed to reach worker");
    assert_eq!(garbage.status(), 200);
    let garbage: Value = garbage.body_json().await.expect("Response is not JSON");
    assert_eq!(garbage["kind"], "validation");

    // Still serving after all of the above.
    let health = run(&worker, json!({ "input": { "op": "health" } })).await;
    assert_eq!(health["status"], "ok");
}

#[async_std::test]
async fn test_unreachable_download_reports_error() {
    let worker = setup_test_server(9313).await;

    let report = run(
        &worker,
        json!({ "input": {
            "op": "download_models",
            "model_url": "http://127.0.0.1:9/unreachable.onnx"
        }}),
    )
    .await;

    assert_eq!(report["status"], "error");
    assert_eq!(report["errors"].as_array().map(Vec::len), Some(1));
    assert!(report["downloaded"].as_array().is_some_and(Vec::is_empty));
    assert!(!worker.models.path().join("unreachable.onnx").exists());
}

#[test]
fn test_invoke_prints_response() {
    let models = tempfile::tempdir().expect("Failed to create model dir");
    let output = Command::new(env!("CARGO_BIN_EXE_oswap"))
        .args(["invoke", "--input", r#"{"input":{"op":"version"}}"#])
        .env("MODEL_DIR", models.path())
        .output()
        .expect("Failed to run oswap invoke");

    assert!(output.status.success());
    let response: Value = serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
    assert_eq!(response["status"], "ok");
    assert!(response["versions"]["face-swap-model"].is_string());

    let failed = Command::new(env!("CARGO_BIN_EXE_oswap"))
        .args(["invoke", "--input", r#"{"input":{"op":"bogus"}}"#])
        .env("MODEL_DIR", models.path())
        .output()
        .expect("Failed to run oswap invoke");
    assert!(!failed.status.success());
}
