//! Integration tests for the modelmeta-rpc JSON-RPC server.
//!
//! These tests spawn the real binary and talk to it over HTTP, checking the
//! response shapes front ends depend on.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

/// Unroutable registry so no test ever reaches the network.
const OFFLINE_API_BASE: &str = "http://127.0.0.1:9/api/v1";

/// Create a temporary model folder holding one artifact.
fn create_model_folder() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let artifact = temp_dir.path().join("style.safetensors");
    std::fs::write(&artifact, b"fake model weights").unwrap();
    (temp_dir, artifact)
}

/// Make an RPC call to the server.
async fn rpc_call(port: u16, method: &str, params: Value) -> Result<Value, String> {
    let json = rpc_call_raw(port, method, params).await?;
    if let Some(error) = json.get("error") {
        return Err(error.to_string());
    }
    Ok(json.get("result").cloned().unwrap_or(Value::Null))
}

/// Make an RPC call and return the full JSON-RPC payload.
async fn rpc_call_raw(port: u16, method: &str, params: Value) -> Result<Value, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{}/rpc", port))
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    response.json::<Value>().await.map_err(|e| e.to_string())
}

/// Check health endpoint.
async fn check_health(port: u16) -> bool {
    let client = reqwest::Client::new();
    if let Ok(response) = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        if let Ok(json) = response.json::<Value>().await {
            return json.get("status").and_then(|v| v.as_str()) == Some("ok");
        }
    }
    false
}

/// Wait for server to be ready.
async fn wait_for_server(port: u16, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        if check_health(port).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

struct RpcServerHandle {
    child: tokio::process::Child,
    port: u16,
}

impl RpcServerHandle {
    async fn stop(mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

fn rpc_binary() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_modelmeta-rpc") {
        return Ok(PathBuf::from(path));
    }

    let current_exe = std::env::current_exe()
        .map_err(|e| format!("failed to resolve current_exe for fallback: {e}"))?;
    let target_debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .ok_or_else(|| "failed to resolve target/debug directory for fallback".to_string())?;

    let mut fallback = target_debug_dir.join("modelmeta-rpc");
    if cfg!(target_os = "windows") {
        fallback.set_extension("exe");
    }
    if !fallback.exists() {
        return Err(format!(
            "CARGO_BIN_EXE_modelmeta-rpc not set and fallback binary not found at {}",
            fallback.display()
        ));
    }
    Ok(fallback)
}

/// Start the RPC binary and wait until `/health` is ready.
async fn start_rpc_server(watch: Option<(&str, &Path)>) -> Result<RpcServerHandle, String> {
    let mut command = tokio::process::Command::new(rpc_binary()?);
    command
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--api-base")
        .arg(OFFLINE_API_BASE)
        .arg("--interval-secs")
        .arg("1");
    if let Some((kind, folder)) = watch {
        command.arg("--watch").arg(format!("{}={}", kind, folder.display()));
    }

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn modelmeta-rpc: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut discovered_port: Option<u16> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("RPC_PORT=") {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid RPC_PORT value '{value}': {e}"))?;
                    discovered_port = Some(parsed);
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read modelmeta-rpc stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port = discovered_port.ok_or_else(|| "server never reported RPC_PORT".to_string())?;
    let handle = RpcServerHandle { child, port };
    if !wait_for_server(port, 10).await {
        return Err(format!("server on port {port} never became healthy"));
    }
    Ok(handle)
}

#[tokio::test]
async fn test_health_check() {
    let server = start_rpc_server(None).await.unwrap();

    let result = rpc_call(server.port, "health_check", json!({})).await.unwrap();
    assert_eq!(result["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn test_metadata_round_trip_over_rpc() {
    let (folder, artifact) = create_model_folder();
    let server = start_rpc_server(None).await.unwrap();
    let path = artifact.to_string_lossy().into_owned();

    let saved = rpc_call(
        server.port,
        "save_metadata",
        json!({
            "path": path,
            "metadata": {"hash": "AUTOV2:deadbeef00", "display_name": "Style", "rating": 5}
        }),
    )
    .await
    .unwrap();
    assert_eq!(saved["success"], true);
    assert_eq!(saved["metadata"]["hash"], "AUTOV2: DEADBEEF00");
    assert!(saved["metadata"]["last_updated"].is_string());

    let loaded = rpc_call(server.port, "load_metadata", json!({"path": path}))
        .await
        .unwrap();
    assert_eq!(loaded["metadata"]["display_name"], "Style");
    assert_eq!(loaded["metadata"]["rating"], 5);

    let scanned = rpc_call(
        server.port,
        "scan_folder",
        json!({"folder": folder.path().to_string_lossy()}),
    )
    .await
    .unwrap();
    assert_eq!(scanned["models"][path.as_str()]["name"], "style.safetensors");
    assert_eq!(
        scanned["models"][path.as_str()]["metadata"]["hash"],
        "AUTOV2: DEADBEEF00"
    );

    assert!(folder.path().join("style.metadata.json").exists());

    server.stop().await;
}

#[tokio::test]
async fn test_parse_registry_url() {
    let server = start_rpc_server(None).await.unwrap();

    let result = rpc_call(
        server.port,
        "parse_registry_url",
        json!({"url": "https://civitai.com/api/download/models/789"}),
    )
    .await
    .unwrap();
    assert_eq!(result["valid"], true);
    assert_eq!(result["collection_id"], 789);
    assert!(result["version_id"].is_null());

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_params_error() {
    let server = start_rpc_server(None).await.unwrap();

    let response = rpc_call_raw(server.port, "get_hash", json!({})).await.unwrap();
    assert_eq!(response["error"]["code"], -32602);
    assert!(response.get("result").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_watch_folder_detects_new_model() {
    let (folder, artifact) = create_model_folder();
    let server = start_rpc_server(Some(("LoRA", folder.path()))).await.unwrap();
    let path = artifact.to_string_lossy().into_owned();

    let mut updates = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    while updates.is_empty() && std::time::Instant::now() < deadline {
        let polled = rpc_call(server.port, "poll_updates", json!({}))
            .await
            .unwrap();
        updates = polled["updates"].as_array().cloned().unwrap_or_default();
        if updates.is_empty() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["path"], json!(path));
    assert_eq!(updates[0]["record"]["artifact_kind"], "LoRA");
    assert_eq!(updates[0]["record"]["source"], "auto-detected");

    let status = rpc_call(server.port, "get_sync_status", json!({}))
        .await
        .unwrap();
    assert_eq!(status["status"]["watching"], true);
    assert_eq!(status["status"]["processed"], 1);

    server.stop().await;
}
