//! JSON-RPC request handlers.

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use modelmeta_core::fingerprint::compute_async;
use modelmeta_core::{
    classify_hash, hash_tree, parse_generation_params, parse_registry_url, ArtifactRecord,
    HashAlgo, ModelMetaError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, error, warn};

/// Updates returned by one `poll_updates` call when `max` is not given.
const DEFAULT_POLL_BATCH: usize = 100;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let response = process_request(&state, request).await;
    (StatusCode::OK, Json(response))
}

/// Run one request through dispatch and wrapping.
pub async fn process_request(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    // Handle built-in methods
    if method == "health_check" {
        return JsonRpcResponse::success(id, json!({"status": "ok"}));
    }

    match dispatch_method(state, method, &params).await {
        Ok(value) => JsonRpcResponse::success(id, wrap_response(method, value)),
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            JsonRpcResponse::error(id, e.to_rpc_error_code(), e.to_string())
        }
    }
}

// ============================================================================
// Helper macros for extracting parameters
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
macro_rules! get_str_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        $params
            .get($snake)
            .or_else(|| $params.get($camel))
            .and_then(|v| v.as_str())
    };
}

/// Extract a required string parameter or return an error.
macro_rules! require_str_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        match get_str_param!($params, $snake, $camel) {
            Some(s) => s.to_string(),
            None => {
                return Err(ModelMetaError::InvalidParams {
                    message: format!("Missing required parameter: {}", $snake),
                });
            }
        }
    };
}

/// Extract an optional bool parameter, supporting both snake_case and camelCase.
macro_rules! get_bool_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        $params
            .get($snake)
            .or_else(|| $params.get($camel))
            .and_then(|v| v.as_bool())
    };
}

/// Extract an optional u64 parameter.
macro_rules! get_u64_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        $params
            .get($snake)
            .or_else(|| $params.get($camel))
            .and_then(|v| v.as_u64())
    };
}

/// Parse an optional `algo` parameter, defaulting to the partial hash.
fn algo_param(params: &Value) -> modelmeta_core::Result<HashAlgo> {
    match get_str_param!(params, "algo", "algo") {
        None => Ok(HashAlgo::PartialContent),
        Some(raw) => HashAlgo::from_str(raw).ok_or_else(|| ModelMetaError::InvalidParams {
            message: format!("Unknown hash algorithm: {}", raw),
        }),
    }
}

/// Run blocking store work off the async workers.
async fn run_blocking<T, F>(f: F) -> modelmeta_core::Result<T>
where
    F: FnOnce() -> modelmeta_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ModelMetaError::Other(format!("Background task failed: {}", e)))?
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate handler.
pub async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> modelmeta_core::Result<Value> {
    match method {
        // ====================================================================
        // Metadata store
        // ====================================================================
        "load_metadata" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            let use_cache = get_bool_param!(params, "use_cache", "useCache").unwrap_or(true);
            let record = state.store.load(&path, use_cache)?;
            Ok(serde_json::to_value(record)?)
        }

        "save_metadata" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            let raw = params
                .get("metadata")
                .filter(|v| v.is_object())
                .cloned()
                .ok_or_else(|| ModelMetaError::InvalidParams {
                    message: "Missing required parameter: metadata".to_string(),
                })?;
            let record: ArtifactRecord =
                serde_json::from_value(raw).map_err(|e| ModelMetaError::InvalidParams {
                    message: format!("Invalid metadata: {}", e),
                })?;
            let saved = state.store.save(&path, record)?;
            Ok(serde_json::to_value(saved)?)
        }

        "delete_metadata" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            state.store.delete(&path)?;
            Ok(json!(true))
        }

        "scan_folder" => {
            let folder = PathBuf::from(require_str_param!(params, "folder", "folder"));
            let store = Arc::clone(&state.store);
            let models = run_blocking(move || Ok(store.scan_folder(&folder))).await?;
            let by_path: BTreeMap<String, _> = models
                .into_iter()
                .map(|model| (model.path.clone(), model))
                .collect();
            Ok(serde_json::to_value(by_path)?)
        }

        "export_metadata" => {
            let folder = PathBuf::from(require_str_param!(params, "folder", "folder"));
            let archive = PathBuf::from(require_str_param!(params, "archive_path", "archivePath"));
            let store = Arc::clone(&state.store);
            let count = run_blocking(move || store.export_folder(&folder, &archive)).await?;
            Ok(json!(count))
        }

        "import_metadata" => {
            let archive = PathBuf::from(require_str_param!(params, "archive_path", "archivePath"));
            let target = get_str_param!(params, "target_folder", "targetFolder").map(PathBuf::from);
            let store = Arc::clone(&state.store);
            let count =
                run_blocking(move || store.import_archive(&archive, target.as_deref())).await?;
            Ok(json!(count))
        }

        "clear_cache" => {
            state.store.clear_cache();
            Ok(json!(true))
        }

        // ====================================================================
        // Hashes
        // ====================================================================
        "get_hash" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            Ok(json!(state.store.get_hash(&path)?))
        }

        "set_hash" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            let hash = require_str_param!(params, "hash", "hash");
            let algo = algo_param(params)?;
            let record = state.store.set_hash(&path, &hash, algo)?;
            Ok(serde_json::to_value(record)?)
        }

        "compute_hash" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            let algo = algo_param(params)?;
            let hex = compute_async(path, algo).await?;
            Ok(json!(algo.canonical(&hex)))
        }

        "classify_hash" => {
            let hash = require_str_param!(params, "hash", "hash");
            Ok(serde_json::to_value(classify_hash(&hash))?)
        }

        "hash_folder" => {
            let folder = PathBuf::from(require_str_param!(params, "folder", "folder"));
            let force = get_bool_param!(params, "force", "force").unwrap_or(false);
            let store = Arc::clone(&state.store);
            let hashes = run_blocking(move || Ok(hash_tree(&store, &folder, force))).await?;
            Ok(serde_json::to_value(hashes)?)
        }

        // ====================================================================
        // Registry
        // ====================================================================
        "parse_registry_url" => {
            let url = require_str_param!(params, "url", "url");
            Ok(match parse_registry_url(&url) {
                Some(reference) => json!({
                    "success": true,
                    "valid": true,
                    "collection_id": reference.collection_id,
                    "version_id": reference.version_id
                }),
                None => json!({
                    "success": true,
                    "valid": false
                }),
            })
        }

        "fetch_registry_entry" => {
            let (collection_id, version_id) = match get_str_param!(params, "url", "url") {
                Some(url) => match parse_registry_url(url) {
                    Some(reference) => (reference.collection_id, reference.version_id),
                    None => {
                        let err = ModelMetaError::InvalidUrl {
                            url: url.to_string(),
                        };
                        return Ok(json!({
                            "success": false,
                            "error": err.to_string()
                        }));
                    }
                },
                None => {
                    let collection_id = get_u64_param!(params, "collection_id", "collectionId")
                        .ok_or_else(|| ModelMetaError::InvalidParams {
                            message: "Missing required parameter: url or collection_id".to_string(),
                        })?;
                    (
                        collection_id,
                        get_u64_param!(params, "version_id", "versionId"),
                    )
                }
            };

            match state
                .synchronizer
                .catalog()
                .lookup_entry(collection_id, version_id)
                .await
            {
                Ok(entry) => Ok(json!({
                    "success": true,
                    "entry": entry
                })),
                Err(e) => Ok(json!({
                    "success": false,
                    "error": e.to_string()
                })),
            }
        }

        "manual_fetch" => {
            let path = PathBuf::from(require_str_param!(params, "path", "path"));
            let url = require_str_param!(params, "url", "url");
            let wait = get_bool_param!(params, "wait", "wait").unwrap_or(true);

            let handle = state.synchronizer.spawn_manual_fetch(path, url);
            if !wait {
                // Completion is reported through poll_updates
                return Ok(json!(true));
            }
            let ok = handle
                .await
                .map_err(|e| ModelMetaError::Other(format!("Fetch task failed: {}", e)))?;
            Ok(json!(ok))
        }

        "parse_generation_params" => {
            let text = require_str_param!(params, "text", "text");
            Ok(serde_json::to_value(parse_generation_params(&text))?)
        }

        // ====================================================================
        // Synchronizer
        // ====================================================================
        "poll_updates" => {
            let max = get_u64_param!(params, "max", "max")
                .map(|m| m as usize)
                .unwrap_or(DEFAULT_POLL_BATCH);
            let mut receiver = state.updates.lock().await;
            let mut updates = Vec::new();
            while updates.len() < max {
                match receiver.try_recv() {
                    Ok(update) => updates.push(update),
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!("Dropped {} unpolled record updates", missed);
                    }
                    Err(_) => break,
                }
            }
            Ok(serde_json::to_value(updates)?)
        }

        "get_sync_status" => {
            let mut status = serde_json::to_value(state.synchronizer.status())?;
            if let Some(object) = status.as_object_mut() {
                object.insert(
                    "watch_folders".to_string(),
                    serde_json::to_value(&state.watch_folders)?,
                );
                object.insert(
                    "interval_secs".to_string(),
                    json!(state.watch_interval.as_secs()),
                );
                object.insert(
                    "registry_authenticated".to_string(),
                    json!(state.synchronizer.catalog().has_token()),
                );
                object.insert("cached_records".to_string(), json!(state.store.cached_count()));
            }
            Ok(status)
        }

        // ====================================================================
        // Unknown
        // ====================================================================
        _ => {
            warn!("Method not found: {}", method);
            Err(ModelMetaError::Other(format!("Method not found: {}", method)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmeta_core::{
        CatalogClient, CatalogClientConfig, MetadataStore, RecordUpdate, Synchronizer,
        WatchFolder,
    };
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tempfile::TempDir;

    fn test_state(folders: Vec<WatchFolder>) -> AppState {
        let (tx, rx) = modelmeta_core::update_channel();
        state_with_channel(folders, tx, rx)
    }

    fn state_with_channel(
        folders: Vec<WatchFolder>,
        tx: broadcast::Sender<RecordUpdate>,
        rx: broadcast::Receiver<RecordUpdate>,
    ) -> AppState {
        let catalog = CatalogClient::new(
            CatalogClientConfig::new().with_api_base("http://127.0.0.1:9/api/v1"),
        )
        .unwrap();
        let sync = Synchronizer::new(Arc::new(MetadataStore::new()), Arc::new(catalog))
            .with_observer(tx);
        AppState::new(Arc::new(sync), rx, folders, Duration::from_secs(60))
    }

    fn artifact(dir: &TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, b"weights").unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn call(state: &AppState, method: &str, params: Value) -> JsonRpcResponse {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: Some(params),
            id: Some(json!(1)),
        };
        process_request(state, request).await
    }

    async fn result(state: &AppState, method: &str, params: Value) -> Value {
        let response = call(state, method, params).await;
        assert!(response.error.is_none(), "{:?}", response.error);
        response.result.unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = test_state(Vec::new());
        let value = result(&state, "health_check", json!({})).await;
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_method_is_error() {
        let state = test_state(Vec::new());
        let response = call(&state, "no_such_method", json!({})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("no_such_method"));
    }

    #[tokio::test]
    async fn test_missing_param_is_invalid_params() {
        let state = test_state(Vec::new());
        let response = call(&state, "load_metadata", json!({})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("path"));
    }

    #[tokio::test]
    async fn test_save_load_delete_cycle() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.safetensors");
        let state = test_state(Vec::new());

        let saved = result(
            &state,
            "save_metadata",
            json!({"path": path, "metadata": {"hash": "AUTOV2:abc", "custom": [1]}}),
        )
        .await;
        assert_eq!(saved["success"], true);
        assert_eq!(saved["metadata"]["hash"], "AUTOV2: ABC");

        let loaded = result(&state, "load_metadata", json!({"path": path, "useCache": false})).await;
        assert_eq!(loaded["metadata"]["custom"], json!([1]));

        let deleted = result(&state, "delete_metadata", json!({"path": path})).await;
        assert_eq!(deleted["success"], true);

        let missing = result(&state, "load_metadata", json!({"path": path})).await;
        assert!(missing["metadata"].is_null());
    }

    #[tokio::test]
    async fn test_save_rejects_bad_metadata() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.safetensors");
        let state = test_state(Vec::new());

        let response = call(
            &state,
            "save_metadata",
            json!({"path": path, "metadata": {"hash_algo": "MD5"}}),
        )
        .await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_hash_methods() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.ckpt");
        let state = test_state(Vec::new());

        let computed = result(&state, "compute_hash", json!({"path": path})).await;
        let canonical = computed["hash"].as_str().unwrap().to_string();
        assert!(canonical.starts_with("AUTOV2: "));

        let hex = canonical.trim_start_matches("AUTOV2: ");
        result(&state, "set_hash", json!({"path": path, "hash": hex})).await;
        let fetched = result(&state, "get_hash", json!({"path": path})).await;
        assert_eq!(fetched["hash"], json!(canonical));

        let classified = result(&state, "classify_hash", json!({"hash": canonical})).await;
        assert_eq!(classified["classification"]["format"], "autov2");

        let response = call(&state, "set_hash", json!({"path": path, "hash": "x", "algo": "md5"})).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_scan_and_hash_folder() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.safetensors");
        let folder = temp.path().to_string_lossy().into_owned();
        let state = test_state(Vec::new());

        let hashed = result(&state, "hash_folder", json!({"folder": folder})).await;
        assert!(hashed["hashes"][&path].as_str().unwrap().starts_with("AUTOV2: "));

        let scanned = result(&state, "scan_folder", json!({"folder": folder})).await;
        assert_eq!(scanned["models"][&path]["name"], "a.safetensors");
        assert_eq!(scanned["models"][&path]["size"], 7);
    }

    #[tokio::test]
    async fn test_export_import() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.safetensors");
        let folder = temp.path().to_string_lossy().into_owned();
        let archive = temp.path().join("archive.json").to_string_lossy().into_owned();
        let state = test_state(Vec::new());

        result(&state, "set_hash", json!({"path": path, "hash": "ABCDEF0123"})).await;
        let exported = result(
            &state,
            "export_metadata",
            json!({"folder": folder, "archivePath": archive}),
        )
        .await;
        assert_eq!(exported["count"], 1);

        result(&state, "delete_metadata", json!({"path": path})).await;
        let imported = result(&state, "import_metadata", json!({"archive_path": archive})).await;
        assert_eq!(imported["count"], 1);

        result(&state, "clear_cache", json!({})).await;
        let fetched = result(&state, "get_hash", json!({"path": path})).await;
        assert_eq!(fetched["hash"], "AUTOV2: ABCDEF0123");
    }

    #[tokio::test]
    async fn test_parse_registry_url() {
        let state = test_state(Vec::new());
        let parsed = result(
            &state,
            "parse_registry_url",
            json!({"url": "https://civitai.com/models/123?modelVersionId=456"}),
        )
        .await;
        assert_eq!(parsed["valid"], true);
        assert_eq!(parsed["collection_id"], 123);
        assert_eq!(parsed["version_id"], 456);

        let invalid = result(&state, "parse_registry_url", json!({"url": "https://x/other"})).await;
        assert_eq!(invalid["valid"], false);
    }

    #[tokio::test]
    async fn test_registry_failures_are_reported_not_raised() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.safetensors");
        let state = test_state(Vec::new());

        let entry = result(
            &state,
            "fetch_registry_entry",
            json!({"url": "https://civitai.com/other"}),
        )
        .await;
        assert_eq!(entry["success"], false);

        let fetched = result(
            &state,
            "manual_fetch",
            json!({"path": path, "url": "https://civitai.com/models/1"}),
        )
        .await;
        assert_eq!(fetched["success"], false);
    }

    #[tokio::test]
    async fn test_generation_params() {
        let state = test_state(Vec::new());
        let parsed = result(
            &state,
            "parse_generation_params",
            json!({"text": "cat\nNegative prompt: blurry\nSteps: 20, Seed: 1"}),
        )
        .await;
        assert_eq!(parsed["params"]["prompt"], "cat");
        assert_eq!(parsed["params"]["negative_prompt"], "blurry");
        assert_eq!(parsed["params"]["settings"]["steps"], "20");
    }

    #[tokio::test]
    async fn test_poll_updates_after_watch_cycle() {
        let temp = TempDir::new().unwrap();
        let path = artifact(&temp, "a.safetensors");
        let state = test_state(vec![WatchFolder::new("LoRA", temp.path())]);

        let report = state
            .synchronizer
            .scan_once(&state.watch_folders, &modelmeta_core::CancellationToken::new())
            .await;
        assert_eq!(report.detected, 1);

        let polled = result(&state, "poll_updates", json!({})).await;
        let updates = polled["updates"].as_array().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["path"], json!(path));
        assert_eq!(updates[0]["origin"], "watch");

        let empty = result(&state, "poll_updates", json!({})).await;
        assert_eq!(empty["updates"], json!([]));

        let status = result(&state, "get_sync_status", json!({})).await;
        assert_eq!(status["status"]["cycles_completed"], 1);
        assert_eq!(status["status"]["processed"], 1);
        assert_eq!(status["status"]["watch_folders"][0]["kind"], "LoRA");
    }

    #[tokio::test]
    async fn test_poll_updates_skips_dropped_updates() {
        let temp = TempDir::new().unwrap();
        for name in ["a.safetensors", "b.safetensors", "c.safetensors"] {
            artifact(&temp, name);
        }
        let (tx, rx) = broadcast::channel(2);
        let state = state_with_channel(vec![WatchFolder::new("LoRA", temp.path())], tx, rx);

        let report = state
            .synchronizer
            .scan_once(&state.watch_folders, &modelmeta_core::CancellationToken::new())
            .await;
        assert_eq!(report.detected, 3);

        let polled = result(&state, "poll_updates", json!({})).await;
        assert_eq!(polled["updates"].as_array().unwrap().len(), 2);
    }
}
