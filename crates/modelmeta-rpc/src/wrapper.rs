//! Response wrapping for frontend compatibility.
//!
//! The frontend expects every result in the form
//! `{success: bool, ...data, error?: string}`. Dispatch returns raw data;
//! this module wraps it per method.

use serde_json::{json, Value};

fn or_default(result: Value, default: Value) -> Value {
    if result.is_null() {
        default
    } else {
        result
    }
}

/// Wrap a raw dispatch result for `method`.
pub fn wrap_response(method: &str, result: Value) -> Value {
    match method {
        // Record wrappers (null means "no record yet")
        "load_metadata" | "save_metadata" | "set_hash" => {
            json!({
                "success": true,
                "metadata": result
            })
        }

        // Dict wrappers
        "scan_folder" => {
            json!({
                "success": true,
                "models": or_default(result, json!({}))
            })
        }

        "hash_folder" => {
            json!({
                "success": true,
                "hashes": or_default(result, json!({}))
            })
        }

        "classify_hash" => {
            json!({
                "success": true,
                "classification": result
            })
        }

        "parse_generation_params" => {
            json!({
                "success": true,
                "params": or_default(result, json!({}))
            })
        }

        "get_sync_status" => {
            json!({
                "success": true,
                "status": or_default(result, json!({}))
            })
        }

        // List wrappers
        "poll_updates" => {
            json!({
                "success": true,
                "updates": or_default(result, json!([]))
            })
        }

        // Scalar wrappers
        "get_hash" | "compute_hash" => {
            json!({
                "success": true,
                "hash": result
            })
        }

        "export_metadata" | "import_metadata" => {
            json!({
                "success": true,
                "count": result.as_u64().unwrap_or(0)
            })
        }

        // Bool methods
        "delete_metadata" | "clear_cache" | "manual_fetch" => {
            json!({
                "success": result.as_bool().unwrap_or(false)
            })
        }

        // Structured response methods (handler returns {success, ...} directly)
        "parse_registry_url" | "fetch_registry_entry" => result,

        // Default: return as-is (for methods not explicitly handled)
        _ => result,
    }
}
