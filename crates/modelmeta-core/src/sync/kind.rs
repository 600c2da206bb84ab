//! Artifact kind inference from folder layout.

use std::path::Path;

/// Exact directory names, checked against every path component.
const COMPONENT_RULES: &[(&[&str], &str)] = &[
    (&["LoRA", "lora"], "LORA"),
    (&["SD", "Checkpoint"], "UNET"),
    (&["SR", "Upscaler"], "UPSCALER"),
    (&["CN", "ControlNet"], "CONTROLNET"),
    (&["TI", "Embedding"], "TI"),
    (&["VAE"], "VAE"),
    (&["HN"], "DETAILER"),
];

/// Substrings, checked against the lowercased parent directory name.
const PARENT_RULES: &[(&[&str], &str)] = &[
    (&["lora"], "LORA"),
    (&["checkpoint", "model"], "UNET"),
    (&["upscal"], "UPSCALER"),
    (&["control"], "CONTROLNET"),
    (&["embedding", "textual"], "TI"),
    (&["vae"], "VAE"),
];

pub const UNKNOWN_KIND: &str = "UNKNOWN";

/// Infer an artifact's kind from the directories it lives in.
///
/// An exact component match anywhere in the path wins; otherwise the parent
/// directory name is searched for a hint. Falls back to `UNKNOWN`.
pub fn infer_artifact_kind(path: &Path) -> &'static str {
    let components: Vec<&str> = path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect()
        })
        .unwrap_or_default();

    for (names, kind) in COMPONENT_RULES {
        if components.iter().any(|c| names.contains(c)) {
            return *kind;
        }
    }

    let parent_name = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    for (hints, kind) in PARENT_RULES {
        if hints.iter().any(|hint| parent_name.contains(hint)) {
            return *kind;
        }
    }

    UNKNOWN_KIND
}
