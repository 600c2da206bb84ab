//! Parsing of the generation-parameter text embedded in registry preview images.
//!
//! ```text
//! (masterpiece), <lora:Avarice:0.8>
//! Negative prompt: worst quality, low quality
//! Steps: 24, Sampler: DPM2 a, CFG scale: 3.5, Lora hashes: "Avarice: 77fa6414d4fe, Kerfus: 23fbc4a6fcd6"
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

const NEGATIVE_MARKER: &str = "Negative prompt:";

/// Prompt, negative prompt and `key: value` settings from a parameter string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Setting names lowercased; values trimmed, surrounding quotes removed.
    pub settings: BTreeMap<String, String>,
}

/// Split a generation-parameter string into its parts.
///
/// Settings are only read after a negative prompt. The negative prompt runs
/// to the end of its line when the settings sit on the next line, otherwise
/// to the first comma.
pub fn parse_generation_params(text: &str) -> GenerationParams {
    let mut params = GenerationParams::default();

    let Some((prompt, rest)) = text.split_once(NEGATIVE_MARKER) else {
        params.prompt = text.trim().to_string();
        return params;
    };
    params.prompt = prompt.trim().to_string();

    let rest = rest.trim_start();
    let (negative, settings) = match rest.split_once('\n') {
        Some((negative, settings)) => (negative, Some(settings)),
        None => match rest.split_once(',') {
            Some((negative, settings)) => (negative, Some(settings)),
            None => (rest, None),
        },
    };
    params.negative_prompt = Some(negative.trim().to_string());

    if let Some(settings) = settings {
        for part in split_unquoted_commas(settings) {
            if let Some((key, value)) = part.split_once(':') {
                let key = key.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                let value = value.trim().trim_matches('"').to_string();
                params.settings.insert(key, value);
            }
        }
    }

    params
}

fn split_unquoted_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' | '\n' if !in_quotes => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
