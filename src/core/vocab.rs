//! Artifact loading for tiktoken-format vocabularies.
//!
//! Two artifacts describe a Kimi-style tokenizer:
//!
//! - `tiktoken.model`: one record per line, `BASE64 WS+ DECIMAL`, where the
//!   base64 field is the raw token byte string and the decimal field its
//!   merge rank. Lower ranks merge first; the rank doubles as the token id.
//! - `tokenizer_config.json`: the HuggingFace-style config whose
//!   `added_tokens_decoder` object names the special tokens sitting in the
//!   reserved id band above the base vocabulary.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading tokenizer artifacts.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("model file {path} contains no entries")]
    EmptyModel { path: String },
    #[error("invalid model file {path}: {reason}")]
    InvalidModel { path: String, reason: String },
    #[error("invalid JSON in {path}: {reason}")]
    InvalidJson { path: String, reason: String },
    #[error("invalid special tokens: {reason}")]
    InvalidSpecialTokens { reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a `tiktoken.model` vocabulary from raw bytes.
///
/// Lines are whitespace-trimmed; lines that do not split into exactly two
/// whitespace-separated fields are skipped. A duplicated byte string keeps
/// its last rank. `origin` is only used in error messages.
pub fn load_tiktoken_model(
    data: &[u8],
    origin: &str,
) -> Result<FxHashMap<Vec<u8>, u32>, VocabError> {
    let text = std::str::from_utf8(data).map_err(|e| VocabError::InvalidModel {
        path: origin.to_string(),
        reason: format!("not valid UTF-8: {e}"),
    })?;

    let mut encoder = FxHashMap::default();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(token_b64), Some(rank_str), None) =
            (fields.next(), fields.next(), fields.next())
        else {
            debug!(line = lineno + 1, "skipping malformed vocabulary line");
            continue;
        };

        let token = STANDARD
            .decode(token_b64)
            .map_err(|e| VocabError::InvalidModel {
                path: origin.to_string(),
                reason: format!("line {}: invalid base64: {e}", lineno + 1),
            })?;
        let rank: u32 = rank_str.parse().map_err(|e| VocabError::InvalidModel {
            path: origin.to_string(),
            reason: format!("line {}: invalid rank {rank_str:?}: {e}", lineno + 1),
        })?;

        encoder.insert(token, rank);
    }

    if encoder.is_empty() {
        return Err(VocabError::EmptyModel {
            path: origin.to_string(),
        });
    }
    Ok(encoder)
}

/// Parse a `tiktoken.model` vocabulary from a file path.
pub fn load_tiktoken_model_file(path: &Path) -> Result<FxHashMap<Vec<u8>, u32>, VocabError> {
    let data = std::fs::read(path)?;
    load_tiktoken_model(&data, &path.display().to_string())
}

/// Read and parse a `tokenizer_config.json` file.
pub fn load_tokenizer_config(path: &Path) -> Result<Value, VocabError> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| VocabError::InvalidJson {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Build the special-token table for the reserved id band
/// `[base_count, base_count + 256)`.
///
/// Names come from `added_tokens_decoder[id].content` where present; every
/// other id in the band falls back to `<|reserved_token_<id>|>`. Keys of
/// `added_tokens_decoder` must be stringified integers.
pub fn build_special_tokens(
    config: &Value,
    base_count: u32,
) -> Result<FxHashMap<String, u32>, VocabError> {
    let mut named: FxHashMap<u32, &str> = FxHashMap::default();

    if let Some(added) = config.get("added_tokens_decoder") {
        let added = added
            .as_object()
            .ok_or_else(|| VocabError::InvalidSpecialTokens {
                reason: "added_tokens_decoder is not an object".to_string(),
            })?;
        for (key, attrs) in added {
            let id: u32 = key.parse().map_err(|_| VocabError::InvalidSpecialTokens {
                reason: format!("non-numeric token id key {key:?}"),
            })?;
            if let Some(content) = attrs.get("content").and_then(Value::as_str) {
                named.insert(id, content);
            }
        }
    }

    let mut special_tokens = FxHashMap::default();
    for id in base_count..base_count + super::kimi::NUM_RESERVED_SPECIAL_TOKENS {
        let token = match named.get(&id) {
            Some(content) => (*content).to_string(),
            None => format!("<|reserved_token_{id}|>"),
        };
        special_tokens.insert(token, id);
    }
    Ok(special_tokens)
}

/// Build a decoder map (token id -> bytes) from an encoder map.
pub fn build_decoder(encoder: &FxHashMap<Vec<u8>, u32>) -> FxHashMap<u32, Vec<u8>> {
    encoder.iter().map(|(k, v)| (*v, k.clone())).collect()
}
