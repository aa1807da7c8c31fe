//! Kimi-K2 tokenizer wiring.
//!
//! Kimi ships its tokenizer as two HuggingFace artifacts: `tiktoken.model`
//! (the rank table) and `tokenizer_config.json` (names for the reserved
//! special-token band). This module knows the repo layout and assembles a
//! [`Tokenizer`] from those artifacts, either from local paths or straight
//! from the hub with disk + in-process caching.

use std::path::Path;
use std::sync::Arc;

use super::hub;
use super::pattern::kimi_pattern;
use super::registry::{self, EncodingKey};
use super::tokenizer::{SpecialTokenMatching, Tokenizer, TokenizerError};
use super::vocab::{build_special_tokens, load_tiktoken_model_file, load_tokenizer_config};

/// Default HuggingFace repository for the Kimi-K2 tokenizer.
pub const KIMI_REPO_ID: &str = "moonshotai/Kimi-K2-Thinking";

/// Pinned revision of [`KIMI_REPO_ID`] these defaults were verified against.
pub const KIMI_REVISION: &str = "612681931a8c906ddb349f8ad0f582cb552189cd";

/// Rank table artifact filename.
pub const MODEL_FILENAME: &str = "tiktoken.model";

/// Tokenizer config artifact filename.
pub const CONFIG_FILENAME: &str = "tokenizer_config.json";

/// Size of the reserved special-token id band above the base vocabulary.
pub const NUM_RESERVED_SPECIAL_TOKENS: u32 = 256;

/// Build a Kimi tokenizer from local artifact files.
///
/// The special-token band occupies ids `[N, N + 256)` where `N` is the
/// number of entries in the rank table; names come from the config's
/// `added_tokens_decoder`, with `<|reserved_token_<id>|>` filling the gaps.
pub fn from_files(
    model_path: &Path,
    config_path: &Path,
    matching: SpecialTokenMatching,
) -> Result<Tokenizer, TokenizerError> {
    let encoder = load_tiktoken_model_file(model_path)?;
    let config = load_tokenizer_config(config_path)?;

    let base_count = encoder.len() as u32;
    let special_tokens = build_special_tokens(&config, base_count)?;

    Tokenizer::with_matching(encoder, special_tokens, &kimi_pattern(), matching)
}

/// Build (or reuse) a Kimi tokenizer from a HuggingFace repository.
///
/// Artifacts are cached on disk under `<cache_dir>/<revision>/`, and the
/// built encoding is memoized process-wide, so repeated calls with the
/// same parameters share a single immutable instance.
pub fn from_hub(
    repo: &str,
    revision: &str,
    cache_dir: &Path,
    matching: SpecialTokenMatching,
) -> Result<Arc<Tokenizer>, TokenizerError> {
    let model_path = hub::fetch(repo, revision, MODEL_FILENAME, cache_dir)?;
    let config_path = hub::fetch(repo, revision, CONFIG_FILENAME, cache_dir)?;

    let key = EncodingKey {
        repo: repo.to_string(),
        revision: revision.to_string(),
        pattern: kimi_pattern(),
        matching,
    };
    registry::get_or_build(&key, || from_files(&model_path, &config_path, matching))
}

/// Build (or reuse) the default Kimi-K2 tokenizer at the pinned revision.
pub fn from_pretrained(matching: SpecialTokenMatching) -> Result<Arc<Tokenizer>, TokenizerError> {
    from_hub(
        KIMI_REPO_ID,
        KIMI_REVISION,
        &hub::default_cache_dir(),
        matching,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::fmt::Write as _;

    /// Write a 21-entry rank table that can tokenize "hello world".
    fn write_test_model(dir: &Path) -> std::path::PathBuf {
        let tokens: Vec<(&[u8], u32)> = vec![
            (b"h", 0),
            (b"e", 1),
            (b"l", 2),
            (b"o", 3),
            (b" ", 4),
            (b"w", 5),
            (b"r", 6),
            (b"d", 7),
            (b"he", 8),
            (b"ll", 9),
            (b"lo", 10),
            (b"wo", 11),
            (b"rl", 12),
            (b"hel", 13),
            (b"llo", 14),
            (b"wor", 15),
            (b"hell", 16),
            (b"ello", 17),
            (b"worl", 18),
            (b"hello", 19),
            (b"world", 20),
        ];

        let mut content = String::new();
        for (token, rank) in tokens {
            writeln!(content, "{} {rank}", STANDARD.encode(token)).unwrap();
        }

        let path = dir.join(MODEL_FILENAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn write_test_config(dir: &Path) -> std::path::PathBuf {
        let config = serde_json::json!({
            "added_tokens_decoder": {
                "21": { "content": "[BOS]", "special": true },
                "22": { "content": "[EOS]", "special": true },
            }
        });
        let path = dir.join(CONFIG_FILENAME);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_from_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_test_model(dir.path());
        let config = write_test_config(dir.path());

        let tokenizer = from_files(&model, &config, SpecialTokenMatching::Parity).unwrap();

        let tokens = tokenizer.encode("hello world").unwrap();
        assert!(!tokens.is_empty());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "hello world");
    }

    #[test]
    fn test_from_files_special_band() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_test_model(dir.path());
        let config = write_test_config(dir.path());

        let tokenizer = from_files(&model, &config, SpecialTokenMatching::Parity).unwrap();
        let specials = tokenizer.special_tokens();

        // 21 base ranks, then the named and reserved band.
        assert_eq!(specials.len(), 256);
        assert_eq!(specials.get("[BOS]"), Some(&21));
        assert_eq!(specials.get("[EOS]"), Some(&22));
        assert_eq!(specials.get("<|reserved_token_23|>"), Some(&23));
        assert_eq!(specials.get("<|reserved_token_276|>"), Some(&276));
    }

    #[test]
    fn test_from_files_encodes_specials() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_test_model(dir.path());
        let config = write_test_config(dir.path());

        let tokenizer = from_files(&model, &config, SpecialTokenMatching::Parity).unwrap();

        let tokens = tokenizer.encode("[BOS]hello").unwrap();
        assert_eq!(tokens, vec![21, 19]);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "[BOS]hello");
    }

    #[test]
    fn test_from_hub_with_prefilled_cache() {
        // Prefill the disk cache so no network traffic happens.
        let dir = tempfile::tempdir().unwrap();
        let revision = "deadbeef";
        let rev_dir = dir.path().join(revision);
        std::fs::create_dir_all(&rev_dir).unwrap();
        write_test_model(&rev_dir);
        write_test_config(&rev_dir);

        let first = from_hub(
            "test/fixture-repo",
            revision,
            dir.path(),
            SpecialTokenMatching::Longest,
        )
        .unwrap();
        let second = from_hub(
            "test/fixture-repo",
            revision,
            dir.path(),
            SpecialTokenMatching::Longest,
        )
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            first.decode(&first.encode("hello world").unwrap()).unwrap(),
            "hello world"
        );
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_test_config(dir.path());
        let result = from_files(
            &dir.path().join("missing.model"),
            &config,
            SpecialTokenMatching::Parity,
        );
        assert!(result.is_err());
    }
}
