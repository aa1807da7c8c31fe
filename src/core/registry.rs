//! Process-wide memoization of built encodings.
//!
//! Building a tokenizer from real artifacts parses a ~160k-entry rank
//! table and compiles the pre-tokenization pattern, so callers that need
//! the same encoding repeatedly (servers, batch jobs) share one immutable
//! instance through this registry. Entries are written once per key and
//! never evicted; construction errors are returned to the caller and not
//! cached.

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::tokenizer::{SpecialTokenMatching, Tokenizer, TokenizerError};

/// Identity of a built encoding: everything that influences its tables
/// and behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodingKey {
    pub repo: String,
    pub revision: String,
    pub pattern: String,
    pub matching: SpecialTokenMatching,
}

static ENCODINGS: Lazy<Mutex<FxHashMap<EncodingKey, Arc<Tokenizer>>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

/// Return the cached encoding for `key`, building and caching it on a miss.
///
/// Concurrent misses on the same key may both run `build`; the first
/// insert wins and both callers get the same shared instance.
pub fn get_or_build<F>(key: &EncodingKey, build: F) -> Result<Arc<Tokenizer>, TokenizerError>
where
    F: FnOnce() -> Result<Tokenizer, TokenizerError>,
{
    if let Ok(encodings) = ENCODINGS.lock() {
        if let Some(encoding) = encodings.get(key) {
            return Ok(Arc::clone(encoding));
        }
    }

    let built = Arc::new(build()?);

    match ENCODINGS.lock() {
        Ok(mut encodings) => Ok(Arc::clone(
            encodings.entry(key.clone()).or_insert(built),
        )),
        // A poisoned registry only costs sharing, not correctness.
        Err(_) => Ok(built),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(tag: &str) -> EncodingKey {
        EncodingKey {
            repo: format!("test/{tag}"),
            revision: "rev".to_string(),
            pattern: r".+".to_string(),
            matching: SpecialTokenMatching::Parity,
        }
    }

    fn build_tiny() -> Result<Tokenizer, TokenizerError> {
        let mut encoder = FxHashMap::default();
        encoder.insert(b"a".to_vec(), 0);
        Tokenizer::new(encoder, FxHashMap::default(), r".+")
    }

    #[test]
    fn test_hit_returns_shared_instance() {
        let key = test_key("shared");
        let first = get_or_build(&key, build_tiny).unwrap();
        let mut built_again = false;
        let second = get_or_build(&key, || {
            built_again = true;
            build_tiny()
        })
        .unwrap();

        assert!(!built_again);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let key = test_key("errors");
        let err = get_or_build(&key, || {
            Tokenizer::new(FxHashMap::default(), FxHashMap::default(), "")
        });
        assert!(err.is_err());

        // The failed build left no entry behind.
        let ok = get_or_build(&key, build_tiny).unwrap();
        assert_eq!(ok.encoder().len(), 1);
    }

    #[test]
    fn test_distinct_keys_distinct_instances() {
        let a = get_or_build(&test_key("a"), build_tiny).unwrap();
        let b = get_or_build(&test_key("b"), build_tiny).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
