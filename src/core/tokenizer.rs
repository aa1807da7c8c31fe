use aho_corasick::{AhoCorasick, MatchKind};
use fancy_regex::Regex as FancyRegex;
use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use thiserror::Error;

#[cfg(feature = "pcre2")]
use pcre2::bytes::Regex as Pcre2Regex;

use super::bpe::byte_pair_encode;
use super::hub::HubError;
use super::vocab::{build_decoder, load_tiktoken_model, load_tiktoken_model_file, VocabError};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("regex execution error: {0}")]
    Regex(#[from] Box<fancy_regex::Error>),
    #[cfg(feature = "pcre2")]
    #[error("regex error (PCRE2): {0}")]
    Pcre2(#[from] pcre2::Error),
    #[error("token id {0} appears in both the rank table and the special tokens")]
    OverlappingIds(u32),
    #[error("vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("artifact fetch error: {0}")]
    Hub(#[from] HubError),
    #[error("decoded bytes are not valid UTF-8")]
    Utf8Error,
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
    #[error("unknown token id {0}")]
    UnknownId(u32),
    #[error("input bytes at offset {offset} cannot be encoded: {bytes:?}")]
    UnencodableBytes { offset: usize, bytes: Vec<u8> },
    #[error("PCRE2 feature not enabled. Compile with --features pcre2")]
    Pcre2NotEnabled,
}

/// How special-token literals are matched inside the input text.
///
/// Both disciplines scan left to right and never overlap matches; they
/// differ only in which literal wins when several start at the same
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecialTokenMatching {
    /// Reference-compatible matching: the automaton holds the literals
    /// sorted by their UTF-8 bytes and the first one in that order wins.
    /// Which of several overlapping specials is chosen is an
    /// implementation detail; callers must not rely on it.
    #[default]
    Parity,
    /// The longest literal starting at the current position always wins.
    Longest,
}

/// Default cache size for encoded chunks
const DEFAULT_CACHE_SIZE: usize = 4096;

/// Regex backend enum for switching between fancy-regex (default) and
/// PCRE2 (optional)
#[derive(Debug)]
enum RegexBackend {
    Fancy(Box<FancyRegex>),
    #[cfg(feature = "pcre2")]
    Pcre2(Pcre2Regex),
}

impl RegexBackend {
    /// Find all non-overlapping matches in the given text, returning
    /// (start, end) byte offsets in left-to-right order.
    fn find_iter(&self, text: &str) -> Result<Vec<(usize, usize)>, TokenizerError> {
        match self {
            RegexBackend::Fancy(regex) => regex
                .find_iter(text)
                .map(|m| {
                    m.map(|m| (m.start(), m.end()))
                        .map_err(|e| TokenizerError::Regex(Box::new(e)))
                })
                .collect(),
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(regex) => regex
                .find_iter(text.as_bytes())
                .map(|m| {
                    m.map(|m| (m.start(), m.end()))
                        .map_err(TokenizerError::from)
                })
                .collect(),
        }
    }
}

fn compile_fancy(pattern: &str) -> Result<FancyRegex, TokenizerError> {
    FancyRegex::new(pattern).map_err(|e| TokenizerError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// TikToken-compatible BPE tokenizer.
///
/// A constructed tokenizer is immutable: every table is fixed at build
/// time and concurrent `encode`/`decode` calls on a shared instance need
/// no external synchronization. The only interior mutability is the
/// Mutex-guarded chunk cache.
///
/// # Encoding pipeline
///
/// `encode` first partitions the input into alternating ordinary and
/// special segments with an Aho-Corasick automaton over the special-token
/// literals (see [`SpecialTokenMatching`]), then splits each ordinary
/// segment into pieces with the pre-tokenization regex and runs
/// rank-priority BPE over each piece. Ids come out in source order, and a
/// failing call returns an error before emitting anything.
///
/// # Regex Backend
///
/// By default patterns compile with `fancy-regex` (Unicode property
/// classes plus lookarounds). With the `pcre2` feature the backend can be
/// switched at runtime:
///
/// ```ignore
/// let tokenizer = Tokenizer::new(encoder, specials, pattern)?.pcre2(true)?;
/// ```
#[derive(Debug)]
pub struct Tokenizer {
    encoder: FxHashMap<Vec<u8>, u32>,
    decoder: FxHashMap<u32, Vec<u8>>,
    special_tokens: FxHashMap<String, u32>,
    special_tokens_decoder: FxHashMap<u32, String>,
    special_token_strings: Vec<String>,
    regex: RegexBackend,
    pattern: String,
    special_matcher: Option<AhoCorasick>,
    special_matching: SpecialTokenMatching,
    chunk_cache: Mutex<LruCache<u64, Vec<u32>>>,
    cache_size: usize,
    use_pcre2: bool,
}

impl Tokenizer {
    /// Create a new tokenizer from a rank table, special tokens, and a
    /// pre-tokenization pattern, using [`SpecialTokenMatching::Parity`].
    ///
    /// # Arguments
    /// * `encoder` - Map of byte sequences to token ids (merge ranks)
    /// * `special_tokens` - Map of special token strings to token ids
    /// * `pattern` - Regex pattern for pre-tokenization
    pub fn new(
        encoder: FxHashMap<Vec<u8>, u32>,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
    ) -> Result<Self, TokenizerError> {
        Self::with_options(
            encoder,
            special_tokens,
            pattern,
            DEFAULT_CACHE_SIZE,
            SpecialTokenMatching::Parity,
        )
    }

    /// Create a new tokenizer with an explicit special-token matching
    /// discipline.
    pub fn with_matching(
        encoder: FxHashMap<Vec<u8>, u32>,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
        matching: SpecialTokenMatching,
    ) -> Result<Self, TokenizerError> {
        Self::with_options(encoder, special_tokens, pattern, DEFAULT_CACHE_SIZE, matching)
    }

    /// Create a new tokenizer with full configuration options.
    ///
    /// # Arguments
    /// * `encoder` - Map of byte sequences to token ids
    /// * `special_tokens` - Map of special token strings to token ids
    /// * `pattern` - Regex pattern for pre-tokenization
    /// * `cache_size` - Size of the LRU cache for encoded chunks
    /// * `matching` - Special-token matching discipline
    pub fn with_options(
        encoder: FxHashMap<Vec<u8>, u32>,
        special_tokens: FxHashMap<String, u32>,
        pattern: &str,
        cache_size: usize,
        matching: SpecialTokenMatching,
    ) -> Result<Self, TokenizerError> {
        if pattern.is_empty() {
            return Err(TokenizerError::InvalidPattern {
                pattern: String::new(),
                message: "pattern must not be empty".to_string(),
            });
        }
        let regex = compile_fancy(pattern)?;

        // Build decoder maps
        let decoder = build_decoder(&encoder);
        for &id in special_tokens.values() {
            if decoder.contains_key(&id) {
                return Err(TokenizerError::OverlappingIds(id));
            }
        }
        let special_tokens_decoder: FxHashMap<u32, String> = special_tokens
            .iter()
            .map(|(k, v)| (*v, k.clone()))
            .collect();

        // Build the Aho-Corasick automaton over the literals in sorted
        // byte order; together with leftmost-first semantics this fixes
        // the parity tiebreak.
        let mut special_token_strings: Vec<String> = special_tokens.keys().cloned().collect();
        special_token_strings.sort();
        let special_matcher = if special_token_strings.is_empty() {
            None
        } else {
            let kind = match matching {
                SpecialTokenMatching::Parity => MatchKind::LeftmostFirst,
                SpecialTokenMatching::Longest => MatchKind::LeftmostLongest,
            };
            Some(
                AhoCorasick::builder()
                    .match_kind(kind)
                    .build(&special_token_strings)?,
            )
        };

        // Initialize LRU cache
        let cache_size_nz = NonZeroUsize::new(cache_size.max(1)).unwrap();
        let chunk_cache = Mutex::new(LruCache::new(cache_size_nz));

        Ok(Self {
            encoder,
            decoder,
            special_tokens,
            special_tokens_decoder,
            special_token_strings,
            regex: RegexBackend::Fancy(Box::new(regex)),
            pattern: pattern.to_string(),
            special_matcher,
            special_matching: matching,
            chunk_cache,
            cache_size,
            use_pcre2: false,
        })
    }

    /// Switch to the PCRE2 regex backend (or back).
    ///
    /// Requires the `pcre2` feature to be enabled at compile time.
    #[cfg(feature = "pcre2")]
    pub fn pcre2(mut self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        self.use_pcre2 = use_pcre2;
        if use_pcre2 {
            let mut regex_builder = pcre2::bytes::RegexBuilder::new();
            regex_builder.jit_if_available(true);
            regex_builder.utf(true);
            regex_builder.ucp(true);
            let regex = regex_builder.build(&self.pattern)?;
            self.regex = RegexBackend::Pcre2(regex);
        } else {
            let regex = compile_fancy(&self.pattern)?;
            self.regex = RegexBackend::Fancy(Box::new(regex));
        }
        Ok(self)
    }

    /// Switch to the PCRE2 regex backend (stub when feature not enabled).
    #[cfg(not(feature = "pcre2"))]
    pub fn pcre2(self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        if use_pcre2 {
            Err(TokenizerError::Pcre2NotEnabled)
        } else {
            Ok(self)
        }
    }

    /// Create a tokenizer from a tiktoken vocabulary file.
    pub fn from_file(
        vocab_path: &str,
        pattern: &str,
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        let encoder = load_tiktoken_model_file(std::path::Path::new(vocab_path))?;
        Self::new(encoder, special_tokens, pattern)
    }

    /// Create a tokenizer from raw vocabulary bytes.
    pub fn from_bytes(
        vocab_data: &[u8],
        pattern: &str,
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        let encoder = load_tiktoken_model(vocab_data, "<bytes>")?;
        Self::new(encoder, special_tokens, pattern)
    }

    /// Compute a fast hash for a byte slice to use as an LRU cache key.
    #[inline]
    fn hash_slice(slice: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        slice.hash(&mut hasher);
        hasher.finish()
    }

    /// Encode a single pre-tokenizer piece with LRU caching.
    ///
    /// `offset` is the piece's byte position in the original input, used
    /// only for error reporting.
    fn encode_piece(&self, piece: &[u8], offset: usize) -> Result<Vec<u32>, TokenizerError> {
        // Fast path: the whole piece is a known token
        if let Some(&rank) = self.encoder.get(piece) {
            return Ok(vec![rank]);
        }

        // Check cache
        let hash = Self::hash_slice(piece);
        if let Ok(mut cache) = self.chunk_cache.lock() {
            if let Some(cached) = cache.get(&hash) {
                return Ok(cached.clone());
            }
        }

        // Perform BPE encoding
        let result = byte_pair_encode(piece, &self.encoder).map_err(|e| {
            TokenizerError::UnencodableBytes {
                offset: offset + e.offset,
                bytes: e.bytes,
            }
        })?;

        // Store in cache
        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.put(hash, result.clone());
        }

        Ok(result)
    }

    /// Pre-tokenize and BPE-encode one ordinary segment, appending to `out`.
    ///
    /// `base` is the segment's byte offset in the original input.
    fn encode_segment(
        &self,
        segment: &str,
        base: usize,
        out: &mut Vec<u32>,
    ) -> Result<(), TokenizerError> {
        let bytes = segment.as_bytes();
        for (start, end) in self.regex.find_iter(segment)? {
            out.extend(self.encode_piece(&bytes[start..end], base + start)?);
        }
        Ok(())
    }

    /// Encode text to token ids with special tokens recognized.
    ///
    /// Occurrences of special-token literals become their configured ids;
    /// everything between them goes through the pre-tokenizer and BPE.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let Some(ref special_matcher) = self.special_matcher else {
            return self.encode_ordinary(text);
        };

        let mut result = Vec::new();
        let mut last_end = 0;

        for m in special_matcher.find_iter(text.as_bytes()) {
            if m.start() > last_end {
                self.encode_segment(&text[last_end..m.start()], last_end, &mut result)?;
            }

            let token_str = &self.special_token_strings[m.pattern().as_usize()];
            // Every automaton pattern came out of the special table.
            result.push(self.special_tokens[token_str]);
            last_end = m.end();
        }

        if last_end < text.len() {
            self.encode_segment(&text[last_end..], last_end, &mut result)?;
        }

        Ok(result)
    }

    /// Encode text to token ids, treating special-token literals as
    /// ordinary text.
    pub fn encode_ordinary(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let mut result = Vec::new();
        self.encode_segment(text, 0, &mut result)?;
        Ok(result)
    }

    /// Encode ordinary text using Rayon over the pre-tokenizer pieces.
    ///
    /// Only beneficial for very large texts (>1MB); special tokens are
    /// not recognized.
    pub fn encode_rayon(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let text_bytes = text.as_bytes();
        let chunks = self.regex.find_iter(text)?;

        let results: Vec<Vec<u32>> = chunks
            .par_iter()
            .map(|&(start, end)| self.encode_piece(&text_bytes[start..end], start))
            .collect::<Result<_, _>>()?;

        Ok(results.into_iter().flatten().collect())
    }

    /// Decode token ids back to bytes.
    ///
    /// Ids are resolved against the rank table first, then the special
    /// table; an id in neither fails the whole call.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);

        for &token in tokens {
            if let Some(bytes) = self.decoder.get(&token) {
                result.extend_from_slice(bytes);
            } else if let Some(special) = self.special_tokens_decoder.get(&token) {
                result.extend_from_slice(special.as_bytes());
            } else {
                return Err(TokenizerError::UnknownId(token));
            }
        }

        Ok(result)
    }

    /// Decode token ids to a string.
    pub fn decode(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        String::from_utf8(bytes).map_err(|_| TokenizerError::Utf8Error)
    }

    /// Decode token ids to a string, replacing invalid UTF-8 with the
    /// replacement character. Unknown ids still fail.
    pub fn decode_lossy(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Batch encode multiple texts in parallel (special tokens recognized).
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<u32>>, TokenizerError> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Batch encode multiple texts in parallel, treating special-token
    /// literals as ordinary text.
    pub fn encode_batch_ordinary(&self, texts: &[String]) -> Result<Vec<Vec<u32>>, TokenizerError> {
        texts
            .par_iter()
            .map(|text| self.encode_ordinary(text))
            .collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Batch decode multiple token lists in parallel, replacing invalid
    /// UTF-8.
    pub fn decode_batch_lossy(
        &self,
        token_lists: &[Vec<u32>],
    ) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode_lossy(tokens))
            .collect()
    }

    /// Get the vocabulary size (number of token ids, including specials).
    ///
    /// This returns max_token_id + 1, representing the full id range.
    pub fn vocab_size(&self) -> usize {
        let max_decoder_id = self.decoder.keys().max().copied().unwrap_or(0);
        let max_special_id = self.special_tokens.values().max().copied().unwrap_or(0);
        let max_id = max_decoder_id.max(max_special_id);

        (max_id + 1) as usize
    }

    /// Get the encoder map (token bytes -> id).
    pub fn encoder(&self) -> &FxHashMap<Vec<u8>, u32> {
        &self.encoder
    }

    /// Get the decoder map (token id -> bytes).
    pub fn decoder(&self) -> &FxHashMap<u32, Vec<u8>> {
        &self.decoder
    }

    /// Get the special tokens map.
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        &self.special_tokens
    }

    /// Get the special tokens decoder map.
    pub fn special_tokens_decoder(&self) -> &FxHashMap<u32, String> {
        &self.special_tokens_decoder
    }

    /// Get the pre-tokenization pattern source.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Get the special-token matching discipline.
    pub fn special_matching(&self) -> SpecialTokenMatching {
        self.special_matching
    }

    /// Clear the encoding cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.clear();
        }
    }

    /// Get the current cache size.
    pub fn cache_len(&self) -> usize {
        self.chunk_cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        // Recompile the active backend; the pattern compiled before, so
        // failure here would be a bug.
        let regex = match &self.regex {
            RegexBackend::Fancy(_) => {
                RegexBackend::Fancy(Box::new(FancyRegex::new(&self.pattern).unwrap()))
            }
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(_) => {
                let mut regex_builder = pcre2::bytes::RegexBuilder::new();
                regex_builder.jit_if_available(true);
                regex_builder.utf(true);
                regex_builder.ucp(true);
                RegexBackend::Pcre2(regex_builder.build(&self.pattern).unwrap())
            }
        };

        // Create a new empty cache (caches are not shared)
        let cache_size_nz = NonZeroUsize::new(self.cache_size.max(1)).unwrap();
        let chunk_cache = Mutex::new(LruCache::new(cache_size_nz));

        // Rebuild special matcher
        let special_matcher = if self.special_token_strings.is_empty() {
            None
        } else {
            let kind = match self.special_matching {
                SpecialTokenMatching::Parity => MatchKind::LeftmostFirst,
                SpecialTokenMatching::Longest => MatchKind::LeftmostLongest,
            };
            Some(
                AhoCorasick::builder()
                    .match_kind(kind)
                    .build(&self.special_token_strings)
                    .unwrap(),
            )
        };

        Self {
            encoder: self.encoder.clone(),
            decoder: self.decoder.clone(),
            special_tokens: self.special_tokens.clone(),
            special_tokens_decoder: self.special_tokens_decoder.clone(),
            special_token_strings: self.special_token_strings.clone(),
            regex,
            pattern: self.pattern.clone(),
            special_matcher,
            special_matching: self.special_matching,
            chunk_cache,
            cache_size: self.cache_size,
            use_pcre2: self.use_pcre2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::kimi_pattern;

    fn make_test_tokenizer() -> Tokenizer {
        let mut encoder = FxHashMap::default();
        for b in 32u8..=126 {
            encoder.insert(vec![b], b as u32);
        }
        encoder.insert(b"Hello".to_vec(), 200);
        encoder.insert(b"World".to_vec(), 201);
        encoder.insert(b" World".to_vec(), 202);

        let mut special_tokens = FxHashMap::default();
        special_tokens.insert("<|endoftext|>".to_string(), 50256);

        let pattern = r"\S+|\s+";
        Tokenizer::new(encoder, special_tokens, pattern).unwrap()
    }

    /// The seven-entry rank table used by the reference scenarios.
    fn reference_ranks() -> FxHashMap<Vec<u8>, u32> {
        [
            (&b"He"[..], 0u32),
            (&b"ll"[..], 1),
            (&b"llo"[..], 2),
            (&b"H"[..], 10),
            (&b"e"[..], 11),
            (&b"l"[..], 12),
            (&b"o"[..], 13),
        ]
        .iter()
        .map(|&(k, v)| (k.to_vec(), v))
        .collect()
    }

    #[test]
    fn test_encode_decode() {
        let tokenizer = make_test_tokenizer();
        let text = "Hello World";
        let tokens = tokenizer.encode(text).unwrap();
        let decoded = tokenizer.decode(&tokens).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_encode_with_special() {
        let tokenizer = make_test_tokenizer();
        let text = "Hello<|endoftext|>World";
        let tokens = tokenizer.encode(text).unwrap();
        assert!(tokens.contains(&50256));
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
    }

    #[test]
    fn test_encode_ordinary_ignores_special() {
        let tokenizer = make_test_tokenizer();
        let tokens = tokenizer.encode_ordinary("Hello<|endoftext|>World").unwrap();
        assert!(!tokens.contains(&50256));
        assert_eq!(
            tokenizer.decode(&tokens).unwrap(),
            "Hello<|endoftext|>World"
        );
    }

    #[test]
    fn test_reference_hello() {
        let tokenizer =
            Tokenizer::new(reference_ranks(), FxHashMap::default(), r".+").unwrap();
        assert_eq!(tokenizer.encode("Hello").unwrap(), vec![0, 2]);
        assert_eq!(tokenizer.decode(&[0, 2]).unwrap(), "Hello");
    }

    #[test]
    fn test_reference_empty_input() {
        let tokenizer =
            Tokenizer::new(reference_ranks(), FxHashMap::default(), r".+").unwrap();
        assert_eq!(tokenizer.encode("").unwrap(), Vec::<u32>::new());
        assert_eq!(tokenizer.decode(&[]).unwrap(), "");
    }

    #[test]
    fn test_reference_bos_special() {
        let mut specials = FxHashMap::default();
        specials.insert("<|bos|>".to_string(), 14);
        let tokenizer = Tokenizer::new(reference_ranks(), specials, r".+").unwrap();

        let tokens = tokenizer.encode("<|bos|>Hello").unwrap();
        assert_eq!(tokens, vec![14, 0, 2]);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "<|bos|>Hello");
    }

    #[test]
    fn test_reference_bos_disallowed_goes_through_bpe() {
        // The literal's own bytes must be coverable once it is ordinary
        // text, so extend the reference table with them.
        let mut ranks = reference_ranks();
        for (i, b) in [b'<', b'|', b'b', b's', b'>'].iter().enumerate() {
            ranks.insert(vec![*b], 20 + i as u32);
        }
        let mut specials = FxHashMap::default();
        specials.insert("<|bos|>".to_string(), 14);
        let tokenizer = Tokenizer::new(ranks, specials, r".+").unwrap();

        let tokens = tokenizer.encode_ordinary("<|bos|>Hello").unwrap();
        assert!(!tokens.contains(&14));
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "<|bos|>Hello");
    }

    fn overlap_tokenizer(matching: SpecialTokenMatching) -> Tokenizer {
        let mut ranks = FxHashMap::default();
        ranks.insert(b"b".to_vec(), 0);
        let mut specials = FxHashMap::default();
        specials.insert("<|a|>".to_string(), 100);
        specials.insert("<|a|>b".to_string(), 101);
        Tokenizer::with_matching(ranks, specials, r".+", matching).unwrap()
    }

    #[test]
    fn test_overlapping_specials_longest() {
        let tokenizer = overlap_tokenizer(SpecialTokenMatching::Longest);
        let tokens = tokenizer.encode("<|a|>b").unwrap();
        assert_eq!(tokens, vec![101]);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "<|a|>b");
    }

    #[test]
    fn test_overlapping_specials_parity() {
        let tokenizer = overlap_tokenizer(SpecialTokenMatching::Parity);
        let tokens = tokenizer.encode("<|a|>b").unwrap();
        // Either partition is valid under parity; this implementation
        // takes the first literal in sorted order, so the shorter wins.
        assert_eq!(tokens, vec![100, 0]);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "<|a|>b");
    }

    #[test]
    fn test_overlapping_ids_rejected() {
        let mut ranks = FxHashMap::default();
        ranks.insert(b"a".to_vec(), 7);
        let mut specials = FxHashMap::default();
        specials.insert("<|x|>".to_string(), 7);

        let err = Tokenizer::new(ranks, specials, r".+").unwrap_err();
        assert!(matches!(err, TokenizerError::OverlappingIds(7)));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = Tokenizer::new(FxHashMap::default(), FxHashMap::default(), "").unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidPattern { .. }));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let err =
            Tokenizer::new(FxHashMap::default(), FxHashMap::default(), r"(unclosed").unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_id_decode() {
        let tokenizer = make_test_tokenizer();
        let err = tokenizer.decode(&[9_999_999]).unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownId(9_999_999)));
    }

    #[test]
    fn test_unencodable_bytes_offset() {
        // Only "a" is known; the piece "ab" has no covering for 'b'.
        let mut ranks = FxHashMap::default();
        ranks.insert(b"a".to_vec(), 0);
        let tokenizer = Tokenizer::new(ranks, FxHashMap::default(), r".+").unwrap();

        let err = tokenizer.encode("ab").unwrap_err();
        match err {
            TokenizerError::UnencodableBytes { offset, bytes } => {
                assert_eq!(offset, 1);
                assert_eq!(bytes, b"b".to_vec());
            }
            other => panic!("expected UnencodableBytes, got {other:?}"),
        }
    }

    #[test]
    fn test_batch_encode() {
        let tokenizer = make_test_tokenizer();
        let texts = vec!["Hello".to_string(), "World".to_string()];
        let batch_tokens = tokenizer.encode_batch(&texts).unwrap();
        assert_eq!(batch_tokens.len(), 2);

        for (tokens, text) in batch_tokens.iter().zip(&texts) {
            assert_eq!(tokens, &tokenizer.encode(text).unwrap());
        }
    }

    #[test]
    fn test_vocab_size() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.vocab_size(), 50257);
    }

    #[test]
    fn test_cache_works() {
        let tokenizer = make_test_tokenizer();
        let text = "HelloWorld";
        let tokens1 = tokenizer.encode(text).unwrap();
        let tokens2 = tokenizer.encode(text).unwrap();
        assert_eq!(tokens1, tokens2);
        assert!(tokenizer.cache_len() > 0);
    }

    #[test]
    fn test_clear_cache() {
        let tokenizer = make_test_tokenizer();
        tokenizer.encode("HelloWorld").unwrap();
        assert!(tokenizer.cache_len() > 0);
        tokenizer.clear_cache();
        assert_eq!(tokenizer.cache_len(), 0);
    }

    #[test]
    fn test_clone_shares_nothing_mutable() {
        let tokenizer = make_test_tokenizer();
        tokenizer.encode("HelloWorld").unwrap();
        let clone = tokenizer.clone();
        assert_eq!(clone.cache_len(), 0);
        assert_eq!(
            clone.encode("Hello World").unwrap(),
            tokenizer.encode("Hello World").unwrap()
        );
    }

    #[test]
    fn test_kimi_pattern_crlf_partition() {
        let regex = RegexBackend::Fancy(Box::new(FancyRegex::new(&kimi_pattern()).unwrap()));
        let text = "line1\r\nline2\nline3\tend";
        let pieces: Vec<&str> = regex
            .find_iter(text)
            .unwrap()
            .into_iter()
            .map(|(s, e)| &text[s..e])
            .collect();
        assert_eq!(
            pieces,
            vec!["line", "1", "\r\n", "line", "2", "\n", "line", "3", "\tend"]
        );
    }

    #[test]
    fn test_kimi_pattern_trailing_space_lookahead() {
        let regex = RegexBackend::Fancy(Box::new(FancyRegex::new(&kimi_pattern()).unwrap()));
        let text = "a  b";
        let pieces: Vec<&str> = regex
            .find_iter(text)
            .unwrap()
            .into_iter()
            .map(|(s, e)| &text[s..e])
            .collect();
        // The first space stays alone (whitespace-not-followed-by-space),
        // the second glues onto the following word.
        assert_eq!(pieces, vec!["a", " ", " b"]);
    }

    #[test]
    fn test_pieces_cover_input_exactly() {
        let regex = RegexBackend::Fancy(Box::new(FancyRegex::new(&kimi_pattern()).unwrap()));
        let text = "Mix 汉字 and ASCII, plus 'll contractions\nand 123 numbers!";
        let spans = regex.find_iter(text).unwrap();

        let mut cursor = 0;
        for (start, end) in spans {
            assert_eq!(start, cursor, "gap before offset {start}");
            assert!(end > start);
            cursor = end;
        }
        assert_eq!(cursor, text.len());
    }

    #[cfg(not(feature = "pcre2"))]
    #[test]
    fn test_pcre2_not_enabled() {
        let tokenizer = make_test_tokenizer();
        assert!(tokenizer.pcre2(true).is_err());
    }

    #[cfg(feature = "pcre2")]
    #[test]
    fn test_pcre2_backend() {
        let tokenizer = make_test_tokenizer().pcre2(true).unwrap();
        let text = "Hello World";
        let tokens = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
    }
}
