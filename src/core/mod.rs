//! Core tokenization engine for kimitok.
//!
//! This module contains the TikToken-compatible BPE tokenizer with:
//! - Byte-pair encoding over a rank table (lowest rank merges first,
//!   leftmost pair on ties)
//! - Kimi's pre-tokenization pattern, with its character-class
//!   intersections translated for engines that lack them
//! - Vocabulary loading from the tiktoken format plus the HuggingFace
//!   `tokenizer_config.json` special-token band
//! - UTF-8 safe streaming decoder for LLM output
//!
//! # Architecture
//!
//! - [`Tokenizer`]: main tokenizer struct with encoding/decoding API, LRU
//!   chunk cache, and Aho-Corasick special token matching
//! - [`bpe`]: low-level byte-pair encoding algorithm
//! - [`pattern`]: Kimi pattern source and the intersection translator
//! - [`vocab`]: artifact parsing for `tiktoken.model` and
//!   `tokenizer_config.json`
//! - [`hub`]: HuggingFace artifact download with a local disk cache
//! - [`registry`]: process-wide sharing of built encodings
//! - [`kimi`]: Kimi-K2 constants and constructors
//! - [`StreamingDecoder`]: UTF-8 safe streaming decoder for
//!   token-by-token LLM output
//!
//! # Performance
//!
//! - fancy-regex by default, optional PCRE2 backend with JIT
//! - Rayon parallelism for batch operations
//! - FxHashMap for all table lookups
//! - Aho-Corasick for O(N) multi-pattern special token matching
//! - LRU cache to avoid redundant BPE computation for repeated chunks

mod bpe;
pub mod hub;
pub mod kimi;
pub mod pattern;
pub mod registry;
mod streaming;
mod tokenizer;
mod vocab;

pub use bpe::{byte_pair_encode, UnencodablePiece};
pub use hub::HubError;
pub use pattern::{kimi_pattern, translate_intersections, KIMI_PAT_STR};
pub use registry::EncodingKey;
pub use streaming::StreamingDecoder;
pub use tokenizer::{SpecialTokenMatching, Tokenizer, TokenizerError};
pub use vocab::{
    build_decoder, build_special_tokens, load_tiktoken_model, load_tiktoken_model_file,
    load_tokenizer_config, VocabError,
};
