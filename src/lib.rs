//! kimitok - TikToken-compatible BPE tokenizer for Kimi-K2 artifacts
//!
//! A byte-level BPE tokenizer in the TikToken family:
//! - Kimi's Unicode-aware pre-tokenization pattern, with its `&&`
//!   character-class intersections translated for engines without them
//! - Rank-priority byte-pair merging with exact reference tie-breaking
//! - Aho-Corasick special token matching with two disciplines
//!   (reference-compatible and longest-match)
//! - `tiktoken.model` / `tokenizer_config.json` artifact loading, with
//!   HuggingFace download, disk caching, and process-wide encoding reuse
//! - Rayon parallelism for batch encoding
//! - UTF-8 streaming decoder for LLM output

pub mod core;

pub use crate::core::{
    byte_pair_encode, kimi_pattern, translate_intersections, EncodingKey, HubError,
    SpecialTokenMatching, StreamingDecoder, Tokenizer, TokenizerError, UnencodablePiece,
    VocabError, KIMI_PAT_STR,
};
