//! Pre-tokenization patterns for Kimi-style tiktoken vocabularies.
//!
//! Kimi's published `pat_str` uses character-class intersections
//! (`[..&&[^\p{Han}]]`), a construct many regex engines lack. The
//! intersection only ever subtracts the Han script from a letter class, so
//! it can be rewritten as a negative lookahead guarding the class:
//! `[CLASS&&[^\p{Han}]]` becomes `(?:(?!\p{Han})CLASS)`. The rewrite
//! preserves the match set: on Han-free text both forms match the same
//! spans, and where the next codepoint is Han neither form consumes it
//! inside the letter class.

/// Kimi-K2 pre-tokenization pattern as published in `tokenization_kimi.py`,
/// including the `&&` intersection classes.
pub const KIMI_PAT_STR: &str = r"[\p{Han}]+|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]*[\p{Ll}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]+[\p{Ll}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

// The four class-plus-quantifier units that appear in `KIMI_PAT_STR`,
// paired with their lookahead rewrites.
const SUBSTITUTIONS: [(&str, &str); 4] = [
    (
        r"[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]*",
        r"(?:(?!\p{Han})[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}])*",
    ),
    (
        r"[\p{Ll}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]+",
        r"(?:(?!\p{Han})[\p{Ll}\p{Lm}\p{Lo}\p{M}])+",
    ),
    (
        r"[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]+",
        r"(?:(?!\p{Han})[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}])+",
    ),
    (
        r"[\p{Ll}\p{Lm}\p{Lo}\p{M}&&[^\p{Han}]]*",
        r"(?:(?!\p{Han})[\p{Ll}\p{Lm}\p{Lo}\p{M}])*",
    ),
];

/// Rewrite the `&&[^\p{Han}]` intersection classes of a Kimi-style pattern
/// into lookahead-guarded classes.
///
/// This is a literal substitution over the four class/quantifier units
/// that occur in [`KIMI_PAT_STR`], not a general regex rewriter. Patterns
/// containing none of them pass through unchanged.
pub fn translate_intersections(pattern: &str) -> String {
    let mut out = pattern.to_string();
    for (from, to) in SUBSTITUTIONS {
        out = out.replace(from, to);
    }
    out
}

/// The default Kimi pattern with intersections translated away, suitable
/// for engines with Unicode property classes and negative lookahead.
pub fn kimi_pattern() -> String {
    translate_intersections(KIMI_PAT_STR)
}
