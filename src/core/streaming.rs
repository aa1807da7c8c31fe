//! Incremental decoding for token streams.
//!
//! Kimi token boundaries routinely fall inside a UTF-8 character: a Han
//! codepoint is three bytes, and nothing guarantees a model emits those
//! bytes through a single token. Decoding ids one at a time therefore
//! needs a place to park the tail bytes of an unfinished character until
//! the next token supplies the rest. [`StreamingDecoder`] is that place.
//!
//! Unlike [`Tokenizer::decode`], which rejects byte sequences that are not
//! valid UTF-8 as a whole, the streaming decoder treats validity as a
//! moving frontier: everything decodable so far is released immediately,
//! a trailing partial character waits, and byte sequences that can never
//! become valid are replaced with U+FFFD on the spot. Unknown ids fail
//! exactly like they do in `decode`.

use super::tokenizer::{Tokenizer, TokenizerError};

/// Incremental UTF-8 decoder over a stream of Kimi token ids.
///
/// Text is released as soon as it is complete; at most one partial
/// character is ever held back. Call [`finish`](Self::finish) at
/// end-of-stream to flush it.
///
/// ```ignore
/// let mut stream = StreamingDecoder::new(&tokenizer);
/// for id in ids {
///     print!("{}", stream.push(id)?);
/// }
/// print!("{}", stream.finish());
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    pending: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a streaming decoder borrowing the given tokenizer's tables.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            pending: Vec::new(),
        }
    }

    /// Decode one token and return whatever text it completed.
    ///
    /// The result is empty while the buffered bytes still end in a
    /// partial character. An id outside both tables fails with
    /// [`TokenizerError::UnknownId`] and leaves the buffer untouched.
    pub fn push(&mut self, token_id: u32) -> Result<String, TokenizerError> {
        self.push_all(std::slice::from_ref(&token_id))
    }

    /// Decode a batch of tokens and return whatever text they completed.
    ///
    /// Fails before buffering anything if any id is unknown.
    pub fn push_all(&mut self, token_ids: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.tokenizer.decode_bytes(token_ids)?;
        self.pending.extend_from_slice(&bytes);
        Ok(self.take_complete())
    }

    /// Consume the decoder, flushing any held-back bytes.
    ///
    /// A dangling partial character becomes a single U+FFFD.
    pub fn finish(mut self) -> String {
        let mut out = self.take_complete();
        if !self.pending.is_empty() {
            out.push('\u{FFFD}');
        }
        out
    }

    /// Number of bytes waiting for the rest of their character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Move every decodable scalar out of the buffer.
    ///
    /// `Utf8Error` distinguishes "more bytes could fix this"
    /// (`error_len() == None`, only possible at the tail) from "this can
    /// never be valid"; the former stays pending, the latter is replaced
    /// with U+FFFD immediately.
    fn take_complete(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // SAFETY: valid_up_to marks the end of the longest
                    // valid prefix.
                    out.push_str(unsafe {
                        std::str::from_utf8_unchecked(&self.pending[..valid])
                    });
                    match err.error_len() {
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}
