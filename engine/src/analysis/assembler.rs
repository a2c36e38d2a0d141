//! Stream Assembler
//!
//! Turns the fragments of one upstream response into a cleaned, growing
//! text. Reasoning spans (`<think>...</think>`) are removed by re-scanning
//! the whole accumulator after every fragment: a tag may be split at any
//! byte, and recomputing from the full text is correct regardless of where
//! the splits fall.

use regex::Regex;
use std::sync::OnceLock;

const OPEN_TAG: &str = "<think>";

/// Malformed bytes in a response stream. Never fatal: the offending bytes
/// decode to U+FFFD and the stream continues.
#[derive(Debug, thiserror::Error)]
#[error("Invalid UTF-8 sequence of {len} byte(s) at stream offset {offset}")]
pub struct DecodeError {
    pub offset: usize,
    pub len: usize,
}

/// Compiled patterns for reasoning removal
pub struct ReasoningFilter {
    closed_span: Regex,
    open_tail: Regex,
}

impl ReasoningFilter {
    fn new() -> Self {
        Self {
            closed_span: Regex::new(r"(?s)<think>.*?</think>").expect("Invalid closed span pattern"),
            open_tail: Regex::new(r"(?s)<think>.*$").expect("Invalid open tail pattern"),
        }
    }

    /// Process-wide instance
    pub fn shared() -> &'static ReasoningFilter {
        static FILTER: OnceLock<ReasoningFilter> = OnceLock::new();
        FILTER.get_or_init(ReasoningFilter::new)
    }

    /// Remove complete spans, then an unclosed trailing span
    pub fn clean(&self, text: &str) -> String {
        let without_spans = self.closed_span.replace_all(text, "");
        self.open_tail.replace(&without_spans, "").into_owned()
    }
}

/// Strip reasoning content from a complete text
pub fn strip_reasoning(text: &str) -> String {
    ReasoningFilter::shared().clean(text)
}

/// Incremental UTF-8 decoder that carries split characters across chunks
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    consumed: usize,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` as possible, appending to `out`.
    ///
    /// An incomplete trailing sequence is kept for the next call.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);
        let buffer = std::mem::take(&mut self.pending);
        let mut rest: &[u8] = &buffer;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.consumed += rest.len();
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    self.consumed += valid.len();

                    match e.error_len() {
                        Some(len) => {
                            let err = DecodeError {
                                offset: self.consumed,
                                len,
                            };
                            tracing::warn!("{}", err);
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.consumed += len;
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Flush an incomplete trailing sequence at end of stream
    pub fn flush_into(&mut self, out: &mut String) {
        if self.pending.is_empty() {
            return;
        }
        let err = DecodeError {
            offset: self.consumed,
            len: self.pending.len(),
        };
        tracing::warn!("Stream ended mid-character: {}", err);
        self.consumed += self.pending.len();
        self.pending.clear();
        out.push(char::REPLACEMENT_CHARACTER);
    }
}

/// Accumulates one response and exposes its cleaned view
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: Utf8Decoder,
    raw: String,
    cleaned: String,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the cleaned cumulative text
    pub fn push(&mut self, bytes: &[u8]) -> &str {
        self.decoder.decode_into(bytes, &mut self.raw);
        self.recompute();
        &self.cleaned
    }

    /// Feed already-decoded text and return the cleaned cumulative text
    pub fn push_str(&mut self, text: &str) -> &str {
        self.raw.push_str(text);
        self.recompute();
        &self.cleaned
    }

    /// Current cleaned view
    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }

    /// Everything received so far, reasoning included
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Flush the decoder and run the final cleaning pass
    pub fn finish(mut self) -> String {
        self.decoder.flush_into(&mut self.raw);
        strip_reasoning(&self.raw)
    }

    fn recompute(&mut self) {
        let mut cleaned = strip_reasoning(&self.raw);
        // Hold back a partial "<think" at the very end so it is never shown
        // and then retracted once the rest of the tag arrives
        let held = partial_open_tag_len(&cleaned);
        cleaned.truncate(cleaned.len() - held);
        self.cleaned = cleaned;
    }
}

/// Length of the longest proper prefix of `<think>` that ends `text`
fn partial_open_tag_len(text: &str) -> usize {
    (1..OPEN_TAG.len())
        .rev()
        .find(|&n| text.ends_with(&OPEN_TAG[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_complete_spans() {
        let text = "a<think>one</think>b<think>two\nlines</think>c";
        assert_eq!(strip_reasoning(text), "abc");
    }

    #[test]
    fn test_strip_unclosed_tail() {
        assert_eq!(strip_reasoning("answer<think>still thinking"), "answer");
    }

    #[test]
    fn test_all_reasoning_is_empty_string() {
        assert_eq!(strip_reasoning("<think>only this</think>"), "");
        assert_eq!(strip_reasoning("<think>open"), "");
    }

    #[test]
    fn test_tag_split_across_fragments() {
        let mut assembler = StreamAssembler::new();

        assert_eq!(assembler.push_str("Hello <th"), "Hello ");
        assert_eq!(assembler.push_str("ink>secret"), "Hello ");
        assert_eq!(assembler.push_str(" stuff</thi"), "Hello ");
        assert_eq!(assembler.push_str("nk> world"), "Hello  world");
        assert_eq!(assembler.finish(), "Hello  world");
    }

    #[test]
    fn test_open_in_k_close_in_k_plus_two() {
        let fragments = ["intro <think>", "hidden reasoning", "</think>answer"];
        let mut assembler = StreamAssembler::new();

        assert!(!assembler.push_str(fragments[0]).contains("hidden"));
        assert!(!assembler.push_str(fragments[1]).contains("hidden"));
        assert_eq!(assembler.push_str(fragments[2]), "intro answer");
    }

    #[test]
    fn test_held_back_prefix_is_released_when_not_a_tag() {
        let mut assembler = StreamAssembler::new();

        assert_eq!(assembler.push_str("a <"), "a ");
        assert_eq!(assembler.push_str(" b"), "a < b");
    }

    #[test]
    fn test_finish_does_not_hold_back() {
        let mut assembler = StreamAssembler::new();
        assembler.push_str("x <thi");
        assert_eq!(assembler.finish(), "x <thi");
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "分析";
        let bytes = text.as_bytes();
        let mut assembler = StreamAssembler::new();

        assert_eq!(assembler.push(&bytes[..2]), "");
        assert_eq!(assembler.push(&bytes[2..4]), "分");
        assert_eq!(assembler.push(&bytes[4..]), "分析");
    }

    #[test]
    fn test_invalid_bytes_become_replacement() {
        let mut assembler = StreamAssembler::new();
        let cleaned = assembler.push(&[b'o', b'k', 0xff, b'!']).to_string();
        assert_eq!(cleaned, "ok\u{fffd}!");
    }

    #[test]
    fn test_truncated_tail_flushed_at_finish() {
        let mut assembler = StreamAssembler::new();
        assembler.push(&"é".as_bytes()[..1]);
        assert_eq!(assembler.finish(), "\u{fffd}");
    }

    #[test]
    fn test_partial_open_tag_len() {
        assert_eq!(partial_open_tag_len("abc"), 0);
        assert_eq!(partial_open_tag_len("abc<"), 1);
        assert_eq!(partial_open_tag_len("abc<think"), 6);
        assert_eq!(partial_open_tag_len("abc<think>"), 0);
    }
}
