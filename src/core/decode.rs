//! Incremental JSON array decoding
//!
//! Turns a stream of byte chunks holding one top-level JSON array into a
//! stream of its elements, without buffering the whole document. Chunk
//! boundaries may fall anywhere, including inside a string or a number.
//!
//! Each element is located with a resumable bracket scanner and handed to
//! `serde_json` once complete, so an element spanning many chunks is scanned
//! and parsed exactly once.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::io;
use thiserror::Error;

use crate::backend::ReadStream;

/// Where the decoder is within the array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before `[`
    Start,
    /// After `[`, expecting an element or `]`
    First,
    /// After `,`, expecting an element
    Next,
    /// After an element, expecting `,` or `]`
    AfterElement,
    /// After the closing `]`
    Done,
}

/// Progress through an element that has not fully arrived yet
#[derive(Debug, Default)]
struct ElementScan {
    /// Bytes of the element already looked at
    scanned: usize,
    /// Open `{`/`[` outside strings
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ElementScan {
    /// Continue scanning `element`, which starts at the element's first byte.
    /// Returns the element's length once its end is known.
    fn advance(&mut self, element: &[u8]) -> Option<usize> {
        while let Some(&byte) = element.get(self.scanned) {
            let at = self.scanned;
            self.scanned += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(self.scanned);
                    }
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(self.scanned);
                    }
                }
                // A bare scalar ends at the first delimiter after it
                b',' | b'}' | b']' if self.depth == 0 => return Some(at),
                c if c.is_ascii_whitespace() && self.depth == 0 => return Some(at),
                _ => {}
            }
        }
        None
    }
}

/// One decoding step
#[derive(Debug, PartialEq)]
pub enum Step {
    Element(Value),
    NeedMore,
    End,
}

/// Push-based decoder for a single top-level JSON array
#[derive(Debug)]
pub struct JsonArrayDecoder {
    buf: Vec<u8>,
    pos: usize,
    state: State,
    scan: ElementScan,
    eof: bool,
}

impl JsonArrayDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            state: State::Start,
            scan: ElementScan::default(),
            eof: false,
        }
    }

    /// Append a chunk of input
    pub fn push(&mut self, chunk: &[u8]) {
        // Reclaim consumed input once it dominates the buffer
        if self.pos > 0 && self.pos * 2 >= self.buf.len() {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Mark the end of input
    pub fn finish(&mut self) {
        self.eof = true;
    }

    /// Try to produce the next element
    pub fn step(&mut self) -> Result<Step, String> {
        loop {
            self.skip_whitespace();
            let next = self.buf.get(self.pos).copied();

            match (self.state, next) {
                (State::Done, None) if self.eof => return Ok(Step::End),
                (State::Done, Some(c)) => {
                    return Err(format!(
                        "unexpected '{}' after end of array at byte {}",
                        c as char, self.pos
                    ))
                }
                (_, None) if self.eof => {
                    return Err(if self.state == State::Start {
                        "input is empty, expected a JSON array".to_string()
                    } else {
                        "unterminated JSON array".to_string()
                    })
                }
                (_, None) => return Ok(Step::NeedMore),
                (State::Start, Some(b'[')) => {
                    self.pos += 1;
                    self.state = State::First;
                }
                (State::Start, Some(c)) => {
                    return Err(format!(
                        "expected a JSON array, found '{}'",
                        c as char
                    ))
                }
                (State::First, Some(b']')) | (State::AfterElement, Some(b']')) => {
                    self.pos += 1;
                    self.state = State::Done;
                }
                (State::AfterElement, Some(b',')) => {
                    self.pos += 1;
                    self.state = State::Next;
                }
                (State::AfterElement, Some(c)) => {
                    return Err(format!(
                        "expected ',' or ']' at byte {}, found '{}'",
                        self.pos, c as char
                    ))
                }
                (State::First, Some(_)) | (State::Next, Some(_)) => return self.element(),
            }
        }
    }

    fn element(&mut self) -> Result<Step, String> {
        let remaining = &self.buf[self.pos..];
        let length = match self.scan.advance(remaining) {
            Some(length) => length,
            // A scalar touching the end of the buffer may continue in the next chunk
            None if !self.eof => return Ok(Step::NeedMore),
            // At end of input whatever is left is the element; serde reports
            // anything unterminated
            None => remaining.len(),
        };

        let value: Value =
            serde_json::from_slice(&remaining[..length]).map_err(|e| e.to_string())?;
        self.pos += length;
        self.scan = ElementScan::default();
        self.state = State::AfterElement;
        Ok(Step::Element(value))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.buf.get(self.pos) {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }
}

impl Default for JsonArrayDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Error surfaced by [`decode_array`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read failed: {0}")]
    Io(#[source] io::Error),

    #[error("invalid JSON array: {0}")]
    Syntax(String),
}

struct DecodeState {
    input: ReadStream,
    decoder: JsonArrayDecoder,
    failed: bool,
}

/// Decode a byte stream holding one JSON array into its elements
///
/// The stream ends after the first error.
pub fn decode_array(input: ReadStream) -> BoxStream<'static, Result<Value, DecodeError>> {
    let state = DecodeState {
        input,
        decoder: JsonArrayDecoder::new(),
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            match state.decoder.step() {
                Ok(Step::Element(value)) => return Some((Ok(value), state)),
                Ok(Step::End) => return None,
                Ok(Step::NeedMore) => match state.input.next().await {
                    Some(Ok(chunk)) => state.decoder.push(&chunk),
                    Some(Err(e)) => {
                        state.failed = true;
                        return Some((Err(DecodeError::Io(e)), state));
                    }
                    None => state.decoder.finish(),
                },
                Err(msg) => {
                    state.failed = true;
                    return Some((Err(DecodeError::Syntax(msg)), state));
                }
            }
        }
    })
    .boxed()
}

/// Convenience for tests and callers holding whole documents
pub fn chunked(data: &[u8], chunk_size: usize) -> ReadStream {
    let chunks: Vec<io::Result<Bytes>> = data
        .chunks(chunk_size.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn decode_all(data: &[u8], chunk_size: usize) -> Result<Vec<Value>, String> {
        let mut out = Vec::new();
        let mut elements = decode_array(chunked(data, chunk_size));
        while let Some(item) = elements.next().await {
            out.push(item.map_err(|e| e.to_string())?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_every_chunk_size_gives_same_elements() {
        let doc = br#" [ {"id": 1, "name": "a,]b"}, 12345, -0.5e3, "x\"y", [1, [2]], null, true ] "#;
        let expected = vec![
            json!({"id": 1, "name": "a,]b"}),
            json!(12345),
            json!(-0.5e3),
            json!("x\"y"),
            json!([1, [2]]),
            json!(null),
            json!(true),
        ];
        for size in 1..=doc.len() {
            assert_eq!(decode_all(doc, size).await.unwrap(), expected, "chunk size {}", size);
        }
    }

    #[tokio::test]
    async fn test_number_split_across_chunks() {
        let values = decode_all(b"[1234567]", 4).await.unwrap();
        assert_eq!(values, vec![json!(1234567)]);
    }

    #[tokio::test]
    async fn test_empty_array() {
        assert!(decode_all(b"[]", 1).await.unwrap().is_empty());
        assert!(decode_all(b" [ \n ] ", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_array() {
        assert!(decode_all(br#"{"id": 1}"#, 4).await.is_err());
        assert!(decode_all(b"", 4).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_malformed_arrays() {
        assert!(decode_all(b"[1, 2", 2).await.is_err());
        assert!(decode_all(b"[1 2]", 2).await.is_err());
        assert!(decode_all(b"[1,]", 2).await.is_err());
        assert!(decode_all(b"[1] [2]", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_elements_before_error_are_delivered() {
        let mut elements = decode_array(chunked(b"[1, 2, oops]", 3));
        assert_eq!(elements.next().await.unwrap().unwrap(), json!(1));
        assert_eq!(elements.next().await.unwrap().unwrap(), json!(2));
        assert!(elements.next().await.unwrap().is_err());
        assert!(elements.next().await.is_none());
    }

    #[test]
    fn test_partial_element_is_not_rescanned() {
        let mut decoder = JsonArrayDecoder::new();
        decoder.push(br#"[{"name": "ab"#);
        assert_eq!(decoder.step().unwrap(), Step::NeedMore);
        assert_eq!(decoder.scan.scanned, br#"{"name": "ab"#.len());
        assert!(decoder.scan.in_string);

        decoder.push(br#"c\"]", "n": [1"#);
        assert_eq!(decoder.step().unwrap(), Step::NeedMore);
        assert_eq!(decoder.scan.depth, 2);

        decoder.push(b"]}]");
        assert_eq!(
            decoder.step().unwrap(),
            Step::Element(json!({"name": "abc\"]", "n": [1]}))
        );
        assert_eq!(decoder.scan.scanned, 0);
    }

    #[tokio::test]
    async fn test_large_element_over_many_chunks() {
        let big = "x".repeat(4 * 1024 * 1024);
        let doc = serde_json::to_vec(&json!([{"payload": big}, 1])).unwrap();
        let values = decode_all(&doc, 4 * 1024).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["payload"].as_str().map(str::len), Some(big.len()));
        assert_eq!(values[1], json!(1));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Syntax("expected ','".to_string());
        assert_eq!(err.to_string(), "invalid JSON array: expected ','");
        let err = DecodeError::Io(io::Error::other("reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_push_reclaims_consumed_input() {
        let mut decoder = JsonArrayDecoder::new();
        decoder.push(b"[1, 2, ");
        assert_eq!(decoder.step().unwrap(), Step::Element(json!(1)));
        assert_eq!(decoder.step().unwrap(), Step::Element(json!(2)));
        assert_eq!(decoder.step().unwrap(), Step::NeedMore);
        decoder.push(b"3]");
        assert!(decoder.buf.len() < 8);
        assert_eq!(decoder.step().unwrap(), Step::Element(json!(3)));
        assert_eq!(decoder.step().unwrap(), Step::NeedMore);
        decoder.finish();
        assert_eq!(decoder.step().unwrap(), Step::End);
    }
}
