//! Incremental decoder for newline-delimited JSON streams
//!
//! Fragments arrive with arbitrary boundaries: one fragment can carry
//! several records, or a single record (even a single UTF-8 character) can
//! be split across fragments. The decoder keeps the unterminated tail in a
//! byte buffer and only hands out records whose terminating newline has
//! been seen, so the emitted sequence depends on the concatenated bytes and
//! never on how they were chunked.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

const RECORD_SEPARATOR: u8 = b'\n';

/// Longest record excerpt quoted in a decode error
const EXCERPT_LEN: usize = 120;

/// What to do with bytes left after the last separator when the stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
    /// Drop the unterminated tail with a warning
    #[default]
    Discard,
    /// Fail the stream with a decode error
    Reject,
}

impl fmt::Display for TrailingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailingPolicy::Discard => f.write_str("discard"),
            TrailingPolicy::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for TrailingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "discard" => Ok(TrailingPolicy::Discard),
            "reject" => Ok(TrailingPolicy::Reject),
            other => Err(Error::Configuration(format!(
                "unknown trailing policy '{}', expected 'discard' or 'reject'",
                other
            ))),
        }
    }
}

/// Residual-buffer NDJSON decoder
pub struct LineDecoder<T> {
    buffer: Vec<u8>,
    complete: VecDeque<Vec<u8>>,
    policy: TrailingPolicy,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LineDecoder<T> {
    pub fn new(policy: TrailingPolicy) -> Self {
        Self {
            buffer: Vec::new(),
            complete: VecDeque::new(),
            policy,
            _record: PhantomData,
        }
    }

    /// Append a fragment and queue every record it completes
    pub fn push(&mut self, fragment: &[u8]) {
        let Some(last) = fragment.iter().rposition(|b| *b == RECORD_SEPARATOR) else {
            self.buffer.extend_from_slice(fragment);
            return;
        };

        self.buffer.extend_from_slice(&fragment[..last]);
        let terminated = std::mem::replace(&mut self.buffer, fragment[last + 1..].to_vec());
        self.complete.extend(
            terminated
                .split(|b| *b == RECORD_SEPARATOR)
                .map(<[u8]>::to_vec),
        );
    }

    /// Next fully received record, skipping blank lines
    ///
    /// A complete record that is not valid UTF-8 JSON is a protocol
    /// violation and fails with `Decode`.
    pub fn next_record(&mut self) -> Result<Option<T>> {
        while let Some(line) = self.complete.pop_front() {
            if let Some(record) = parse_record(&line)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Bytes held back waiting for a separator
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Apply the trailing policy to whatever is left once the source ends
    ///
    /// Complete records still queued are unaffected; only the unterminated
    /// tail is examined. Calling this more than once is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        let tail = std::mem::take(&mut self.buffer);
        if tail.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        match self.policy {
            TrailingPolicy::Discard => {
                warn!(
                    bytes = tail.len(),
                    "discarding unterminated trailing record at end of stream"
                );
                Ok(())
            }
            TrailingPolicy::Reject => Err(Error::Decode(format!(
                "stream ended inside an unterminated record: {}",
                excerpt(&tail)
            ))),
        }
    }
}

fn parse_record<T: DeserializeOwned>(line: &[u8]) -> Result<Option<T>> {
    let text = std::str::from_utf8(line)
        .map_err(|e| Error::Decode(format!("record is not valid UTF-8: {}", e)))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| Error::Decode(format!("malformed record {}: {}", excerpt(text.as_bytes()), e)))
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() <= EXCERPT_LEN {
        return format!("'{}'", text);
    }
    let head: String = text.chars().take(EXCERPT_LEN).collect();
    format!("'{}...'", head)
}

struct DecodeState<S, T> {
    source: S,
    decoder: LineDecoder<T>,
    exhausted: bool,
    failed: bool,
    fragments: usize,
}

/// Decode a fragment stream into records, strictly in arrival order
///
/// The returned stream ends after the first error. A transport error from
/// `source` is passed through unchanged.
pub fn decode_stream<T, S>(source: S, policy: TrailingPolicy) -> impl Stream<Item = Result<T>> + Send
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let state = DecodeState {
        source,
        decoder: LineDecoder::new(policy),
        exhausted: false,
        failed: false,
        fragments: 0,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.failed {
                return None;
            }

            match state.decoder.next_record() {
                Ok(Some(record)) => return Some((Ok(record), state)),
                Ok(None) => {}
                Err(e) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
            }

            if state.exhausted {
                return None;
            }

            match state.source.next().await {
                Some(Ok(fragment)) => {
                    state.fragments += 1;
                    state.decoder.push(&fragment);
                }
                Some(Err(e)) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.exhausted = true;
                    debug!(fragments = state.fragments, "generation stream ended");
                    if let Err(e) = state.decoder.finish() {
                        state.failed = true;
                        return Some((Err(e), state));
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationEvent, Stage};
    use futures::TryStreamExt;
    use serde_json::Value;

    const BODY: &str = "{\"response\":\"Paris\"}\n{\"response\":\".\"}\n\n{\"response\":\" Très\"}\n{\"done\":true}\n";

    fn decode_chunks(chunks: &[&[u8]]) -> Result<Vec<Value>> {
        let mut decoder = LineDecoder::new(TrailingPolicy::Reject);
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.push(chunk);
            while let Some(record) = decoder.next_record()? {
                out.push(record);
            }
        }
        decoder.finish()?;
        Ok(out)
    }

    fn expected() -> Vec<Value> {
        BODY.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_single_fragment() {
        assert_eq!(decode_chunks(&[BODY.as_bytes()]).unwrap(), expected());
    }

    #[test]
    fn test_output_independent_of_chunking() {
        let bytes = BODY.as_bytes();
        let want = expected();

        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let got = decode_chunks(&[&bytes[..i], &bytes[i..j], &bytes[j..]]).unwrap();
                assert_eq!(got, want, "split at {} and {}", i, j);
            }
        }

        let bytewise: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(&bytewise).unwrap(), want);
    }

    #[test]
    fn test_no_record_before_separator() {
        let mut decoder: LineDecoder<Value> = LineDecoder::new(TrailingPolicy::Discard);
        decoder.push(b"{\"response\":\"Par");
        assert!(decoder.next_record().unwrap().is_none());
        decoder.push(b"is\"}");
        assert!(decoder.next_record().unwrap().is_none());
        assert_eq!(decoder.pending_bytes(), 20);
        decoder.push(b"\n");
        assert_eq!(
            decoder.next_record().unwrap(),
            Some(serde_json::json!({"response": "Paris"}))
        );
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let got = decode_chunks(&[b"\n  \n{\"a\":1}\r\n\t\n{\"a\":2}\n"]).unwrap();
        assert_eq!(got, vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})]);
    }

    #[test]
    fn test_malformed_record_after_good_ones() {
        let mut decoder: LineDecoder<Value> = LineDecoder::new(TrailingPolicy::Discard);
        decoder.push(b"{\"a\":1}\n{oops}\n{\"a\":3}\n");
        assert_eq!(decoder.next_record().unwrap(), Some(serde_json::json!({"a": 1})));
        let err = decoder.next_record().unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.stage(), Some(Stage::Decode));
    }

    #[test]
    fn test_invalid_utf8_record() {
        let mut decoder: LineDecoder<Value> = LineDecoder::new(TrailingPolicy::Discard);
        decoder.push(&[0xff, 0xfe, b'\n']);
        assert!(matches!(decoder.next_record(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_trailing_policy() {
        let mut discard: LineDecoder<Value> = LineDecoder::new(TrailingPolicy::Discard);
        discard.push(b"{\"a\":1}\n{\"a\":");
        assert!(discard.finish().is_ok());
        assert_eq!(discard.next_record().unwrap(), Some(serde_json::json!({"a": 1})));
        assert!(discard.next_record().unwrap().is_none());

        let mut reject: LineDecoder<Value> = LineDecoder::new(TrailingPolicy::Reject);
        reject.push(b"{\"a\":1}\n{\"a\":");
        assert!(matches!(reject.finish(), Err(Error::Decode(_))));
        assert!(reject.finish().is_ok());

        let mut whitespace: LineDecoder<Value> = LineDecoder::new(TrailingPolicy::Reject);
        whitespace.push(b"{\"a\":1}\n  ");
        assert!(whitespace.finish().is_ok());
    }

    #[test]
    fn test_trailing_policy_parsing() {
        assert_eq!("Reject".parse::<TrailingPolicy>().unwrap(), TrailingPolicy::Reject);
        assert_eq!("discard".parse::<TrailingPolicy>().unwrap(), TrailingPolicy::Discard);
        assert!("keep".parse::<TrailingPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_decode_stream_in_order() {
        let fragments: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"Pa")),
            Ok(Bytes::from_static(b"ris\"}\n{\"respon")),
            Ok(Bytes::from_static(b"se\":\".\"}\n{\"done\":true}\n")),
        ];
        let events: Vec<GenerationEvent> =
            decode_stream(stream::iter(fragments), TrailingPolicy::Reject)
                .try_collect()
                .await
                .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].response.as_deref(), Some("Paris"));
        assert_eq!(events[1].response.as_deref(), Some("."));
        assert_eq!(events[2].done, Some(true));
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_error() {
        let fragments: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"a\"}\n")),
            Err(Error::Network {
                stage: Stage::Generation,
                message: "connection reset".to_string(),
            }),
            Ok(Bytes::from_static(b"{\"response\":\"b\"}\n")),
        ];
        let results: Vec<Result<GenerationEvent>> =
            decode_stream(stream::iter(fragments), TrailingPolicy::Discard)
                .collect()
                .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Network { .. })));
    }

    #[tokio::test]
    async fn test_decode_stream_rejects_trailing_tail() {
        let fragments: Vec<Result<Bytes>> = vec![Ok(Bytes::from_static(
            b"{\"response\":\"a\"}\n{\"response\":\"b\"}",
        ))];
        let results: Vec<Result<GenerationEvent>> =
            decode_stream(stream::iter(fragments), TrailingPolicy::Reject)
                .collect()
                .await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(Error::Decode(_))));
    }
}
