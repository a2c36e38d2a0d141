//! Server-sent events decoding for OpenAI-compatible streaming responses
//!
//! Chat completion streams arrive as `data: {json}` lines, terminated by
//! `data: [DONE]`. Network chunks do not respect line boundaries, so the
//! decoder buffers raw bytes and only interprets complete lines.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{Result, TextStream, UpstreamError};

const DONE_MARKER: &str = "[DONE]";

/// Incremental decoder turning SSE bytes into content deltas
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` marker has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk, returning the content of every complete event
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(delta) = self.decode_line(&line)? {
                deltas.push(delta);
            }
        }
        Ok(deltas)
    }

    /// Interpret whatever is left once the body has ended
    pub fn finish(&mut self) -> Result<Vec<String>> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.buffer);
        Ok(self.decode_line(&line)?.into_iter().collect())
    }

    fn decode_line(&mut self, raw: &[u8]) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);

        // Comments, event names and blank separators carry no content
        let Some(payload) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let payload = payload.trim_start();

        if payload == DONE_MARKER {
            self.done = true;
            return Ok(None);
        }
        if payload.is_empty() {
            return Ok(None);
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Skipping malformed stream event: {}", e);
                return Ok(None);
            }
        };

        if let Some(error) = chunk.error {
            return Err(UpstreamError::Parse(error.message));
        }

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty()))
    }
}

/// Wrap an SSE body into a stream of plain content bytes
pub fn content_stream<S>(body: S) -> TextStream
where
    S: Stream<Item = Result<Vec<u8>>> + Send + Unpin + 'static,
{
    let state = StreamState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(&chunk);
                    state.enqueue(decoded);
                    if state.decoder.is_done() {
                        state.finished = true;
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    let decoded = state.decoder.finish();
                    state.enqueue(decoded);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

struct StreamState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<Vec<u8>>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn enqueue(&mut self, decoded: Result<Vec<String>>) {
        match decoded {
            Ok(deltas) => self
                .pending
                .extend(deltas.into_iter().map(|d| Ok(d.into_bytes()))),
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_decodes_complete_events() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}{}data: [DONE]\n\n", event("Hel"), event("lo"));

        let deltas = decoder.push(body.as_bytes()).unwrap();

        assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let body = event("split me");
        let (a, b) = body.as_bytes().split_at(17);

        assert!(decoder.push(a).unwrap().is_empty());
        assert_eq!(decoder.push(b).unwrap(), vec!["split me".to_string()]);
    }

    #[test]
    fn test_role_only_and_comment_lines_are_skipped() {
        let mut decoder = SseDecoder::new();
        let body = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";

        assert!(decoder.push(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_event_is_not_fatal() {
        let mut decoder = SseDecoder::new();
        let body = format!("data: {{not json\n\n{}", event("ok"));

        assert_eq!(decoder.push(body.as_bytes()).unwrap(), vec!["ok".to_string()]);
    }

    #[test]
    fn test_error_event_fails() {
        let mut decoder = SseDecoder::new();
        let body = "data: {\"error\":{\"message\":\"quota exceeded\"}}\n\n";

        let err = decoder.push(body.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Parse error: quota exceeded");
    }

    #[test]
    fn test_finish_handles_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let body = event("tail");
        let trimmed = body.trim_end();

        assert!(decoder.push(trimmed.as_bytes()).unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), vec!["tail".to_string()]);
    }

    #[tokio::test]
    async fn test_content_stream_stops_at_done() {
        let body = format!(
            "{}data: [DONE]\n\n{}",
            event("before"),
            event("after")
        );
        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(body.into_bytes())];

        let collected: Vec<Vec<u8>> = content_stream(futures::stream::iter(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(collected, vec![b"before".to_vec()]);
    }
}
