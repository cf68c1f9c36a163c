//! Decoder for the `data:` event stream relayed by the composer
//!
//! Turns arbitrarily-split byte chunks into the ordered text fragments carried
//! by OpenAI-compatible chat-completion deltas. Only complete lines are ever
//! classified, so the fragment sequence does not depend on where the chunk
//! boundaries fell.

use axum::body::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental decoder state for one response body
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamDecoder {
    /// Bytes after the last seen line terminator
    pending: Vec<u8>,
    /// Payload that failed to parse and gets one more attempt joined with the next line
    held: Option<String>,
    done: bool,
}

impl StreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel was seen or `finish` was called
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk and collect the fragments completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut fragments = Vec::new();
        if self.done || chunk.is_empty() {
            return fragments;
        }

        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return fragments;
        };

        // `\n` never occurs inside a multi-byte sequence, so cutting here keeps
        // split characters intact in `pending`
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        let text = String::from_utf8_lossy(&complete);

        for line in text.split_terminator('\n') {
            if self.process_line(line, &mut fragments) {
                break;
            }
        }
        fragments
    }

    /// Flush whatever is left once the transport reports end of input
    pub fn finish(&mut self) -> Vec<String> {
        let mut fragments = Vec::new();
        if self.done {
            return fragments;
        }

        let remaining = std::mem::take(&mut self.pending);
        if !remaining.is_empty() {
            let text = String::from_utf8_lossy(&remaining);
            self.process_line(&text, &mut fragments);
        }

        if let Some(held) = self.held.take() {
            tracing::debug!(payload = %held, "Dropping unparseable stream payload at end of input");
        }
        self.done = true;
        fragments
    }

    /// Classify one complete line. Returns true when the stream is finished.
    fn process_line(&mut self, raw: &str, out: &mut Vec<String>) -> bool {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            return false;
        }

        // A continuation may itself start with `:` when the split fell after a key
        if let Some(held) = self.held.take() {
            let joined = format!("{held}{line}");
            if let Ok(chunk) = serde_json::from_str::<StreamChunk>(joined.trim()) {
                out.extend(chunk.into_fragment());
                return false;
            }
            tracing::debug!(payload = %held, "Dropping unparseable stream payload after retry");
        }

        if line.starts_with(':') {
            return false;
        }

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            self.done = true;
            self.pending.clear();
            return true;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => out.extend(chunk.into_fragment()),
            Err(e) => {
                tracing::trace!(error = %e, "Holding unparseable stream payload for one retry");
                self.held = Some(payload.to_string());
            }
        }
        false
    }
}

/// One chat-completion chunk; only the fields the decoder reads
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl StreamChunk {
    fn into_fragment(self) -> Option<String> {
        if let Some(error) = &self.error {
            tracing::warn!(error = %error, "Upstream reported an error inside the stream");
        }
        self.choices?
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|content| !content.is_empty())
    }
}

struct FragmentState<S> {
    chunks: S,
    decoder: StreamDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

/// Lazily decode a chunk stream into fragments.
///
/// The result ends at `[DONE]`, at end of input (after a final flush), or
/// right after yielding the first transport error.
pub fn fragments<S, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let state = FragmentState {
        chunks,
        decoder: StreamDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.ready.pop_front() {
                return Some((Ok(fragment), st));
            }
            if st.finished {
                return None;
            }
            match st.chunks.next().await {
                Some(Ok(bytes)) => {
                    st.ready.extend(st.decoder.push(&bytes));
                    st.finished = st.decoder.is_done();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.ready.extend(st.decoder.finish());
                    st.finished = true;
                }
            }
        }
    })
}
