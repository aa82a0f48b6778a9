//! Decoder for streamed (`data:`-framed) responses.
//!
//! Wire format:
//! ```text
//! data: {"key": "value"}
//! data: {"another": "event"}
//! data: [DONE]
//! ```
//!
//! Each transport chunk is decoded on its own. A frame split across two
//! chunks is not reassembled: both halves fail to decode and are dropped.
//! Frames are expected to arrive line-complete.

use futures::{pin_mut, Stream, StreamExt};
use serde::de::DeserializeOwned;

/// Lifecycle of one streamed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Open,
    /// Sentinel seen or transport ended. Further chunks are ignored.
    Done,
    /// Transport failed mid-stream.
    Error,
}

/// Incremental frame decoder. Delivers frames to a consumer in arrival order.
#[derive(Debug)]
pub struct StreamDecoder {
    state: DecoderState,
    frames: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Open,
            frames: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Frames delivered to the consumer so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Decode one chunk, passing every well-formed frame to `consumer`.
    ///
    /// Lines without the `data: ` prefix are ignored; frames that fail to
    /// decode as `T` are dropped. Stops at the `[DONE]` sentinel.
    pub fn feed<T, F>(&mut self, chunk: &[u8], consumer: &mut F) -> DecoderState
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        if self.state != DecoderState::Open {
            return self.state;
        }

        let text = String::from_utf8_lossy(chunk);
        for line in text.lines() {
            let Some(data) = parse_data_line(line) else {
                continue;
            };
            if is_done_marker(data) {
                self.state = DecoderState::Done;
                break;
            }
            match serde_json::from_str::<T>(data) {
                Ok(frame) => {
                    self.frames += 1;
                    consumer(frame);
                }
                Err(e) => tracing::debug!("skipping malformed stream frame: {e}"),
            }
        }
        self.state
    }

    /// Transport reached end of body.
    pub fn finish(&mut self) {
        if self.state == DecoderState::Open {
            self.state = DecoderState::Done;
        }
    }

    /// Transport failed.
    pub fn fail(&mut self) {
        if self.state == DecoderState::Open {
            self.state = DecoderState::Error;
        }
    }

    /// Drive the decoder over a chunk stream until the sentinel, the end of
    /// the stream, or a transport error. Returns the number of frames
    /// delivered.
    pub async fn run<S, B, E, T, F>(&mut self, chunks: S, mut consumer: F) -> Result<usize, E>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        T: DeserializeOwned,
        F: FnMut(T),
    {
        pin_mut!(chunks);
        while let Some(next) = chunks.next().await {
            match next {
                Ok(chunk) => {
                    if self.feed::<T, F>(chunk.as_ref(), &mut consumer) == DecoderState::Done {
                        return Ok(self.frames);
                    }
                }
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }
        self.finish();
        Ok(self.frames)
    }
}

/// Extract the payload of a `data: ` line.
///
/// # Example
/// ```
/// use modelhub::sse::parse_data_line;
///
/// assert_eq!(parse_data_line("data: {\"a\": 1}"), Some("{\"a\": 1}"));
/// assert_eq!(parse_data_line("event: ping"), None);
/// ```
pub fn parse_data_line(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").map(|s| s.trim())
}

/// Whether a frame payload is the end-of-stream sentinel.
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}
