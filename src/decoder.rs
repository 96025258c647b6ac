//! Incremental event-stream decoder.
//!
//! [`FrameStream`] wraps a byte stream (normally an HTTP response body) and
//! yields the JSON payload of every `data: ` line as soon as its terminating
//! newline arrives. It owns the source for its whole life and drops it the
//! moment the stream can produce nothing more: on `[DONE]`, on end of input,
//! on a read error, or when the consumer drops the `FrameStream` early.
//!
//! The decoder has no timeout of its own. Read deadlines belong to whatever
//! produced the byte stream.

use bytes::Bytes;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

use crate::error::{BoxError, StreamError};
use crate::sse_codec::{classify_line, SseCodec, SseLine};
use crate::types::{Completion, MalformedFrame, StreamFrame};

type MalformedHandler = Box<dyn FnMut(&MalformedFrame) + Send>;

pub struct FrameStream<S> {
    source: Option<S>,
    codec: SseCodec,
    ready: VecDeque<StreamFrame>,
    completion: Option<Completion>,
    malformed: usize,
    on_malformed: Option<MalformedHandler>,
}

impl<S> FrameStream<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Some(source),
            codec: SseCodec::new(),
            ready: VecDeque::new(),
            completion: None,
            malformed: 0,
            on_malformed: None,
        }
    }

    /// Registers a callback for `data:` lines that fail to parse. The line is
    /// skipped either way.
    pub fn on_malformed<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&MalformedFrame) + Send + 'static,
    {
        self.on_malformed = Some(Box::new(handler));
        self
    }

    /// `None` until the stream has terminated.
    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    fn release(&mut self, completion: Completion) {
        self.source = None;
        self.completion = Some(completion);
        debug!(?completion, "frame stream terminated, source released");
    }

    fn ingest(&mut self, chunk: &[u8]) {
        trace!(len = chunk.len(), "chunk received");

        for line in self.codec.decode(chunk) {
            match classify_line(&line) {
                SseLine::Data(payload) => self.ready.push_back(StreamFrame { payload }),
                SseLine::Done => {
                    self.codec.finish();
                    self.release(Completion::Sentinel);
                    break;
                }
                SseLine::Malformed { error, .. } => {
                    self.malformed += 1;
                    warn!(%error, line = %line, "skipping malformed frame");
                    let frame = MalformedFrame { line, error };
                    if let Some(handler) = self.on_malformed.as_mut() {
                        handler(&frame);
                    }
                }
                SseLine::Ignored => trace!(line = %line, "ignoring non-data line"),
            }
        }
    }
}

impl<S, E> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    type Item = Result<StreamFrame, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(frame) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }

            let Some(source) = this.source.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(source).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.ingest(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    this.codec.finish();
                    this.release(Completion::Failed);
                    return Poll::Ready(Some(Err(StreamError::Transport(e.into()))));
                }
                Poll::Ready(None) => {
                    let discarded_bytes = this.codec.finish();
                    if discarded_bytes > 0 {
                        debug!(discarded_bytes, "dropping unterminated tail at end of stream");
                    }
                    this.release(Completion::EndOfStream { discarded_bytes });
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> Drop for FrameStream<S> {
    fn drop(&mut self) {
        if self.source.is_some() {
            debug!("frame stream abandoned before completion, releasing source");
        }
    }
}
