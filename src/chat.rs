//! Turns decoded frames into chat text using the agent backend's
//! `content.parts[].text` convention. The decoder itself knows nothing about
//! this shape.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::decoder::FrameStream;
use crate::error::{BoxError, StreamError};
use crate::types::{AgentEvent, Completion, StreamFrame};

#[derive(Debug, Clone, PartialEq)]
pub enum ChatDelta {
    Text(String),
    AgentError(String),
}

impl ChatDelta {
    pub fn from_frame(frame: &StreamFrame) -> Option<Self> {
        let event: AgentEvent = match serde_json::from_value(frame.payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                debug!("frame does not look like an agent event: {}", e);
                return None;
            }
        };

        if let Some(error) = event.error {
            return Some(ChatDelta::AgentError(error));
        }
        event
            .joined_text()
            .filter(|text| !text.is_empty())
            .map(ChatDelta::Text)
    }
}

/// Maps a frame stream to the text it contributes, in arrival order.
pub fn text_deltas<S>(frames: S) -> impl Stream<Item = Result<ChatDelta, StreamError>>
where
    S: Stream<Item = Result<StreamFrame, StreamError>> + Unpin,
{
    async_stream::try_stream! {
        let mut frames = frames;
        while let Some(frame) = frames.next().await {
            let frame = frame?;
            if let Some(delta) = ChatDelta::from_frame(&frame) {
                yield delta;
            }
        }
    }
}

/// The assembled assistant message of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub completion: Completion,
    pub agent_errors: Vec<String>,
}

impl ChatReply {
    pub fn completed_normally(&self) -> bool {
        self.completion.completed_normally()
    }

    /// The agent reported an error somewhere in the reply.
    pub fn is_failed(&self) -> bool {
        !self.agent_errors.is_empty()
    }
}

pub async fn collect_reply<S, E>(frames: FrameStream<S>) -> Result<ChatReply, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    collect_reply_with(frames, |_| {}).await
}

/// Like [`collect_reply`], calling `on_text` with each piece as it arrives.
pub async fn collect_reply_with<S, E, F>(
    mut frames: FrameStream<S>,
    mut on_text: F,
) -> Result<ChatReply, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
    F: FnMut(&str),
{
    let mut text = String::new();
    let mut agent_errors = Vec::new();

    while let Some(frame) = frames.next().await {
        match ChatDelta::from_frame(&frame?) {
            Some(ChatDelta::Text(piece)) => {
                on_text(&piece);
                text.push_str(&piece);
            }
            Some(ChatDelta::AgentError(error)) => {
                warn!(%error, "agent reported an error");
                agent_errors.push(error);
            }
            None => {}
        }
    }

    let completion = frames
        .completion()
        .unwrap_or(Completion::EndOfStream { discarded_bytes: 0 });

    Ok(ChatReply {
        text,
        completion,
        agent_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;
    use std::io;

    type Body = stream::Iter<std::vec::IntoIter<Result<Bytes, io::Error>>>;

    fn body(parts: &[&str]) -> FrameStream<Body> {
        let chunks: Vec<Result<Bytes, io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        FrameStream::new(stream::iter(chunks))
    }

    #[test]
    fn test_delta_from_frame() {
        let frame = StreamFrame {
            payload: json!({"content": {"parts": [{"text": "Hi"}, {"text": " there"}]}}),
        };
        assert_eq!(ChatDelta::from_frame(&frame), Some(ChatDelta::Text("Hi there".into())));

        let frame = StreamFrame { payload: json!({"error": "quota"}) };
        assert_eq!(ChatDelta::from_frame(&frame), Some(ChatDelta::AgentError("quota".into())));

        let frame = StreamFrame { payload: json!(42) };
        assert_eq!(ChatDelta::from_frame(&frame), None);

        let frame = StreamFrame { payload: json!({"content": {"parts": [{"text": ""}]}}) };
        assert_eq!(ChatDelta::from_frame(&frame), None);
    }

    #[tokio::test]
    async fn test_text_deltas_in_order() {
        let frames = body(&[
            "data: {\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}\n",
            "data: {\"other\":true}\ndata: {\"content\":{\"parts\":[{\"text\":\"lo\"}]}}\n",
            "data: [DONE]\n",
        ]);
        let deltas: Vec<_> = text_deltas(frames).collect().await;
        let deltas: Vec<ChatDelta> = deltas.into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(
            deltas,
            vec![ChatDelta::Text("Hel".into()), ChatDelta::Text("lo".into())]
        );
    }

    #[tokio::test]
    async fn test_collect_reply() {
        let frames = body(&[
            "data: {\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}\n\n",
            "data: {\"content\":{\"parts\":[{\"text\":\"lo\"}]}}\n\ndata: [DONE]\n\n",
        ]);
        let mut seen = Vec::new();
        let reply = collect_reply_with(frames, |t| seen.push(t.to_string())).await.unwrap();

        assert_eq!(reply.text, "Hello");
        assert!(reply.completed_normally());
        assert!(reply.agent_errors.is_empty());
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_collect_reply_without_sentinel() {
        let frames = body(&[
            "data: {\"content\":{\"parts\":[{\"text\":\"partial\"}]}}\n",
            "data: {\"error\":\"agent crashed\"}\n",
        ]);
        let reply = collect_reply(frames).await.unwrap();

        assert_eq!(reply.text, "partial");
        assert!(!reply.completed_normally());
        assert!(reply.is_failed());
        assert_eq!(reply.agent_errors, vec!["agent crashed".to_string()]);
    }

    #[tokio::test]
    async fn test_error_only_reply_is_failed() {
        let frames = body(&["data: {\"error\": \"model quota exceeded\"}\n\n"]);
        let reply = collect_reply(frames).await.unwrap();

        assert!(reply.text.is_empty());
        assert!(reply.is_failed());
        assert_eq!(reply.agent_errors, vec!["model quota exceeded".to_string()]);
    }
}
