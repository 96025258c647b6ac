//! Streaming chat client for ADK agent backends.
//!
//! The core is [`decoder::FrameStream`], which turns an HTTP response body of
//! `data: <json>` lines into a stream of JSON frames. [`client::AgentClient`]
//! opens those bodies, [`chat`] assembles them into replies, and [`db`] keeps
//! a local transcript.

pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod decoder;
pub mod devserver;
pub mod error;
pub mod sse_codec;
pub mod types;

pub use chat::{collect_reply, text_deltas, ChatDelta, ChatReply};
pub use client::{AgentClient, CredentialProvider, StaticToken};
pub use decoder::FrameStream;
pub use error::{ClientError, StreamError};
pub use types::{Completion, MalformedFrame, StreamFrame};
