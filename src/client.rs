//! HTTP side of a chat: sessions, auth headers, timeouts and retries. The
//! byte stream it opens is handed to [`FrameStream`] untouched.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::{RequestBuilder, Response, Url};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chat::{collect_reply, ChatReply};
use crate::config::ClientConfig;
use crate::decoder::FrameStream;
use crate::error::ClientError;
use crate::types::{
    AgentInfo, CreateSessionRequest, MessageRequest, Session, SessionMessage, SessionQuery,
    StatusResponse,
};

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;
pub type ChatStream = FrameStream<BodyStream>;

/// Supplies the bearer token for each request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<Option<String>, ClientError>;
}

pub struct StaticToken(pub Option<String>);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AgentClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            credentials: Arc::new(StaticToken(config.api_token.clone())),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        Ok(match self.credentials.bearer_token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = self.authorized(builder).await?.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>, ClientError> {
        Ok(self.send(self.http.get(self.url("/agents"))).await?.json().await?)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, ClientError> {
        let url = self.url(&format!("/agents/{}", agent_id));
        Ok(self.send(self.http.get(url)).await?.json().await?)
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        app_name: &str,
    ) -> Result<Session, ClientError> {
        let request = CreateSessionRequest {
            user_id: user_id.to_string(),
            app_name: app_name.to_string(),
        };
        let session: Session = self
            .send(self.http.post(self.url("/agents/sessions")).json(&request))
            .await?
            .json()
            .await?;
        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Sessions of `user_id`, most recently updated first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, ClientError> {
        let query = SessionQuery {
            user_id: user_id.to_string(),
        };
        let builder = self.http.get(self.url("/agents/sessions")).query(&query);
        Ok(self.send(builder).await?.json().await?)
    }

    pub async fn get_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<SessionMessage>, ClientError> {
        let url = self.url(&format!("/agents/sessions/{}/messages", session_id));
        Ok(self.send(self.http.get(url)).await?.json().await?)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session, ClientError> {
        let url = self.url(&format!("/agents/sessions/{}", session_id));
        Ok(self.send(self.http.get(url)).await?.json().await?)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("/agents/sessions/{}", session_id));
        let status: StatusResponse = self.send(self.http.delete(url)).await?.json().await?;
        debug!(session_id, status = %status.status, "session deleted");
        Ok(())
    }

    /// Posts `message` and returns the decoded reply stream.
    ///
    /// Only opening the stream is retried. Once the body starts arriving the
    /// caller owns it, and a failure mid-stream ends that stream for good.
    pub async fn open_stream(
        &self,
        agent_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<ChatStream, ClientError> {
        let url = self.url(&format!("/agents/{}/stream_query", agent_id));
        let request = MessageRequest {
            session_id: session_id.to_string(),
            message: message.to_string(),
        };

        let mut attempt = 0;
        loop {
            let builder = self
                .http
                .post(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&request);

            match self.send(builder).await {
                Ok(response) => {
                    info!(agent_id, session_id, attempt, "reply stream opened");
                    let body: BodyStream = Box::pin(response.bytes_stream());
                    return Ok(FrameStream::new(body));
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    warn!(attempt, ?delay, error = %e, "opening reply stream failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends one message and waits for the whole reply.
    pub async fn send_message(
        &self,
        agent_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<ChatReply, ClientError> {
        let frames = self.open_stream(agent_id, session_id, message).await?;
        Ok(collect_reply(frames).await?)
    }
}

/// Upper bound on the pause between two attempts to open a stream.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `base * 2^attempt`, capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}
