//! Local agent backend that speaks the same session and streaming protocol as
//! the ADK server. Its only agent echoes the user message back one character
//! per frame.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::sse_codec::DONE_SENTINEL;
use crate::types::{
    AgentEvent, AgentInfo, CreateSessionRequest, MessageRequest, Role, Session, SessionMessage,
    SessionQuery, StatusResponse,
};

#[derive(Clone, Default)]
pub struct DevState {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    messages: Arc<RwLock<HashMap<String, Vec<SessionMessage>>>>,
    char_delay: Duration,
}

impl DevState {
    pub fn new(char_delay: Duration) -> Self {
        Self {
            char_delay,
            ..Self::default()
        }
    }

    async fn push_message(&self, session_id: &str, role: Role, content: String) {
        let message = SessionMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content,
            timestamp: now_secs(),
        };
        self.messages
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }
}

/// Agents the backend advertises.
pub fn agent_catalog() -> Vec<AgentInfo> {
    vec![
        AgentInfo {
            id: "financial_agent".to_string(),
            name: "Financial Analysis Agent".to_string(),
            description: "Analyze financial statements, market trends, and KPIs".to_string(),
            tags: vec!["finance".into(), "analysis".into(), "kpi".into()],
            icon: "💰".to_string(),
        },
        AgentInfo {
            id: "drive_rag_agent".to_string(),
            name: "Google Drive RAG Agent".to_string(),
            description: "Search and analyze documents from Google Drive".to_string(),
            tags: vec!["drive".into(), "documents".into(), "rag".into()],
            icon: "📁".to_string(),
        },
        AgentInfo {
            id: "echo".to_string(),
            name: "Echo Agent".to_string(),
            description: "Streams the message back one character at a time".to_string(),
            tags: vec!["test".into()],
            icon: "🤖".to_string(),
        },
    ]
}

pub fn router(state: DevState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/agents", get(list_agents))
        .route("/agents/sessions", post(create_session).get(list_sessions))
        .route(
            "/agents/sessions/:session_id",
            get(get_session).delete(delete_session),
        )
        .route("/agents/sessions/:session_id/messages", get(get_messages))
        .route("/agents/:agent_id", get(get_agent))
        .route("/agents/:agent_id/stream_query", post(stream_query))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: DevState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("dev agent backend listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn health_check() -> &'static str {
    "OK"
}

fn now_secs() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

async fn list_agents() -> Json<Vec<AgentInfo>> {
    Json(agent_catalog())
}

async fn get_agent(Path(agent_id): Path<String>) -> Result<Json<AgentInfo>, StatusCode> {
    agent_catalog()
        .into_iter()
        .find(|agent| agent.id == agent_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_session(
    State(state): State<DevState>,
    Json(request): Json<CreateSessionRequest>,
) -> Json<Session> {
    let now = now_secs();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id: request.user_id,
        agent_id: request.app_name,
        created_at: now.clone(),
        updated_at: now,
    };
    state
        .sessions
        .write()
        .await
        .insert(session.id.clone(), session.clone());
    info!(session_id = %session.id, "created session");
    Json(session)
}

/// Sessions of one user, most recently updated first.
async fn list_sessions(
    State(state): State<DevState>,
    Query(query): Query<SessionQuery>,
) -> Json<Vec<Session>> {
    let mut sessions: Vec<Session> = state
        .sessions
        .read()
        .await
        .values()
        .filter(|s| s.user_id == query.user_id)
        .cloned()
        .collect();
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Json(sessions)
}

async fn get_session(
    State(state): State<DevState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, StatusCode> {
    state
        .sessions
        .read()
        .await
        .get(&session_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_messages(
    State(state): State<DevState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<SessionMessage>>, StatusCode> {
    if !state.sessions.read().await.contains_key(&session_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let messages = state
        .messages
        .read()
        .await
        .get(&session_id)
        .cloned()
        .unwrap_or_default();
    Ok(Json(messages))
}

async fn delete_session(
    State(state): State<DevState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    match state.sessions.write().await.remove(&session_id) {
        Some(_) => {
            state.messages.write().await.remove(&session_id);
            Ok(Json(StatusResponse {
                status: "deleted".to_string(),
            }))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn stream_query(
    State(state): State<DevState>,
    Path(agent_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&request.session_id)
            .ok_or(StatusCode::NOT_FOUND)?;
        session.updated_at = now_secs();
    }
    info!(%agent_id, session_id = %request.session_id, "streaming echo reply");

    state
        .push_message(&request.session_id, Role::User, request.message.clone())
        .await;
    let events = echo_events(state, request.session_id, request.message);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn echo_events(
    state: DevState,
    session_id: String,
    message: String,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    async_stream::try_stream! {
        for c in message.chars() {
            yield Event::default().json_data(AgentEvent::text(c.to_string()))?;
            if !state.char_delay.is_zero() {
                tokio::time::sleep(state.char_delay).await;
            }
        }
        state.push_message(&session_id, Role::Assistant, message.clone()).await;
        yield Event::default().data(DONE_SENTINEL);
    }
}
