//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;
use crate::dialogue::{DialogueEvent, Phase};
use crate::domain::MessageType;
use crate::session::SessionState;
use crate::store::{Message, Progress, SessionRecord, SessionStatus, User};

/// Envelope wrapped around every HTTP response body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data), error: None }
    }

    pub fn ok_with(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, message: None, data: None, error: Some(error.into()) }
    }
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Start,
    NextQuestion,
    SubmitAnswer { answer: String },
    Hint,
    Retry,
    Reset,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    /// Sent once after the socket attaches to a session.
    Ready {
        #[serde(rename = "sessionId")]
        session_id: String,
        dialogue: DialogueView,
    },
    Events {
        events: Vec<DialogueEvent>,
        dialogue: DialogueView,
    },
    Error {
        message: String,
        #[serde(rename = "retryLater")]
        retry_later: bool,
    },
}

/// Controller snapshot exposed to clients after each operation.
#[derive(Clone, Debug, Serialize)]
pub struct DialogueView {
    pub phase: Phase,
    pub epoch: u64,
    pub topics: Vec<String>,
    #[serde(rename = "canRetry")]
    pub can_retry: bool,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct DialogueOut {
    pub events: Vec<DialogueEvent>,
    pub dialogue: DialogueView,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct SignupIn {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshIn {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthOut {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct RenameIn {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionIn {
    #[serde(rename = "pdfId")]
    pub pdf_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    #[serde(rename = "pdfId")]
    pub pdf_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionPatchIn {
    pub title: Option<String>,
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailOut {
    pub session: SessionRecord,
    pub messages: Vec<Message>,
    pub progress: Option<Progress>,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageIn {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub answer: String,
}

/// Query string of the WebSocket upgrade; browsers cannot set headers there.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
    pub session: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub oracle: &'static str,
}
