//! WebSocket upgrade + message loop for one dialogue session.
//!
//! Each client message is parsed as JSON and forwarded to core logic; we reply
//! with a single JSON message per request. When a question cycle completes the
//! socket schedules the next question after the configured pause. Reset and
//! start cancel a pending advance, and the controller drops any advance that
//! was scheduled before the latest reset.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, instrument};

use crate::auth::{AuthUser, TokenKind};
use crate::dialogue::DialogueEvent;
use crate::logic::{self, DialogueCommand};
use crate::protocol::{ClientWsMessage, ServerWsMessage, WsQuery};
use crate::routes::error::ApiError;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state, q), fields(session_id = %q.session))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<WsQuery>,
) -> Result<impl IntoResponse, ApiError> {
  let user: AuthUser = state.tokens.verify(&q.token, TokenKind::Access)?.into();
  state.store.get_session(&user.id, &q.session).await?;
  info!(target: "socratic_tutor", user_id = %user.id, "WebSocket upgrade requested");
  Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, user, q.session)))
}

#[instrument(level = "info", skip(socket, state, user), fields(user_id = %user.id))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, user: AuthUser, session_id: String) {
  info!(target: "socratic_tutor", "WebSocket connected");

  let ready = match logic::dialogue_view(&state, &user, &session_id).await {
    Ok(dialogue) => ServerWsMessage::Ready { session_id: session_id.clone(), dialogue },
    Err(e) => error_message(&e),
  };
  if send(&mut socket, &ready).await.is_err() {
    return;
  }

  let (advance_tx, mut advance_rx) = mpsc::channel::<u64>(4);
  let mut pending: Option<JoinHandle<()>> = None;

  loop {
    let reply = tokio::select! {
      msg = socket.recv() => match msg {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "socratic_tutor", "WS received: {:?}", &incoming);
            match to_command(incoming) {
              None => ServerWsMessage::Pong,
              Some(command) => {
                if matches!(command, DialogueCommand::Start | DialogueCommand::Reset) {
                  cancel(&mut pending);
                }
                dispatch(&state, &user, &session_id, command).await
              }
            }
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e), retry_later: false },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          debug!(target: "socratic_tutor", error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => continue,
      },
      Some(epoch) = advance_rx.recv() => {
        pending = None;
        dispatch(&state, &user, &session_id, DialogueCommand::Advance(epoch)).await
      }
    };

    if let ServerWsMessage::Events { events, dialogue } = &reply {
      if events.iter().any(|e| matches!(e, DialogueEvent::Advanced { .. })) {
        cancel(&mut pending);
        pending = Some(schedule_advance(&state, advance_tx.clone(), dialogue.epoch));
      }
    }

    if send(&mut socket, &reply).await.is_err() {
      break;
    }
  }

  cancel(&mut pending);
  info!(target: "socratic_tutor", "WebSocket disconnected");
}

/// `None` for messages that are answered without touching the dialogue.
fn to_command(msg: ClientWsMessage) -> Option<DialogueCommand> {
  let command = match msg {
    ClientWsMessage::Ping => return None,
    ClientWsMessage::Start => DialogueCommand::Start,
    ClientWsMessage::NextQuestion => DialogueCommand::NextQuestion,
    ClientWsMessage::SubmitAnswer { answer } => DialogueCommand::Answer(answer),
    ClientWsMessage::Hint => DialogueCommand::Hint,
    ClientWsMessage::Retry => DialogueCommand::Retry,
    ClientWsMessage::Reset => DialogueCommand::Reset,
  };
  Some(command)
}

async fn dispatch(state: &AppState, user: &AuthUser, session_id: &str, command: DialogueCommand) -> ServerWsMessage {
  match logic::run_dialogue(state, user, session_id, command).await {
    Ok(out) => ServerWsMessage::Events { events: out.events, dialogue: out.dialogue },
    Err(e) => error_message(&e),
  }
}

fn error_message(e: &ApiError) -> ServerWsMessage {
  ServerWsMessage::Error {
    message: e.to_string(),
    retry_later: matches!(e, ApiError::Tutor(t) if t.is_retry_later()),
  }
}

fn schedule_advance(state: &AppState, tx: mpsc::Sender<u64>, epoch: u64) -> JoinHandle<()> {
  let pause = state.config.advance_pause;
  tokio::spawn(async move {
    tokio::time::sleep(pause).await;
    let _ = tx.send(epoch).await;
  })
}

fn cancel(pending: &mut Option<JoinHandle<()>>) {
  if let Some(handle) = pending.take() {
    handle.abort();
  }
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await.map_err(|e| {
    error!(target: "socratic_tutor", error = %e, "WS send error");
    e
  })
}
