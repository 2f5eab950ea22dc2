//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Account signup/login/refresh
//!   - Document ingestion (extract + analyze through the oracle)
//!   - Session CRUD
//!   - Dialogue commands: run the controller, persist new turns as messages,
//!     update progress counters and snapshot the session state
//!   - Progress statistics

use tracing::{debug, info, instrument};

use crate::auth::{hash_password, verify_password, AuthUser, TokenKind};
use crate::dialogue::{DialogueController, DialogueEvent};
use crate::domain::{MessageType, Quality, SourceDocument, Turn, TurnKind};
use crate::error::TutorError;
use crate::progress::{compute_thinking_score, compute_time_spent, summarize, ProgressStats};
use crate::protocol::{AuthOut, DialogueOut, DialogueView, LoginIn, SignupIn};
use crate::routes::error::ApiError;
use crate::state::AppState;
use crate::store::{Document, NewDocument, SessionPatch, SessionRecord, SessionStatus};

const MIN_PASSWORD_CHARS: usize = 8;

/// One dialogue operation, as issued by either transport.
#[derive(Clone, Debug)]
pub enum DialogueCommand {
  Start,
  NextQuestion,
  Answer(String),
  Hint,
  Retry,
  Reset,
  /// Scheduled advance carrying the epoch it was scheduled in.
  Advance(u64),
}

//
// Accounts
//

#[instrument(level = "info", skip(state, body), fields(email = %body.email))]
pub async fn signup(state: &AppState, body: SignupIn) -> Result<AuthOut, ApiError> {
  let email = body.email.trim();
  if !email.contains('@') || email.len() < 3 {
    return Err(ApiError::BadRequest("a valid email is required".into()));
  }
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("name is required".into()));
  }
  if body.password.chars().count() < MIN_PASSWORD_CHARS {
    return Err(ApiError::BadRequest(format!("password must be at least {MIN_PASSWORD_CHARS} characters")));
  }
  if state.store.find_user_by_email(email).await.is_some() {
    return Err(ApiError::Conflict("email already registered".into()));
  }

  let cost = state.config.bcrypt_cost;
  let password = body.password;
  let hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

  let user = state.store.create_user(email, &body.name, hash).await?;
  let tokens = state.tokens.issue(&user)?;
  Ok(AuthOut { user, tokens })
}

#[instrument(level = "info", skip(state, body), fields(email = %body.email))]
pub async fn login(state: &AppState, body: LoginIn) -> Result<AuthOut, ApiError> {
  let invalid = || ApiError::Unauthorized("invalid email or password".into());
  let user = state.store.find_user_by_email(&body.email).await.ok_or_else(invalid)?;

  let hash = user.password_hash.clone();
  let password = body.password;
  let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;
  if !ok {
    debug!(target: "socratic_tutor", user_id = %user.id, "Password mismatch");
    return Err(invalid());
  }

  let tokens = state.tokens.issue(&user)?;
  info!(target: "socratic_tutor", user_id = %user.id, "User logged in");
  Ok(AuthOut { user, tokens })
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<AuthOut, ApiError> {
  let claims = state.tokens.verify(refresh_token, TokenKind::Refresh)?;
  let user = state
    .store
    .get_user(&claims.sub)
    .await
    .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;
  let tokens = state.tokens.issue(&user)?;
  Ok(AuthOut { user, tokens })
}

//
// Documents
//

/// Extract and analyze an uploaded document, then store it.
#[instrument(level = "info", skip(state, doc), fields(user_id = %user.id, filename = %doc.filename, bytes = doc.bytes.len()))]
pub async fn ingest_document(
  state: &AppState,
  user: &AuthUser,
  title: Option<String>,
  doc: SourceDocument,
) -> Result<Document, ApiError> {
  if doc.bytes.is_empty() {
    return Err(ApiError::BadRequest("uploaded file is empty".into()));
  }
  if doc.bytes.len() > state.config.max_upload_bytes {
    return Err(ApiError::BadRequest(format!("file exceeds {} bytes", state.config.max_upload_bytes)));
  }

  let text = state.oracle.extract_text(&doc).await?;
  if text.trim().is_empty() {
    return Err(TutorError::Extraction("no text could be extracted".into()).into());
  }
  let analysis = state.oracle.analyze_content(&text).await?;

  let title = title
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
    .unwrap_or_else(|| title_from_filename(&doc.filename));
  let stored = state
    .store
    .insert_document(
      &user.id,
      NewDocument {
        title,
        filename: doc.filename,
        mime: doc.mime,
        size_bytes: doc.bytes.len(),
        content: text,
        topics: analysis.topics,
        concepts: analysis.concepts,
      },
    )
    .await;
  info!(target: "socratic_tutor", pdf_id = %stored.id, topics = stored.topics.len(), "Document ingested");
  Ok(stored)
}

pub async fn delete_document(state: &AppState, user: &AuthUser, pdf_id: &str) -> Result<(), ApiError> {
  let removed = state.store.delete_document(&user.id, pdf_id).await?;
  state.forget(&removed).await;
  Ok(())
}

fn title_from_filename(filename: &str) -> String {
  let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
  let stem = stem.trim();
  if stem.is_empty() { "Untitled document".into() } else { stem.to_string() }
}

//
// Sessions
//

pub async fn update_session(
  state: &AppState,
  user: &AuthUser,
  session_id: &str,
  title: Option<String>,
  status: Option<SessionStatus>,
) -> Result<SessionRecord, ApiError> {
  if title.as_deref().is_some_and(|t| t.trim().is_empty()) {
    return Err(ApiError::BadRequest("title cannot be empty".into()));
  }
  Ok(state.store.update_session(&user.id, session_id, SessionPatch { title, status }).await?)
}

//
// Dialogue
//

/// Run one dialogue command against a session's live controller.
///
/// New transcript turns are persisted as messages and the state snapshot is
/// saved even when the command fails, because a failed evaluation still keeps
/// the student's answer.
#[instrument(level = "info", skip(state, user), fields(user_id = %user.id))]
pub async fn run_dialogue(
  state: &AppState,
  user: &AuthUser,
  session_id: &str,
  command: DialogueCommand,
) -> Result<DialogueOut, ApiError> {
  let record = state.store.get_session(&user.id, session_id).await?;
  if record.status == SessionStatus::Completed && !matches!(command, DialogueCommand::Reset) {
    return Err(ApiError::BadRequest("session is completed".into()));
  }

  let live = state.controller(&record).await?;
  let mut ctrl = live.lock().await;
  let before = ctrl.state().transcript.len();

  let result = match command {
    DialogueCommand::Start => {
      let doc = state.store.get_document(&user.id, &record.pdf_id).await?;
      ctrl.start_session(&doc.content, &doc.topics).await
    }
    DialogueCommand::NextQuestion => ctrl.request_next_question().await,
    DialogueCommand::Answer(answer) => ctrl.submit_answer(&answer).await,
    DialogueCommand::Hint => ctrl.request_hint().await,
    DialogueCommand::Retry => ctrl.retry().await,
    DialogueCommand::Reset => {
      ctrl.reset_session();
      Ok(Vec::new())
    }
    DialogueCommand::Advance(epoch) => ctrl.advance_if_current(epoch).await,
  };

  persist_turns(state, &record.id, &ctrl.state().transcript, before).await?;
  state.store.save_state(&record.id, ctrl.state().clone()).await?;

  let events = result?;
  record_progress(state, &record, &events).await?;
  Ok(DialogueOut { events, dialogue: view_of(&ctrl) })
}

/// Current controller snapshot without running anything.
pub async fn dialogue_view(state: &AppState, user: &AuthUser, session_id: &str) -> Result<DialogueView, ApiError> {
  let record = state.store.get_session(&user.id, session_id).await?;
  let live = state.controller(&record).await?;
  let ctrl = live.lock().await;
  Ok(view_of(&ctrl))
}

pub fn view_of(ctrl: &DialogueController) -> DialogueView {
  DialogueView {
    phase: ctrl.phase(),
    epoch: ctrl.epoch(),
    topics: ctrl.topics().to_vec(),
    can_retry: ctrl.has_failed_operation(),
    state: ctrl.state().clone(),
  }
}

/// Persist turns appended since `before`; a reset leaves nothing to persist.
async fn persist_turns(state: &AppState, session_id: &str, transcript: &[Turn], before: usize) -> Result<(), ApiError> {
  let Some(new_turns) = transcript.get(before..) else { return Ok(()) };
  for (offset, turn) in new_turns.iter().enumerate() {
    let kind = message_type(turn, before + offset);
    state.store.append_message(session_id, kind, &turn.content).await?;
  }
  Ok(())
}

fn message_type(turn: &Turn, index: usize) -> MessageType {
  match turn.kind {
    TurnKind::Question => MessageType::AiQuestion,
    TurnKind::Answer => MessageType::UserAnswer,
    TurnKind::Explanation if index == 0 => MessageType::Intro,
    TurnKind::Explanation => MessageType::AiExplanation,
  }
}

/// Counters follow the events; the thinking score is recomputed after every evaluation.
async fn record_progress(state: &AppState, record: &SessionRecord, events: &[DialogueEvent]) -> Result<(), ApiError> {
  let mut asked = 0;
  let mut strong = 0;
  let mut hints = 0;
  let mut evaluated = false;
  for event in events {
    match event {
      DialogueEvent::Question { .. } => asked += 1,
      DialogueEvent::Hint { .. } => hints += 1,
      DialogueEvent::Evaluated { quality, .. } => {
        evaluated = true;
        if *quality == Quality::Strong {
          strong += 1;
        }
      }
      _ => {}
    }
  }
  if asked == 0 && hints == 0 && !evaluated {
    return Ok(());
  }

  let minutes = compute_time_spent(record.started_at, None);
  let progress = state
    .store
    .update_progress(&record.id, |p| {
      p.questions_asked += asked;
      p.correct_answers += strong;
      p.hints_used += hints;
      if evaluated {
        p.thinking_score = Some(compute_thinking_score(p.correct_answers, p.hints_used, Some(minutes), p.questions_asked));
      }
    })
    .await?;
  debug!(target: "socratic_tutor", session_id = %record.id, asked = progress.questions_asked, correct = progress.correct_answers, hints = progress.hints_used, score = ?progress.thinking_score, "Progress updated");
  Ok(())
}

//
// Statistics
//

pub async fn progress_stats(state: &AppState, user: &AuthUser, pdf_id: Option<&str>) -> Result<ProgressStats, ApiError> {
  if let Some(id) = pdf_id {
    state.store.get_document(&user.id, id).await?;
  }
  let figures = state.store.session_figures(&user.id, pdf_id).await;
  Ok(summarize(&figures))
}
