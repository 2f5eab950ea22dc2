//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Multipart, Path, Query, State},
  http::StatusCode,
  Json,
};
use tracing::{info, instrument};

use crate::auth::AuthUser;
use crate::domain::SourceDocument;
use crate::logic::{self, DialogueCommand};
use crate::progress::ProgressStats;
use crate::protocol::*;
use crate::routes::error::ApiError;
use crate::state::AppState;
use crate::store::{Document, Message, SessionRecord, User};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn created<T: serde::Serialize>(message: &str, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
  (StatusCode::CREATED, Json(ApiResponse::ok_with(message, data)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthOut>> {
  Json(ApiResponse::ok(HealthOut { ok: true, oracle: state.oracle.name() }))
}

//
// Auth
//

#[instrument(level = "info", skip(state, body))]
pub async fn http_signup(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SignupIn>,
) -> Result<(StatusCode, Json<ApiResponse<AuthOut>>), ApiError> {
  let out = logic::signup(&state, body).await?;
  info!(target: "socratic_tutor", user_id = %out.user.id, "HTTP signup");
  Ok(created("Account created", out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_login(State(state): State<Arc<AppState>>, Json(body): Json<LoginIn>) -> ApiResult<AuthOut> {
  Ok(Json(ApiResponse::ok(logic::login(&state, body).await?)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_refresh(State(state): State<Arc<AppState>>, Json(body): Json<RefreshIn>) -> ApiResult<AuthOut> {
  Ok(Json(ApiResponse::ok(logic::refresh(&state, &body.refresh_token).await?)))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_me(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<User> {
  let me = state
    .store
    .get_user(&user.id)
    .await
    .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;
  Ok(Json(ApiResponse::ok(me)))
}

//
// Documents
//

/// Multipart fields: `file` (required) and `title` (optional).
#[instrument(level = "info", skip(state, multipart), fields(user_id = %user.id))]
pub async fn http_upload_pdf(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Document>>), ApiError> {
  let mut title = None;
  let mut file = None;
  while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
    let name = field.name().unwrap_or_default().to_string();
    match name.as_str() {
      "title" => title = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?),
      "file" | "pdf" => {
        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        file = Some(SourceDocument { filename, mime, bytes: bytes.to_vec() });
      }
      _ => {}
    }
  }
  let file = file.ok_or_else(|| ApiError::BadRequest("missing 'file' field".into()))?;
  let doc = logic::ingest_document(&state, &user, title, file).await?;
  Ok(created("Document uploaded", doc))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_list_pdfs(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Vec<Document>> {
  Ok(Json(ApiResponse::ok(state.store.list_documents(&user.id).await)))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_get_pdf(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
) -> ApiResult<Document> {
  Ok(Json(ApiResponse::ok(state.store.get_document(&user.id, &id).await?)))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user.id))]
pub async fn http_rename_pdf(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
  Json(body): Json<RenameIn>,
) -> ApiResult<Document> {
  if body.title.trim().is_empty() {
    return Err(ApiError::BadRequest("title cannot be empty".into()));
  }
  Ok(Json(ApiResponse::ok(state.store.rename_document(&user.id, &id, &body.title).await?)))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_delete_pdf(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
) -> ApiResult<()> {
  logic::delete_document(&state, &user, &id).await?;
  info!(target: "socratic_tutor", pdf_id = %id, "HTTP document deleted");
  Ok(Json(ApiResponse::ok_with("Document deleted", ())))
}

//
// Sessions
//

#[instrument(level = "info", skip(state, body), fields(user_id = %user.id, pdf_id = %body.pdf_id))]
pub async fn http_create_session(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Json(body): Json<CreateSessionIn>,
) -> Result<(StatusCode, Json<ApiResponse<SessionRecord>>), ApiError> {
  let session = state.store.create_session(&user.id, &body.pdf_id, body.title).await?;
  Ok(created("Session created", session))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_list_sessions(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Query(q): Query<SessionListQuery>,
) -> ApiResult<Vec<SessionRecord>> {
  Ok(Json(ApiResponse::ok(state.store.list_sessions(&user.id, q.pdf_id.as_deref()).await)))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
) -> ApiResult<SessionDetailOut> {
  let session = state.store.get_session(&user.id, &id).await?;
  let messages = state.store.messages(&id).await;
  let progress = state.store.progress(&id).await;
  Ok(Json(ApiResponse::ok(SessionDetailOut { session, messages, progress })))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user.id))]
pub async fn http_update_session(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
  Json(body): Json<SessionPatchIn>,
) -> ApiResult<SessionRecord> {
  Ok(Json(ApiResponse::ok(logic::update_session(&state, &user, &id, body.title, body.status).await?)))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user.id, kind = ?body.kind))]
pub async fn http_append_message(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
  Json(body): Json<AppendMessageIn>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), ApiError> {
  state.store.get_session(&user.id, &id).await?;
  if body.content.trim().is_empty() {
    return Err(ApiError::BadRequest("content cannot be empty".into()));
  }
  let message = state.store.append_message(&id, body.kind, &body.content).await?;
  Ok(created("Message saved", message))
}

//
// Dialogue
//

async fn dialogue(state: &AppState, user: &AuthUser, id: &str, command: DialogueCommand) -> ApiResult<DialogueOut> {
  let out = logic::run_dialogue(state, user, id, command).await?;
  info!(target: "socratic_tutor", session_id = %id, events = out.events.len(), phase = ?out.dialogue.phase, "HTTP dialogue command");
  Ok(Json(ApiResponse::ok(out)))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_dialogue_start(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<DialogueOut> {
  dialogue(&state, &user, &id, DialogueCommand::Start).await
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_dialogue_question(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<DialogueOut> {
  dialogue(&state, &user, &id, DialogueCommand::NextQuestion).await
}

#[instrument(level = "info", skip(state, body), fields(user_id = %user.id, answer_len = body.answer.len()))]
pub async fn http_dialogue_answer(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> ApiResult<DialogueOut> {
  dialogue(&state, &user, &id, DialogueCommand::Answer(body.answer)).await
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_dialogue_hint(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<DialogueOut> {
  dialogue(&state, &user, &id, DialogueCommand::Hint).await
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_dialogue_retry(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<DialogueOut> {
  dialogue(&state, &user, &id, DialogueCommand::Retry).await
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_dialogue_reset(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<DialogueOut> {
  dialogue(&state, &user, &id, DialogueCommand::Reset).await
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_dialogue_view(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<DialogueView> {
  Ok(Json(ApiResponse::ok(logic::dialogue_view(&state, &user, &id).await?)))
}

//
// Progress
//

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_stats(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<ProgressStats> {
  Ok(Json(ApiResponse::ok(logic::progress_stats(&state, &user, None).await?)))
}

#[instrument(level = "info", skip(state), fields(user_id = %user.id))]
pub async fn http_pdf_stats(
  State(state): State<Arc<AppState>>,
  user: AuthUser,
  Path(id): Path<String>,
) -> ApiResult<ProgressStats> {
  Ok(Json(ApiResponse::ok(logic::progress_stats(&state, &user, Some(&id)).await?)))
}
