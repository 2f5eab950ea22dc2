//! API error type and its mapping onto status codes and the response envelope.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::error::TutorError;
use crate::protocol::ApiResponse;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Tutor(#[from] TutorError),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Conflict(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Tutor(TutorError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
      ApiError::Tutor(TutorError::Validation(_)) => StatusCode::BAD_REQUEST,
      ApiError::Tutor(_) => StatusCode::BAD_GATEWAY,
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::NotFound(..) => ApiError::NotFound(e.to_string()),
      StoreError::Conflict(msg) => ApiError::Conflict(msg),
    }
  }
}

impl From<AuthError> for ApiError {
  fn from(e: AuthError) -> Self {
    match e {
      AuthError::Hash(msg) => ApiError::Internal(msg),
      other => ApiError::Unauthorized(other.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "socratic_tutor", %status, error = %self, "Request failed");
    } else {
      warn!(target: "socratic_tutor", %status, error = %self, "Request rejected");
    }
    (status, Json(ApiResponse::<()>::failure(self.to_string()))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tutor_errors_map_to_gateway_statuses() {
    assert_eq!(ApiError::from(TutorError::RateLimited("429".into())).status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(ApiError::from(TutorError::Validation("bad level".into())).status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::from(TutorError::Evaluation("boom".into())).status(), StatusCode::BAD_GATEWAY);
  }

  #[test]
  fn store_and_auth_errors_map_to_client_statuses() {
    assert_eq!(ApiError::from(StoreError::NotFound("pdf", "x".into())).status(), StatusCode::NOT_FOUND);
    assert_eq!(ApiError::from(StoreError::Conflict("dup".into())).status(), StatusCode::CONFLICT);
    assert_eq!(ApiError::from(AuthError::Expired).status(), StatusCode::UNAUTHORIZED);
  }
}
