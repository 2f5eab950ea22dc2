//! Error taxonomy for the tutor core and the oracle seam.
//!
//! Every oracle failure is re-raised at the dialogue boundary as the typed error of
//! the operation that triggered it. Rate-limit/quota failures keep their own variant
//! because the remedy (wait) differs from every other failure.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TutorError {
  #[error("text extraction failed: {0}")]
  Extraction(String),

  #[error("content analysis failed: {0}")]
  Analysis(String),

  #[error("generation failed: {0}")]
  Generation(String),

  #[error("answer evaluation failed: {0}")]
  Evaluation(String),

  #[error("hint generation failed: {0}")]
  Hint(String),

  /// Generic transport/auth failure, or a precondition the oracle call needs.
  #[error("oracle error: {0}")]
  Oracle(String),

  #[error("oracle is rate limited, retry later: {0}")]
  RateLimited(String),

  #[error("invalid input: {0}")]
  Validation(String),
}

impl TutorError {
  /// The message carried by any variant.
  pub fn message(&self) -> &str {
    match self {
      TutorError::Extraction(m)
      | TutorError::Analysis(m)
      | TutorError::Generation(m)
      | TutorError::Evaluation(m)
      | TutorError::Hint(m)
      | TutorError::Oracle(m)
      | TutorError::RateLimited(m)
      | TutorError::Validation(m) => m,
    }
  }

  /// Re-raise as the error kind of the calling operation, keeping the original message.
  /// Rate limits and validation failures keep their identity.
  pub fn rewrap(self, kind: fn(String) -> TutorError) -> TutorError {
    match self {
      TutorError::RateLimited(m) => TutorError::RateLimited(m),
      TutorError::Validation(m) => TutorError::Validation(m),
      other => {
        let msg = other.message().to_string();
        if looks_rate_limited(&msg) { TutorError::RateLimited(msg) } else { kind(msg) }
      }
    }
  }

  /// True when the caller should wait before retrying.
  pub fn is_retry_later(&self) -> bool {
    matches!(self, TutorError::RateLimited(_))
  }
}

/// Status-code phrasings of a 429. A bare "429" is too common (offsets, ids) to count.
const STATUS_429_PHRASES: &[&str] = &["http 429", "status 429", "status: 429", "status code 429", "code 429", "error 429"];

/// Heuristic detection of rate-limit/quota failures from an error message.
pub fn looks_rate_limited(message: &str) -> bool {
  let m = message.to_lowercase();
  STATUS_429_PHRASES.iter().any(|p| m.contains(p))
    || m.contains("rate limit")
    || m.contains("rate_limit")
    || m.contains("too many requests")
    || m.contains("quota")
    || m.contains("resource_exhausted")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rewrap_keeps_message_and_changes_kind() {
    let e = TutorError::Oracle("connection reset".into()).rewrap(TutorError::Evaluation);
    assert_eq!(e, TutorError::Evaluation("connection reset".into()));
  }

  #[test]
  fn rewrap_detects_quota_wording() {
    let e = TutorError::Generation("OpenAI HTTP 429: You exceeded your current quota".into())
      .rewrap(TutorError::Hint);
    assert!(e.is_retry_later());
    assert!(e.message().contains("quota"));
  }

  #[test]
  fn rate_limited_survives_rewrap() {
    let e = TutorError::RateLimited("slow down".into()).rewrap(TutorError::Generation);
    assert_eq!(e, TutorError::RateLimited("slow down".into()));
  }

  #[test]
  fn plain_failures_are_not_rate_limits() {
    assert!(!looks_rate_limited("JSON parse error: expected value at line 1"));
    assert!(looks_rate_limited("Too Many Requests"));
    assert!(looks_rate_limited("upstream returned HTTP 429"));
  }

  #[test]
  fn parse_error_at_column_429_is_not_a_rate_limit() {
    let e = TutorError::Oracle("JSON parse error: trailing characters at line 1 column 429".into())
      .rewrap(TutorError::Evaluation);
    assert!(!e.is_retry_later());
    assert_eq!(e, TutorError::Evaluation("JSON parse error: trailing characters at line 1 column 429".into()));
  }
}
