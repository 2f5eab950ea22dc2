//! Runtime configuration: environment variables plus optional prompt overrides in TOML.
//!
//! See `AppConfig` for the environment and `Prompts` for the TOML schema
//! (`[prompts]` table, every key optional).

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfigFile {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts used by the OpenAI oracle. Templates use `{key}` placeholders.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub tutor_system: String,
  pub extract_system: String,
  pub analyze_system: String,
  pub analyze_user_template: String,
  pub intro_user_template: String,
  pub question_user_template: String,
  pub evaluate_system: String,
  pub evaluate_user_template: String,
  pub explanation_user_template: String,
  pub hint_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      tutor_system: "You are a patient Socratic tutor. You never hand out answers; you guide the student with questions grounded in the lecture material.".into(),
      extract_system: "Extract the full readable text of the attached lecture document. Output ONLY the text, preserving paragraph breaks. No commentary.".into(),
      analyze_system: "You analyze lecture material. Respond ONLY with strict JSON.".into(),
      analyze_user_template: "Lecture text:\n{content}\n\nReturn JSON {\"topics\": [3-7 short topic names in teaching order], \"concepts\": [5-15 key concepts]}.".into(),
      intro_user_template: "Lecture text:\n{content}\n\nWrite a short, friendly introduction (3-5 sentences) to this material at a {level} level. {guidance}\nFocus topic: {topic}.\nEnd by telling the student that you will ask questions to help them think it through.".into(),
      question_user_template: "Lecture text:\n{content}\n\nConversation so far:\n{history}\n\nDifficulty: {level}. {guidance}\nFocus topic: {topic}.\nAsk exactly ONE open-ended Socratic question that makes the student reason about the material. Do not repeat earlier questions. Output ONLY the question.".into(),
      evaluate_system: "You evaluate student answers for a Socratic tutor. Respond ONLY with strict JSON. Feedback must be a guiding question or nudge and must NEVER state the answer.".into(),
      evaluate_user_template: "Lecture text:\n{content}\n\nQuestion: {question}\nStudent answer: {answer}\nDifficulty: {level}.\n\nReturn JSON {\"quality\": \"strong\" | \"partial\" | \"needs_work\", \"feedback\": string}. 'strong' means the reasoning is correct and complete for this difficulty.".into(),
      explanation_user_template: "Lecture text:\n{content}\n\nQuestion: {question}\nStudent answer: {answer}\nDifficulty: {level}.\n\nThe student answered well. In 2-4 sentences, affirm what they got right and deepen the idea with one connection from the material.".into(),
      hint_user_template: "Lecture text:\n{content}\n\nQuestion: {question}\nStudent's latest answer: {answer}\nDifficulty: {level}.\nThis is hint {number} of 3. {guidance}\nOutput ONLY the hint, one or two sentences, without revealing the answer.".into(),
    }
  }
}

/// Everything read from the environment at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  pub jwt_secret: String,
  pub jwt_refresh_secret: String,
  pub access_token_ttl: Duration,
  pub refresh_token_ttl: Duration,
  pub bcrypt_cost: u32,
  pub max_upload_bytes: usize,
  /// Pause between a completed question and the next one on live sockets.
  pub advance_pause: Duration,
  pub prompts: Prompts,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      jwt_secret: "dev-access-secret-change-me".into(),
      jwt_refresh_secret: "dev-refresh-secret-change-me".into(),
      access_token_ttl: Duration::from_secs(15 * 60),
      refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
      bcrypt_cost: bcrypt::DEFAULT_COST,
      max_upload_bytes: 20 * 1024 * 1024,
      advance_pause: Duration::from_millis(1500),
      prompts: Prompts::default(),
    }
  }
}

impl AppConfig {
  pub fn from_env() -> Self {
    let d = AppConfig::default();
    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
      warn!(target: "socratic_tutor", "JWT_SECRET not set; using an insecure development secret");
      d.jwt_secret.clone()
    });
    let jwt_refresh_secret = std::env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| format!("{jwt_secret}-refresh"));

    Self {
      port: env_parse("PORT").unwrap_or(d.port),
      jwt_secret,
      jwt_refresh_secret,
      access_token_ttl: env_parse::<u64>("ACCESS_TOKEN_TTL_MINUTES")
        .map(|m| Duration::from_secs(m * 60))
        .unwrap_or(d.access_token_ttl),
      refresh_token_ttl: env_parse::<u64>("REFRESH_TOKEN_TTL_DAYS")
        .map(|days| Duration::from_secs(days * 24 * 3600))
        .unwrap_or(d.refresh_token_ttl),
      bcrypt_cost: env_parse("BCRYPT_COST").unwrap_or(d.bcrypt_cost),
      max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(d.max_upload_bytes),
      advance_pause: env_parse::<u64>("ADVANCE_PAUSE_MS").map(Duration::from_millis).unwrap_or(d.advance_pause),
      prompts: load_config_file_from_env().map(|c| c.prompts).unwrap_or_default(),
    }
  }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
  let raw = std::env::var(key).ok()?;
  match raw.parse::<T>() {
    Ok(v) => Some(v),
    Err(_) => {
      warn!(target: "socratic_tutor", %key, value = %raw, "Ignoring unparsable environment value");
      None
    }
  }
}

/// Attempt to load prompt overrides from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_file_from_env() -> Option<TutorConfigFile> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TutorConfigFile>(&s) {
      Ok(cfg) => {
        info!(target: "socratic_tutor", %path, "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "socratic_tutor", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "socratic_tutor", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_prompt_overrides_keep_defaults() {
    let cfg: TutorConfigFile = toml::from_str(
      r#"
      [prompts]
      tutor_system = "Be brief."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.tutor_system, "Be brief.");
    assert_eq!(cfg.prompts.hint_user_template, Prompts::default().hint_user_template);
  }

  #[test]
  fn empty_file_is_all_defaults() {
    let cfg: TutorConfigFile = toml::from_str("").unwrap();
    assert!(cfg.prompts.question_user_template.contains("{history}"));
  }
}
