//! OpenAI chat-completions implementation of the tutor oracle.
//!
//! We only call chat.completions and request either plain text or a JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{ContentAnalysis, Difficulty, Evaluation, HintLevel, Quality, SourceDocument, Turn};
use crate::error::TutorError;
use crate::normalize::{clean_reply, extract_json_payload, reveals_answer, with_transition};
use crate::oracle::{bound_analysis, render_history, TutorOracle};
use crate::util::{excerpt, fill_template, trunc_for_log};

/// Upper bound of lecture text sent with a single prompt.
const MAX_CONTENT_CHARS: usize = 12_000;

const STRICT_NO_ANSWER_SYSTEM: &str = r#"
You are a Socratic tutor.

CRITICAL RULE: Never state, quote, or paraphrase the answer to the question.
Do not write phrases like "the answer is" or "the correct answer".

Respond only with a guiding question or a nudge that helps the student reason
toward the answer on their own.
"#;

/// Strict variant for evaluations, which must stay in the JSON shape.
const STRICT_NO_ANSWER_JSON_SYSTEM: &str = r#"
You evaluate student answers for a Socratic tutor. Respond ONLY with strict JSON
{"quality": "strong" | "partial" | "needs_work", "feedback": string}.

CRITICAL RULE: the feedback must never state, quote, or paraphrase the answer.
Do not write phrases like "the answer is" or "the correct answer". Feedback is a
guiding question or a nudge.
"#;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub prompts: Prompts,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, prompts })
  }

  async fn send(&self, req: &ChatCompletionRequest) -> Result<String, TutorError> {
    let url = format!("{}/chat/completions", self.base_url);
    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "socratic-tutor/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req).send().await.map_err(|e| TutorError::Oracle(e.to_string()))?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(target: "oracle", %status, elapsed = ?start.elapsed(), "OpenAI call failed");
      return Err(classify_status(status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| TutorError::Oracle(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(target: "oracle", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();
    info!(target: "oracle", elapsed = ?start.elapsed(), reply_len = text.len(), "OpenAI reply received");
    Ok(text)
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, TutorError> {
    let req = ChatCompletionRequest::new(model, system, MessageContent::Text(user.into()), temperature, None);
    let text = self.send(&req).await?;
    if text.is_empty() {
      return Err(TutorError::Generation("model returned an empty reply".into()));
    }
    Ok(text)
  }

  /// JSON-object chat completion. Tolerates replies wrapped in a fenced code block.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, TutorError> {
    let format = Some(ResponseFormat { r#type: "json_object".into() });
    let req = ChatCompletionRequest::new(model, system, MessageContent::Text(user.into()), temperature, format);
    let text = self.send(&req).await?;
    let payload = extract_json_payload(&text)
      .ok_or_else(|| TutorError::Oracle(format!("no JSON object in reply: {}", trunc_for_log(&text, 80))))?;
    serde_json::from_str::<T>(payload).map_err(|e| TutorError::Oracle(format!("JSON parse error: {e}")))
  }

  fn level_pairs(difficulty: Difficulty) -> [(&'static str, &'static str); 2] {
    [("level", difficulty.label()), ("guidance", difficulty.guidance())]
  }

  /// Ask once more with the strict no-answer system prompt when a reply gives the answer away.
  async fn guard_no_answer(&self, reply: String, user: &str) -> Result<String, TutorError> {
    if !reveals_answer(&reply) {
      return Ok(reply);
    }
    warn!(target: "oracle", "Reply reveals the answer; retrying with strict prompt");
    let second = clean_reply(&self.chat_plain(&self.fast_model, STRICT_NO_ANSWER_SYSTEM, user, 0.3).await?);
    if reveals_answer(&second) {
      warn!(target: "oracle", "Strict retry still reveals the answer; keeping it");
    }
    Ok(second)
  }
}

#[async_trait]
impl TutorOracle for OpenAI {
  fn name(&self) -> &'static str { "openai" }

  #[instrument(level = "info", skip(self, document), fields(filename = %document.filename, size = document.bytes.len()))]
  async fn extract_text(&self, document: &SourceDocument) -> Result<String, TutorError> {
    let text = if document.is_pdf() {
      let encoded = base64::engine::general_purpose::STANDARD.encode(&document.bytes);
      let content = MessageContent::Parts(vec![
        ContentPart::Text { text: "Extract the text of this document.".into() },
        ContentPart::File {
          file: FilePart {
            filename: document.filename.clone(),
            file_data: format!("data:application/pdf;base64,{encoded}"),
          },
        },
      ]);
      let req = ChatCompletionRequest::new(&self.fast_model, &self.prompts.extract_system, content, 0.0, None);
      self.send(&req).await.map_err(|e| e.rewrap(TutorError::Extraction))?
    } else if document.is_text() {
      String::from_utf8(document.bytes.clone()).map_err(|e| TutorError::Extraction(format!("not valid UTF-8 text: {e}")))?
    } else {
      return Err(TutorError::Extraction(format!("unsupported document type '{}'", document.mime)));
    };

    let text = text.trim().to_string();
    if text.is_empty() {
      return Err(TutorError::Extraction("no text could be extracted".into()));
    }
    Ok(text)
  }

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len()))]
  async fn analyze_content(&self, text: &str) -> Result<ContentAnalysis, TutorError> {
    let user = fill_template(&self.prompts.analyze_user_template, &[("content", excerpt(text, MAX_CONTENT_CHARS))]);
    let analysis: ContentAnalysis = self
      .chat_json(&self.strong_model, &self.prompts.analyze_system, &user, 0.2)
      .await
      .map_err(|e| e.rewrap(TutorError::Analysis))?;
    bound_analysis(analysis)
  }

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), difficulty = difficulty.level()))]
  async fn generate_intro(&self, text: &str, difficulty: Difficulty, focus_topic: Option<&str>) -> Result<String, TutorError> {
    let [level, guidance] = Self::level_pairs(difficulty);
    let user = fill_template(
      &self.prompts.intro_user_template,
      &[("content", excerpt(text, MAX_CONTENT_CHARS)), level, guidance, ("topic", focus_topic.unwrap_or("the whole lecture"))],
    );
    let reply = self.chat_plain(&self.strong_model, &self.prompts.tutor_system, &user, 0.7).await;
    reply.map(|t| clean_reply(&t)).map_err(|e| e.rewrap(TutorError::Generation))
  }

  #[instrument(level = "info", skip(self, text, history), fields(text_len = text.len(), history = history.len(), difficulty = difficulty.level()))]
  async fn generate_question(
    &self,
    text: &str,
    difficulty: Difficulty,
    history: &[Turn],
    focus_topic: Option<&str>,
  ) -> Result<String, TutorError> {
    let [level, guidance] = Self::level_pairs(difficulty);
    let history = render_history(history);
    let user = fill_template(
      &self.prompts.question_user_template,
      &[
        ("content", excerpt(text, MAX_CONTENT_CHARS)),
        ("history", if history.is_empty() { "(none yet)" } else { history.as_str() }),
        level,
        guidance,
        ("topic", focus_topic.unwrap_or("any part of the lecture")),
      ],
    );
    let reply = self.chat_plain(&self.strong_model, &self.prompts.tutor_system, &user, 0.8).await;
    reply.map(|t| clean_reply(&t)).map_err(|e| e.rewrap(TutorError::Generation))
  }

  #[instrument(level = "info", skip(self, question, answer, text), fields(answer_len = answer.len(), difficulty = difficulty.level()))]
  async fn evaluate_answer(&self, question: &str, answer: &str, text: &str, difficulty: Difficulty) -> Result<Evaluation, TutorError> {
    #[derive(Deserialize)]
    struct Raw { quality: String, feedback: String }

    let user = fill_template(
      &self.prompts.evaluate_user_template,
      &[("content", excerpt(text, MAX_CONTENT_CHARS)), ("question", question), ("answer", answer), ("level", difficulty.label())],
    );
    let raw: Raw = self
      .chat_json(&self.strong_model, &self.prompts.evaluate_system, &user, 0.2)
      .await
      .map_err(|e| e.rewrap(TutorError::Evaluation))?;
    let quality = parse_quality(&raw.quality)
      .ok_or_else(|| TutorError::Evaluation(format!("unknown quality label '{}'", raw.quality)))?;

    let feedback = clean_reply(&raw.feedback);
    let feedback = if quality == Quality::Strong || !reveals_answer(&feedback) {
      feedback
    } else {
      // The retry keeps the JSON contract; only its feedback field is used.
      warn!(target: "oracle", "Feedback reveals the answer; retrying with strict prompt");
      let strict: Raw = self
        .chat_json(&self.fast_model, STRICT_NO_ANSWER_JSON_SYSTEM, &user, 0.3)
        .await
        .map_err(|e| e.rewrap(TutorError::Evaluation))?;
      let second = clean_reply(&strict.feedback);
      if reveals_answer(&second) {
        warn!(target: "oracle", "Strict retry still reveals the answer; keeping it");
      }
      second
    };
    Ok(Evaluation { quality, feedback })
  }

  #[instrument(level = "info", skip(self, question, answer, text), fields(difficulty = difficulty.level()))]
  async fn generate_explanation(&self, question: &str, answer: &str, text: &str, difficulty: Difficulty) -> Result<String, TutorError> {
    let user = fill_template(
      &self.prompts.explanation_user_template,
      &[("content", excerpt(text, MAX_CONTENT_CHARS)), ("question", question), ("answer", answer), ("level", difficulty.label())],
    );
    let reply = self.chat_plain(&self.strong_model, &self.prompts.tutor_system, &user, 0.5).await;
    reply.map(|t| with_transition(&clean_reply(&t))).map_err(|e| e.rewrap(TutorError::Generation))
  }

  #[instrument(level = "info", skip(self, question, answer, text), fields(hint = hint.number(), difficulty = difficulty.level()))]
  async fn generate_hint(
    &self,
    question: &str,
    answer: Option<&str>,
    hint: HintLevel,
    text: &str,
    difficulty: Difficulty,
  ) -> Result<String, TutorError> {
    let number = hint.number().to_string();
    let user = fill_template(
      &self.prompts.hint_user_template,
      &[
        ("content", excerpt(text, MAX_CONTENT_CHARS)),
        ("question", question),
        ("answer", answer.unwrap_or("(no answer yet)")),
        ("level", difficulty.label()),
        ("number", number.as_str()),
        ("guidance", hint.guidance()),
      ],
    );
    let reply = self
      .chat_plain(&self.fast_model, &self.prompts.tutor_system, &user, 0.4)
      .await
      .map_err(|e| e.rewrap(TutorError::Generation))?;
    self.guard_no_answer(clean_reply(&reply), &user).await.map_err(|e| e.rewrap(TutorError::Generation))
  }
}

/// Accept the label spellings models actually produce.
fn parse_quality(label: &str) -> Option<Quality> {
  match label.trim().to_lowercase().replace(|c: char| c == '-' || c == ' ', "_").as_str() {
    "strong" => Some(Quality::Strong),
    "partial" => Some(Quality::Partial),
    "needs_work" | "weak" => Some(Quality::NeedsWork),
    _ => None,
  }
}

fn classify_status(status: StatusCode, message: String) -> TutorError {
  if status == StatusCode::TOO_MANY_REQUESTS {
    TutorError::RateLimited(format!("OpenAI HTTP {status}: {message}"))
  } else {
    TutorError::Oracle(format!("OpenAI HTTP {status}: {message}"))
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
  fn new(model: &str, system: &str, user: MessageContent, temperature: f32, response_format: Option<ResponseFormat>) -> Self {
    Self {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: MessageContent::Text(system.into()) },
        ChatMessageReq { role: "user".into(), content: user },
      ],
      temperature,
      response_format,
    }
  }
}

#[derive(Serialize)]
struct ChatMessageReq { role: String, content: MessageContent }

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
  Text { text: String },
  File { file: FilePart },
}

#[derive(Serialize)]
struct FilePart { filename: String, file_data: String }

#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;
  use std::sync::{Arc, Mutex};

  use axum::{extract::State, routing::post, Json, Router};
  use serde_json::{json, Value};

  use super::*;

  type Replies = Arc<Mutex<VecDeque<String>>>;

  async fn chat_stub(State(replies): State<Replies>) -> Json<Value> {
    let content = replies.lock().unwrap().pop_front().unwrap_or_default();
    Json(json!({ "choices": [{ "message": { "content": content } }] }))
  }

  /// OpenAI client pointed at a local server answering with `replies` in order.
  async fn stubbed(replies: &[&str]) -> (OpenAI, Replies) {
    let queue: Replies = Arc::new(Mutex::new(replies.iter().map(|r| r.to_string()).collect()));
    let app = Router::new().route("/chat/completions", post(chat_stub)).with_state(queue.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    let oa = OpenAI {
      client: reqwest::Client::new(),
      api_key: "test-key".into(),
      base_url: format!("http://{addr}"),
      fast_model: "fast".into(),
      strong_model: "strong".into(),
      prompts: Prompts::default(),
    };
    (oa, queue)
  }

  #[tokio::test]
  async fn revealing_feedback_is_replaced_by_the_strict_json_feedback() {
    let (oa, queue) = stubbed(&[
      r#"{"quality":"partial","feedback":"Close, but the answer is the mitochondria."}"#,
      r#"{"quality":"partial","feedback":"Which organelle did the lecture link to ATP?"}"#,
    ])
    .await;
    let ev = oa
      .evaluate_answer("Where is ATP made?", "Somewhere inside the cell, I think.", "Lecture text.", Difficulty::MIN)
      .await
      .unwrap();
    assert_eq!(ev.quality, Quality::Partial);
    assert_eq!(ev.feedback, "Which organelle did the lecture link to ATP?");
    assert!(queue.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn clean_feedback_needs_a_single_call() {
    let (oa, queue) = stubbed(&[
      r#"{"quality":"needs_work","feedback":"What does the second paragraph say about energy?"}"#,
      r#"{"quality":"partial","feedback":"unused"}"#,
    ])
    .await;
    let ev = oa
      .evaluate_answer("Where is ATP made?", "No idea at all, honestly.", "Lecture text.", Difficulty::MIN)
      .await
      .unwrap();
    assert_eq!(ev.quality, Quality::NeedsWork);
    assert_eq!(ev.feedback, "What does the second paragraph say about energy?");
    assert_eq!(queue.lock().unwrap().len(), 1);
  }

  #[test]
  fn quality_labels_are_tolerant() {
    assert_eq!(parse_quality("Strong"), Some(Quality::Strong));
    assert_eq!(parse_quality("needs work"), Some(Quality::NeedsWork));
    assert_eq!(parse_quality("needs-work"), Some(Quality::NeedsWork));
    assert_eq!(parse_quality("excellent"), None);
  }

  #[test]
  fn status_429_is_rate_limited() {
    assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into()).is_retry_later());
    assert!(!classify_status(StatusCode::UNAUTHORIZED, "bad key".into()).is_retry_later());
  }

  #[test]
  fn error_body_message_is_extracted() {
    let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Incorrect API key provided"));
    assert_eq!(extract_openai_error("<html>"), None);
  }

  #[test]
  fn file_parts_serialize_in_chat_shape() {
    let req = ChatCompletionRequest::new(
      "gpt-4o-mini",
      "sys",
      MessageContent::Parts(vec![ContentPart::File {
        file: FilePart { filename: "l.pdf".into(), file_data: "data:application/pdf;base64,AA==".into() },
      }]),
      0.0,
      None,
    );
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["messages"][0]["content"], "sys");
    assert_eq!(v["messages"][1]["content"][0]["type"], "file");
    assert_eq!(v["messages"][1]["content"][0]["file"]["filename"], "l.pdf");
    assert!(v.get("response_format").is_none());
  }
}
