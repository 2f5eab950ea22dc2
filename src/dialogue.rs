//! Adaptive Socratic dialogue controller.
//!
//! Drives one session: intro, questions, answer evaluation, hints, explanations,
//! and difficulty adjustment. Each operation either commits its whole turn or
//! leaves `SessionState` untouched, with one exception: a submitted answer is
//! appended to the transcript before evaluation and is kept even if evaluation
//! fails. The last failed operation is remembered so `retry` can re-issue it with
//! identical inputs.
//!
//! Callers must serialize operations per session (the registry holds each
//! controller behind a `tokio::sync::Mutex`).

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::difficulty::{self, Adjustment};
use crate::domain::{Difficulty, HintLevel, Quality, Turn, TurnKind};
use crate::error::TutorError;
use crate::oracle::TutorOracle;
use crate::session::{answer_is_long_enough, focus_topic_index, SessionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  AwaitingIntro,
  AwaitingQuestion,
  AwaitingAnswer,
  Evaluating,
  Hinting,
  Explaining,
  /// A question cycle just completed; the next question may follow after a pause.
  Advancing,
}

/// UI-facing outcome of an operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueEvent {
  Intro { text: String },
  Question { number: u32, difficulty: Difficulty, focus_topic: Option<String>, text: String },
  Evaluated { quality: Quality, attempt: u8 },
  Feedback { text: String },
  Explanation { text: String },
  Hint { number: u8, text: String },
  DifficultyChanged { adjustment: Adjustment },
  Advanced { next_question: u32, forced: bool },
}

/// Operation to repeat on `retry`.
#[derive(Clone, Debug, PartialEq, Eq)]
enum PendingOp {
  Start { content: String, topics: Vec<String> },
  Question,
  Answer(String),
  Hint,
}

pub struct DialogueController {
  oracle: Arc<dyn TutorOracle>,
  content: String,
  topics: Vec<String>,
  state: SessionState,
  phase: Phase,
  failed: Option<PendingOp>,
  /// Answer already in the transcript whose evaluation has not committed yet.
  unevaluated: Option<String>,
  epoch: u64,
}

impl DialogueController {
  pub fn new(oracle: Arc<dyn TutorOracle>) -> Self {
    Self {
      oracle,
      content: String::new(),
      topics: Vec::new(),
      state: SessionState::new(),
      phase: Phase::AwaitingIntro,
      failed: None,
      unevaluated: None,
      epoch: 0,
    }
  }

  /// Rebuild a controller from a persisted snapshot.
  pub fn restore(oracle: Arc<dyn TutorOracle>, content: String, topics: Vec<String>, state: SessionState) -> Self {
    let phase = if state.transcript.is_empty() {
      Phase::AwaitingIntro
    } else if state.has_pending_question() {
      Phase::AwaitingAnswer
    } else {
      Phase::AwaitingQuestion
    };
    let unevaluated = match state.transcript.last() {
      Some(t) if t.kind == TurnKind::Answer && state.has_pending_question() => Some(t.content.clone()),
      _ => None,
    };
    Self { oracle, content, topics, state, phase, failed: None, unevaluated, epoch: 0 }
  }

  pub fn state(&self) -> &SessionState { &self.state }
  pub fn phase(&self) -> Phase { self.phase }
  pub fn epoch(&self) -> u64 { self.epoch }
  pub fn topics(&self) -> &[String] { &self.topics }
  pub fn has_failed_operation(&self) -> bool { self.failed.is_some() }

  /// Generate the intro explanation. On failure the controller stays in `AwaitingIntro`.
  #[instrument(level = "info", skip(self, content, topics), fields(content_len = content.len(), topics = topics.len()))]
  pub async fn start_session(&mut self, content: &str, topics: &[String]) -> Result<Vec<DialogueEvent>, TutorError> {
    if self.phase != Phase::AwaitingIntro {
      return Err(TutorError::Validation("session already started; reset it first".into()));
    }
    if content.trim().is_empty() {
      return Err(TutorError::Oracle("cannot start a session without document content".into()));
    }

    let focus = topics.first().map(String::as_str);
    match self.oracle.generate_intro(content, Difficulty::MIN, focus).await {
      Ok(text) => {
        self.content = content.to_string();
        self.topics = topics.to_vec();
        self.state.transcript.push(Turn::explanation(text.clone()));
        self.phase = Phase::AwaitingQuestion;
        self.failed = None;
        info!(target: "dialogue", oracle = self.oracle.name(), "Session started");
        Ok(vec![DialogueEvent::Intro { text }])
      }
      Err(e) => {
        warn!(target: "dialogue", error = %e, "Intro generation failed");
        self.failed = Some(PendingOp::Start { content: content.to_string(), topics: topics.to_vec() });
        Err(e.rewrap(TutorError::Oracle))
      }
    }
  }

  /// Ask the oracle for the next question on the current focus topic.
  #[instrument(level = "info", skip(self), fields(question = self.state.question_number, difficulty = self.state.difficulty.level()))]
  pub async fn request_next_question(&mut self) -> Result<Vec<DialogueEvent>, TutorError> {
    match self.phase {
      Phase::AwaitingQuestion | Phase::Advancing => {}
      Phase::AwaitingIntro => return Err(TutorError::Oracle("session has not been started".into())),
      _ => return Err(TutorError::Validation("a question is already awaiting an answer".into())),
    }
    if self.content.trim().is_empty() {
      return Err(TutorError::Oracle("no document content for this session".into()));
    }

    let focus = focus_topic_index(self.state.question_number, self.topics.len()).map(|i| self.topics[i].clone());
    let difficulty = self.state.difficulty;
    let result = self
      .oracle
      .generate_question(&self.content, difficulty, &self.state.transcript, focus.as_deref())
      .await;

    match result {
      Ok(text) => {
        if let Some(topic) = &focus {
          self.state.mark_explored(topic);
        }
        self.state.transcript.push(Turn::question(text.clone()));
        self.state.current_question = Some(text.clone());
        self.state.last_answer = None;
        self.state.hints.clear();
        self.unevaluated = None;
        self.phase = Phase::AwaitingAnswer;
        self.failed = None;
        info!(target: "dialogue", number = self.state.question_number, focus = ?focus, "Question asked");
        Ok(vec![DialogueEvent::Question {
          number: self.state.question_number,
          difficulty,
          focus_topic: focus,
          text,
        }])
      }
      Err(e) => {
        warn!(target: "dialogue", error = %e, "Question generation failed");
        self.failed = Some(PendingOp::Question);
        Err(e.rewrap(TutorError::Oracle))
      }
    }
  }

  /// Evaluate an answer. Too-short answers, or answers with no pending question, are ignored.
  #[instrument(level = "info", skip(self, answer), fields(answer_len = answer.len(), attempt = self.state.attempt_count))]
  pub async fn submit_answer(&mut self, answer: &str) -> Result<Vec<DialogueEvent>, TutorError> {
    if !answer_is_long_enough(answer) || self.phase != Phase::AwaitingAnswer {
      debug!(target: "dialogue", phase = ?self.phase, "Answer ignored");
      return Ok(Vec::new());
    }
    let Some(question) = self.state.current_question.clone() else {
      return Ok(Vec::new());
    };
    let answer = answer.trim().to_string();

    // The student's words are kept even if evaluation fails; a retry of the same
    // answer must not append it twice.
    if self.unevaluated.as_deref() != Some(answer.as_str()) {
      self.state.transcript.push(Turn::answer(answer.clone()));
      self.unevaluated = Some(answer.clone());
    }
    self.state.last_answer = Some(answer.clone());

    let difficulty = self.state.difficulty;
    self.phase = Phase::Evaluating;
    let evaluation = match self.oracle.evaluate_answer(&question, &answer, &self.content, difficulty).await {
      Ok(ev) => ev,
      Err(e) => {
        warn!(target: "dialogue", error = %e, "Evaluation failed");
        return Err(self.fail_answer(answer, e.rewrap(TutorError::Evaluation)));
      }
    };

    let explanation = if evaluation.quality == Quality::Strong {
      self.phase = Phase::Explaining;
      match self.oracle.generate_explanation(&question, &answer, &self.content, difficulty).await {
        Ok(text) => Some(text),
        Err(e) => {
          warn!(target: "dialogue", error = %e, "Explanation failed");
          return Err(self.fail_answer(answer, e.rewrap(TutorError::Generation)));
        }
      }
    } else {
      None
    };

    // Commit the whole turn.
    self.unevaluated = None;
    self.failed = None;
    let quality = evaluation.quality;
    let mut events = vec![DialogueEvent::Evaluated { quality, attempt: self.state.attempt_count + 1 }];

    self.state.quality_window.push(quality);
    if self.state.quality_window.is_full() {
      let adjustment = difficulty::apply(&mut self.state.quality_window, &mut self.state.difficulty);
      if adjustment != Adjustment::Hold {
        info!(target: "dialogue", ?adjustment, "Difficulty adjusted");
        events.push(DialogueEvent::DifficultyChanged { adjustment });
      }
    }

    match explanation {
      Some(text) => {
        self.state.transcript.push(Turn::explanation(text.clone()));
        events.push(DialogueEvent::Explanation { text });
        self.advance(&mut events, false);
      }
      None => {
        self.state.transcript.push(Turn::explanation(evaluation.feedback.clone()));
        events.push(DialogueEvent::Feedback { text: evaluation.feedback });
        if self.state.record_attempt() {
          self.advance(&mut events, true);
        } else {
          self.phase = Phase::AwaitingAnswer;
        }
      }
    }

    info!(target: "dialogue", quality = quality.as_str(), phase = ?self.phase, "Answer evaluated");
    Ok(events)
  }

  /// Request the next hint for the pending question. No-op once three hints were given.
  #[instrument(level = "info", skip(self), fields(hints = self.state.hint_count))]
  pub async fn request_hint(&mut self) -> Result<Vec<DialogueEvent>, TutorError> {
    if self.phase != Phase::AwaitingAnswer || self.state.hints_exhausted() {
      return Ok(Vec::new());
    }
    let Some(question) = self.state.current_question.clone() else {
      return Ok(Vec::new());
    };
    let level = HintLevel::from_number(self.state.hint_count + 1)?;

    self.phase = Phase::Hinting;
    let result = self
      .oracle
      .generate_hint(&question, self.state.last_answer.as_deref(), level, &self.content, self.state.difficulty)
      .await;
    self.phase = Phase::AwaitingAnswer;

    match result {
      Ok(text) => {
        self.state.hint_count += 1;
        self.state.hints.push(text.clone());
        self.failed = None;
        Ok(vec![DialogueEvent::Hint { number: level.number(), text }])
      }
      Err(e) => {
        warn!(target: "dialogue", error = %e, "Hint generation failed");
        self.failed = Some(PendingOp::Hint);
        Err(e.rewrap(TutorError::Hint))
      }
    }
  }

  /// Re-issue the last failed operation with the same inputs.
  pub async fn retry(&mut self) -> Result<Vec<DialogueEvent>, TutorError> {
    match self.failed.clone() {
      None => Ok(Vec::new()),
      Some(PendingOp::Start { content, topics }) => self.start_session(&content, &topics).await,
      Some(PendingOp::Question) => self.request_next_question().await,
      Some(PendingOp::Answer(answer)) => self.submit_answer(&answer).await,
      Some(PendingOp::Hint) => self.request_hint().await,
    }
  }

  /// Fire a scheduled advance only if no reset happened since it was scheduled.
  pub async fn advance_if_current(&mut self, epoch: u64) -> Result<Vec<DialogueEvent>, TutorError> {
    if epoch != self.epoch || self.phase != Phase::Advancing {
      debug!(target: "dialogue", scheduled = epoch, current = self.epoch, phase = ?self.phase, "Stale advance dropped");
      return Ok(Vec::new());
    }
    self.request_next_question().await
  }

  /// Drop all progress. Invalidates any scheduled advance.
  pub fn reset_session(&mut self) {
    self.state.reset();
    self.content.clear();
    self.topics.clear();
    self.phase = Phase::AwaitingIntro;
    self.failed = None;
    self.unevaluated = None;
    self.epoch += 1;
    info!(target: "dialogue", epoch = self.epoch, "Session reset");
  }

  fn advance(&mut self, events: &mut Vec<DialogueEvent>, forced: bool) {
    self.state.complete_question();
    self.phase = Phase::Advancing;
    events.push(DialogueEvent::Advanced { next_question: self.state.question_number, forced });
  }

  fn fail_answer(&mut self, answer: String, err: TutorError) -> TutorError {
    self.phase = Phase::AwaitingAnswer;
    self.failed = Some(PendingOp::Answer(answer));
    err
  }
}
