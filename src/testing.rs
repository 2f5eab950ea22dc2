//! Test double for the oracle seam.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ContentAnalysis, Difficulty, Evaluation, HintLevel, Quality, SourceDocument, Turn};
use crate::error::TutorError;
use crate::oracle::TutorOracle;

/// Oracle with queued evaluation verdicts, per-operation call counts and
/// one-shot injected failures. Unqueued evaluations come back `partial`.
#[derive(Default)]
pub struct ScriptedOracle {
  verdicts: Mutex<VecDeque<Quality>>,
  calls: Mutex<HashMap<&'static str, usize>>,
  failures: Mutex<HashMap<&'static str, TutorError>>,
}

impl ScriptedOracle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn queue(&self, verdicts: impl IntoIterator<Item = Quality>) {
    self.verdicts.lock().unwrap().extend(verdicts);
  }

  pub fn fail_next(&self, op: &'static str, err: TutorError) {
    self.failures.lock().unwrap().insert(op, err);
  }

  pub fn calls(&self, op: &'static str) -> usize {
    self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
  }

  fn enter(&self, op: &'static str) -> Result<(), TutorError> {
    *self.calls.lock().unwrap().entry(op).or_default() += 1;
    match self.failures.lock().unwrap().remove(op) {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl TutorOracle for ScriptedOracle {
  fn name(&self) -> &'static str { "scripted" }

  async fn extract_text(&self, document: &SourceDocument) -> Result<String, TutorError> {
    self.enter("extract")?;
    String::from_utf8(document.bytes.clone()).map_err(|e| TutorError::Extraction(e.to_string()))
  }

  async fn analyze_content(&self, _text: &str) -> Result<ContentAnalysis, TutorError> {
    self.enter("analyze")?;
    Ok(ContentAnalysis {
      topics: vec!["Alpha".into(), "Beta".into(), "Gamma".into()],
      concepts: vec!["one".into(), "two".into(), "three".into(), "four".into(), "five".into()],
    })
  }

  async fn generate_intro(&self, _text: &str, _d: Difficulty, focus: Option<&str>) -> Result<String, TutorError> {
    self.enter("intro")?;
    Ok(format!("Welcome! Today we explore {}.", focus.unwrap_or("the material")))
  }

  async fn generate_question(
    &self,
    _text: &str,
    difficulty: Difficulty,
    history: &[Turn],
    focus: Option<&str>,
  ) -> Result<String, TutorError> {
    self.enter("question")?;
    Ok(format!("[{}] Q{} about {}?", difficulty.level(), history.len(), focus.unwrap_or("anything")))
  }

  async fn evaluate_answer(&self, _q: &str, _a: &str, _t: &str, _d: Difficulty) -> Result<Evaluation, TutorError> {
    self.enter("evaluate")?;
    let quality = self.verdicts.lock().unwrap().pop_front().unwrap_or(Quality::Partial);
    Ok(Evaluation { quality, feedback: "What happens to the energy next?".into() })
  }

  async fn generate_explanation(&self, _q: &str, _a: &str, _t: &str, _d: Difficulty) -> Result<String, TutorError> {
    self.enter("explanation")?;
    Ok("Exactly: light energy ends up stored as chemical bonds.".into())
  }

  async fn generate_hint(
    &self,
    _q: &str,
    _a: Option<&str>,
    hint: HintLevel,
    _t: &str,
    _d: Difficulty,
  ) -> Result<String, TutorError> {
    self.enter("hint")?;
    Ok(format!("Hint {}: look at the second paragraph.", hint.number()))
  }
}
