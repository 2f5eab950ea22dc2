//! Domain models shared by the dialogue core and the oracle: difficulty and hint
//! levels, answer quality, transcript turns, and oracle reply shapes.

use serde::{Deserialize, Serialize};

use crate::error::TutorError;

/// Question difficulty. Serialized as its numeric level (1..=4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
  Foundational = 1,
  Intermediate = 2,
  Advanced = 3,
  Expert = 4,
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Foundational }
}

impl Difficulty {
  pub const MIN: Difficulty = Difficulty::Foundational;
  pub const MAX: Difficulty = Difficulty::Expert;

  pub fn level(self) -> u8 { self as u8 }

  pub fn from_level(level: u8) -> Result<Self, TutorError> {
    match level {
      1 => Ok(Difficulty::Foundational),
      2 => Ok(Difficulty::Intermediate),
      3 => Ok(Difficulty::Advanced),
      4 => Ok(Difficulty::Expert),
      other => Err(TutorError::Validation(format!("difficulty must be in 1..=4, got {other}"))),
    }
  }

  /// One step up, or None at the ceiling.
  pub fn raised(self) -> Option<Self> {
    match self {
      Difficulty::Foundational => Some(Difficulty::Intermediate),
      Difficulty::Intermediate => Some(Difficulty::Advanced),
      Difficulty::Advanced => Some(Difficulty::Expert),
      Difficulty::Expert => None,
    }
  }

  /// One step down, or None at the floor.
  pub fn lowered(self) -> Option<Self> {
    match self {
      Difficulty::Foundational => None,
      Difficulty::Intermediate => Some(Difficulty::Foundational),
      Difficulty::Advanced => Some(Difficulty::Intermediate),
      Difficulty::Expert => Some(Difficulty::Advanced),
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Difficulty::Foundational => "foundational",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
      Difficulty::Expert => "expert",
    }
  }

  /// Prompt guidance describing what a question at this level should explore.
  pub fn guidance(self) -> &'static str {
    match self {
      Difficulty::Foundational => "Ask about basic definitions and recall of key ideas. Keep vocabulary simple.",
      Difficulty::Intermediate => "Ask the student to explain relationships between ideas or apply a concept to a simple case.",
      Difficulty::Advanced => "Ask the student to analyze, compare, or predict consequences using the material.",
      Difficulty::Expert => "Ask the student to evaluate, critique, or synthesize ideas across the material and beyond it.",
    }
  }
}

impl TryFrom<u8> for Difficulty {
  type Error = TutorError;
  fn try_from(level: u8) -> Result<Self, Self::Error> { Difficulty::from_level(level) }
}

impl From<Difficulty> for u8 {
  fn from(d: Difficulty) -> u8 { d.level() }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({})", self.level(), self.label())
  }
}

/// Which of the three hints for the current question is being requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HintLevel {
  Nudge = 1,
  Pointer = 2,
  Scaffold = 3,
}

impl HintLevel {
  pub fn number(self) -> u8 { self as u8 }

  pub fn from_number(n: u8) -> Result<Self, TutorError> {
    match n {
      1 => Ok(HintLevel::Nudge),
      2 => Ok(HintLevel::Pointer),
      3 => Ok(HintLevel::Scaffold),
      other => Err(TutorError::Validation(format!("hint number must be in 1..=3, got {other}"))),
    }
  }

  pub fn guidance(self) -> &'static str {
    match self {
      HintLevel::Nudge => "Give a gentle nudge: point to the area of the material worth re-reading.",
      HintLevel::Pointer => "Name the key concept involved and ask a leading question about it.",
      HintLevel::Scaffold => "Break the question into a smaller first step the student can answer, without giving the answer.",
    }
  }
}

impl TryFrom<u8> for HintLevel {
  type Error = TutorError;
  fn try_from(n: u8) -> Result<Self, Self::Error> { HintLevel::from_number(n) }
}

impl From<HintLevel> for u8 {
  fn from(h: HintLevel) -> u8 { h.number() }
}

/// Quality label the oracle attaches to an evaluated answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
  Strong,
  Partial,
  NeedsWork,
}

impl Quality {
  pub fn as_str(self) -> &'static str {
    match self {
      Quality::Strong => "strong",
      Quality::Partial => "partial",
      Quality::NeedsWork => "needs_work",
    }
  }
}

/// Speaker of a transcript turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Assistant,
  User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
  Question,
  Answer,
  Explanation,
}

/// One dialogue turn. The transcript is passed verbatim to the oracle as history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
  pub kind: TurnKind,
  pub role: Role,
  pub content: String,
}

impl Turn {
  pub fn question(content: impl Into<String>) -> Self {
    Self { kind: TurnKind::Question, role: Role::Assistant, content: content.into() }
  }
  pub fn answer(content: impl Into<String>) -> Self {
    Self { kind: TurnKind::Answer, role: Role::User, content: content.into() }
  }
  pub fn explanation(content: impl Into<String>) -> Self {
    Self { kind: TurnKind::Explanation, role: Role::Assistant, content: content.into() }
  }
}

/// Persisted message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
  #[serde(rename = "ai-question")]
  AiQuestion,
  #[serde(rename = "user-answer")]
  UserAnswer,
  #[serde(rename = "ai-explanation")]
  AiExplanation,
  #[serde(rename = "intro")]
  Intro,
}

/// Raw uploaded document handed to the oracle for text extraction.
#[derive(Clone, Debug)]
pub struct SourceDocument {
  pub filename: String,
  pub mime: String,
  pub bytes: Vec<u8>,
}

impl SourceDocument {
  pub fn is_pdf(&self) -> bool {
    self.mime == "application/pdf" || self.bytes.starts_with(b"%PDF")
  }

  pub fn is_text(&self) -> bool {
    self.mime.starts_with("text/") || self.filename.ends_with(".txt") || self.filename.ends_with(".md")
  }
}

/// Topics and concepts extracted from a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAnalysis {
  pub topics: Vec<String>,
  pub concepts: Vec<String>,
}

/// Oracle verdict on one answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
  pub quality: Quality,
  pub feedback: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_steps_never_leave_range() {
    for level in 1..=4u8 {
      let d = Difficulty::from_level(level).unwrap();
      if let Some(up) = d.raised() { assert_eq!(up.level(), level + 1); }
      if let Some(down) = d.lowered() { assert_eq!(down.level(), level - 1); }
    }
    assert_eq!(Difficulty::MAX.raised(), None);
    assert_eq!(Difficulty::MIN.lowered(), None);
  }

  #[test]
  fn difficulty_serializes_as_level() {
    assert_eq!(serde_json::to_string(&Difficulty::Advanced).unwrap(), "3");
    let d: Difficulty = serde_json::from_str("2").unwrap();
    assert_eq!(d, Difficulty::Intermediate);
    assert!(serde_json::from_str::<Difficulty>("5").is_err());
  }

  #[test]
  fn message_types_use_dashed_names() {
    assert_eq!(serde_json::to_string(&MessageType::AiQuestion).unwrap(), "\"ai-question\"");
    assert_eq!(serde_json::to_string(&MessageType::UserAnswer).unwrap(), "\"user-answer\"");
  }

  #[test]
  fn quality_uses_snake_case() {
    let q: Quality = serde_json::from_str("\"needs_work\"").unwrap();
    assert_eq!(q, Quality::NeedsWork);
  }

  #[test]
  fn hint_levels_are_bounded() {
    assert!(HintLevel::from_number(0).is_err());
    assert_eq!(HintLevel::from_number(3).unwrap(), HintLevel::Scaffold);
    assert!(HintLevel::from_number(4).is_err());
  }
}
