//! The tutor oracle seam: every generative call the dialogue needs.
//!
//! Implementations: `openai::OpenAI` (chat completions) and `local::LocalOracle`
//! (offline heuristics). The controller only ever sees `Arc<dyn TutorOracle>`.

use async_trait::async_trait;

use crate::domain::{ContentAnalysis, Difficulty, Evaluation, HintLevel, SourceDocument, Turn};
use crate::error::TutorError;

#[async_trait]
pub trait TutorOracle: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Extract plain text from an uploaded document.
    async fn extract_text(&self, document: &SourceDocument) -> Result<String, TutorError>;

    /// Topics (3..7) and concepts (5..15) covered by the text.
    async fn analyze_content(&self, text: &str) -> Result<ContentAnalysis, TutorError>;

    async fn generate_intro(
        &self,
        text: &str,
        difficulty: Difficulty,
        focus_topic: Option<&str>,
    ) -> Result<String, TutorError>;

    async fn generate_question(
        &self,
        text: &str,
        difficulty: Difficulty,
        history: &[Turn],
        focus_topic: Option<&str>,
    ) -> Result<String, TutorError>;

    async fn evaluate_answer(
        &self,
        question: &str,
        answer: &str,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<Evaluation, TutorError>;

    async fn generate_explanation(
        &self,
        question: &str,
        answer: &str,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<String, TutorError>;

    async fn generate_hint(
        &self,
        question: &str,
        answer: Option<&str>,
        hint: HintLevel,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<String, TutorError>;
}

pub const MIN_TOPICS: usize = 3;
pub const MAX_TOPICS: usize = 7;
pub const MAX_CONCEPTS: usize = 15;

/// Clamp an analysis to the documented bounds. Too few topics is malformed output.
pub fn bound_analysis(mut analysis: ContentAnalysis) -> Result<ContentAnalysis, TutorError> {
    analysis.topics.retain(|t| !t.trim().is_empty());
    analysis.concepts.retain(|c| !c.trim().is_empty());
    if analysis.topics.len() < MIN_TOPICS {
        return Err(TutorError::Analysis(format!(
            "expected at least {MIN_TOPICS} topics, got {}",
            analysis.topics.len()
        )));
    }
    analysis.topics.truncate(MAX_TOPICS);
    analysis.concepts.truncate(MAX_CONCEPTS);
    Ok(analysis)
}

/// Render transcript turns as prompt history.
pub fn render_history(history: &[Turn]) -> String {
    use crate::domain::TurnKind;
    history
        .iter()
        .map(|t| {
            let label = match t.kind {
                TurnKind::Question => "Tutor question",
                TurnKind::Answer => "Student answer",
                TurnKind::Explanation => "Tutor explanation",
            };
            format!("{label}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
