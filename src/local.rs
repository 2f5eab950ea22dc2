//! Offline oracle used when OPENAI_API_KEY is not set.
//!
//! Keyword heuristics over the lecture text keep the dialogue usable without a
//! model. Quality is judged by how much of the answer's vocabulary the lecture
//! supports; it is deliberately coarse.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::domain::{ContentAnalysis, Difficulty, Evaluation, HintLevel, Quality, SourceDocument, Turn, TurnKind};
use crate::error::TutorError;
use crate::normalize::with_transition;
use crate::oracle::{bound_analysis, TutorOracle, MAX_CONCEPTS, MAX_TOPICS, MIN_TOPICS};

const STOP_WORDS: &[&str] = &[
  "about", "above", "after", "again", "against", "because", "before", "being", "below", "between",
  "could", "doing", "during", "every", "having", "other", "their", "there", "these", "those",
  "through", "under", "until", "where", "which", "while", "would", "should", "might", "into",
  "from", "with", "that", "this", "they", "them", "then", "than", "what", "when", "were", "will",
  "your", "also", "have", "more", "most", "some", "such", "only", "each", "very", "just", "over",
];

const STRONG_MATCHES: usize = 6;
const PARTIAL_MATCHES: usize = 3;

#[derive(Default)]
pub struct LocalOracle;

impl LocalOracle {
  pub fn new() -> Self {
    Self
  }
}

fn keywords(text: &str) -> impl Iterator<Item = String> + '_ {
  text
    .split(|c: char| !c.is_alphanumeric() && c != '-')
    .map(|w| w.trim_matches('-').to_lowercase())
    .filter(|w| w.chars().count() >= 4 && !STOP_WORDS.contains(&w.as_str()) && !w.chars().all(|c| c.is_numeric()))
}

/// Keywords ordered by frequency, ties broken by first appearance.
fn ranked_keywords(text: &str) -> Vec<String> {
  let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
  for (pos, w) in keywords(text).enumerate() {
    counts.entry(w).or_insert((0, pos)).0 += 1;
  }
  let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
  ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
  ranked.into_iter().map(|(w, _)| w).collect()
}

/// Short lines without sentence punctuation read as headings.
fn headings(text: &str) -> Vec<String> {
  let mut seen = HashSet::new();
  text
    .lines()
    .map(|l| l.trim().trim_start_matches('#').trim())
    .filter(|l| {
      let n = l.chars().count();
      (3..=60).contains(&n) && !l.ends_with(&['.', '?', '!', ',', ';', ':'][..]) && l.chars().next().is_some_and(char::is_uppercase)
    })
    .filter(|l| seen.insert(l.to_lowercase()))
    .map(str::to_string)
    .collect()
}

fn first_sentence(text: &str) -> &str {
  let t = text.trim();
  match t.find(&['.', '?', '!'][..]) {
    Some(i) => &t[..=i],
    None => t,
  }
}

/// The lecture sentence sharing the most keywords with `query`.
fn best_sentence<'a>(content: &'a str, query: &str) -> Option<&'a str> {
  let wanted: HashSet<String> = keywords(query).collect();
  content
    .split_inclusive(&['.', '?', '!'][..])
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| (keywords(s).filter(|w| wanted.contains(w)).count(), s))
    .filter(|(n, _)| *n > 0)
    .max_by_key(|(n, _)| *n)
    .map(|(_, s)| s)
}

/// Most frequent keyword of `text` that is not already in `exclude`.
fn main_keyword(text: &str, exclude: &[String]) -> Option<String> {
  ranked_keywords(text).into_iter().find(|w| !exclude.contains(w))
}

#[async_trait]
impl TutorOracle for LocalOracle {
  fn name(&self) -> &'static str { "local" }

  async fn extract_text(&self, document: &SourceDocument) -> Result<String, TutorError> {
    if document.is_pdf() {
      return Err(TutorError::Extraction("PDF extraction needs the OpenAI oracle (set OPENAI_API_KEY)".into()));
    }
    if !document.is_text() {
      return Err(TutorError::Extraction(format!("unsupported document type '{}'", document.mime)));
    }
    let text = String::from_utf8(document.bytes.clone())
      .map_err(|e| TutorError::Extraction(format!("not valid UTF-8 text: {e}")))?;
    let text = text.trim().to_string();
    if text.is_empty() {
      return Err(TutorError::Extraction("no text could be extracted".into()));
    }
    Ok(text)
  }

  async fn analyze_content(&self, text: &str) -> Result<ContentAnalysis, TutorError> {
    let ranked = ranked_keywords(text);
    let mut topics = headings(text);
    topics.truncate(MAX_TOPICS);
    for w in &ranked {
      if topics.len() >= MIN_TOPICS {
        break;
      }
      if !topics.iter().any(|t| t.to_lowercase() == *w) {
        topics.push(w.clone());
      }
    }
    let concepts = ranked.into_iter().take(MAX_CONCEPTS).collect();
    bound_analysis(ContentAnalysis { topics, concepts })
  }

  async fn generate_intro(&self, text: &str, difficulty: Difficulty, focus_topic: Option<&str>) -> Result<String, TutorError> {
    let focus = focus_topic.map(|t| format!(" We'll start with {t}."));
    Ok(format!(
      "Welcome! This lecture opens with: \"{}\"{} I'll ask you {} questions to help you reason through the material yourself, so take your time with each answer.",
      first_sentence(text),
      focus.unwrap_or_default(),
      difficulty.label(),
    ))
  }

  async fn generate_question(
    &self,
    text: &str,
    difficulty: Difficulty,
    history: &[Turn],
    focus_topic: Option<&str>,
  ) -> Result<String, TutorError> {
    let asked: Vec<String> = history
      .iter()
      .filter(|t| t.kind == TurnKind::Question)
      .flat_map(|t| keywords(&t.content).collect::<Vec<_>>())
      .collect();
    let topic = focus_topic.map(str::to_string).or_else(|| main_keyword(text, &[])).unwrap_or_else(|| "this material".into());
    let concept = main_keyword(text, &asked).unwrap_or_else(|| topic.to_lowercase());

    let templates: &[&str] = match difficulty {
      Difficulty::Foundational => &[
        "In your own words, what is {topic}, and where does {concept} come into it?",
        "What does the lecture mean by {concept} when it discusses {topic}?",
      ],
      Difficulty::Intermediate => &[
        "How does {concept} relate to {topic}, step by step?",
        "Why does {concept} matter for understanding {topic}?",
      ],
      Difficulty::Advanced => &[
        "What would change in {topic} if {concept} behaved differently, and why?",
        "How does the role of {concept} in {topic} compare with another idea from the lecture?",
      ],
      Difficulty::Expert => &[
        "What is the strongest objection to the lecture's account of {topic}, and how would {concept} answer it?",
        "How would you design an example that tests the limits of {concept} within {topic}?",
      ],
    };
    let tpl = templates.choose(&mut rand::thread_rng()).copied().unwrap_or(templates[0]);
    Ok(crate::util::fill_template(tpl, &[("topic", topic.as_str()), ("concept", concept.as_str())]))
  }

  async fn evaluate_answer(&self, question: &str, answer: &str, text: &str, _difficulty: Difficulty) -> Result<Evaluation, TutorError> {
    let lecture: HashSet<String> = keywords(text).collect();
    let supported: HashSet<String> = keywords(answer).filter(|w| lecture.contains(w)).collect();

    let focus = main_keyword(question, &[]).unwrap_or_else(|| "the key idea".into());
    let (quality, feedback) = if supported.len() >= STRONG_MATCHES {
      (Quality::Strong, "Well reasoned.".to_string())
    } else if supported.len() >= PARTIAL_MATCHES {
      (Quality::Partial, format!("You're on the right track. How does {focus} fit into what you described?"))
    } else {
      (Quality::NeedsWork, format!("Let's slow down. What does the lecture say about {focus}, and how could that shape your answer?"))
    };
    Ok(Evaluation { quality, feedback })
  }

  async fn generate_explanation(&self, question: &str, answer: &str, text: &str, _difficulty: Difficulty) -> Result<String, TutorError> {
    let query = format!("{question} {answer}");
    let body = match best_sentence(text, &query) {
      Some(s) => format!("Nicely done. The lecture puts it this way: \"{s}\""),
      None => "Nicely done. Your reasoning lines up with the material.".to_string(),
    };
    Ok(with_transition(&body))
  }

  async fn generate_hint(
    &self,
    question: &str,
    answer: Option<&str>,
    hint: HintLevel,
    text: &str,
    _difficulty: Difficulty,
  ) -> Result<String, TutorError> {
    let focus = main_keyword(question, &[]).unwrap_or_else(|| "the key idea".into());
    let missing = answer
      .map(|a| {
        let said: HashSet<String> = keywords(a).collect();
        let q: Vec<String> = keywords(question).collect();
        ranked_keywords(text).into_iter().find(|w| !said.contains(w) && !q.contains(w))
      })
      .unwrap_or_else(|| main_keyword(text, &[focus.clone()]));

    Ok(match hint {
      HintLevel::Nudge => format!("Look back at the part of the lecture that discusses {focus}. What stands out?"),
      HintLevel::Pointer => match missing {
        Some(w) => format!("Think about {w}. How might it connect to {focus}?"),
        None => format!("What is {focus} responsible for, according to the lecture?"),
      },
      HintLevel::Scaffold => format!("Start smaller: in one sentence, what is {focus}? Then ask yourself what it causes or depends on."),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const LECTURE: &str = "Cell Respiration\n\
    Cells break down glucose to release energy. Mitochondria convert glucose into ATP through respiration.\n\
    Glycolysis\n\
    Glycolysis splits glucose into pyruvate in the cytoplasm and yields a small amount of ATP.\n\
    Krebs Cycle\n\
    The Krebs cycle oxidizes pyruvate inside mitochondria, releasing carbon dioxide.";

  #[tokio::test]
  async fn analysis_prefers_headings() {
    let a = LocalOracle::new().analyze_content(LECTURE).await.unwrap();
    assert_eq!(a.topics, vec!["Cell Respiration", "Glycolysis", "Krebs Cycle"]);
    assert_eq!(a.concepts[0], "glucose");
  }

  #[tokio::test]
  async fn analysis_fills_topics_from_keywords() {
    let a = LocalOracle::new()
      .analyze_content("Energy flows through ecosystems. Producers capture energy. Consumers eat producers.")
      .await
      .unwrap();
    assert_eq!(a.topics.len(), 3);
    assert_eq!(a.topics[0], "energy");
  }

  #[tokio::test]
  async fn pdf_needs_remote_oracle() {
    let doc = SourceDocument { filename: "l.pdf".into(), mime: "application/pdf".into(), bytes: b"%PDF-1.7".to_vec() };
    assert!(matches!(LocalOracle::new().extract_text(&doc).await, Err(TutorError::Extraction(_))));
  }

  #[tokio::test]
  async fn supported_answers_grade_higher() {
    let o = LocalOracle::new();
    let strong = o
      .evaluate_answer(
        "What does glycolysis do?",
        "Glycolysis splits glucose into pyruvate in the cytoplasm, giving a little ATP before the Krebs cycle in mitochondria.",
        LECTURE,
        Difficulty::Foundational,
      )
      .await
      .unwrap();
    assert_eq!(strong.quality, Quality::Strong);

    let weak = o
      .evaluate_answer("What does glycolysis do?", "I am honestly not sure what this is about.", LECTURE, Difficulty::Foundational)
      .await
      .unwrap();
    assert_eq!(weak.quality, Quality::NeedsWork);
    assert!(!crate::normalize::reveals_answer(&weak.feedback));
  }

  #[tokio::test]
  async fn questions_mention_focus_topic() {
    let q = LocalOracle::new()
      .generate_question(LECTURE, Difficulty::Intermediate, &[], Some("Glycolysis"))
      .await
      .unwrap();
    assert!(q.contains("Glycolysis"));
    assert!(q.ends_with('?'));
  }
}
