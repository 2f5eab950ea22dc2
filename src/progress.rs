//! Thinking score and session statistics.
//!
//! Read-only over persisted data: nothing here mutates sessions or progress.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::util::round1;

const CORRECTNESS_WEIGHT: f64 = 60.0;
const HINT_PENALTY_EACH: f64 = 2.0;
const HINT_PENALTY_CAP: f64 = 20.0;
const DEFAULT_TIME_BONUS: f64 = 10.0;

/// 0..=100 score from correctness, hint usage and pacing, rounded to one decimal.
pub fn compute_thinking_score(
  correct_answers: u32,
  hints_used: u32,
  time_spent_minutes: Option<f64>,
  total_questions: u32,
) -> f64 {
  let correctness = if total_questions == 0 {
    0.0
  } else {
    f64::from(correct_answers) / f64::from(total_questions) * CORRECTNESS_WEIGHT
  };
  let hint_penalty = (f64::from(hints_used) * HINT_PENALTY_EACH).min(HINT_PENALTY_CAP);
  let bonus = time_bonus(time_spent_minutes, total_questions);

  round1((correctness - hint_penalty + bonus).clamp(0.0, 100.0))
}

fn time_bonus(time_spent_minutes: Option<f64>, total_questions: u32) -> f64 {
  // No questions means no per-question pace; same as missing time data.
  let Some(minutes) = time_spent_minutes.filter(|_| total_questions > 0) else {
    return DEFAULT_TIME_BONUS;
  };
  let avg = minutes / f64::from(total_questions);
  if avg < 2.0 {
    10.0
  } else if avg <= 5.0 {
    20.0
  } else if avg <= 10.0 {
    15.0
  } else {
    5.0
  }
}

/// Elapsed minutes between two instants (real-valued, not rounded).
pub fn compute_time_spent(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> f64 {
  let end = end.unwrap_or_else(Utc::now);
  (end - start).num_milliseconds() as f64 / 60_000.0
}

/// What the aggregator needs from one persisted session.
#[derive(Clone, Debug, Default)]
pub struct SessionFigures {
  pub questions_asked: u32,
  pub correct_answers: u32,
  pub hints_used: u32,
  pub thinking_score: Option<f64>,
  pub time_spent_minutes: f64,
  pub completed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
  pub total_sessions: usize,
  pub completed_sessions: usize,
  pub total_questions: u32,
  pub total_correct_answers: u32,
  pub total_hints_used: u32,
  /// Mean over sessions with at least one question and a computed score.
  pub average_thinking_score: f64,
  /// Percentage over summed totals, one decimal.
  pub accuracy: f64,
  pub total_time_minutes: f64,
}

pub fn summarize(sessions: &[SessionFigures]) -> ProgressStats {
  let total_questions: u32 = sessions.iter().map(|s| s.questions_asked).sum();
  let total_correct: u32 = sessions.iter().map(|s| s.correct_answers).sum();

  let scores: Vec<f64> = sessions
    .iter()
    .filter(|s| s.questions_asked > 0)
    .filter_map(|s| s.thinking_score)
    .collect();
  let average = if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 };

  let accuracy = if total_questions == 0 {
    0.0
  } else {
    f64::from(total_correct) / f64::from(total_questions) * 100.0
  };

  ProgressStats {
    total_sessions: sessions.len(),
    completed_sessions: sessions.iter().filter(|s| s.completed).count(),
    total_questions,
    total_correct_answers: total_correct,
    total_hints_used: sessions.iter().map(|s| s.hints_used).sum(),
    average_thinking_score: round1(average),
    accuracy: round1(accuracy),
    total_time_minutes: round1(sessions.iter().map(|s| s.time_spent_minutes).sum()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn reference_score() {
    assert_eq!(compute_thinking_score(8, 2, Some(25.0), 10), 64.0);
  }

  #[test]
  fn zero_questions_gets_default_time_bonus_only() {
    assert_eq!(compute_thinking_score(0, 0, None, 0), 10.0);
    assert_eq!(compute_thinking_score(0, 0, Some(12.0), 0), 10.0);
    assert_eq!(compute_thinking_score(0, 0, Some(0.0), 0), 10.0);
  }

  #[test]
  fn hint_penalty_is_capped() {
    // 60 - 20 + 10
    assert_eq!(compute_thinking_score(5, 50, None, 5), 50.0);
  }

  #[test]
  fn pace_bands() {
    assert_eq!(compute_thinking_score(0, 0, Some(1.0), 1), 10.0);
    assert_eq!(compute_thinking_score(0, 0, Some(2.0), 1), 20.0);
    assert_eq!(compute_thinking_score(0, 0, Some(5.0), 1), 20.0);
    assert_eq!(compute_thinking_score(0, 0, Some(7.5), 1), 15.0);
    assert_eq!(compute_thinking_score(0, 0, Some(10.0), 1), 15.0);
    assert_eq!(compute_thinking_score(0, 0, Some(11.0), 1), 5.0);
  }

  #[test]
  fn score_is_clamped_at_zero() {
    assert_eq!(compute_thinking_score(0, 10, Some(30.0), 1), 0.0);
  }

  #[test]
  fn score_rounds_to_one_decimal() {
    // 1/7 * 60 + 10 = 18.571...
    assert_eq!(compute_thinking_score(1, 0, None, 7), 18.6);
  }

  #[test]
  fn time_spent_is_fractional_minutes() {
    let start = Utc::now();
    let end = start + Duration::seconds(90);
    assert_eq!(compute_time_spent(start, Some(end)), 1.5);
  }

  #[test]
  fn summary_averages_scored_sessions_and_sums_accuracy() {
    let sessions = vec![
      SessionFigures { questions_asked: 4, correct_answers: 1, thinking_score: Some(40.0), completed: true, ..Default::default() },
      SessionFigures { questions_asked: 6, correct_answers: 5, thinking_score: Some(70.0), ..Default::default() },
      // No questions: excluded from the average even with a score.
      SessionFigures { questions_asked: 0, thinking_score: Some(10.0), ..Default::default() },
    ];
    let stats = summarize(&sessions);
    assert_eq!(stats.total_sessions, 3);
    assert_eq!(stats.completed_sessions, 1);
    assert_eq!(stats.average_thinking_score, 55.0);
    assert_eq!(stats.accuracy, 60.0);
    assert_eq!(stats.total_questions, 10);
  }

  #[test]
  fn empty_summary_is_zeroed() {
    assert_eq!(summarize(&[]), ProgressStats::default());
  }
}
