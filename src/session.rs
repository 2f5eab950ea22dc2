//! Mutable progress record of one learning session.
//!
//! `SessionState` is owned by a single `DialogueController` and snapshotted to the
//! store between turns. Counters only move through the methods below so the
//! invariants (attempts < 3, hints <= 3, question number monotonic) hold.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, Quality, Turn};

pub const WINDOW_CAPACITY: usize = 3;
pub const MAX_ATTEMPTS: u8 = 3;
pub const MAX_HINTS: u8 = 3;
pub const MIN_ANSWER_CHARS: usize = 20;

/// Bounded FIFO of the most recent answer-quality labels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityWindow {
    entries: VecDeque<Quality>,
}

impl QualityWindow {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(WINDOW_CAPACITY) }
    }

    /// Push a label, evicting the oldest beyond capacity.
    pub fn push(&mut self, quality: Quality) {
        if self.entries.len() == WINDOW_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(quality);
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == WINDOW_CAPACITY
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True when the window is full and every entry equals `quality`.
    pub fn is_unanimous(&self, quality: Quality) -> bool {
        self.is_full() && self.entries.iter().all(|q| *q == quality)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quality> {
        self.entries.iter()
    }
}

impl<const N: usize> From<[Quality; N]> for QualityWindow {
    fn from(items: [Quality; N]) -> Self {
        let mut w = QualityWindow::new();
        for q in items {
            w.push(q);
        }
        w
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub difficulty: Difficulty,
    pub question_number: u32,
    pub attempt_count: u8,
    pub hint_count: u8,
    pub quality_window: QualityWindow,
    /// Insertion-ordered, duplicate-free.
    pub explored_topics: Vec<String>,
    pub transcript: Vec<Turn>,
    pub current_question: Option<String>,
    /// Latest answer to the current question, used as hint context.
    pub last_answer: Option<String>,
    /// Hints delivered for the current question. Presentational only.
    pub hints: Vec<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::MIN,
            question_number: 1,
            attempt_count: 0,
            hint_count: 0,
            quality_window: QualityWindow::new(),
            explored_topics: Vec::new(),
            transcript: Vec::new(),
            current_question: None,
            last_answer: None,
            hints: Vec::new(),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending_question(&self) -> bool {
        self.current_question.is_some()
    }

    pub fn mark_explored(&mut self, topic: &str) {
        if !self.explored_topics.iter().any(|t| t == topic) {
            self.explored_topics.push(topic.to_string());
        }
    }

    /// Close the current question cycle: counters reset, question number advances.
    pub fn complete_question(&mut self) {
        self.attempt_count = 0;
        self.hint_count = 0;
        self.question_number += 1;
        self.current_question = None;
        self.last_answer = None;
        self.hints.clear();
    }

    /// Record one failed attempt. Returns true when attempts are exhausted.
    pub fn record_attempt(&mut self) -> bool {
        self.attempt_count += 1;
        self.attempt_count >= MAX_ATTEMPTS
    }

    pub fn hints_exhausted(&self) -> bool {
        self.hint_count >= MAX_HINTS
    }

    pub fn reset(&mut self) {
        *self = SessionState::default();
    }
}

/// Focus topic for a question number: each topic covers three consecutive questions
/// and the last topic absorbs the remainder.
pub fn focus_topic_index(question_number: u32, topic_count: usize) -> Option<usize> {
    if topic_count == 0 {
        return None;
    }
    let slot = (question_number.saturating_sub(1) / 3) as usize;
    Some(slot.min(topic_count - 1))
}

/// Whether an answer is long enough to be evaluated.
pub fn answer_is_long_enough(answer: &str) -> bool {
    answer.trim().chars().count() >= MIN_ANSWER_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let mut w = QualityWindow::new();
        w.push(Quality::NeedsWork);
        w.push(Quality::Strong);
        w.push(Quality::Strong);
        w.push(Quality::Strong);
        assert_eq!(w.len(), 3);
        assert!(w.is_unanimous(Quality::Strong));
    }

    #[test]
    fn partial_window_is_never_unanimous() {
        let w = QualityWindow::from([Quality::Strong, Quality::Strong]);
        assert!(!w.is_unanimous(Quality::Strong));
    }

    #[test]
    fn focus_topics_cycle_in_blocks_of_three() {
        let topics = ["A", "B", "C"];
        let picked: Vec<&str> = (1..=9)
            .map(|n| topics[focus_topic_index(n, topics.len()).unwrap()])
            .collect();
        assert_eq!(picked, vec!["A", "A", "A", "B", "B", "B", "C", "C", "C"]);
    }

    #[test]
    fn last_topic_absorbs_remainder() {
        assert_eq!(focus_topic_index(10, 3), Some(2));
        assert_eq!(focus_topic_index(40, 3), Some(2));
        assert_eq!(focus_topic_index(5, 0), None);
    }

    #[test]
    fn completing_a_question_resets_counters() {
        let mut s = SessionState::new();
        s.current_question = Some("What is entropy?".into());
        s.attempt_count = 2;
        s.hint_count = 3;
        s.complete_question();
        assert_eq!(s.question_number, 2);
        assert_eq!((s.attempt_count, s.hint_count), (0, 0));
        assert!(!s.has_pending_question());
    }

    #[test]
    fn explored_topics_are_deduplicated() {
        let mut s = SessionState::new();
        s.mark_explored("Thermodynamics");
        s.mark_explored("Thermodynamics");
        assert_eq!(s.explored_topics, vec!["Thermodynamics".to_string()]);
    }

    #[test]
    fn answer_length_threshold() {
        assert!(!answer_is_long_enough("nineteen characters"));
        assert!(answer_is_long_enough("twenty characters!!!"));
    }
}
