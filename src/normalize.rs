//! Presentation cleanup of oracle output.
//!
//! Models wrap replies in labels, quotes and code fences. Adapters run their text
//! through these helpers; the dialogue controller never does.

const LABEL_PREFIXES: &[&str] = &[
  "question:",
  "next question:",
  "hint:",
  "explanation:",
  "feedback:",
  "introduction:",
  "intro:",
  "tutor:",
  "answer:",
];

const DIRECT_ANSWER_PHRASES: &[&str] = &[
  "the answer is",
  "the correct answer is",
  "the right answer is",
  "the answer would be",
  "correct answer:",
  "the solution is",
];

const TRANSITION: &str = "Let's build on that with the next question.";

/// Strip a leading label (`Question:` …), surrounding quotes, markdown emphasis and whitespace.
pub fn clean_reply(raw: &str) -> String {
  let mut s = raw.trim();

  // Markdown bold labels like "**Question:**".
  let unbolded;
  if s.starts_with("**") {
    unbolded = s.replacen("**", "", 2);
    s = unbolded.trim();
  }

  loop {
    let lower = s.to_lowercase();
    match LABEL_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
      Some(p) => s = s[p.len()..].trim_start(),
      None => break,
    }
  }

  strip_quotes(s).trim().to_string()
}

fn strip_quotes(s: &str) -> &str {
  const PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’'), ('`', '`')];
  let s = s.trim();
  for (open, close) in PAIRS {
    if s.chars().count() >= 2 && s.starts_with(*open) && s.ends_with(*close) {
      let inner = &s[open.len_utf8()..s.len() - close.len_utf8()];
      // Only strip when the quote pair wraps the whole reply.
      if !inner.contains(*close) {
        return inner;
      }
    }
  }
  s
}

/// Pull a JSON object out of a model reply: plain, fenced (```json … ```), or embedded in prose.
pub fn extract_json_payload(raw: &str) -> Option<&str> {
  let s = raw.trim();
  if s.starts_with('{') && s.ends_with('}') {
    return Some(s);
  }

  if let Some(start) = s.find("```") {
    let after = &s[start + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    if let Some(end) = body.find("```") {
      let inner = body[..end].trim();
      if inner.starts_with('{') {
        return Some(inner);
      }
    }
  }

  let open = s.find('{')?;
  let close = s.rfind('}')?;
  (close > open).then(|| &s[open..=close])
}

/// True when text reads like it hands over the answer instead of guiding.
pub fn reveals_answer(text: &str) -> bool {
  let lower = text.to_lowercase();
  DIRECT_ANSWER_PHRASES.iter().any(|p| lower.contains(p))
}

/// Append the transition sentence to an explanation unless it already ends with one.
pub fn with_transition(explanation: &str) -> String {
  let s = explanation.trim_end();
  if s.is_empty() || s.ends_with(TRANSITION) || s.to_lowercase().contains("next question") {
    return s.to_string();
  }
  let sep = if s.ends_with(&['.', '!', '?'][..]) { " " } else { ". " };
  format!("{s}{sep}{TRANSITION}")
}
