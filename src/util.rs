//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings (char boundary aware).
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let total = s.chars().count();
  if total <= max_chars {
    s.to_string()
  } else {
    format!("{}… ({} chars total)", s.chars().take(max_chars).collect::<String>(), total)
  }
}

/// Limit how much document text goes into a single prompt.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
  match text.char_indices().nth(max_chars) {
    Some((idx, _)) => &text[..idx],
    None => text,
  }
}

/// Round to one decimal place.
pub fn round1(x: f64) -> f64 {
  (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_all_keys() {
    let out = fill_template("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and y and x");
  }

  #[test]
  fn excerpt_respects_char_boundaries() {
    assert_eq!(excerpt("héllo", 2), "hé");
    assert_eq!(excerpt("hi", 10), "hi");
  }

  #[test]
  fn trunc_marks_long_strings() {
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log("a much longer string", 4).starts_with("a mu…"));
  }

  #[test]
  fn round1_keeps_one_decimal() {
    assert_eq!(round1(12.36), 12.4);
    assert_eq!(round1(12.34), 12.3);
  }
}
