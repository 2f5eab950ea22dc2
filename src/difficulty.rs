//! Difficulty adjustment over the quality window.
//!
//! A unanimous full window moves difficulty one step and clears the window. Any
//! other full window (mixed labels, or unanimous at a boundary) is kept as is so
//! later answers keep sliding through it.

use serde::Serialize;

use crate::domain::{Difficulty, Quality};
use crate::session::QualityWindow;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum Adjustment {
  Escalate { from: Difficulty, to: Difficulty },
  Deescalate { from: Difficulty, to: Difficulty },
  Hold,
}

/// Pure decision. Only meaningful on a full window; anything shorter holds.
pub fn decide(window: &QualityWindow, current: Difficulty) -> Adjustment {
  if window.is_unanimous(Quality::Strong) {
    if let Some(to) = current.raised() {
      return Adjustment::Escalate { from: current, to };
    }
  } else if window.is_unanimous(Quality::NeedsWork) {
    if let Some(to) = current.lowered() {
      return Adjustment::Deescalate { from: current, to };
    }
  }
  Adjustment::Hold
}

/// Apply the decision in place. Returns the adjustment made.
pub fn apply(window: &mut QualityWindow, difficulty: &mut Difficulty) -> Adjustment {
  let adj = decide(window, *difficulty);
  match adj {
    Adjustment::Escalate { to, .. } | Adjustment::Deescalate { to, .. } => {
      *difficulty = to;
      window.clear();
    }
    Adjustment::Hold => {}
  }
  adj
}
