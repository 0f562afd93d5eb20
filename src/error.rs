//! Error classes crossing the submission boundary.
//!
//! Transport failures are transient; malformed payloads, service-reported
//! errors and typesetting failures are not, so callers log them differently.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
  #[error("transport error: {0}")]
  Transport(String),
  #[error("malformed response: {0}")]
  Malformed(String),
  #[error("recognition service error: {0}")]
  Service(String),
  #[error("snapshot encoding failed: {0}")]
  Encode(String),
}

impl SubmitError {
  pub fn is_transient(&self) -> bool {
    matches!(self, SubmitError::Transport(_))
  }

  /// Short class label sent to the client.
  pub fn class(&self) -> &'static str {
    match self {
      SubmitError::Transport(_) => "transport",
      SubmitError::Malformed(_) => "malformed_response",
      SubmitError::Service(_) => "service",
      SubmitError::Encode(_) => "encode",
    }
  }
}

impl From<reqwest::Error> for SubmitError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      SubmitError::Malformed(e.to_string())
    } else {
      SubmitError::Transport(e.to_string())
    }
  }
}

/// Markup the typesetter refuses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
  #[error("typesetter not initialized")]
  NotInitialized,
  #[error("unbalanced braces at byte {0}")]
  UnbalancedBraces(usize),
  #[error("unterminated \\text block")]
  UnterminatedText,
}
