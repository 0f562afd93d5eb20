//! HTTP endpoint handlers. These are thin wrappers over config and the markup adapter.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::markup::{format_latex, step_markup, Typesetter};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(ClientConfigOut::from(&state.config.surface))
}

/// Convert either a record `latex` string or a single step into renderer markup.
#[instrument(level = "info", skip(body), fields(has_latex = body.latex.is_some(), has_step = body.step.is_some()))]
pub async fn http_post_markup(Json(body): Json<MarkupIn>) -> impl IntoResponse {
  let (markup, display) = match (&body.latex, &body.step) {
    (Some(latex), _) => (format_latex(latex).to_markup(), true),
    (None, Some(step)) => (step_markup(step), false),
    (None, None) => {
      return (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(MarkupOut { markup: String::new(), typeset: None, error: Some("expected `latex` or `step`".into()) }),
      );
    }
  };

  let mut typesetter = Typesetter::initialize();
  let out = match typesetter.typeset(&markup, display) {
    Ok(t) => MarkupOut { markup, typeset: Some(t), error: None },
    Err(e) => {
      info!(target: "markup", error = %e, "Markup rejected by typesetter");
      MarkupOut { markup, typeset: None, error: Some(e.to_string()) }
    }
  };
  (StatusCode::OK, Json(out))
}
