//! Loading service configuration (surface, layout, submission policy) from TOML
//! plus a handful of environment variables.
//!
//! See `AppConfig` for the expected schema. Every section and field is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Color;

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
  pub surface: SurfaceConfig,
  pub layout: LayoutConfig,
  pub submission: SubmissionConfig,
}

/// Raster dimensions and tool widths.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
  pub width: u32,
  pub height: u32,
  pub pen_width: f32,
  pub eraser_width: f32,
  pub default_color: Color,
}

impl Default for SurfaceConfig {
  fn default() -> Self {
    Self {
      width: 1280,
      height: 720,
      pen_width: 3.0,
      eraser_width: 20.0,
      default_color: Color::WHITE,
    }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPolicyKind {
  #[default]
  Cascade,
  InkCenter,
}

/// Initial overlay placement. `x0/y0` is the first cascade slot, `dx/dy` the
/// offset added per insertion.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
  pub policy: LayoutPolicyKind,
  pub x0: f32,
  pub y0: f32,
  pub dx: f32,
  pub dy: f32,
}

impl Default for LayoutConfig {
  fn default() -> Self {
    Self { policy: LayoutPolicyKind::Cascade, x0: 20.0, y0: 100.0, dx: 20.0, dy: 60.0 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
  pub clear_surface_on_success: bool,
  /// None leaves the request pending until the transport gives up.
  pub request_timeout_secs: Option<u64>,
}

impl Default for SubmissionConfig {
  fn default() -> Self {
    Self { clear_surface_on_success: true, request_timeout_secs: None }
  }
}

/// Process-level settings that come from the environment only.
#[derive(Clone, Debug)]
pub struct EnvSettings {
  pub port: u16,
  pub recognizer_url: String,
  pub static_dir: String,
}

impl EnvSettings {
  pub fn from_env() -> Self {
    let port = std::env::var("PORT")
      .ok()
      .and_then(|p| p.parse::<u16>().ok())
      .unwrap_or(3000);
    let recognizer_url = std::env::var("RECOGNIZER_URL")
      .unwrap_or_else(|_| "http://localhost:8900/calculate".into());
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());
    Self { port, recognizer_url, static_dir }
  }
}

pub fn parse_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Attempt to load `AppConfig` from INKCALC_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("INKCALC_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "inkcalc_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "inkcalc_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "inkcalc_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_document_yields_defaults() {
    let cfg = parse_config("").expect("parse");
    assert_eq!(cfg.surface.width, 1280);
    assert_eq!(cfg.layout.policy, LayoutPolicyKind::Cascade);
    assert_eq!((cfg.layout.x0, cfg.layout.y0), (20.0, 100.0));
    assert!(cfg.submission.clear_surface_on_success);
    assert!(cfg.submission.request_timeout_secs.is_none());
  }

  #[test]
  fn partial_sections_override_only_named_fields() {
    let cfg = parse_config(
      r##"
        [surface]
        eraser_width = 32.0
        default_color = "#ff0000"

        [layout]
        policy = "ink_center"

        [submission]
        request_timeout_secs = 45
      "##,
    )
    .expect("parse");
    assert_eq!(cfg.surface.eraser_width, 32.0);
    assert_eq!(cfg.surface.pen_width, 3.0);
    assert_eq!(cfg.surface.default_color, Color([255, 0, 0, 255]));
    assert_eq!(cfg.layout.policy, LayoutPolicyKind::InkCenter);
    assert_eq!(cfg.layout.dy, 60.0);
    assert_eq!(cfg.submission.request_timeout_secs, Some(45));
  }

  #[test]
  fn bad_colour_is_a_parse_error() {
    assert!(parse_config("[surface]\ndefault_color = \"purple-ish\"").is_err());
  }
}
