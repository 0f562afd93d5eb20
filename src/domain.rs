//! Domain models: surface geometry and colour, tool mode, and the structured
//! results the recognition service returns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A position on the drawing surface or the overlay plane, in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub fn new(x: f32, y: f32) -> Self { Self { x, y } }
}

/// Active tool of the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  #[default]
  Pen,
  Eraser,
}

/// Straight RGBA colour. Parsed from `#rrggbb`, `#rrggbbaa` or `rgb(r, g, b)` /
/// `rgba(r, g, b, a)` the way the palette sends them; serialized back as `rgb(...)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
  pub const WHITE: Color = Color([255, 255, 255, 255]);

  pub fn rgba(self) -> [u8; 4] { self.0 }
}

impl Default for Color {
  fn default() -> Self { Color::WHITE }
}

impl fmt::Display for Color {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let [r, g, b, a] = self.0;
    if a == 255 {
      write!(f, "rgb({r}, {g}, {b})")
    } else {
      write!(f, "rgba({r}, {g}, {b}, {:.3})", a as f32 / 255.0)
    }
  }
}

impl FromStr for Color {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
      let byte = |i: usize| {
        hex.get(i..i + 2)
          .and_then(|h| u8::from_str_radix(h, 16).ok())
          .ok_or_else(|| format!("invalid hex colour: {s}"))
      };
      return match hex.len() {
        6 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => Err(format!("invalid hex colour: {s}")),
      };
    }

    let lower = s.to_ascii_lowercase();
    let inner = lower
      .strip_prefix("rgba(")
      .or_else(|| lower.strip_prefix("rgb("))
      .and_then(|rest| rest.strip_suffix(')'))
      .ok_or_else(|| format!("unsupported colour syntax: {s}"))?;

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
      return Err(format!("expected 3 or 4 components: {s}"));
    }
    let channel = |p: &str| p.parse::<u8>().map_err(|_| format!("invalid channel '{p}' in {s}"));
    let alpha = match parts.get(3) {
      Some(a) => {
        let a: f32 = a.parse().map_err(|_| format!("invalid alpha '{a}' in {s}"))?;
        (a.clamp(0.0, 1.0) * 255.0).round() as u8
      }
      None => 255,
    };
    Ok(Color([channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha]))
  }
}

impl Serialize for Color {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Color {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// What the service decided the handwritten item is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
  #[default]
  Arithmetic,
  Equation,
  VariableAssignment,
  Function,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
  Text,
  Math,
}

/// One line of a step-by-step solution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  pub kind: StepKind,
  pub content: String,
}

impl Step {
  pub fn text(content: impl Into<String>) -> Self { Self { kind: StepKind::Text, content: content.into() } }
  pub fn math(content: impl Into<String>) -> Self { Self { kind: StepKind::Math, content: content.into() } }
}

/// One structured recognition outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
  pub expr: String,
  pub result: String,
  pub latex: String,
  pub steps: Vec<Step>,
  pub classification: Classification,
  pub assign: bool,
}

impl ResultRecord {
  /// Assignment records never get a step panel.
  pub fn shows_steps(&self) -> bool {
    self.classification != Classification::VariableAssignment && !self.steps.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_palette_colours() {
    assert_eq!("rgb(255, 255, 255)".parse::<Color>().unwrap(), Color::WHITE);
    assert_eq!("#ee3333".parse::<Color>().unwrap(), Color([0xee, 0x33, 0x33, 255]));
    assert_eq!("rgba(0,0,0,0)".parse::<Color>().unwrap(), Color([0, 0, 0, 0]));
    assert!("hsl(1,2,3)".parse::<Color>().is_err());
    assert!("#12".parse::<Color>().is_err());
  }

  #[test]
  fn colour_display_round_trips_through_parse() {
    let c = Color([12, 200, 7, 255]);
    assert_eq!(c.to_string(), "rgb(12, 200, 7)");
    assert_eq!(c.to_string().parse::<Color>().unwrap(), c);
  }

  #[test]
  fn assignment_records_hide_steps() {
    let mut r = ResultRecord {
      expr: "x".into(),
      result: "5".into(),
      latex: "x=5".into(),
      steps: vec![Step::math("x = 5")],
      classification: Classification::VariableAssignment,
      assign: true,
    };
    assert!(!r.shows_steps());
    r.classification = Classification::Equation;
    assert!(r.shows_steps());
    r.steps.clear();
    assert!(!r.shows_steps());
  }
}
