//! Converts result records and solution steps into TeX markup for the
//! front-end typesetting engine, and checks that markup before handing it over.
//!
//! Example:
//!   format_latex("a=b=c") -> \begin{aligned}&a = b \\ &= c\end{aligned}

use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::domain::{ResultRecord, Step, StepKind};
use crate::error::RenderError;

/// Fixed rewrite table for math steps, applied in order.
static MATH_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
  [
    (r"×", r" \times "),
    (r"≈", r" \approx "),
    (r"(^|[\d\s(])(mm|cm|dm|km|m|ft)²", r"${1}\text{$2}^{2}"),
    (r"(^|[\d\s(])(mm|cm|dm|km|m|ft)³", r"${1}\text{$2}^{3}"),
    (r"²", r"^{2}"),
    (r"³", r"^{3}"),
    (r"\^(-?\d+(?:\.\d+)?)", r"^{$1}"),
    (r"(^|[\d\s(])(mm|cm|dm|km|m|ft)([23])\b", r"${1}\text{$2}^{$3}"),
    (r"\s+", " "),
  ]
  .into_iter()
  .filter_map(|(pat, rep)| match Regex::new(pat) {
    Ok(re) => Some((re, rep)),
    Err(e) => {
      warn!(target: "markup", pattern = pat, error = %e, "Skipping invalid rewrite");
      None
    }
  })
  .collect()
});

/// Markup for one solution step.
pub fn step_markup(step: &Step) -> String {
  match step.kind {
    StepKind::Text => text_block(&step.content),
    StepKind::Math => rewrite_math(&step.content),
  }
}

/// Wrap content verbatim in a `\text{}` block so word spacing survives.
pub fn text_block(content: &str) -> String {
  format!(r"\text{{{content}}}")
}

/// Like `text_block`, but with TeX specials escaped. Used when the original
/// markup could not be typeset.
fn escaped_text_block(content: &str) -> String {
  let mut out = String::with_capacity(content.len() + 8);
  out.push_str(r"\text{");
  for ch in content.chars() {
    match ch {
      '\\' => out.push_str(r"\textbackslash{}"),
      '{' | '}' | '$' | '%' | '#' | '&' | '_' => {
        out.push('\\');
        out.push(ch);
      }
      _ => out.push(ch),
    }
  }
  out.push('}');
  out
}

pub fn rewrite_math(content: &str) -> String {
  let mut s = content.to_string();
  for (re, rep) in MATH_REWRITES.iter() {
    s = re.replace_all(&s, *rep).into_owned();
  }
  s.trim().to_string()
}

/// A record's `latex` split on top-level `=` into aligned rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlignedBlock {
  pub rows: Vec<String>,
}

impl AlignedBlock {
  pub fn to_markup(&self) -> String {
    let mut body = String::new();
    for (i, row) in self.rows.iter().enumerate() {
      if i >= 2 {
        body.push(' ');
      }
      body.push_str(row);
    }
    format!(r"\begin{{aligned}}{body}\end{{aligned}}")
  }
}

/// Split `latex` on every top-level equals sign. The first side becomes `&lhs`,
/// the second ` = rhs` on the same line, and every further side a new aligned
/// row `\\ &= rhs`.
pub fn format_latex(latex: &str) -> AlignedBlock {
  let parts = split_top_level_equals(latex);
  let rows = parts
    .iter()
    .enumerate()
    .map(|(i, part)| match i {
      0 => format!("&{part}"),
      1 => format!(" = {part}"),
      _ => format!(r"\\ &= {part}"),
    })
    .collect();
  AlignedBlock { rows }
}

fn split_top_level_equals(s: &str) -> Vec<String> {
  let chars: Vec<char> = s.chars().collect();
  let mut parts = Vec::new();
  let mut current = String::new();
  let mut depth = 0i32;

  for (i, &c) in chars.iter().enumerate() {
    match c {
      '{' | '(' | '[' => depth += 1,
      '}' | ')' | ']' => depth -= 1,
      _ => {}
    }
    let prev = if i > 0 { chars[i - 1] } else { ' ' };
    let next = chars.get(i + 1).copied().unwrap_or(' ');
    let relational = matches!(prev, '<' | '>' | '!' | '=' | '\\') || next == '=';
    if c == '=' && depth == 0 && !relational {
      parts.push(current.trim().to_string());
      current.clear();
    } else {
      current.push(c);
    }
  }
  parts.push(current.trim().to_string());
  parts
}

/// Overlay title, e.g. `\LARGE{2+2 = 4}`.
pub fn headline_markup(record: &ResultRecord) -> String {
  format!(r"\LARGE{{{} = {}}}", record.expr, record.result)
}

/// Display-ready markup for one overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedRecord {
  pub headline: String,
  pub latex: String,
  pub steps: Vec<String>,
}

/// Front-end typesetting engine handle. Owned by a session: `initialize` when
/// the session opens, `dispose` when it closes. Markup that would break the
/// engine is rejected here instead.
#[derive(Debug, Default)]
pub struct Typesetter {
  ready: bool,
  typeset_count: u64,
}

impl Typesetter {
  pub fn initialize() -> Self {
    debug!(target: "markup", "Typesetter initialized");
    Self { ready: true, typeset_count: 0 }
  }

  pub fn is_ready(&self) -> bool { self.ready }

  /// Validate markup and wrap it in inline `\( \)` or display `\[ \]` delimiters.
  pub fn typeset(&mut self, markup: &str, display: bool) -> Result<String, RenderError> {
    if !self.ready {
      return Err(RenderError::NotInitialized);
    }
    check_braces(markup)?;
    self.typeset_count += 1;
    Ok(if display { format!(r"\[{markup}\]") } else { format!(r"\({markup}\)") })
  }

  /// Typeset, or fall back to the raw source as an escaped text block.
  pub fn typeset_or_text(&mut self, markup: &str, raw: &str, display: bool) -> String {
    match self.typeset(markup, display) {
      Ok(out) => out,
      Err(RenderError::NotInitialized) => raw.to_string(),
      Err(e) => {
        warn!(target: "markup", error = %e, raw_len = raw.len(), "Typesetting failed; showing plain text");
        let fallback = escaped_text_block(raw);
        self.typeset(&fallback, display).unwrap_or(fallback)
      }
    }
  }

  pub fn render(&mut self, record: &ResultRecord) -> RenderedRecord {
    let headline_src = headline_markup(record);
    let headline = self.typeset_or_text(&headline_src, &format!("{} = {}", record.expr, record.result), false);
    let latex = self.typeset_or_text(&format_latex(&record.latex).to_markup(), &record.latex, true);
    let steps = if record.shows_steps() {
      record
        .steps
        .iter()
        .map(|s| self.typeset_or_text(&step_markup(s), &s.content, false))
        .collect()
    } else {
      Vec::new()
    };
    RenderedRecord { headline, latex, steps }
  }

  pub fn dispose(&mut self) {
    if self.ready {
      debug!(target: "markup", typeset = self.typeset_count, "Typesetter disposed");
    }
    self.ready = false;
  }
}

impl Drop for Typesetter {
  fn drop(&mut self) {
    self.dispose();
  }
}

fn check_braces(markup: &str) -> Result<(), RenderError> {
  // Each open brace remembers whether it opened a \text argument.
  let mut open: Vec<(usize, bool)> = Vec::new();
  let bytes = markup.as_bytes();
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'\\' => {
        // Escaped char or control word; `\{` and `\}` are literal braces.
        if matches!(bytes.get(i + 1), Some(b'{') | Some(b'}') | Some(b'\\')) {
          i += 2;
          continue;
        }
      }
      b'{' => {
        let is_text = markup[..i].ends_with(r"\text");
        open.push((i, is_text));
      }
      b'}' => {
        if open.pop().is_none() {
          return Err(RenderError::UnbalancedBraces(i));
        }
      }
      _ => {}
    }
    i += 1;
  }
  match open.last() {
    None => Ok(()),
    Some((_, true)) => Err(RenderError::UnterminatedText),
    Some((pos, false)) => Err(RenderError::UnbalancedBraces(*pos)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Classification;

  #[test]
  fn single_equals_gives_two_rows() {
    let block = format_latex("x=5");
    assert_eq!(block.rows, vec!["&x".to_string(), " = 5".to_string()]);
    assert_eq!(block.to_markup(), r"\begin{aligned}&x = 5\end{aligned}");
  }

  #[test]
  fn chained_equalities_start_new_rows() {
    let block = format_latex("a=b=c");
    assert_eq!(block.rows, vec!["&a".to_string(), " = b".to_string(), r"\\ &= c".to_string()]);
    assert_eq!(block.to_markup(), r"\begin{aligned}&a = b \\ &= c\end{aligned}");
  }

  #[test]
  fn nested_and_relational_equals_are_not_split_points() {
    let block = format_latex(r"f(x=1) \leq 3 = y");
    assert_eq!(block.rows.len(), 2);
    assert_eq!(block.rows[0], r"&f(x=1) \leq 3");
    assert_eq!(format_latex("a <= b").rows, vec!["&a <= b".to_string()]);
    assert_eq!(format_latex(r"\frac{a=b}{2}").rows.len(), 1);
  }

  #[test]
  fn math_rewrites_apply_fixed_table() {
    assert_eq!(rewrite_math("3 × 4"), r"3 \times 4");
    assert_eq!(rewrite_math("π ≈ 3.14"), r"π \approx 3.14");
    assert_eq!(rewrite_math("x^23 + y^2"), "x^{23} + y^{2}");
    assert_eq!(rewrite_math("area = 12 m2"), r"area = 12 \text{m}^{2}");
    assert_eq!(rewrite_math("A = 12 m² and 5 cm³"), r"A = 12 \text{m}^{2} and 5 \text{cm}^{3}");
    assert_eq!(rewrite_math("x² + y³"), "x^{2} + y^{3}");
    assert_eq!(rewrite_math("5cm3"), r"5\text{cm}^{3}");
    assert_eq!(rewrite_math("  a   +\n b  "), "a + b");
    assert_eq!(rewrite_math("x2 + m2"), r"x2 + \text{m}^{2}");
  }

  #[test]
  fn text_steps_are_literal() {
    let step = Step::text("cost is $5 & 10% off {x}");
    assert_eq!(step_markup(&step), r"\text{cost is $5 & 10% off {x}}");
    assert_eq!(step_markup(&Step::text("3 × 4")), r"\text{3 × 4}");
  }

  #[test]
  fn typesetter_rejects_unbalanced_markup() {
    let mut t = Typesetter::initialize();
    assert_eq!(t.typeset("x^{2", false), Err(RenderError::UnbalancedBraces(2)));
    assert_eq!(t.typeset("a}", false), Err(RenderError::UnbalancedBraces(1)));
    assert_eq!(t.typeset(r"\text{abc", false), Err(RenderError::UnterminatedText));
    assert_eq!(t.typeset(r"\{ x \}", false).unwrap(), r"\(\{ x \}\)");
    assert_eq!(t.typeset("x", true).unwrap(), r"\[x\]");
  }

  #[test]
  fn disposed_typesetter_refuses_work() {
    let mut t = Typesetter::initialize();
    t.dispose();
    assert!(!t.is_ready());
    assert_eq!(t.typeset("x", false), Err(RenderError::NotInitialized));
  }

  #[test]
  fn broken_markup_falls_back_to_text() {
    let mut t = Typesetter::initialize();
    assert_eq!(t.typeset_or_text("x^{2", "x^{2", false), r"\(\text{x^\{2}\)");
  }

  #[test]
  fn render_hides_steps_for_assignments() {
    let mut t = Typesetter::initialize();
    let mut record = ResultRecord {
      expr: "x".into(),
      result: "5".into(),
      latex: "x=5".into(),
      steps: vec![Step::math("x = 5")],
      classification: Classification::VariableAssignment,
      assign: true,
    };
    let r = t.render(&record);
    assert_eq!(r.headline, r"\(\LARGE{x = 5}\)");
    assert_eq!(r.latex, r"\[\begin{aligned}&x = 5\end{aligned}\]");
    assert!(r.steps.is_empty());

    record.classification = Classification::Equation;
    assert_eq!(t.render(&record).steps, vec![r"\(x = 5\)".to_string()]);
  }
}
