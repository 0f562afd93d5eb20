//! Small utility helpers used across modules.

/// Log-safe truncation for large strings.
/// Avoids spamming logs with image payloads and response bodies.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_strings_pass_through() {
    assert_eq!(trunc_for_log("abc", 10), "abc");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "ab×cd";
    assert_eq!(trunc_for_log(s, 3), "ab… (6 bytes total)");
  }
}
