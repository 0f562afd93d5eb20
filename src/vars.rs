//! Accumulated `expr -> result` bindings sent back with every submission so
//! the service can resolve variables defined by earlier drawings.

use std::collections::HashMap;

use crate::domain::ResultRecord;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableContext {
  bindings: HashMap<String, String>,
}

impl VariableContext {
  pub fn new() -> Self { Self::default() }

  /// Fold every `assign` record into the context, in response order.
  /// Returns how many records were folded.
  pub fn fold(&mut self, records: &[ResultRecord]) -> usize {
    let mut folded = 0;
    for r in records.iter().filter(|r| r.assign) {
      self.bindings.insert(r.expr.clone(), r.result.clone());
      folded += 1;
    }
    folded
  }

  pub fn get(&self, expr: &str) -> Option<&str> {
    self.bindings.get(expr).map(String::as_str)
  }

  pub fn bindings(&self) -> &HashMap<String, String> { &self.bindings }
  pub fn len(&self) -> usize { self.bindings.len() }
  pub fn is_empty(&self) -> bool { self.bindings.is_empty() }

  pub fn clear(&mut self) {
    self.bindings.clear();
  }
}
