//! Registry of result overlays currently shown above the surface.
//!
//! Each overlay wraps one `ResultRecord` with a draggable position and an
//! expand/collapse flag for its step panel. Overlays are addressed by an id
//! handed out at insertion, so two textually identical results stay distinct.

use serde::{Deserialize, Serialize};

use crate::config::{LayoutConfig, LayoutPolicyKind};
use crate::domain::{Point, ResultRecord};
use crate::surface::InkBounds;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(pub u64);

#[derive(Clone, Debug)]
pub struct OverlayEntry {
  pub id: OverlayId,
  pub record: ResultRecord,
  pub position: Point,
  pub expanded: bool,
}

impl OverlayEntry {
  /// The step panel is shown only when the entry is expanded and the record has one.
  #[cfg(test)]
  pub fn steps_visible(&self) -> bool {
    self.expanded && self.record.shows_steps()
  }
}

/// Initial placement for freshly inserted overlays.
#[derive(Clone, Debug)]
pub enum LayoutPolicy {
  /// `origin + i * step`, `i` counting insertions since the last clear.
  Cascade { origin: Point, step: Point },
  /// Centre of the submitted ink, falling back to the cascade when blank.
  InkCenter { fallback_origin: Point, fallback_step: Point },
}

impl LayoutPolicy {
  pub fn from_config(cfg: &LayoutConfig) -> Self {
    let origin = Point::new(cfg.x0, cfg.y0);
    let step = Point::new(cfg.dx, cfg.dy);
    match cfg.policy {
      LayoutPolicyKind::Cascade => LayoutPolicy::Cascade { origin, step },
      LayoutPolicyKind::InkCenter => LayoutPolicy::InkCenter { fallback_origin: origin, fallback_step: step },
    }
  }

  pub fn needs_ink_bounds(&self) -> bool {
    matches!(self, LayoutPolicy::InkCenter { .. })
  }

  fn place(&self, index: u64, ink: Option<InkBounds>) -> Point {
    let cascade = |origin: Point, step: Point| {
      let i = index as f32;
      Point::new(origin.x + i * step.x, origin.y + i * step.y)
    };
    match self {
      LayoutPolicy::Cascade { origin, step } => cascade(*origin, *step),
      LayoutPolicy::InkCenter { fallback_origin, fallback_step } => match ink {
        Some(b) => b.center(),
        None => cascade(*fallback_origin, *fallback_step),
      },
    }
  }
}

impl Default for LayoutPolicy {
  fn default() -> Self { LayoutPolicy::from_config(&LayoutConfig::default()) }
}

pub struct OverlayRegistry {
  entries: Vec<OverlayEntry>,
  layout: LayoutPolicy,
  next_id: u64,
  /// Insertions since the last clear; drives the cascade index.
  placed: u64,
}

impl OverlayRegistry {
  pub fn new(layout: LayoutPolicy) -> Self {
    Self { entries: Vec::new(), layout, next_id: 1, placed: 0 }
  }

  pub fn layout(&self) -> &LayoutPolicy { &self.layout }

  /// Append records in order; returns the ids they were given.
  pub fn insert_all(&mut self, records: Vec<ResultRecord>, ink: Option<InkBounds>) -> Vec<OverlayId> {
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
      let id = OverlayId(self.next_id);
      self.next_id += 1;
      let position = self.layout.place(self.placed, ink);
      self.placed += 1;
      self.entries.push(OverlayEntry { id, record, position, expanded: false });
      ids.push(id);
    }
    ids
  }

  /// Flip the step panel of one entry. Returns the new state, or None if unknown.
  pub fn toggle_steps(&mut self, id: OverlayId) -> Option<bool> {
    let e = self.get_mut(id)?;
    e.expanded = !e.expanded;
    Some(e.expanded)
  }

  pub fn reposition(&mut self, id: OverlayId, to: Point) -> bool {
    match self.get_mut(id) {
      Some(e) => {
        e.position = to;
        true
      }
      None => false,
    }
  }

  pub fn delete(&mut self, id: OverlayId) -> Option<OverlayEntry> {
    let idx = self.entries.iter().position(|e| e.id == id)?;
    Some(self.entries.remove(idx))
  }

  pub fn clear_all(&mut self) {
    self.entries.clear();
    self.placed = 0;
  }

  #[cfg(test)]
  pub fn get(&self, id: OverlayId) -> Option<&OverlayEntry> {
    self.entries.iter().find(|e| e.id == id)
  }

  fn get_mut(&mut self, id: OverlayId) -> Option<&mut OverlayEntry> {
    self.entries.iter_mut().find(|e| e.id == id)
  }

  pub fn entries(&self) -> &[OverlayEntry] { &self.entries }
  pub fn len(&self) -> usize { self.entries.len() }
  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl Default for OverlayRegistry {
  fn default() -> Self { Self::new(LayoutPolicy::default()) }
}
