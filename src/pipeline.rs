//! Submission pipeline: snapshot the surface, send one recognition request at
//! a time, and fold the reply into the variable context and overlay registry.
//!
//! Flow:
//! 1) `begin` captures the PNG snapshot and bindings and raises the in-flight flag.
//!    A second `begin` while the flag is up does nothing.
//! 2) The caller awaits the recognizer without holding the session, so drawing
//!    keeps working while the request is out.
//! 3) `complete` lowers the flag first, then applies the outcome. On failure
//!    nothing else is touched.

use tracing::{debug, error, info, instrument, warn};

use crate::config::SubmissionConfig;
use crate::domain::ResultRecord;
use crate::error::SubmitError;
use crate::overlay::{OverlayId, OverlayRegistry};
use crate::recognizer::RecognitionRequest;
use crate::surface::{InkBounds, Surface};
use crate::vars::VariableContext;

/// State captured at dispatch time and needed again at completion.
#[derive(Clone, Copy, Debug)]
pub struct SubmissionTicket {
  pub seq: u64,
  pub ink: Option<InkBounds>,
}

pub struct Dispatch {
  pub request: RecognitionRequest,
  pub ticket: SubmissionTicket,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
  pub inserted: Vec<OverlayId>,
  pub folded: usize,
}

pub struct SubmissionPipeline {
  in_flight: bool,
  clear_surface_on_success: bool,
  seq: u64,
}

impl SubmissionPipeline {
  pub fn new(cfg: &SubmissionConfig) -> Self {
    Self { in_flight: false, clear_surface_on_success: cfg.clear_surface_on_success, seq: 0 }
  }

  pub fn is_submitting(&self) -> bool { self.in_flight }

  /// Capture a request. `Ok(None)` when a submission is already in flight.
  #[instrument(level = "debug", skip_all, fields(in_flight = self.in_flight))]
  pub fn begin(
    &mut self,
    surface: &Surface,
    vars: &VariableContext,
    want_ink_bounds: bool,
  ) -> Result<Option<Dispatch>, SubmitError> {
    if self.in_flight {
      debug!(target: "submission", "Submit suppressed; request already in flight");
      return Ok(None);
    }
    let image = surface.snapshot()?;
    let ink = if want_ink_bounds { surface.ink_bounds() } else { None };

    self.seq += 1;
    self.in_flight = true;
    info!(target: "submission", seq = self.seq, image_len = image.len(), vars = vars.len(), "Submission dispatched");
    Ok(Some(Dispatch {
      request: RecognitionRequest { image, dict_of_vars: vars.bindings().clone() },
      ticket: SubmissionTicket { seq: self.seq, ink },
    }))
  }

  /// Apply a finished request. The in-flight flag is cleared for every outcome.
  #[instrument(level = "debug", skip_all, fields(seq = ticket.seq))]
  pub fn complete(
    &mut self,
    ticket: SubmissionTicket,
    outcome: Result<Vec<ResultRecord>, SubmitError>,
    surface: &mut Surface,
    vars: &mut VariableContext,
    overlays: &mut OverlayRegistry,
  ) -> Result<Completion, SubmitError> {
    self.in_flight = false;

    let records = match outcome {
      Ok(records) => records,
      Err(e) => {
        if e.is_transient() {
          warn!(target: "submission", seq = ticket.seq, error = %e, "Submission failed (transient)");
        } else {
          error!(target: "submission", seq = ticket.seq, class = e.class(), error = %e, "Submission failed");
        }
        return Err(e);
      }
    };

    let folded = vars.fold(&records);
    let inserted = overlays.insert_all(records, ticket.ink);
    if self.clear_surface_on_success {
      surface.clear();
    }
    info!(target: "submission", seq = ticket.seq, results = inserted.len(), folded, "Submission applied");
    Ok(Completion { inserted, folded })
  }
}
