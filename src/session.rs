//! One drawing session: the surface, the variable context, the overlay
//! registry, the submission pipeline and the typesetter, owned together by the
//! connection that created them.
//!
//! All mutation goes through `&mut Session` from a single task; nothing here
//! is shared or locked.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::{Color, Mode, Point, ResultRecord};
use crate::error::SubmitError;
use crate::markup::Typesetter;
use crate::overlay::{LayoutPolicy, OverlayEntry, OverlayId, OverlayRegistry};
use crate::pipeline::{Completion, Dispatch, SubmissionPipeline, SubmissionTicket};
use crate::protocol::{OverlayOut, StateOut};
use crate::recognizer::Recognizer;
use crate::surface::Surface;
use crate::vars::VariableContext;

pub struct Session {
  pub id: Uuid,
  pub surface: Surface,
  pub vars: VariableContext,
  pub overlays: OverlayRegistry,
  pipeline: SubmissionPipeline,
  typesetter: Typesetter,
}

impl Session {
  pub fn new(cfg: &AppConfig) -> Self {
    let id = Uuid::new_v4();
    info!(target: "session", %id, width = cfg.surface.width, height = cfg.surface.height, "Session opened");
    Self {
      id,
      surface: Surface::new(&cfg.surface),
      vars: VariableContext::new(),
      overlays: OverlayRegistry::new(LayoutPolicy::from_config(&cfg.layout)),
      pipeline: SubmissionPipeline::new(&cfg.submission),
      typesetter: Typesetter::initialize(),
    }
  }

  pub fn is_submitting(&self) -> bool { self.pipeline.is_submitting() }

  // --- pointer input ---

  pub fn pointer_down(&mut self, p: Point) { self.surface.begin_stroke(p); }
  pub fn pointer_move(&mut self, p: Point) { self.surface.extend_stroke(p); }
  pub fn pointer_up(&mut self) { self.surface.end_stroke(); }
  pub fn pointer_leave(&mut self) { self.surface.end_stroke(); }

  pub fn set_mode(&mut self, mode: Mode) { self.surface.set_mode(mode); }
  pub fn set_color(&mut self, color: Color) { self.surface.set_color(color); }

  pub fn clear_surface(&mut self) {
    self.surface.clear();
  }

  /// Clear surface, bindings and overlays. Tool and colour survive.
  /// A request already in flight is not cancelled; its results land in the fresh state.
  #[instrument(level = "info", skip(self), fields(session = %self.id))]
  pub fn reset(&mut self) {
    self.surface.end_stroke();
    self.surface.clear();
    self.vars.clear();
    self.overlays.clear_all();
  }

  // --- submission ---

  pub fn begin_submit(&mut self) -> Result<Option<Dispatch>, SubmitError> {
    let want_ink = self.overlays.layout().needs_ink_bounds();
    self.pipeline.begin(&self.surface, &self.vars, want_ink)
  }

  pub fn finish_submit(
    &mut self,
    ticket: SubmissionTicket,
    outcome: Result<Vec<ResultRecord>, SubmitError>,
  ) -> Result<Completion, SubmitError> {
    self.pipeline.complete(ticket, outcome, &mut self.surface, &mut self.vars, &mut self.overlays)
  }

  /// Dispatch, await and apply in one go. Returns `Ok(None)` when suppressed
  /// because another submission is in flight.
  pub async fn submit(&mut self, recognizer: &dyn Recognizer) -> Result<Option<Completion>, SubmitError> {
    let Some(Dispatch { request, ticket }) = self.begin_submit()? else {
      return Ok(None);
    };
    let outcome = recognizer.recognize(request).await;
    self.finish_submit(ticket, outcome).map(Some)
  }

  // --- overlays ---

  pub fn toggle_steps(&mut self, id: OverlayId) -> Option<bool> {
    self.overlays.toggle_steps(id)
  }

  pub fn move_result(&mut self, id: OverlayId, to: Point) -> bool {
    self.overlays.reposition(id, to)
  }

  pub fn delete_result(&mut self, id: OverlayId) -> bool {
    let removed = self.overlays.delete(id).is_some();
    debug!(target: "session", session = %self.id, id = id.0, removed, "Overlay delete");
    removed
  }

  pub fn clear_results(&mut self) {
    self.overlays.clear_all();
  }

  // --- views ---

  pub fn state_view(&self) -> StateOut {
    StateOut {
      mode: self.surface.mode(),
      color: self.surface.active_color(),
      drawing: self.surface.is_drawing(),
      submitting: self.is_submitting(),
      bindings: self.vars.bindings().clone(),
    }
  }

  pub fn overlay_views(&mut self) -> Vec<OverlayOut> {
    let Self { overlays, typesetter, .. } = self;
    overlays.entries().iter().map(|e| overlay_out(e, typesetter)).collect()
  }

  pub fn snapshot(&self) -> Result<String, SubmitError> {
    self.surface.snapshot()
  }

  /// Release per-session resources. Called when the connection ends.
  pub fn close(&mut self) {
    if self.typesetter.is_ready() {
      self.typesetter.dispose();
    }
    info!(target: "session", id = %self.id, overlays = self.overlays.len(), vars = self.vars.len(), "Session closed");
  }
}

fn overlay_out(e: &OverlayEntry, typesetter: &mut Typesetter) -> OverlayOut {
  let rendered = typesetter.render(&e.record);
  OverlayOut {
    id: e.id,
    expr: e.record.expr.clone(),
    result: e.record.result.clone(),
    classification: e.record.classification,
    assign: e.record.assign,
    position: e.position,
    expanded: e.expanded,
    has_steps: e.record.shows_steps(),
    headline: rendered.headline,
    latex: rendered.latex,
    steps: rendered.steps,
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use async_trait::async_trait;

  use super::*;
  use crate::config::{LayoutPolicyKind, SurfaceConfig};
  use crate::domain::{Classification, Step};
  use crate::recognizer::{decode_response, RecognitionRequest};

  /// Replays canned response bodies and records what it was sent.
  struct FakeRecognizer {
    body: Result<&'static str, fn() -> SubmitError>,
    calls: AtomicUsize,
    seen: Mutex<Vec<RecognitionRequest>>,
  }

  impl FakeRecognizer {
    fn ok(body: &'static str) -> Self {
      Self { body: Ok(body), calls: AtomicUsize::new(0), seen: Mutex::new(Vec::new()) }
    }
    fn failing(err: fn() -> SubmitError) -> Self {
      Self { body: Err(err), calls: AtomicUsize::new(0), seen: Mutex::new(Vec::new()) }
    }
  }

  #[async_trait]
  impl Recognizer for FakeRecognizer {
    async fn recognize(&self, request: RecognitionRequest) -> Result<Vec<ResultRecord>, SubmitError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.seen.lock().unwrap().push(request);
      match self.body {
        Ok(body) => decode_response(body),
        Err(make) => Err(make()),
      }
    }
  }

  fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.surface = SurfaceConfig { width: 80, height: 60, ..SurfaceConfig::default() };
    cfg
  }

  fn scribble(s: &mut Session) {
    s.pointer_down(Point::new(10.0, 10.0));
    s.pointer_move(Point::new(50.0, 40.0));
    s.pointer_up();
  }

  const ARITHMETIC: &str = r#"{"data":[{"expr":"2+2","result":"4","steps":[],"type":"arithmetic","assign":false,"latex":"2+2=4"}]}"#;
  const ASSIGNMENT: &str = r#"{"data":[{"expr":"x","result":"5","steps":[{"type":"math","content":"x = 5"}],"type":"variable_assignment","assign":true,"latex":"x=5"}]}"#;

  #[tokio::test]
  async fn arithmetic_result_lands_at_first_cascade_slot() {
    let mut s = Session::new(&config());
    scribble(&mut s);
    let rec = FakeRecognizer::ok(ARITHMETIC);
    let done = s.submit(&rec).await.expect("ok").expect("dispatched");

    assert_eq!(done.folded, 0);
    assert!(s.vars.is_empty());
    assert_eq!(s.overlays.len(), 1);
    let e = &s.overlays.entries()[0];
    assert_eq!(e.position, Point::new(20.0, 100.0));
    assert!(!e.expanded);
    assert!(!s.is_submitting());

    let views = s.overlay_views();
    assert!(!views[0].has_steps);
    assert!(views[0].steps.is_empty());
    assert_eq!(views[0].latex, r"\[\begin{aligned}&2+2 = 4\end{aligned}\]");
  }

  #[tokio::test]
  async fn assignment_is_folded_and_never_shows_steps() {
    let mut s = Session::new(&config());
    let rec = FakeRecognizer::ok(ASSIGNMENT);
    s.submit(&rec).await.expect("ok");
    assert_eq!(s.vars.get("x"), Some("5"));

    let id = s.overlays.entries()[0].id;
    s.toggle_steps(id);
    let views = s.overlay_views();
    assert!(views[0].expanded);
    assert!(!views[0].has_steps);
    assert!(views[0].steps.is_empty());
  }

  #[tokio::test]
  async fn bindings_travel_with_next_request() {
    let mut s = Session::new(&config());
    let first = FakeRecognizer::ok(ASSIGNMENT);
    s.submit(&first).await.expect("ok");
    assert!(first.seen.lock().unwrap()[0].dict_of_vars.is_empty());

    let second = FakeRecognizer::ok(ARITHMETIC);
    s.submit(&second).await.expect("ok");
    assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    let sent = second.seen.lock().unwrap();
    assert_eq!(sent[0].dict_of_vars.get("x").map(String::as_str), Some("5"));
    assert!(sent[0].image.starts_with("data:image/png;base64,"));
  }

  #[tokio::test]
  async fn n_records_k_assignments() {
    let body = r#"{"data":[
      {"expr":"a","result":"1","type":"variable_assignment","assign":true},
      {"expr":"1+1","result":"2"},
      {"expr":"b","result":"2","type":"equation","assign":true},
      {"expr":"sin(30°)","result":"0.5","type":"function"}
    ]}"#;
    let mut s = Session::new(&config());
    let done = s.submit(&FakeRecognizer::ok(body)).await.expect("ok").expect("dispatched");
    assert_eq!(done.folded, 2);
    assert_eq!(s.vars.len(), 2);
    let exprs: Vec<&str> = s.overlays.entries().iter().map(|e| e.record.expr.as_str()).collect();
    assert_eq!(exprs, vec!["a", "1+1", "b", "sin(30°)"]);
  }

  #[test]
  fn second_submit_while_in_flight_is_suppressed() {
    let mut s = Session::new(&config());
    let first = s.begin_submit().expect("ok").expect("dispatched");
    let before = s.state_view();
    assert!(before.submitting);

    assert!(s.begin_submit().expect("ok").is_none());
    assert_eq!(s.state_view(), before);
    assert!(s.overlays.is_empty());

    s.finish_submit(first.ticket, Ok(vec![])).expect("applied");
    assert!(!s.is_submitting());
  }

  #[tokio::test]
  async fn failure_leaves_state_untouched_and_clears_flag() {
    let mut s = Session::new(&config());
    s.vars.fold(&[ResultRecord {
      expr: "y".into(),
      result: "3".into(),
      latex: "y=3".into(),
      steps: vec![],
      classification: Classification::VariableAssignment,
      assign: true,
    }]);
    scribble(&mut s);
    let ink_before = s.surface.ink_bounds();

    let rec = FakeRecognizer::failing(|| SubmitError::Transport("connection refused".into()));
    let err = s.submit(&rec).await.unwrap_err();
    assert!(err.is_transient());
    assert!(!s.is_submitting());
    assert_eq!(s.vars.get("y"), Some("3"));
    assert_eq!(s.vars.len(), 1);
    assert!(s.overlays.is_empty());
    assert_eq!(s.surface.ink_bounds(), ink_before);

    let malformed = FakeRecognizer::ok("not json");
    let err = s.submit(&malformed).await.unwrap_err();
    assert_eq!(err.class(), "malformed_response");
    assert!(!s.is_submitting());
  }

  #[tokio::test]
  async fn drawing_continues_while_request_in_flight() {
    let mut s = Session::new(&config());
    scribble(&mut s);
    let Dispatch { request, ticket } = s.begin_submit().expect("ok").expect("dispatched");

    s.set_mode(Mode::Eraser);
    s.pointer_down(Point::new(0.0, 0.0));
    s.pointer_move(Point::new(79.0, 59.0));
    s.pointer_leave();
    s.set_mode(Mode::Pen);
    s.pointer_down(Point::new(70.0, 5.0));
    s.pointer_move(Point::new(75.0, 5.0));

    let outcome = FakeRecognizer::ok(ARITHMETIC).recognize(request).await;
    s.finish_submit(ticket, outcome).expect("applied");
    assert_eq!(s.overlays.len(), 1);
    assert!(s.surface.is_drawing());
    // cleared on success
    assert!(s.surface.ink_bounds().is_none());
  }

  #[tokio::test]
  async fn surface_kept_when_clear_on_success_disabled() {
    let mut cfg = config();
    cfg.submission.clear_surface_on_success = false;
    let mut s = Session::new(&cfg);
    scribble(&mut s);
    s.submit(&FakeRecognizer::ok(ARITHMETIC)).await.expect("ok");
    assert!(s.surface.ink_bounds().is_some());
  }

  #[tokio::test]
  async fn ink_center_policy_places_at_drawing_centre() {
    let mut cfg = config();
    cfg.layout.policy = LayoutPolicyKind::InkCenter;
    let mut s = Session::new(&cfg);
    scribble(&mut s);
    let centre = s.surface.ink_bounds().expect("ink").center();
    s.submit(&FakeRecognizer::ok(ARITHMETIC)).await.expect("ok");
    assert_eq!(s.overlays.entries()[0].position, centre);
  }

  #[tokio::test]
  async fn deleting_results_never_touches_vars_or_surface() {
    let mut cfg = config();
    cfg.submission.clear_surface_on_success = false;
    let mut s = Session::new(&cfg);
    scribble(&mut s);
    s.submit(&FakeRecognizer::ok(ASSIGNMENT)).await.expect("ok");
    s.submit(&FakeRecognizer::ok(ARITHMETIC)).await.expect("ok");
    let ink = s.surface.ink_bounds();
    let vars = s.vars.clone();

    let first = s.overlays.entries()[0].id;
    assert!(s.delete_result(first));
    assert!(!s.delete_result(first));
    s.clear_results();
    assert!(s.overlays.is_empty());
    assert_eq!(s.vars, vars);
    assert_eq!(s.surface.ink_bounds(), ink);
  }

  #[tokio::test]
  async fn reset_clears_everything_but_tool_state() {
    let mut s = Session::new(&config());
    s.set_color(Color([0, 0, 255, 255]));
    s.submit(&FakeRecognizer::ok(ASSIGNMENT)).await.expect("ok");
    scribble(&mut s);
    s.set_mode(Mode::Eraser);
    s.reset();
    assert!(s.vars.is_empty());
    assert!(s.overlays.is_empty());
    assert!(s.surface.ink_bounds().is_none());
    assert_eq!(s.surface.mode(), Mode::Eraser);
    s.set_mode(Mode::Pen);
    assert_eq!(s.surface.active_color(), Color([0, 0, 255, 255]));
  }

  #[tokio::test]
  async fn expanded_steps_render_for_equations() {
    let body = r#"{"data":[{"expr":"x","result":"-1","steps":[
      {"type":"text","content":"Factor the quadratic"},
      {"type":"math","content":"(x + 1)^2 = 0"}],"type":"equation","assign":true,"latex":"x = -1"}]}"#;
    let mut s = Session::new(&config());
    s.submit(&FakeRecognizer::ok(body)).await.expect("ok");
    let id = s.overlays.entries()[0].id;
    assert_eq!(s.toggle_steps(id), Some(true));
    let v = &s.overlay_views()[0];
    assert!(v.has_steps && v.expanded);
    assert_eq!(v.steps, vec![r"\(\text{Factor the quadratic}\)".to_string(), r"\((x + 1)^{2} = 0\)".to_string()]);
    assert_eq!(s.overlays.get(id).map(|e| e.record.steps.clone()), Some(vec![
      Step::text("Factor the quadratic"),
      Step::math("(x + 1)^2 = 0"),
    ]));
  }
}
