//! WebSocket upgrade + session event loop.
//!
//! Each connection owns one `Session`. The loop waits on the next client
//! message and, when a submission is out, on its recognition future as well.
//! Both run on this one task, so pointer input keeps flowing while the
//! request is pending and no session state needs locking.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, instrument};

use crate::domain::{Point, ResultRecord};
use crate::error::SubmitError;
use crate::pipeline::{Dispatch, SubmissionTicket};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::recognizer::Recognizer;
use crate::session::Session;
use crate::state::AppState;

type InFlight = BoxFuture<'static, (SubmissionTicket, Result<Vec<ResultRecord>, SubmitError>)>;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "inkcalc_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let mut session = Session::new(&state.config);
  let mut in_flight: Option<InFlight> = None;
  info!(target: "inkcalc_backend", session = %session.id, "WebSocket connected");

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let replies = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(m) => {
                debug!(target: "session", session = %session.id, "WS received: {:?}", &m);
                let (replies, dispatch) = handle_client_ws(m, &mut session);
                if let Some(d) = dispatch {
                  in_flight = Some(dispatch_recognition(state.recognizer.clone(), d));
                }
                replies
              }
              Err(e) => vec![ServerWsMessage::error(format!("Invalid JSON: {}", e))],
            };
            if send_all(&mut socket, replies).await.is_err() {
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }

      (ticket, outcome) = poll_in_flight(&mut in_flight), if in_flight.is_some() => {
        in_flight = None;
        let replies = finish_submission(&mut session, ticket, outcome);
        if send_all(&mut socket, replies).await.is_err() {
          break;
        }
      }
    }
  }

  session.close();
  info!(target: "inkcalc_backend", "WebSocket disconnected");
}

/// Detach the request from the session so the loop can keep serving input.
fn dispatch_recognition(recognizer: Arc<dyn Recognizer>, d: Dispatch) -> InFlight {
  let Dispatch { request, ticket } = d;
  async move {
    let outcome = recognizer.recognize(request).await;
    (ticket, outcome)
  }
  .boxed()
}

async fn poll_in_flight(f: &mut Option<InFlight>) -> (SubmissionTicket, Result<Vec<ResultRecord>, SubmitError>) {
  match f {
    Some(fut) => fut.await,
    None => std::future::pending().await,
  }
}

fn finish_submission(
  session: &mut Session,
  ticket: SubmissionTicket,
  outcome: Result<Vec<ResultRecord>, SubmitError>,
) -> Vec<ServerWsMessage> {
  let mut replies = Vec::with_capacity(2);
  match session.finish_submit(ticket, outcome) {
    Ok(done) => {
      debug!(target: "session", session = %session.id, inserted = done.inserted.len(), folded = done.folded, "Results ready");
      replies.push(ServerWsMessage::Results { overlays: session.overlay_views() });
    }
    Err(e) => replies.push(ServerWsMessage::Error { class: Some(e.class().into()), message: e.to_string() }),
  }
  replies.push(ServerWsMessage::State(session.state_view()));
  replies
}

async fn send_all(socket: &mut WebSocket, replies: Vec<ServerWsMessage>) -> Result<(), axum::Error> {
  for reply in replies {
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "inkcalc_backend", error = %e, "WS send error");
      return Err(e);
    }
  }
  Ok(())
}

fn state_msg(s: &Session) -> ServerWsMessage {
  ServerWsMessage::State(s.state_view())
}

fn results_msg(s: &mut Session) -> ServerWsMessage {
  ServerWsMessage::Results { overlays: s.overlay_views() }
}

/// Apply one client message. Returns the replies and, for an accepted
/// `submit`, the request to dispatch.
fn handle_client_ws(msg: ClientWsMessage, session: &mut Session) -> (Vec<ServerWsMessage>, Option<Dispatch>) {
  match msg {
    ClientWsMessage::Ping => (vec![ServerWsMessage::Pong], None),

    // Pointer traffic is high-rate; only stroke boundaries are acknowledged.
    ClientWsMessage::PointerDown { x, y } => {
      session.pointer_down(Point::new(x, y));
      (vec![], None)
    }
    ClientWsMessage::PointerMove { x, y } => {
      session.pointer_move(Point::new(x, y));
      (vec![], None)
    }
    ClientWsMessage::PointerUp => {
      session.pointer_up();
      (vec![], None)
    }
    ClientWsMessage::PointerLeave => {
      session.pointer_leave();
      (vec![], None)
    }

    ClientWsMessage::SetMode { mode } => {
      session.set_mode(mode);
      (vec![state_msg(session)], None)
    }
    ClientWsMessage::SetColor { color } => {
      session.set_color(color);
      (vec![state_msg(session)], None)
    }
    ClientWsMessage::ClearSurface => {
      session.clear_surface();
      (vec![state_msg(session)], None)
    }
    ClientWsMessage::Reset => {
      session.reset();
      (vec![results_msg(session), state_msg(session)], None)
    }

    ClientWsMessage::Submit => match session.begin_submit() {
      Ok(Some(d)) => (vec![ServerWsMessage::Submitting, state_msg(session)], Some(d)),
      Ok(None) => (vec![state_msg(session)], None),
      Err(e) => {
        error!(target: "submission", session = %session.id, error = %e, "Could not capture snapshot");
        (
          vec![ServerWsMessage::Error { class: Some(e.class().into()), message: e.to_string() }, state_msg(session)],
          None,
        )
      }
    },

    ClientWsMessage::ToggleSteps { id } => {
      if session.toggle_steps(id).is_none() {
        return (vec![ServerWsMessage::error(format!("Unknown result id: {}", id.0))], None);
      }
      (vec![results_msg(session)], None)
    }
    ClientWsMessage::MoveResult { id, x, y } => {
      if !session.move_result(id, Point::new(x, y)) {
        return (vec![ServerWsMessage::error(format!("Unknown result id: {}", id.0))], None);
      }
      (vec![], None)
    }
    ClientWsMessage::DeleteResult { id } => {
      session.delete_result(id);
      (vec![results_msg(session)], None)
    }
    ClientWsMessage::ClearResults => {
      session.clear_results();
      (vec![results_msg(session)], None)
    }

    ClientWsMessage::Snapshot => match session.snapshot() {
      Ok(image) => (vec![ServerWsMessage::Snapshot { image }], None),
      Err(e) => (vec![ServerWsMessage::Error { class: Some(e.class().into()), message: e.to_string() }], None),
    },
    ClientWsMessage::GetState => (vec![state_msg(session), results_msg(session)], None),
  }
}
