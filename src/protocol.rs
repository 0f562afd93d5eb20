//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::SurfaceConfig;
use crate::domain::{Classification, Color, Mode, Point, Step};
use crate::overlay::OverlayId;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    PointerDown {
        x: f32,
        y: f32,
    },
    PointerMove {
        x: f32,
        y: f32,
    },
    PointerUp,
    PointerLeave,
    SetMode {
        mode: Mode,
    },
    SetColor {
        color: Color,
    },
    ClearSurface,
    Reset,
    Submit,
    ToggleSteps {
        id: OverlayId,
    },
    MoveResult {
        id: OverlayId,
        x: f32,
        y: f32,
    },
    DeleteResult {
        id: OverlayId,
    },
    ClearResults,
    Snapshot,
    GetState,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State(StateOut),
    Submitting,
    Results {
        overlays: Vec<OverlayOut>,
    },
    Snapshot {
        image: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        class: Option<String>,
        message: String,
    },
}

impl ServerWsMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerWsMessage::Error { class: None, message: message.into() }
    }
}

/// Tool and submission state of a session.
#[derive(Debug, Serialize, PartialEq)]
pub struct StateOut {
    pub mode: Mode,
    pub color: Color,
    pub drawing: bool,
    pub submitting: bool,
    pub bindings: HashMap<String, String>,
}

/// One overlay as the client draws it. `steps` is empty when the record has no
/// step panel; `expanded` says whether the panel is open.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct OverlayOut {
    pub id: OverlayId,
    pub expr: String,
    pub result: String,
    pub classification: Classification,
    pub assign: bool,
    pub position: Point,
    pub expanded: bool,
    pub has_steps: bool,
    pub headline: String,
    pub latex: String,
    pub steps: Vec<String>,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct MarkupIn {
    #[serde(default)]
    pub latex: Option<String>,
    #[serde(default)]
    pub step: Option<Step>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkupOut {
    pub markup: String,
    pub typeset: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientConfigOut {
    pub width: u32,
    pub height: u32,
    pub pen_width: f32,
    pub eraser_width: f32,
    pub default_color: Color,
}

impl From<&SurfaceConfig> for ClientConfigOut {
    fn from(c: &SurfaceConfig) -> Self {
        Self {
            width: c.width,
            height: c.height,
            pen_width: c.pen_width,
            eraser_width: c.eraser_width,
            default_color: c.default_color,
        }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
