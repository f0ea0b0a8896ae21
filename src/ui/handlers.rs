//! HTTP API handlers

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::broadcast::{ControllerStatus, SinkStats};
use crate::tracks::Track;
use crate::ui::server::AppState;
use crate::ui::stream::{listener_body, ListenerGuard};

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Controller command body, e.g. `{"command": "start"}`
#[derive(serde::Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Broadcast status
#[derive(serde::Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: ControllerStatus,
    pub selected_track: Option<Track>,
    pub sink: SinkStats,
}

/// Redirect the bare root to the home page
pub async fn root() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/home")])
}

/// Command acknowledgement, `{"result": "OK"}` on success
#[derive(Debug, serde::Serialize)]
pub struct CommandResponse {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            result: "OK",
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            result: "ERROR",
            error: Some(msg.into()),
        }
    }
}

/// Run a `start` or `stop` command
pub async fn command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> (StatusCode, Json<CommandResponse>) {
    match req.command.trim().to_ascii_lowercase().as_str() {
        "start" => match state.controller.start_broadcast().await {
            Ok(_) => (StatusCode::OK, Json(CommandResponse::ok())),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommandResponse::error(e.to_string())),
            ),
        },
        "stop" => {
            state.controller.stop_broadcast().await;
            (StatusCode::OK, Json(CommandResponse::ok()))
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(CommandResponse::error(format!("Unknown command: {}", other))),
        ),
    }
}

/// Attach the caller as a listener and stream the broadcast to it.
///
/// The content type is taken from the track selected at attach time. A later
/// switch to another format does not update it for this listener.
pub async fn stream(State(state): State<Arc<AppState>>) -> Response {
    let content_type = state
        .controller
        .current_track()
        .map(|track| track.content_type())
        .unwrap_or("audio/mpeg");

    let (id, listener) = state.controller.attach_listener();
    let guard = ListenerGuard::new(state.controller.clone(), id);
    tracing::info!(listener = %id, "Listener joined");

    let body = Body::from_stream(listener_body(listener, guard));
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// Get broadcast status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatusResponse>> {
    let response = StatusResponse {
        status: state.controller.status(),
        selected_track: state.controller.current_track(),
        sink: state.controller.sink_stats(),
    };

    Json(ApiResponse::ok(response))
}
