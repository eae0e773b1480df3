//! HTTP route handlers for the bridge API.

use std::path::Path;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::commands::{MAX_UNDO, parse_commands, wait_until_consumed};
use crate::grid::render_grid;
use crate::state::AppState;
use crate::world_data::WorldData;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/game_state", get(game_state))
        .route("/status", get(status))
        .route("/execute_commands", post(execute_commands))
        .route("/undo_multiple", post(undo_multiple))
        .route("/restart_level", post(restart_level))
        .route("/load_level", post(load_level))
}

/// Failure returned to clients as `{"error": message}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(err: &anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Serialize)]
struct ResultResponse {
    result: String,
}

impl ResultResponse {
    fn json(result: impl Into<String>) -> Json<Self> {
        Json(Self {
            result: result.into(),
        })
    }
}

#[derive(Deserialize)]
struct ExecuteRequest {
    commands: String,
}

#[derive(Deserialize)]
struct UndoRequest {
    n: u32,
}

#[derive(Deserialize)]
struct LoadLevelRequest {
    level_id: u32,
}

#[derive(Serialize)]
struct StatusResponse {
    won: bool,
}

async fn health() -> &'static str {
    "ok"
}

fn load_world(state: &AppState) -> Result<WorldData, ApiError> {
    WorldData::load(&state.world_data).map_err(|err| ApiError::internal(&err))
}

/// Wait for the game to run `path` when a timeout is configured.
async fn settle(state: &AppState, path: &Path) -> Result<(), ApiError> {
    let Some(timeout) = state.consume_timeout else {
        return Ok(());
    };
    wait_until_consumed(path, timeout)
        .await
        .map_err(|err| ApiError {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: err.to_string(),
        })
}

/// GET /game_state - the board as grid text wrapped in `<pre>`.
async fn game_state(State(state): State<AppState>) -> Result<String, ApiError> {
    let data = load_world(&state)?;
    let grid = render_grid(&data).map_err(|err| ApiError::internal(&err))?;
    Ok(format!("<pre>{grid}</pre>"))
}

/// GET /status - whether the current level is won.
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let data = load_world(&state)?;
    Ok(Json(StatusResponse {
        won: data.level_won,
    }))
}

/// POST /execute_commands - queue movement commands.
async fn execute_commands(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ResultResponse>, ApiError> {
    let Json(request) = payload?;
    let commands =
        parse_commands(&request.commands).map_err(|err| ApiError::bad_request(err.to_string()))?;
    let path = state
        .commands
        .queue_commands(&commands)
        .map_err(|err| ApiError::internal(&err))?;
    debug!(commands = %commands.join(","), "queued commands");
    settle(&state, &path).await?;

    let won = WorldData::load(&state.world_data).is_ok_and(|data| data.level_won);
    Ok(ResultResponse::json(if won {
        "Level won!"
    } else {
        "Commands executed. The level is not won yet."
    }))
}

/// POST /undo_multiple - undo the last `n` moves.
async fn undo_multiple(
    State(state): State<AppState>,
    payload: Result<Json<UndoRequest>, JsonRejection>,
) -> Result<Json<ResultResponse>, ApiError> {
    let Json(request) = payload?;
    if request.n == 0 || request.n > MAX_UNDO {
        return Err(ApiError::bad_request(format!(
            "parameter 'n' must be between 1 and {MAX_UNDO}"
        )));
    }
    let path = state
        .commands
        .queue_undo(request.n)
        .map_err(|err| ApiError::internal(&err))?;
    settle(&state, &path).await?;
    Ok(ResultResponse::json(format!("Undid {} moves", request.n)))
}

/// POST /restart_level - restart the current level.
async fn restart_level(State(state): State<AppState>) -> Result<Json<ResultResponse>, ApiError> {
    let path = state
        .commands
        .queue_restart()
        .map_err(|err| ApiError::internal(&err))?;
    settle(&state, &path).await?;
    Ok(ResultResponse::json("Restarted the current level"))
}

/// POST /load_level - enter the level with the given id.
async fn load_level(
    State(state): State<AppState>,
    payload: Result<Json<LoadLevelRequest>, JsonRejection>,
) -> Result<Json<ResultResponse>, ApiError> {
    let Json(request) = payload?;
    let path = state
        .commands
        .queue_load_level(request.level_id)
        .map_err(|err| ApiError::internal(&err))?;
    settle(&state, &path).await?;
    Ok(ResultResponse::json(format!(
        "Loading level {}",
        request.level_id
    )))
}
