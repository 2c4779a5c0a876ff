use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    board::HttpHandler,
    controller::{ScreenState, SportsMatrix},
    foundation::error::{MatrixError, MatrixResult},
};

const BUILTIN_PATHS: &[&str] = &[
    "/api/version",
    "/api/screenon",
    "/api/screenoff",
    "/api/status",
    "/api/boards",
    "/api/jump",
    "/api/next",
    "/api/enableall",
    "/api/disableall",
    "/api/board/{name}/enable",
    "/api/board/{name}/disable",
];

#[derive(Debug, serde::Deserialize)]
struct JumpRequest {
    board: String,
}

impl IntoResponse for MatrixError {
    fn into_response(self) -> Response {
        let status = match &self {
            MatrixError::Closed | MatrixError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
            MatrixError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            MatrixError::Validation(_) | MatrixError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Board paths live under `/api`; a relative or bare path is prefixed.
fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with("/api/") || path == "/api" {
        return path.to_string();
    }
    format!("/api/{}", path.trim_start_matches('/'))
}

/// Control routes plus every board's own handlers.
///
/// Fails when a board handler fails to build or two handlers claim the same path.
pub fn router(matrix: SportsMatrix) -> MatrixResult<Router> {
    let mut seen: HashSet<String> = BUILTIN_PATHS.iter().map(|p| p.to_string()).collect();
    let mut extra: Vec<(String, HttpHandler)> = Vec::new();

    for board in matrix.boards() {
        for mut handler in board.http_handlers()? {
            handler.path = normalize_path(&handler.path);
            if !seen.insert(handler.path.clone()) {
                return Err(MatrixError::validation(format!(
                    "duplicate HTTP endpoint '{}'",
                    handler.path
                )));
            }
            tracing::info!(board = %board.name(), path = %handler.path, "registering http handler");
            extra.push((board.name().to_string(), handler));
        }
    }

    let mut app = Router::new()
        .route("/api/version", get(version))
        .route("/api/screenon", get(screen_on).post(screen_on))
        .route("/api/screenoff", get(screen_off).post(screen_off))
        .route("/api/status", get(status))
        .route("/api/boards", get(boards))
        .route("/api/jump", post(jump))
        .route("/api/next", get(next).post(next))
        .route("/api/enableall", get(enable_all).post(enable_all))
        .route("/api/disableall", get(disable_all).post(disable_all))
        .route("/api/board/{name}/enable", get(enable_board).post(enable_board))
        .route("/api/board/{name}/disable", get(disable_board).post(disable_board))
        .with_state(matrix);

    for (_, handler) in extra {
        app = app.route(&handler.path, handler.router);
    }
    Ok(app)
}

/// Serve `app` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> MatrixResult<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "http server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| MatrixError::Other(anyhow::Error::new(e).context("http server failed")))
}

async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

async fn screen_on(State(m): State<SportsMatrix>) -> Result<StatusCode, MatrixError> {
    m.screen_on().await?;
    Ok(StatusCode::OK)
}

async fn screen_off(State(m): State<SportsMatrix>) -> Result<StatusCode, MatrixError> {
    m.screen_off().await?;
    Ok(StatusCode::OK)
}

async fn status(State(m): State<SportsMatrix>) -> impl IntoResponse {
    let on = m.screen_state() == ScreenState::On;
    ([(header::CONTENT_TYPE, "text/plain")], on.to_string())
}

async fn boards(State(m): State<SportsMatrix>) -> impl IntoResponse {
    Json(m.board_status())
}

async fn jump(
    State(m): State<SportsMatrix>,
    Json(req): Json<JumpRequest>,
) -> Result<StatusCode, MatrixError> {
    if m.board(&req.board).is_none() {
        return Ok(StatusCode::NOT_FOUND);
    }
    m.jump_to(&req.board)?;
    Ok(StatusCode::OK)
}

async fn next(State(m): State<SportsMatrix>) -> StatusCode {
    m.next_board();
    StatusCode::OK
}

async fn enable_all(State(m): State<SportsMatrix>) -> StatusCode {
    for b in m.boards() {
        b.enable();
    }
    StatusCode::OK
}

async fn disable_all(State(m): State<SportsMatrix>) -> StatusCode {
    for b in m.boards() {
        b.disable();
    }
    StatusCode::OK
}

async fn enable_board(State(m): State<SportsMatrix>, Path(name): Path<String>) -> StatusCode {
    match m.board(&name) {
        Some(b) => {
            b.enable();
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn disable_board(State(m): State<SportsMatrix>, Path(name): Path<String>) -> StatusCode {
    match m.board(&name) {
        Some(b) => {
            b.disable();
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_paths_land_under_api() {
        assert_eq!(normalize_path("/nhl/favorite"), "/api/nhl/favorite");
        assert_eq!(normalize_path("nhl"), "/api/nhl");
        assert_eq!(normalize_path("/api/nhl"), "/api/nhl");
        assert_eq!(normalize_path("/apis"), "/api/apis");
    }
}
