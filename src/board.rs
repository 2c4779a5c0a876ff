use std::time::Duration;

use axum::routing::MethodRouter;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{
    canvas::Canvas,
    enabler::Enabler,
    foundation::error::{MatrixError, MatrixResult},
};

const HOLD_POLL: Duration = Duration::from_millis(100);

/// An extra HTTP endpoint a board wants mounted under `/api`.
pub struct HttpHandler {
    pub path: String,
    pub router: MethodRouter,
}

impl HttpHandler {
    pub fn new(path: impl Into<String>, router: MethodRouter) -> Self {
        Self {
            path: path.into(),
            router,
        }
    }
}

impl std::fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHandler")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A content producer the controller rotates through.
///
/// `render` owns the canvas for its whole duration and must return promptly once
/// `cancel` fires, with [`MatrixError::Canceled`] or `Ok`. Enabled state is toggled from
/// other tasks, so implementations keep it in an atomic (usually an [`Enabler`]).
pub trait Board: Send + Sync {
    fn name(&self) -> &str;
    fn enabled(&self) -> bool;
    fn enable(&self) -> bool;
    fn disable(&self) -> bool;
    fn render<'a>(
        &'a self,
        cancel: CancellationToken,
        canvas: &'a mut dyn Canvas,
    ) -> BoxFuture<'a, MatrixResult<()>>;

    /// Called once when the controller stops serving.
    fn cleanup(&self) {}

    /// While any board reports priority, only priority boards are shown.
    fn has_priority(&self) -> bool {
        false
    }

    fn http_handlers(&self) -> MatrixResult<Vec<HttpHandler>> {
        Ok(Vec::new())
    }
}

/// Keep the current frame on screen for `duration`.
///
/// Returns `Ok` early when `enabler` turns off and [`MatrixError::Canceled`] when
/// `cancel` fires.
pub async fn hold(
    cancel: &CancellationToken,
    enabler: &Enabler,
    duration: Duration,
) -> MatrixResult<()> {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if !enabler.enabled() {
            return Ok(());
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(());
        }
        let step = HOLD_POLL.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(MatrixError::Canceled),
            _ = tokio::time::sleep(step) => {}
        }
    }
}
