use std::{
    sync::{
        Arc, Mutex as StdMutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    board::Board,
    canvas::Canvas,
    config::Pacing,
    foundation::error::{MatrixError, MatrixResult},
};

const SIGNAL_QUEUE_DEPTH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenState {
    On,
    Off,
}

/// A request to change the screen state, delivered through the controller's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenSignal {
    On,
    Off,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStatus {
    pub name: String,
    pub enabled: bool,
    pub priority: bool,
}

struct Inner {
    boards: Vec<Arc<dyn Board>>,
    canvas: Mutex<Box<dyn Canvas>>,
    pacing: Pacing,
    screen_on: AtomicBool,
    off_logged: AtomicBool,
    serve_token: StdMutex<CancellationToken>,
    render_token: StdMutex<CancellationToken>,
    jump_to: StdMutex<Option<usize>>,
    signals: mpsc::Sender<ScreenSignal>,
    signal_rx: StdMutex<Option<mpsc::Receiver<ScreenSignal>>>,
    closed: CancellationToken,
}

/// Rotates boards over one shared canvas.
///
/// Cheap to clone; every clone drives the same controller. `serve` runs the rotation,
/// everything else (screen signals, jumps, close) may be called from any task.
#[derive(Clone)]
pub struct SportsMatrix {
    inner: Arc<Inner>,
}

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SportsMatrix {
    pub fn new(canvas: Box<dyn Canvas>, boards: Vec<Arc<dyn Board>>, pacing: Pacing) -> Self {
        for b in &boards {
            tracing::info!(board = %b.name(), "registering board");
        }
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
        Self {
            inner: Arc::new(Inner {
                boards,
                canvas: Mutex::new(canvas),
                pacing,
                screen_on: AtomicBool::new(true),
                off_logged: AtomicBool::new(false),
                serve_token: StdMutex::new(CancellationToken::new()),
                render_token: StdMutex::new(CancellationToken::new()),
                jump_to: StdMutex::new(None),
                signals: tx,
                signal_rx: StdMutex::new(Some(rx)),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn boards(&self) -> &[Arc<dyn Board>] {
        &self.inner.boards
    }

    /// Case-insensitive board lookup.
    pub fn board(&self, name: &str) -> Option<&Arc<dyn Board>> {
        self.index_of(name).map(|i| &self.inner.boards[i])
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.inner
            .boards
            .iter()
            .position(|b| b.name().eq_ignore_ascii_case(name))
    }

    pub fn board_status(&self) -> Vec<BoardStatus> {
        self.inner
            .boards
            .iter()
            .map(|b| BoardStatus {
                name: b.name().to_string(),
                enabled: b.enabled(),
                priority: b.has_priority(),
            })
            .collect()
    }

    pub fn pacing(&self) -> Pacing {
        self.inner.pacing
    }

    pub fn screen_state(&self) -> ScreenState {
        if self.inner.screen_on.load(Ordering::SeqCst) {
            ScreenState::On
        } else {
            ScreenState::Off
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Queue a screen signal. Fails once the controller is closed.
    pub async fn signal(&self, signal: ScreenSignal) -> MatrixResult<()> {
        if self.is_closed() {
            return Err(MatrixError::Closed);
        }
        tokio::select! {
            _ = self.inner.closed.cancelled() => Err(MatrixError::Closed),
            sent = self.inner.signals.send(signal) => sent.map_err(|_| MatrixError::Closed),
        }
    }

    pub async fn screen_on(&self) -> MatrixResult<()> {
        self.signal(ScreenSignal::On).await
    }

    pub async fn screen_off(&self) -> MatrixResult<()> {
        self.signal(ScreenSignal::Off).await
    }

    /// Make `name` the next board shown, enabling it if needed, and stop the current
    /// board's render.
    pub fn jump_to(&self, name: &str) -> MatrixResult<()> {
        let Some(index) = self.index_of(name) else {
            return Err(MatrixError::validation(format!("no board named '{name}'")));
        };
        let board = &self.inner.boards[index];
        if !board.enabled() {
            board.enable();
        }
        *lock(&self.inner.jump_to) = Some(index);
        tracing::info!(board = %board.name(), "jumping to board");
        self.rotate_render_token();
        Ok(())
    }

    /// Stop the current board's render; the rotation continues with the next board.
    pub fn next_board(&self) {
        self.rotate_render_token();
    }

    /// End `serve`. Idempotent; an in-progress render is abandoned.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            tracing::warn!("sportsmatrix is shutting down");
        }
        self.inner.closed.cancel();
        lock(&self.inner.render_token).cancel();
    }

    fn render_token(&self) -> CancellationToken {
        lock(&self.inner.render_token).clone()
    }

    /// Cancel the active render token and install a fresh child of the serve token.
    fn rotate_render_token(&self) {
        let fresh = lock(&self.inner.serve_token).child_token();
        let old = std::mem::replace(&mut *lock(&self.inner.render_token), fresh);
        old.cancel();
    }

    fn all_disabled(&self) -> bool {
        !self.inner.boards.iter().any(|b| b.enabled())
    }

    async fn clear_canvas(&self) {
        let mut canvas = self.inner.canvas.lock().await;
        if let Err(e) = canvas.clear() {
            tracing::error!(error = %e, "failed to clear canvas");
        }
    }

    /// Rotate boards until `cancel` fires ([`MatrixError::Canceled`]) or the controller
    /// is closed ([`MatrixError::Closed`]). Every board's `cleanup` runs on the way out.
    #[tracing::instrument(skip_all)]
    pub async fn serve(&self, cancel: CancellationToken) -> MatrixResult<()> {
        if self.is_closed() {
            return Err(MatrixError::Closed);
        }
        if self.inner.boards.is_empty() {
            return Err(MatrixError::validation("no boards configured"));
        }
        let Some(rx) = lock(&self.inner.signal_rx).take() else {
            return Err(MatrixError::validation("controller is already serving"));
        };

        *lock(&self.inner.serve_token) = cancel.clone();
        self.rotate_render_token();

        let watcher = tokio::spawn(self.clone().watch_screen(rx, cancel.clone()));

        let result = tokio::select! {
            biased;
            _ = self.inner.closed.cancelled() => Err(MatrixError::Closed),
            _ = cancel.cancelled() => Err(MatrixError::Canceled),
            r = self.rotate(&cancel) => r,
        };

        lock(&self.inner.render_token).cancel();
        watcher.abort();
        for b in &self.inner.boards {
            b.cleanup();
        }
        tracing::info!(result = ?result.as_ref().err(), "serve finished");
        result
    }

    async fn rotate(&self, cancel: &CancellationToken) -> MatrixResult<()> {
        let idle = self.inner.pacing.idle_poll();
        let mut cleared = false;

        loop {
            if cancel.is_cancelled() {
                return Err(MatrixError::Canceled);
            }

            if self.all_disabled() {
                if !cleared {
                    tracing::info!("all boards disabled, clearing canvas");
                    self.clear_canvas().await;
                    cleared = true;
                }
                idle_wait(cancel, idle).await?;
                continue;
            }
            cleared = false;

            if self.screen_state() == ScreenState::Off {
                if !self.inner.off_logged.swap(true, Ordering::SeqCst) {
                    tracing::warn!("screen is turned off");
                }
                idle_wait(cancel, idle).await?;
                continue;
            }

            self.serve_pass(cancel).await;
        }
    }

    /// One pass over the boards in order. While any enabled board has priority only
    /// priority boards are shown and the pass ends after the first of them.
    async fn serve_pass(&self, cancel: &CancellationToken) {
        let boards = &self.inner.boards;
        let priority_mode = boards.iter().any(|b| b.enabled() && b.has_priority());
        let mut index = 0;

        loop {
            if cancel.is_cancelled() || self.screen_state() == ScreenState::Off {
                return;
            }
            if let Some(jump) = lock(&self.inner.jump_to).take() {
                index = jump;
            }
            let Some(board) = boards.get(index) else {
                return;
            };
            index += 1;

            if !board.enabled() {
                tracing::debug!(board = %board.name(), "skipping disabled board");
                continue;
            }
            if priority_mode && !board.has_priority() {
                continue;
            }

            self.render_board(board.as_ref(), cancel).await;

            if priority_mode {
                return;
            }
        }
    }

    async fn render_board(&self, board: &dyn Board, cancel: &CancellationToken) {
        let pacing = self.inner.pacing;
        let token = self.render_token();
        let name = board.name().to_string();
        // turn_off stores Off before installing a fresh token
        if self.screen_state() == ScreenState::Off || token.is_cancelled() {
            tracing::debug!(board = %name, "screen went off, skipping render");
            return;
        }
        tracing::debug!(board = %name, "rendering board");

        let done = CancellationToken::new();
        {
            let done = done.clone();
            let token = token.clone();
            let name = name.clone();
            let limit = pacing.watchdog();
            tokio::spawn(async move {
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(board = %name, ?limit, "board rendered longer than normal");
                    }
                }
            });
        }
        let _watchdog = done.drop_guard();

        let started = Instant::now();
        let result = {
            let mut canvas = self.inner.canvas.lock().await;
            board.render(token.clone(), &mut **canvas).await
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => {
                tracing::debug!(board = %name, "board render canceled");
            }
            Err(e) => tracing::error!(board = %name, error = %e, "board render failed"),
        }

        if started.elapsed() < pacing.min_render() && !token.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(pacing.pause()) => {}
            }
        }
    }

    async fn watch_screen(self, mut rx: mpsc::Receiver<ScreenSignal>, cancel: CancellationToken) {
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.inner.closed.cancelled() => return,
                s = rx.recv() => s,
            };
            match signal {
                Some(ScreenSignal::Off) => self.turn_off().await,
                Some(ScreenSignal::On) => self.turn_on(),
                None => return,
            }
        }
    }

    async fn turn_off(&self) {
        if self
            .inner
            .screen_on
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("screen is already off");
            return;
        }
        tracing::warn!("screen turning off");
        self.inner.off_logged.store(false, Ordering::SeqCst);
        self.rotate_render_token();
        self.clear_canvas().await;
    }

    fn turn_on(&self) {
        if self.inner.screen_on.swap(true, Ordering::SeqCst) {
            tracing::warn!("screen is already on");
        } else {
            tracing::warn!("screen turning on");
        }
    }
}

impl std::fmt::Debug for SportsMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportsMatrix")
            .field("boards", &self.inner.boards.len())
            .field("screen", &self.screen_state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn idle_wait(cancel: &CancellationToken, idle: std::time::Duration) -> MatrixResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(MatrixError::Canceled),
        _ = tokio::time::sleep(idle) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures_util::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::{canvas::Surface, enabler::Enabler, foundation::core::Rect};

    struct Quiet {
        name: String,
        enabler: Enabler,
        priority: bool,
        renders: AtomicUsize,
    }

    impl Quiet {
        fn new(name: &str, enabled: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                enabler: Enabler::new(enabled),
                priority: false,
                renders: AtomicUsize::new(0),
            })
        }
    }

    impl Board for Quiet {
        fn name(&self) -> &str {
            &self.name
        }
        fn enabled(&self) -> bool {
            self.enabler.enabled()
        }
        fn enable(&self) -> bool {
            self.enabler.enable()
        }
        fn disable(&self) -> bool {
            self.enabler.disable()
        }
        fn render<'a>(
            &'a self,
            _cancel: CancellationToken,
            _canvas: &'a mut dyn Canvas,
        ) -> BoxFuture<'a, MatrixResult<()>> {
            async move {
                self.renders.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                Ok(())
            }
            .boxed()
        }
        fn has_priority(&self) -> bool {
            self.priority
        }
    }

    fn fast() -> Pacing {
        Pacing {
            watchdog_secs: 60,
            min_render_ms: 0,
            pause_ms: 0,
            idle_poll_ms: 5,
        }
    }

    fn controller(boards: Vec<Arc<Quiet>>) -> SportsMatrix {
        SportsMatrix::new(
            Box::new(Surface::new(Rect::from_size(4, 4))),
            boards.into_iter().map(|b| b as Arc<dyn Board>).collect(),
            fast(),
        )
    }

    #[tokio::test]
    async fn serve_without_boards_is_an_error() {
        let m = controller(vec![]);
        let err = m.serve(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MatrixError::Validation(_)));
    }

    #[tokio::test]
    async fn jump_requires_a_known_board_and_enables_it() {
        let a = Quiet::new("NHL", false);
        let m = controller(vec![a.clone()]);
        assert!(m.jump_to("mlb").is_err());
        m.jump_to("nhl").unwrap();
        assert!(a.enabled());
        assert_eq!(*lock(&m.inner.jump_to), Some(0));
    }

    #[tokio::test]
    async fn next_board_cancels_the_active_render() {
        let m = controller(vec![Quiet::new("a", true)]);
        let before = m.render_token();
        m.next_board();
        assert!(before.is_cancelled());
        assert!(!m.render_token().is_cancelled());
    }

    #[tokio::test]
    async fn priority_boards_preempt_the_rotation() {
        let plain = Quiet::new("plain", true);
        let urgent = Arc::new(Quiet {
            name: "urgent".to_string(),
            enabler: Enabler::new(true),
            priority: true,
            renders: AtomicUsize::new(0),
        });
        let m = controller(vec![plain.clone(), urgent.clone()]);
        let cancel = CancellationToken::new();
        let serving = tokio::spawn({
            let m = m.clone();
            let cancel = cancel.clone();
            async move { m.serve(cancel).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(urgent.renders.load(Ordering::SeqCst) > 0);
        assert_eq!(plain.renders.load(Ordering::SeqCst), 0);

        cancel.cancel();
        let res = serving.await.unwrap();
        assert!(matches!(res, Err(MatrixError::Canceled)));
    }

    #[tokio::test]
    async fn render_is_skipped_once_the_screen_is_off() {
        let a = Quiet::new("a", true);
        let m = controller(vec![a.clone()]);
        let cancel = CancellationToken::new();

        m.render_board(a.as_ref(), &cancel).await;
        assert_eq!(a.renders.load(Ordering::SeqCst), 1);

        m.inner.screen_on.store(false, Ordering::SeqCst);
        m.rotate_render_token();
        m.render_board(a.as_ref(), &cancel).await;
        assert_eq!(a.renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn board_status_lists_registration_order() {
        let m = controller(vec![Quiet::new("a", true), Quiet::new("b", false)]);
        let names: Vec<_> = m.board_status().into_iter().map(|s| (s.name, s.enabled)).collect();
        assert_eq!(names, vec![("a".to_string(), true), ("b".to_string(), false)]);
        assert_eq!(m.screen_state(), ScreenState::On);
    }
}
