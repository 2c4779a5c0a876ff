use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use futures_util::future::{BoxFuture, FutureExt};
use sportsmatrix::{
    Board, Canvas, Color, Enabler, MatrixError, MatrixResult, Pacing, Rect, ScreenState,
    SportsMatrix, Surface,
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
enum Mode {
    Quick,
    UntilCanceled,
    Stuck,
    Fail,
}

struct TestBoard {
    name: String,
    mode: Mode,
    enabler: Enabler,
    renders: AtomicUsize,
    canceled: AtomicUsize,
    cleanups: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

impl TestBoard {
    fn new(name: &str, mode: Mode, enabled: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            mode,
            enabler: Enabler::new(enabled),
            renders: AtomicUsize::new(0),
            canceled: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
            log: log.clone(),
        })
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl Board for TestBoard {
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
        cancel: CancellationToken,
        canvas: &'a mut dyn Canvas,
    ) -> BoxFuture<'a, MatrixResult<()>> {
        async move {
            self.renders.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.name.clone());
            canvas.set(0, 0, image::Rgba([255, 0, 0, 255]));
            match self.mode {
                Mode::Quick => {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    canvas.render(&cancel).await
                }
                Mode::UntilCanceled => {
                    cancel.cancelled().await;
                    self.canceled.fetch_add(1, Ordering::SeqCst);
                    Err(MatrixError::Canceled)
                }
                Mode::Stuck => std::future::pending().await,
                Mode::Fail => Err(MatrixError::device("panel unplugged")),
            }
        }
        .boxed()
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory canvas that counts clears and renders.
struct CountingCanvas {
    surface: Surface,
    clears: Arc<AtomicUsize>,
    renders: Arc<AtomicUsize>,
}

impl Canvas for CountingCanvas {
    fn name(&self) -> &str {
        "counting"
    }
    fn bounds(&self) -> Rect {
        self.surface.bounds()
    }
    fn at(&self, x: i32, y: i32) -> Color {
        self.surface.at(x, y)
    }
    fn set(&mut self, x: i32, y: i32, color: Color) {
        self.surface.set(x, y, color);
    }
    fn render<'a>(&'a mut self, _cancel: &'a CancellationToken) -> BoxFuture<'a, MatrixResult<()>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }.boxed()
    }
    fn clear(&mut self) -> MatrixResult<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.surface.clear()
    }
    fn scrollable(&self) -> bool {
        false
    }
    fn enabled(&self) -> bool {
        true
    }
    fn enable(&self) -> bool {
        false
    }
    fn disable(&self) -> bool {
        false
    }
}

struct Harness {
    matrix: SportsMatrix,
    clears: Arc<AtomicUsize>,
    cancel: CancellationToken,
    serving: tokio::task::JoinHandle<MatrixResult<()>>,
}

fn fast() -> Pacing {
    Pacing {
        watchdog_secs: 60,
        min_render_ms: 0,
        pause_ms: 0,
        idle_poll_ms: 5,
    }
}

fn start(boards: Vec<Arc<TestBoard>>) -> Harness {
    start_with(boards, fast())
}

fn start_with(boards: Vec<Arc<TestBoard>>, pacing: Pacing) -> Harness {
    let clears = Arc::new(AtomicUsize::new(0));
    let canvas = CountingCanvas {
        surface: Surface::new(Rect::from_size(8, 8)),
        clears: clears.clone(),
        renders: Arc::new(AtomicUsize::new(0)),
    };
    let boards = boards.into_iter().map(|b| b as Arc<dyn Board>).collect();
    let matrix = SportsMatrix::new(Box::new(canvas), boards, pacing);
    let cancel = CancellationToken::new();
    let serving = tokio::spawn({
        let matrix = matrix.clone();
        let cancel = cancel.clone();
        async move { matrix.serve(cancel).await }
    });
    Harness {
        matrix,
        clears,
        cancel,
        serving,
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

async fn finish(h: Harness) -> MatrixResult<()> {
    h.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), h.serving)
        .await
        .expect("serve did not stop")
        .expect("serve task panicked")
}

#[tokio::test]
async fn all_disabled_clears_once_per_period() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("only", Mode::Quick, false, &log);
    let h = start(vec![board.clone()]);

    assert!(wait_until(|| h.clears.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.clears.load(Ordering::SeqCst), 1);
    assert_eq!(board.renders(), 0);

    board.enable();
    assert!(wait_until(|| board.renders() > 0).await);
    assert_eq!(h.clears.load(Ordering::SeqCst), 1);

    board.disable();
    assert!(wait_until(|| h.clears.load(Ordering::SeqCst) == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.clears.load(Ordering::SeqCst), 2);

    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}

#[tokio::test]
async fn serve_renders_then_returns_canceled() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("a", Mode::UntilCanceled, true, &log);
    let h = start(vec![board.clone()]);

    assert!(wait_until(|| board.renders() == 1).await);
    let res = finish(h).await;
    assert!(matches!(res, Err(MatrixError::Canceled)), "{res:?}");
    assert_eq!(board.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_unblocks_a_board_that_ignores_its_token() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("stuck", Mode::Stuck, true, &log);
    let h = start(vec![board.clone()]);

    assert!(wait_until(|| board.renders() == 1).await);
    let res = finish(h).await;
    assert!(matches!(res, Err(MatrixError::Canceled)), "{res:?}");
    assert_eq!(board.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_board_does_not_stop_the_rotation() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let bad = TestBoard::new("bad", Mode::Fail, true, &log);
    let good = TestBoard::new("good", Mode::Quick, true, &log);
    let h = start(vec![bad.clone(), good.clone()]);

    assert!(wait_until(|| bad.renders() >= 3 && good.renders() >= 3).await);
    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}

#[tokio::test]
async fn quick_renders_are_followed_by_a_pause() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("quick", Mode::Quick, true, &log);
    let pacing = Pacing {
        min_render_ms: 200,
        pause_ms: 150,
        ..fast()
    };
    let h = start_with(vec![board.clone()], pacing);

    assert!(wait_until(|| board.renders() == 1).await);
    let first = Instant::now();
    assert!(wait_until(|| board.renders() == 2).await);
    assert!(
        first.elapsed() >= Duration::from_millis(100),
        "second render after {:?}",
        first.elapsed()
    );

    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

#[tokio::test]
async fn watchdog_warns_about_a_long_render() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("slow", Mode::Stuck, true, &log);
    let pacing = Pacing {
        watchdog_secs: 1,
        ..fast()
    };
    let h = start_with(vec![board.clone()], pacing);

    assert!(wait_until(|| board.renders() == 1).await);
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let out = captured.text();
    assert!(out.contains("board rendered longer than normal"), "{out}");
    assert!(out.contains("WARN"), "{out}");

    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}

#[tokio::test]
async fn close_unblocks_a_stuck_render() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("stuck", Mode::Stuck, true, &log);
    let h = start(vec![board.clone()]);

    assert!(wait_until(|| board.renders() == 1).await);
    h.matrix.close();
    h.matrix.close();

    let res = tokio::time::timeout(Duration::from_secs(2), h.serving)
        .await
        .expect("close did not unblock serve")
        .unwrap();
    assert!(matches!(res, Err(MatrixError::Closed)));
    assert_eq!(board.cleanups.load(Ordering::SeqCst), 1);

    let again = h.matrix.serve(CancellationToken::new()).await;
    assert!(matches!(again, Err(MatrixError::Closed)));
    assert!(matches!(
        h.matrix.screen_on().await,
        Err(MatrixError::Closed)
    ));
}

#[tokio::test]
async fn screen_off_cancels_the_render_and_clears_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let board = TestBoard::new("a", Mode::UntilCanceled, true, &log);
    let h = start(vec![board.clone()]);

    assert!(wait_until(|| board.renders() == 1).await);
    h.matrix.screen_off().await.unwrap();
    h.matrix.screen_off().await.unwrap();

    assert!(wait_until(|| h.matrix.screen_state() == ScreenState::Off).await);
    assert!(wait_until(|| board.canceled.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.clears.load(Ordering::SeqCst), 1);
    assert_eq!(board.renders(), 1);

    h.matrix.screen_on().await.unwrap();
    assert!(wait_until(|| board.renders() == 2).await);
    assert_eq!(h.matrix.screen_state(), ScreenState::On);

    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}

#[tokio::test]
async fn jump_skips_ahead_to_the_named_board() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = TestBoard::new("a", Mode::UntilCanceled, true, &log);
    let b = TestBoard::new("b", Mode::Quick, true, &log);
    let c = TestBoard::new("C", Mode::Quick, false, &log);
    let h = start(vec![a.clone(), b.clone(), c.clone()]);

    assert!(wait_until(|| a.renders() == 1).await);
    assert!(h.matrix.jump_to("nope").is_err());
    h.matrix.jump_to("c").unwrap();
    assert!(c.enabled());

    assert!(wait_until(|| c.renders() >= 1).await);
    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[..2], ["a".to_string(), "C".to_string()]);

    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}

#[tokio::test]
async fn next_board_moves_the_rotation_on() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = TestBoard::new("a", Mode::UntilCanceled, true, &log);
    let b = TestBoard::new("b", Mode::UntilCanceled, true, &log);
    let h = start(vec![a.clone(), b.clone()]);

    assert!(wait_until(|| a.renders() == 1).await);
    h.matrix.next_board();
    assert!(wait_until(|| b.renders() == 1).await);
    assert_eq!(a.canceled.load(Ordering::SeqCst), 1);

    assert!(matches!(finish(h).await, Err(MatrixError::Canceled)));
}
