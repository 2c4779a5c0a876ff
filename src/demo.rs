//! Self-contained boards for the bundled binary and for exercising the engine without
//! any live data source.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::routing::get;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    board::{Board, HttpHandler, hold},
    canvas::{Canvas, fill_rect},
    enabler::Enabler,
    foundation::core::{BLACK, Color, Rect, WHITE, rgb},
    foundation::error::{MatrixError, MatrixResult},
    grid::{CellSizing, Grid},
    layer::{BACKGROUND_PRIORITY, FOREGROUND_PRIORITY, Layer, LayerDrawer},
    preload::{Prefetcher, preload_deadline},
};

const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Draw `value` in a 3x5 pixel font with its top-left corner at `(x, y)`.
/// Returns the x just past the last digit.
pub fn draw_number(canvas: &mut dyn Canvas, x: i32, y: i32, value: u64, color: Color) -> i32 {
    let mut cursor = x;
    for ch in value.to_string().bytes() {
        let glyph = DIGITS[usize::from(ch - b'0')];
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) != 0 {
                    canvas.set(cursor + col, y + row as i32, color);
                }
            }
        }
        cursor += 4;
    }
    cursor
}

const PALETTE: [Color; 4] = [
    image::Rgba([200, 0, 0, 255]),
    image::Rgba([0, 160, 0, 255]),
    image::Rgba([0, 0, 200, 255]),
    image::Rgba([200, 160, 0, 255]),
];

/// Colored columns with a white frame, drawn through two layer tiers.
pub struct PatternBoard {
    name: String,
    area: Rect,
    columns: usize,
    hold_for: Duration,
    enabler: Enabler,
    drawer: Mutex<LayerDrawer>,
}

impl PatternBoard {
    pub fn new(name: impl Into<String>, area: Rect, columns: usize, hold_for: Duration) -> Self {
        Self {
            name: name.into(),
            area,
            columns: columns.max(1),
            hold_for,
            enabler: Enabler::new(true),
            drawer: Mutex::new(LayerDrawer::new(Duration::from_secs(5))),
        }
    }

    fn setup_layers(&self, drawer: &mut LayerDrawer) -> MatrixResult<()> {
        drawer.clear_layers();

        let mut grid = Grid::new(
            self.area,
            CellSizing::Uniform {
                cols: self.columns,
                rows: 1,
            },
        )?
        .with_padding(0.05);
        for (i, cell) in grid.cells_mut().iter_mut().enumerate() {
            let bounds = cell.surface.bounds();
            cell.surface.fill_rect(bounds, PALETTE[i % PALETTE.len()]);
        }
        let grid = Arc::new(grid);

        drawer.add_layer(
            BACKGROUND_PRIORITY,
            Layer::draw_only(move |surface, _| {
                grid.fill_padded(surface, BLACK);
                grid.draw_to_base(surface);
                Ok(())
            }),
        );

        let area = self.area;
        drawer.add_layer(
            FOREGROUND_PRIORITY,
            Layer::draw_only(move |surface, _| {
                let (x0, y0, x1, y1) = (area.min.x, area.min.y, area.max.x, area.max.y);
                fill_rect(surface, Rect::new(x0, y0, x1, y0 + 1), WHITE);
                fill_rect(surface, Rect::new(x0, y1 - 1, x1, y1), WHITE);
                fill_rect(surface, Rect::new(x0, y0, x0 + 1, y1), WHITE);
                fill_rect(surface, Rect::new(x1 - 1, y0, x1, y1), WHITE);
                Ok(())
            }),
        );
        Ok(())
    }
}

impl Board for PatternBoard {
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
            let mut drawer = self.drawer.lock().await;
            self.setup_layers(&mut drawer)?;
            drawer.draw(&cancel, canvas).await?;
            drop(drawer);

            canvas.render(&cancel).await?;
            hold(&cancel, &self.enabler, self.hold_for).await
        }
        .boxed()
    }
}

pub type Source = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, MatrixResult<u64>> + Send + Sync>;

/// A counter that fails every third call, standing in for a flaky remote API.
pub fn flaky_counter() -> Source {
    let calls = Arc::new(AtomicU64::new(0));
    Arc::new(move |_| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n % 3 == 0 {
                Err(MatrixError::fetch(format!("call {n} dropped")))
            } else {
                Ok(n)
            }
        }
        .boxed()
    })
}

const TICKER_KEY: &str = "ticker";

/// Shows the latest value of a slow source, preloading the next value while the current
/// one is on screen.
pub struct TickerBoard {
    name: String,
    hold_for: Duration,
    enabler: Enabler,
    source: Source,
    prefetch: Mutex<Prefetcher<&'static str, u64>>,
    latest: Arc<AtomicU64>,
}

impl TickerBoard {
    pub fn new(name: impl Into<String>, source: Source, hold_for: Duration) -> Self {
        Self {
            name: name.into(),
            hold_for,
            enabler: Enabler::new(true),
            source,
            prefetch: Mutex::new(Prefetcher::new()),
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

impl Board for TickerBoard {
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
            let value = {
                let mut prefetch = self.prefetch.lock().await;
                let source = self.source.clone();
                prefetch.start(TICKER_KEY, cancel.child_token(), move |c| source(c));
                prefetch
                    .get(&TICKER_KEY, preload_deadline(self.hold_for))
                    .await
            };

            match value {
                Some(v) => {
                    self.latest.store(v, Ordering::SeqCst);
                    draw_number(canvas, 1, 1, v, rgb(0, 200, 200));
                }
                None => {
                    tracing::debug!(board = %self.name, "no ticker data yet");
                    fill_rect(canvas, Rect::new(1, 3, 8, 4), rgb(120, 120, 120));
                }
            }

            canvas.render(&cancel).await?;
            hold(&cancel, &self.enabler, self.hold_for).await
        }
        .boxed()
    }

    fn http_handlers(&self) -> MatrixResult<Vec<HttpHandler>> {
        let latest = self.latest.clone();
        let path = format!("/{}/value", self.name.to_lowercase());
        Ok(vec![HttpHandler::new(
            path,
            get(move || {
                let v = latest.load(Ordering::SeqCst);
                async move { v.to_string() }
            }),
        )])
    }
}
