use std::{
    collections::BTreeSet,
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures_util::future::{BoxFuture, FutureExt};
use image::RgbaImage;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    canvas::{Canvas, Surface, draw_over},
    foundation::core::Point,
    foundation::error::{MatrixError, MatrixResult},
};

pub const BACKGROUND_PRIORITY: i32 = 0;
/// Reserved priority: always drawn after every numbered tier.
pub const FOREGROUND_PRIORITY: i32 = -1;

pub type PrepareFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, MatrixResult<RgbaImage>> + Send + Sync>;
pub type DrawFn = Arc<dyn Fn(&mut Surface, Option<&RgbaImage>) -> MatrixResult<()> + Send + Sync>;
pub type TextPrepareFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, MatrixResult<Vec<String>>> + Send + Sync>;
pub type TextDrawFn = Arc<dyn Fn(&mut Surface, &[String]) -> MatrixResult<()> + Send + Sync>;

/// One independently prepared and drawn piece of a frame whose artifact is an image.
pub struct Layer {
    priority: i32,
    prepare: Option<PrepareFn>,
    draw: DrawFn,
    prepared: Option<Arc<RgbaImage>>,
}

impl Layer {
    pub fn new<P, Fut, D>(prepare: P, draw: D) -> Self
    where
        P: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MatrixResult<RgbaImage>> + Send + 'static,
        D: Fn(&mut Surface, Option<&RgbaImage>) -> MatrixResult<()> + Send + Sync + 'static,
    {
        Self {
            priority: BACKGROUND_PRIORITY,
            prepare: Some(Arc::new(move |cancel| prepare(cancel).boxed())),
            draw: Arc::new(draw),
            prepared: None,
        }
    }

    /// A layer without a prepare step; its draw function receives `None`.
    pub fn draw_only<D>(draw: D) -> Self
    where
        D: Fn(&mut Surface, Option<&RgbaImage>) -> MatrixResult<()> + Send + Sync + 'static,
    {
        Self {
            priority: BACKGROUND_PRIORITY,
            prepare: None,
            draw: Arc::new(draw),
            prepared: None,
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// A layer whose prepared artifact is a set of already measured text lines.
pub struct TextLayer {
    priority: i32,
    prepare: Option<TextPrepareFn>,
    draw: TextDrawFn,
    prepared: Arc<Vec<String>>,
}

impl TextLayer {
    pub fn new<P, Fut, D>(prepare: P, draw: D) -> Self
    where
        P: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MatrixResult<Vec<String>>> + Send + 'static,
        D: Fn(&mut Surface, &[String]) -> MatrixResult<()> + Send + Sync + 'static,
    {
        Self {
            priority: BACKGROUND_PRIORITY,
            prepare: Some(Arc::new(move |cancel| prepare(cancel).boxed())),
            draw: Arc::new(draw),
            prepared: Arc::new(Vec::new()),
        }
    }

    /// A text layer with fixed lines and no prepare step.
    pub fn with_lines<D>(lines: Vec<String>, draw: D) -> Self
    where
        D: Fn(&mut Surface, &[String]) -> MatrixResult<()> + Send + Sync + 'static,
    {
        Self {
            priority: BACKGROUND_PRIORITY,
            prepare: None,
            draw: Arc::new(draw),
            prepared: Arc::new(lines),
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Image(usize),
    Text(usize),
}

enum Prepared {
    Image(RgbaImage),
    Text(Vec<String>),
}

/// Composites layers in priority tiers.
///
/// All prepare steps run concurrently. Draws then run tier by tier in ascending priority;
/// the layers of one tier draw concurrently, each onto a private transparent surface,
/// and the surfaces are laid over the canvas in registration order once the whole tier
/// finished. Layers that share a tier must not depend on each other's pixels.
pub struct LayerDrawer {
    timeout: Duration,
    priorities: BTreeSet<i32>,
    layers: Vec<Layer>,
    text_layers: Vec<TextLayer>,
    max_priority: i32,
    prepared: bool,
}

impl LayerDrawer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            priorities: BTreeSet::new(),
            layers: Vec::new(),
            text_layers: Vec::new(),
            max_priority: 0,
            prepared: false,
        }
    }

    pub fn add_layer(&mut self, priority: i32, mut layer: Layer) {
        layer.priority = priority;
        self.priorities.insert(priority);
        self.layers.push(layer);
        self.prepared = false;
    }

    pub fn add_text_layer(&mut self, priority: i32, mut layer: TextLayer) {
        layer.priority = priority;
        self.priorities.insert(priority);
        self.text_layers.push(layer);
        self.prepared = false;
    }

    pub fn clear_layers(&mut self) {
        self.layers.clear();
        self.text_layers.clear();
        self.priorities.clear();
        self.max_priority = 0;
        self.prepared = false;
    }

    pub fn len(&self) -> usize {
        self.layers.len() + self.text_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap the frontmost sentinel for a real tier one above the highest numbered tier
    /// and return all tiers in ascending order.
    fn resolve_priorities(&mut self) -> Vec<i32> {
        let has_foreground = self.priorities.remove(&FOREGROUND_PRIORITY);
        let max = self
            .priorities
            .iter()
            .copied()
            .max()
            .unwrap_or(BACKGROUND_PRIORITY)
            .max(BACKGROUND_PRIORITY);
        self.max_priority = max;

        if has_foreground {
            self.max_priority = max + 1;
            self.priorities.insert(self.max_priority);
            for layer in &mut self.layers {
                if layer.priority == FOREGROUND_PRIORITY {
                    layer.priority = self.max_priority;
                }
            }
            for layer in &mut self.text_layers {
                if layer.priority == FOREGROUND_PRIORITY {
                    layer.priority = self.max_priority;
                }
            }
        }

        self.priorities.iter().copied().collect()
    }

    /// Run every prepare step concurrently.
    ///
    /// Fails with [`MatrixError::Canceled`] when `cancel` fires first, with a timeout
    /// error when the phase outlives the drawer timeout, and with the first failing
    /// layer's error (in registration order) otherwise.
    pub async fn prepare(&mut self, cancel: &CancellationToken) -> MatrixResult<()> {
        let phase = cancel.child_token();
        let _stop = phase.clone().drop_guard();

        let mut tasks = JoinSet::new();
        for (i, layer) in self.layers.iter().enumerate() {
            if let Some(prepare) = &layer.prepare {
                let fut = prepare(phase.clone());
                tasks.spawn(async move { (Slot::Image(i), fut.await.map(Prepared::Image)) });
            }
        }
        for (i, layer) in self.text_layers.iter().enumerate() {
            if let Some(prepare) = &layer.prepare {
                let fut = prepare(phase.clone());
                tasks.spawn(async move { (Slot::Text(i), fut.await.map(Prepared::Text)) });
            }
        }

        let mut results = run_phase(&mut tasks, cancel, self.timeout, "layer prepare").await?;
        results.sort_by_key(|(slot, _)| *slot);

        let mut first_err = None;
        for (slot, result) in results {
            match (slot, result) {
                (Slot::Image(i), Ok(Prepared::Image(img))) => {
                    self.layers[i].prepared = Some(Arc::new(img));
                }
                (Slot::Text(i), Ok(Prepared::Text(lines))) => {
                    self.text_layers[i].prepared = Arc::new(lines);
                }
                (slot, Ok(_)) => {
                    if first_err.is_none() {
                        first_err = Some(MatrixError::layer(format!(
                            "{slot:?} produced the wrong artifact kind"
                        )));
                    }
                }
                (slot, Err(e)) => {
                    tracing::warn!(layer = ?slot, error = %e, "layer prepare failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        self.prepared = true;
        Ok(())
    }

    /// Draw every tier onto `canvas`, preparing first if that has not happened yet.
    ///
    /// The canvas is not rendered; that stays with the caller.
    pub async fn draw(
        &mut self,
        cancel: &CancellationToken,
        canvas: &mut dyn Canvas,
    ) -> MatrixResult<()> {
        if !self.prepared {
            self.prepare(cancel).await.map_err(|e| match e {
                MatrixError::Layer(msg) => {
                    MatrixError::layer(format!("failed to prepare layers before drawing: {msg}"))
                }
                other => other,
            })?;
        }

        let bounds = canvas.bounds();
        for tier in self.resolve_priorities() {
            tracing::debug!(priority = tier, "drawing tier");

            let mut tasks = JoinSet::new();
            let mut order = 0usize;
            for layer in self.layers.iter().filter(|l| l.priority == tier) {
                let draw = layer.draw.clone();
                let prepared = layer.prepared.clone();
                let n = order;
                order += 1;
                tasks.spawn_blocking(move || {
                    let mut surface = Surface::new(bounds);
                    (n, draw(&mut surface, prepared.as_deref()).map(|_| surface))
                });
            }
            for layer in self.text_layers.iter().filter(|l| l.priority == tier) {
                let draw = layer.draw.clone();
                let lines = layer.prepared.clone();
                let n = order;
                order += 1;
                tasks.spawn_blocking(move || {
                    let mut surface = Surface::new(bounds);
                    (n, draw(&mut surface, &lines).map(|_| surface))
                });
            }

            let mut results = run_phase(&mut tasks, cancel, self.timeout, "layer draw").await?;
            results.sort_by_key(|(n, _)| *n);

            let mut surfaces = Vec::with_capacity(results.len());
            for (_, result) in results {
                surfaces.push(result?);
            }
            for surface in &surfaces {
                draw_over(canvas, surface.buffer(), Point::ZERO);
            }
        }

        Ok(())
    }
}

/// Wait for every task of one phase, racing the phase against `cancel` and `timeout`.
/// Leaving early drops the caller's `JoinSet`, which aborts whatever is still running.
async fn run_phase<T: 'static>(
    tasks: &mut JoinSet<T>,
    cancel: &CancellationToken,
    timeout: Duration,
    phase: &str,
) -> MatrixResult<Vec<T>> {
    let collect = async {
        let mut out = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            out.push(joined);
        }
        out
    };

    let joined: Vec<Result<T, JoinError>> = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(MatrixError::Canceled),
        res = tokio::time::timeout(timeout, collect) => res
            .map_err(|_| MatrixError::timeout(format!("{phase} exceeded {timeout:?}")))?,
    };
    // Tasks that finished because the token fired still count as canceled.
    if cancel.is_cancelled() {
        return Err(MatrixError::Canceled);
    }

    joined
        .into_iter()
        .map(|r| r.map_err(|e| MatrixError::layer(format!("{phase} task failed: {e}"))))
        .collect()
}
