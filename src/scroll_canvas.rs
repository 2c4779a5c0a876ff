use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::{
    canvas::{Canvas, PixelBuffer},
    enabler::Enabler,
    foundation::core::{BLACK, Color, Rect, is_blank},
    foundation::error::{MatrixError, MatrixResult},
    matrix::SharedMatrix,
};

pub const DEFAULT_SCROLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollDirection {
    #[default]
    RightToLeft,
    LeftToRight,
    BottomToTop,
    TopToBottom,
}

impl ScrollDirection {
    fn horizontal(self) -> bool {
        matches!(self, Self::RightToLeft | Self::LeftToRight)
    }
}

/// Default padding around the device: one device width plus a quarter of it.
pub fn default_padding(width: usize) -> usize {
    width + (width as f64 * 0.25) as usize
}

/// Canvas whose `render` is a marquee: the content sweeps across the device one pixel
/// per interval, entering from one edge and leaving through the opposite one.
///
/// Boards draw into an oversized virtual buffer, `pad` pixels larger than the device on
/// every side, so content may be placed off-screen and still scroll into view.
pub struct ScrollCanvas {
    width: usize,
    height: usize,
    matrix: SharedMatrix,
    enabler: Enabler,
    virt: PixelBuffer,
    pad: usize,
    direction: ScrollDirection,
    interval: Duration,
    captured: Vec<PixelBuffer>,
    strip: Option<PixelBuffer>,
}

impl ScrollCanvas {
    pub fn new(matrix: SharedMatrix) -> Self {
        let (width, height) = matrix.geometry();
        let pad = default_padding(width);
        let mut c = Self {
            width,
            height,
            matrix,
            enabler: Enabler::new(true),
            virt: PixelBuffer::new(Rect::default(), BLACK),
            pad,
            direction: ScrollDirection::default(),
            interval: DEFAULT_SCROLL_INTERVAL,
            captured: Vec::new(),
            strip: None,
        };
        c.set_padding(pad);
        c
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_direction(mut self, direction: ScrollDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_padding(mut self, pad: usize) -> Self {
        self.set_padding(pad);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn direction(&self) -> ScrollDirection {
        self.direction
    }

    pub fn set_direction(&mut self, direction: ScrollDirection) {
        self.direction = direction;
    }

    pub fn padding(&self) -> usize {
        self.pad
    }

    /// Replace the virtual buffer with a blank one `pad` pixels larger on every side.
    pub fn set_padding(&mut self, pad: usize) {
        self.pad = pad;
        let p = pad as i32;
        let bounds = Rect::new(-p, -p, self.width as i32 + p, self.height as i32 + p);
        self.virt = PixelBuffer::new(bounds, BLACK);
        tracing::debug!(
            padding = pad,
            width = self.width,
            height = self.height,
            bounds = %bounds,
            "creating scroll canvas"
        );
    }

    /// Snapshot the current virtual content for a later [`ScrollCanvas::merge`] and
    /// blank the buffer so the next item can be drawn.
    pub fn capture(&mut self) {
        let snapshot = self.virt.clone();
        self.captured.push(snapshot);
        self.virt.reset();
    }

    /// Snapshot another canvas for a later [`ScrollCanvas::merge`].
    pub fn add_canvas(&mut self, other: &dyn Canvas) {
        let bounds = other.bounds();
        let mut snapshot = PixelBuffer::new(bounds, BLACK);
        for y in bounds.min.y..bounds.max.y {
            for x in bounds.min.x..bounds.max.x {
                snapshot.set(x, y, other.at(x, y));
            }
        }
        self.captured.push(snapshot);
    }

    pub fn captured_len(&self) -> usize {
        self.captured.len()
    }

    /// Join the non-blank column ranges of all captured snapshots into one strip,
    /// `padding` blank columns before each, which the next `render` scrolls instead of
    /// the virtual buffer. Captures with no content are skipped.
    pub fn merge(&mut self, padding: usize) {
        if self.captured.is_empty() {
            return;
        }

        let spans: Vec<(usize, i32, i32)> = self
            .captured
            .iter()
            .enumerate()
            .filter_map(|(i, buf)| content_span(buf, true).map(|(a, b)| (i, a, b)))
            .collect();

        let total: usize = spans
            .iter()
            .map(|(_, first, last)| padding + (last - first + 1) as usize)
            .sum();

        let mut strip = PixelBuffer::new(Rect::from_size(total, self.height), BLACK);
        let mut cursor = 0i32;
        for (i, first, last) in spans {
            let src = &self.captured[i];
            cursor += padding as i32;
            for x in first..=last {
                for y in 0..self.height as i32 {
                    strip.set(cursor + (x - first), y, src.at(x, y));
                }
            }
            cursor += last - first + 1;
        }

        tracing::debug!(
            width = total,
            height = self.height,
            parts = self.captured.len(),
            "merged scroll strip"
        );
        self.captured.clear();
        self.strip = Some(strip);
    }

    async fn sweep(&mut self, cancel: &CancellationToken) -> MatrixResult<()> {
        let source = self.strip.take().unwrap_or_else(|| self.virt.clone());
        let horizontal = self.direction.horizontal();
        let extent = if horizontal { self.width } else { self.height } as i32;

        let (first, last) = content_span(&source, horizontal).unwrap_or((0, extent - 1));
        // Offsets that put the content just outside the device on either side.
        let enter_high = extent - first;
        let exit_low = -(last + 1);
        let (mut shift, finish, step) = match self.direction {
            ScrollDirection::RightToLeft | ScrollDirection::BottomToTop => {
                (enter_high, exit_low, -1)
            }
            ScrollDirection::LeftToRight | ScrollDirection::TopToBottom => {
                (exit_low, enter_high, 1)
            }
        };

        tracing::debug!(
            direction = ?self.direction,
            start = shift,
            finish,
            interval = ?self.interval,
            "scrolling"
        );

        let (w, h) = (self.width as i32, self.height as i32);
        let mut frame = vec![BLACK; self.width * self.height];
        while shift != finish {
            if cancel.is_cancelled() {
                return Err(MatrixError::Canceled);
            }

            for y in 0..h {
                for x in 0..w {
                    let (vx, vy) = if horizontal {
                        (x - shift, y)
                    } else {
                        (x, y - shift)
                    };
                    frame[(y * w + x) as usize] = source.at(vx, vy);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(MatrixError::Canceled),
                _ = tokio::time::sleep(self.interval) => {}
            }

            self.matrix.apply(&frame)?;
            shift += step;
        }
        Ok(())
    }
}

/// First and last row/column (along the scroll axis) holding a non-blank pixel.
fn content_span(buf: &PixelBuffer, columns: bool) -> Option<(i32, i32)> {
    let mut span: Option<(i32, i32)> = None;
    for (p, c) in buf.painted() {
        if is_blank(c) {
            continue;
        }
        let v = if columns { p.x } else { p.y };
        span = Some(match span {
            Some((a, b)) => (a.min(v), b.max(v)),
            None => (v, v),
        });
    }
    span
}

impl Canvas for ScrollCanvas {
    fn name(&self) -> &str {
        "RGB ScrollCanvas"
    }

    fn bounds(&self) -> Rect {
        self.virt.bounds()
    }

    fn at(&self, x: i32, y: i32) -> Color {
        self.virt.at(x, y)
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        self.virt.set(x, y, color);
    }

    fn render<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, MatrixResult<()>> {
        async move {
            self.sweep(cancel).await?;
            self.virt.reset();
            Ok(())
        }
        .boxed()
    }

    fn clear(&mut self) -> MatrixResult<()> {
        self.virt.reset();
        self.strip = None;
        self.captured.clear();
        self.matrix.apply(&vec![BLACK; self.width * self.height])
    }

    fn scrollable(&self) -> bool {
        true
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{foundation::core::rgb, matrix::ImageMatrix};

    fn canvas(w: usize, h: usize) -> (ScrollCanvas, crate::matrix::FrameProbe) {
        let m = ImageMatrix::new(w, h);
        let probe = m.probe();
        let c = ScrollCanvas::new(SharedMatrix::new(m)).with_interval(Duration::from_millis(1));
        (c, probe)
    }

    #[test]
    fn default_bounds_are_padded() {
        let (c, _) = canvas(64, 32);
        assert_eq!(c.padding(), 80);
        assert_eq!(c.bounds(), Rect::new(-80, -80, 144, 112));
    }

    #[test]
    fn padded_region_is_addressable() {
        let (mut c, _) = canvas(8, 4);
        c.set(-10, -10, rgb(255, 0, 0));
        assert_eq!(c.at(-10, -10), rgb(255, 0, 0));
        c.set(-500, 0, rgb(255, 0, 0));
        assert_eq!(c.at(-500, 0), BLACK);
    }

    #[tokio::test]
    async fn right_to_left_sweep_pushes_one_frame_per_step_and_clears() {
        let (mut c, probe) = canvas(4, 1);
        for x in 0..4 {
            c.set(x, 0, rgb(255, 255, 255));
        }
        c.render(&CancellationToken::new()).await.unwrap();
        // shift runs from +4 down to -3: eight frames.
        assert_eq!(probe.renders(), 8);
        assert_eq!(*probe.frame().get_pixel(0, 0), rgb(255, 255, 255));
        assert_eq!(*probe.frame().get_pixel(1, 0), BLACK);
        assert_eq!(c.at(0, 0), BLACK);
    }

    #[tokio::test]
    async fn sweep_stops_on_cancel() {
        let (mut c, probe) = canvas(4, 1);
        c.set(0, 0, rgb(255, 0, 0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = c.render(&cancel).await.unwrap_err();
        assert!(matches!(err, MatrixError::Canceled));
        assert_eq!(probe.renders(), 0);
    }

    #[tokio::test]
    async fn bottom_to_top_moves_content_up() {
        let (c, probe) = canvas(1, 3);
        let mut c = c.with_direction(ScrollDirection::BottomToTop);
        c.set(0, 0, rgb(0, 255, 0));
        c.render(&CancellationToken::new()).await.unwrap();
        // rows: enter at +3, leave at -1 → four frames, last one shows row 0 at y=0.
        assert_eq!(probe.renders(), 4);
        assert_eq!(*probe.frame().get_pixel(0, 0), rgb(0, 255, 0));
    }

    #[test]
    fn merge_joins_content_columns_with_padding() {
        let (mut c, _) = canvas(4, 1);
        c.set(1, 0, rgb(255, 0, 0));
        c.set(2, 0, rgb(255, 0, 0));
        c.capture();
        c.set(0, 0, rgb(0, 0, 255));
        c.capture();
        assert_eq!(c.captured_len(), 2);
        assert_eq!(c.at(0, 0), BLACK);

        c.merge(1);
        let strip = c.strip.as_ref().unwrap();
        assert_eq!(strip.bounds(), Rect::new(0, 0, 5, 1));
        assert_eq!(strip.at(0, 0), BLACK);
        assert_eq!(strip.at(1, 0), rgb(255, 0, 0));
        assert_eq!(strip.at(2, 0), rgb(255, 0, 0));
        assert_eq!(strip.at(3, 0), BLACK);
        assert_eq!(strip.at(4, 0), rgb(0, 0, 255));
        assert_eq!(c.captured_len(), 0);
    }
}
