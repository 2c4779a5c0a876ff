use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::{
    composite::over,
    enabler::Enabler,
    foundation::core::{BLACK, Color, Point, Rect, TRANSPARENT},
    foundation::error::{MatrixError, MatrixResult},
    matrix::SharedMatrix,
};

/// Drawing target handed to boards.
///
/// Coordinates outside [`Canvas::bounds`] are legal: `at` returns the background color
/// and `set` does nothing. Callers rely on this to draw partially off-screen content.
pub trait Canvas: Send {
    fn name(&self) -> &str;
    fn bounds(&self) -> Rect;
    fn at(&self, x: i32, y: i32) -> Color;
    fn set(&mut self, x: i32, y: i32, color: Color);
    /// Push the buffer to the device. May take several frames for animated canvases.
    fn render<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, MatrixResult<()>>;
    /// Fill with the background color and push that once.
    fn clear(&mut self) -> MatrixResult<()>;
    fn scrollable(&self) -> bool;
    fn enabled(&self) -> bool;
    fn enable(&self) -> bool;
    fn disable(&self) -> bool;
}

/// Row-major pixels over an arbitrary (possibly negative-origin) rectangle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    bounds: Rect,
    pixels: Vec<Color>,
    background: Color,
}

impl PixelBuffer {
    pub fn new(bounds: Rect, background: Color) -> Self {
        Self {
            bounds,
            pixels: vec![background; bounds.width() * bounds.height()],
            background,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bounds.contains(x, y) {
            return None;
        }
        let col = (x - self.bounds.min.x) as usize;
        let row = (y - self.bounds.min.y) as usize;
        Some(row * self.bounds.width() + col)
    }

    pub fn at(&self, x: i32, y: i32) -> Color {
        self.index(x, y)
            .map(|i| self.pixels[i])
            .unwrap_or(self.background)
    }

    pub fn set(&mut self, x: i32, y: i32, color: Color) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color;
        }
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    pub fn reset(&mut self) {
        self.pixels.fill(self.background);
    }

    /// Every pixel whose color is not the background.
    pub fn painted(&self) -> impl Iterator<Item = (Point, Color)> + '_ {
        let w = self.bounds.width().max(1);
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != self.background)
            .map(move |(i, &c)| {
                let p = Point::new(
                    self.bounds.min.x + (i % w) as i32,
                    self.bounds.min.y + (i / w) as i32,
                );
                (p, c)
            })
    }
}

/// Canvas over a matrix device. `render` pushes the full buffer every time.
pub struct MatrixCanvas {
    matrix: SharedMatrix,
    buffer: PixelBuffer,
    enabler: Enabler,
}

impl MatrixCanvas {
    pub fn new(matrix: SharedMatrix) -> Self {
        let (w, h) = matrix.geometry();
        Self {
            matrix,
            buffer: PixelBuffer::new(Rect::from_size(w, h), BLACK),
            enabler: Enabler::new(true),
        }
    }

    pub fn matrix(&self) -> &SharedMatrix {
        &self.matrix
    }

    pub fn push(&self) -> MatrixResult<()> {
        self.matrix.apply(self.buffer.pixels())
    }
}

impl Canvas for MatrixCanvas {
    fn name(&self) -> &str {
        "RGB Canvas"
    }

    fn bounds(&self) -> Rect {
        self.buffer.bounds()
    }

    fn at(&self, x: i32, y: i32) -> Color {
        self.buffer.at(x, y)
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        self.buffer.set(x, y, color);
    }

    fn render<'a>(&'a mut self, cancel: &'a CancellationToken) -> BoxFuture<'a, MatrixResult<()>> {
        async move {
            if cancel.is_cancelled() {
                return Err(MatrixError::Canceled);
            }
            self.push()
        }
        .boxed()
    }

    fn clear(&mut self) -> MatrixResult<()> {
        self.buffer.reset();
        self.push()
    }

    fn scrollable(&self) -> bool {
        false
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

/// Transparent in-memory canvas that never reaches a device.
///
/// Used as the private target of a single layer and as grid cells; its content is
/// later composited onto a real canvas with [`draw_over`].
#[derive(Debug)]
pub struct Surface {
    buffer: PixelBuffer,
    enabler: Enabler,
}

impl Surface {
    pub fn new(bounds: Rect) -> Self {
        Self {
            buffer: PixelBuffer::new(bounds, TRANSPARENT),
            enabler: Enabler::new(true),
        }
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        fill_rect(self, rect, color);
    }
}

impl Canvas for Surface {
    fn name(&self) -> &str {
        "Surface"
    }

    fn bounds(&self) -> Rect {
        self.buffer.bounds()
    }

    fn at(&self, x: i32, y: i32) -> Color {
        self.buffer.at(x, y)
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        self.buffer.set(x, y, color);
    }

    fn render<'a>(&'a mut self, _cancel: &'a CancellationToken) -> BoxFuture<'a, MatrixResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn clear(&mut self) -> MatrixResult<()> {
        self.buffer.reset();
        Ok(())
    }

    fn scrollable(&self) -> bool {
        false
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

pub fn fill_rect(canvas: &mut dyn Canvas, rect: Rect, color: Color) {
    let rect = rect.intersect(canvas.bounds());
    for y in rect.min.y..rect.max.y {
        for x in rect.min.x..rect.max.x {
            canvas.set(x, y, color);
        }
    }
}

/// Composite every painted pixel of `src` onto `dst`, shifted by `offset`.
pub fn draw_over(dst: &mut dyn Canvas, src: &PixelBuffer, offset: Point) {
    for (p, c) in src.painted() {
        let (x, y) = (p.x + offset.x, p.y + offset.y);
        let under = dst.at(x, y);
        dst.set(x, y, over(under, c));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::rgb,
        matrix::{ImageMatrix, SharedMatrix},
    };

    #[test]
    fn out_of_range_access_is_ignored() {
        let mut buf = PixelBuffer::new(Rect::from_size(4, 4), BLACK);
        buf.set(-1, 0, rgb(255, 0, 0));
        buf.set(4, 0, rgb(255, 0, 0));
        buf.set(0, 99, rgb(255, 0, 0));
        assert!(buf.pixels().iter().all(|&c| c == BLACK));
        assert_eq!(buf.at(-5, -5), BLACK);
        assert_eq!(buf.at(4, 3), BLACK);
    }

    #[test]
    fn negative_origin_buffers_index_correctly() {
        let mut buf = PixelBuffer::new(Rect::new(-2, -1, 2, 1), TRANSPARENT);
        buf.set(-2, -1, rgb(1, 1, 1));
        buf.set(1, 0, rgb(2, 2, 2));
        assert_eq!(buf.at(-2, -1), rgb(1, 1, 1));
        assert_eq!(buf.at(1, 0), rgb(2, 2, 2));
        assert_eq!(buf.pixels()[0], rgb(1, 1, 1));
        assert_eq!(buf.pixels()[7], rgb(2, 2, 2));
        let painted: Vec<_> = buf.painted().collect();
        assert_eq!(
            painted,
            vec![
                (Point::new(-2, -1), rgb(1, 1, 1)),
                (Point::new(1, 0), rgb(2, 2, 2))
            ]
        );
    }

    #[tokio::test]
    async fn matrix_canvas_render_pushes_buffer() {
        let m = ImageMatrix::new(3, 2);
        let probe = m.probe();
        let mut canvas = MatrixCanvas::new(SharedMatrix::new(m));
        assert_eq!(canvas.bounds(), Rect::new(0, 0, 3, 2));
        canvas.set(2, 1, rgb(0, 255, 0));
        canvas.set(7, 7, rgb(0, 255, 0));
        canvas.render(&CancellationToken::new()).await.unwrap();
        assert_eq!(probe.renders(), 1);
        assert_eq!(*probe.frame().get_pixel(2, 1), rgb(0, 255, 0));

        canvas.clear().unwrap();
        assert_eq!(probe.renders(), 2);
        assert_eq!(*probe.frame().get_pixel(2, 1), BLACK);
        assert_eq!(canvas.at(2, 1), BLACK);
    }

    #[tokio::test]
    async fn matrix_canvas_render_honors_cancellation() {
        let mut canvas = MatrixCanvas::new(SharedMatrix::new(ImageMatrix::new(1, 1)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = canvas.render(&cancel).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn draw_over_skips_transparent_pixels() {
        let mut dst = MatrixCanvas::new(SharedMatrix::new(ImageMatrix::new(3, 1)));
        fill_rect(&mut dst, Rect::new(0, 0, 3, 1), rgb(0, 0, 255));
        let mut src = Surface::new(Rect::new(0, 0, 3, 1));
        src.set(1, 0, rgb(255, 0, 0));
        draw_over(&mut dst, src.buffer(), Point::ZERO);
        assert_eq!(dst.at(0, 0), rgb(0, 0, 255));
        assert_eq!(dst.at(1, 0), rgb(255, 0, 0));
        assert_eq!(dst.at(2, 0), rgb(0, 0, 255));
    }
}
