use std::{
    io::Write,
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    composite::dim,
    foundation::core::{BLACK, Color},
    foundation::error::{MatrixError, MatrixResult},
};

/// A physical or virtual LED matrix.
///
/// Pixels are addressed by row-major position (`x + y * width`). Implementations must
/// ignore out-of-range positions: `at` returns black and `set` is a no-op.
pub trait Matrix: Send {
    fn geometry(&self) -> (usize, usize);
    fn at(&self, position: usize) -> Color;
    fn set(&mut self, position: usize, color: Color);
    /// Set every LED from `leds` (row-major) and push the frame.
    fn apply(&mut self, leds: &[Color]) -> MatrixResult<()>;
    /// Push the current LED state to the display.
    fn render(&mut self) -> MatrixResult<()>;
    fn close(&mut self) -> MatrixResult<()>;
    /// Brightness in percent, 0..=100.
    fn set_brightness(&mut self, brightness: u8);
}

/// Cloneable handle to one matrix shared by canvases and the controller.
#[derive(Clone)]
pub struct SharedMatrix {
    inner: Arc<Mutex<Box<dyn Matrix>>>,
    width: usize,
    height: usize,
}

impl SharedMatrix {
    pub fn new(matrix: impl Matrix + 'static) -> Self {
        let (width, height) = matrix.geometry();
        Self {
            inner: Arc::new(Mutex::new(Box::new(matrix))),
            width,
            height,
        }
    }

    pub fn geometry(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn lock(&self) -> MatrixResult<MutexGuard<'_, Box<dyn Matrix>>> {
        self.inner
            .lock()
            .map_err(|_| MatrixError::device("matrix lock poisoned"))
    }

    pub fn apply(&self, leds: &[Color]) -> MatrixResult<()> {
        self.lock()?.apply(leds)
    }

    pub fn render(&self) -> MatrixResult<()> {
        self.lock()?.render()
    }

    pub fn close(&self) -> MatrixResult<()> {
        self.lock()?.close()
    }

    pub fn set_brightness(&self, brightness: u8) -> MatrixResult<()> {
        self.lock()?.set_brightness(brightness);
        Ok(())
    }
}

impl std::fmt::Debug for SharedMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMatrix")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Text stand-in for a real panel: every render dumps one character per LED.
///
/// `R`/`G`/`B` mark a dominant channel, `W` near-white, `_` near-black and `0` anything
/// else. LEDs reset to black after each render.
pub struct ConsoleMatrix<W: Write + Send> {
    leds: Vec<Color>,
    width: usize,
    height: usize,
    out: W,
}

impl<W: Write + Send> ConsoleMatrix<W> {
    pub fn new(width: usize, height: usize, out: W) -> Self {
        Self {
            leds: vec![BLACK; width * height],
            width,
            height,
            out,
        }
    }

    fn reset(&mut self) {
        self.leds.fill(BLACK);
    }

    fn glyph(c: Color) -> char {
        let [r, g, b, _] = c.0;
        if r > g && r > b {
            'R'
        } else if g > r && g > b {
            'G'
        } else if b > r && b > g {
            'B'
        } else if r < 40 && g < 40 && b < 40 {
            '_'
        } else if r > 240 && g > 240 && b > 240 {
            'W'
        } else {
            '0'
        }
    }

    pub fn frame_text(&self) -> String {
        let mut s = String::with_capacity((self.width * 2 + 3) * (self.height + 2));
        s.push('|');
        s.push_str(&"_ ".repeat(self.width));
        s.push('|');
        s.push('\n');
        for row in self.leds.chunks(self.width.max(1)) {
            s.push('|');
            for &c in row {
                s.push(Self::glyph(c));
                s.push(' ');
            }
            s.push('|');
            s.push('\n');
        }
        s.push('|');
        s.push_str(&"_ ".repeat(self.width));
        s.push('|');
        s
    }
}

impl<W: Write + Send> Matrix for ConsoleMatrix<W> {
    fn geometry(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn at(&self, position: usize) -> Color {
        self.leds.get(position).copied().unwrap_or(BLACK)
    }

    fn set(&mut self, position: usize, color: Color) {
        if let Some(led) = self.leds.get_mut(position) {
            *led = color;
        }
    }

    fn apply(&mut self, leds: &[Color]) -> MatrixResult<()> {
        for (position, &c) in leds.iter().enumerate() {
            self.set(position, c);
        }
        self.render()
    }

    fn render(&mut self) -> MatrixResult<()> {
        let text = self.frame_text();
        writeln!(self.out, "{text}")
            .map_err(|e| MatrixError::device(format!("console write failed: {e}")))?;
        self.reset();
        Ok(())
    }

    fn close(&mut self) -> MatrixResult<()> {
        self.out
            .flush()
            .map_err(|e| MatrixError::device(format!("console flush failed: {e}")))
    }

    fn set_brightness(&mut self, _brightness: u8) {}
}

/// Observer for an [`ImageMatrix`] that stays usable after the matrix is boxed.
#[derive(Clone, Debug)]
pub struct FrameProbe {
    frame: Arc<Mutex<image::RgbaImage>>,
    renders: Arc<AtomicUsize>,
}

impl FrameProbe {
    /// Copy of the last frame pushed to the device.
    pub fn frame(&self) -> image::RgbaImage {
        self.frame
            .lock()
            .map(|f| f.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

/// In-memory matrix that keeps the last rendered frame as an RGBA image and can
/// optionally write every frame to a PNG file.
pub struct ImageMatrix {
    leds: Vec<Color>,
    width: usize,
    height: usize,
    brightness: u8,
    png_path: Option<PathBuf>,
    probe: FrameProbe,
}

impl ImageMatrix {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            leds: vec![BLACK; width * height],
            width,
            height,
            brightness: 100,
            png_path: None,
            probe: FrameProbe {
                frame: Arc::new(Mutex::new(image::RgbaImage::new(
                    width as u32,
                    height as u32,
                ))),
                renders: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    pub fn with_png_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.png_path = Some(path.into());
        self
    }

    pub fn probe(&self) -> FrameProbe {
        self.probe.clone()
    }

    fn snapshot(&self) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.width as u32, self.height as u32);
        for (i, &c) in self.leds.iter().enumerate() {
            let x = (i % self.width) as u32;
            let y = (i / self.width) as u32;
            img.put_pixel(x, y, dim(c, self.brightness));
        }
        img
    }
}

impl Matrix for ImageMatrix {
    fn geometry(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn at(&self, position: usize) -> Color {
        self.leds.get(position).copied().unwrap_or(BLACK)
    }

    fn set(&mut self, position: usize, color: Color) {
        if let Some(led) = self.leds.get_mut(position) {
            *led = color;
        }
    }

    fn apply(&mut self, leds: &[Color]) -> MatrixResult<()> {
        for (position, &c) in leds.iter().enumerate() {
            self.set(position, c);
        }
        self.render()
    }

    fn render(&mut self) -> MatrixResult<()> {
        let img = self.snapshot();
        if let Some(path) = &self.png_path {
            img.save_with_format(path, image::ImageFormat::Png)
                .map_err(|e| {
                    MatrixError::device(format!("write png '{}': {e}", path.display()))
                })?;
        }
        match self.probe.frame.lock() {
            Ok(mut frame) => *frame = img,
            Err(poisoned) => *poisoned.into_inner() = img,
        }
        self.probe.renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> MatrixResult<()> {
        Ok(())
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(100);
    }
}
