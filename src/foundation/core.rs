/// Straight (non-premultiplied) RGBA8 pixel.
pub type Color = image::Rgba<u8>;

pub const BLACK: Color = image::Rgba([0, 0, 0, 255]);
pub const WHITE: Color = image::Rgba([255, 255, 255, 255]);
pub const TRANSPARENT: Color = image::Rgba([0, 0, 0, 0]);

pub fn rgb(r: u8, g: u8, b: u8) -> Color {
    image::Rgba([r, g, b, 255])
}

/// True when a pixel carries no visible light on an LED panel.
pub fn is_blank(c: Color) -> bool {
    let [r, g, b, a] = c.0;
    a == 0 || (r == 0 && g == 0 && b == 0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Half-open pixel rectangle: `min` is inclusive, `max` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min: Point::new(x0, y0),
            max: Point::new(x1, y1),
        }
    }

    pub fn from_size(width: usize, height: usize) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn dx(self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn dy(self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn width(self) -> usize {
        self.dx().max(0) as usize
    }

    pub fn height(self) -> usize {
        self.dy().max(0) as usize
    }

    pub fn is_empty(self) -> bool {
        self.dx() <= 0 || self.dy() <= 0
    }

    pub fn contains(self, x: i32, y: i32) -> bool {
        self.min.x <= x && x < self.max.x && self.min.y <= y && y < self.max.y
    }

    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.min.x + dx,
            self.min.y + dy,
            self.max.x + dx,
            self.max.y + dy,
        )
    }

    /// Same size, moved so that `min` is the origin.
    pub fn zeroed(self) -> Self {
        self.translate(-self.min.x, -self.min.y)
    }

    pub fn intersect(self, other: Rect) -> Self {
        let r = Self::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        if r.is_empty() { Rect::default() } else { r }
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}
