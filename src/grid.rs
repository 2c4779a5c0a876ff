use crate::{
    canvas::{Canvas, Surface, draw_over},
    foundation::core::{Color, Point, Rect},
    foundation::error::{MatrixError, MatrixResult},
};

/// How a [`Grid`] sizes its columns and rows.
#[derive(Clone, Debug, PartialEq)]
pub enum CellSizing {
    /// Every column and row gets an equal share of the base canvas.
    Uniform { cols: usize, rows: usize },
    /// Each column/row gets `floor(ratio * extent)` pixels.
    Ratios { cols: Vec<f64>, rows: Vec<f64> },
    /// As many cells of the given size as fit into the base canvas.
    CellSize { width: usize, height: usize },
}

/// A sub-canvas of a grid. `bounds` is where the cell lands on the base canvas; the
/// cell's own surface is addressed from `(0, 0)`.
#[derive(Debug)]
pub struct Cell {
    pub surface: Surface,
    pub bounds: Rect,
    pub col: usize,
    pub row: usize,
}

/// Splits a base canvas into cells that are drawn independently and then composited
/// back with [`Grid::draw_to_base`].
#[derive(Debug)]
pub struct Grid {
    base: Rect,
    cell_widths: Vec<usize>,
    cell_heights: Vec<usize>,
    padding: usize,
    padded: Vec<Point>,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(base: Rect, sizing: CellSizing) -> MatrixResult<Self> {
        let (cell_widths, cell_heights) = match sizing {
            CellSizing::Uniform { cols, rows } => {
                if cols == 0 || rows == 0 {
                    return Err(MatrixError::validation("grid needs at least one column and row"));
                }
                (
                    vec![base.width() / cols; cols],
                    vec![base.height() / rows; rows],
                )
            }
            CellSizing::Ratios { cols, rows } => {
                if cols.is_empty() || rows.is_empty() {
                    return Err(MatrixError::validation("grid needs at least one column and row"));
                }
                if cols.iter().chain(rows.iter()).any(|r| !(0.0..=1.0).contains(r)) {
                    return Err(MatrixError::validation("cell ratios must be within 0..=1"));
                }
                let w = base.width() as f64;
                let h = base.height() as f64;
                (
                    cols.iter().map(|r| (r * w).floor() as usize).collect(),
                    rows.iter().map(|r| (r * h).floor() as usize).collect(),
                )
            }
            CellSizing::CellSize { width, height } => {
                if width == 0 || height == 0 {
                    return Err(MatrixError::validation("cell size must be non-zero"));
                }
                let cols = base.width() / width;
                let rows = base.height() / height;
                if cols == 0 || rows == 0 {
                    return Err(MatrixError::validation(format!(
                        "cell size {width}x{height} does not fit into {base}"
                    )));
                }
                (vec![width; cols], vec![height; rows])
            }
        };

        let mut grid = Self {
            base,
            cell_widths,
            cell_heights,
            padding: 0,
            padded: Vec::new(),
            cells: Vec::new(),
        };
        grid.generate_cells();
        tracing::debug!(
            cols = grid.num_cols(),
            rows = grid.num_rows(),
            "new grid"
        );
        Ok(grid)
    }

    /// Pad between cells by `ratio` of the base width. Any positive ratio yields at
    /// least 2 pixels, and the padding is always even so both sides get half.
    pub fn with_padding(mut self, ratio: f64) -> Self {
        let mut padding = 0;
        if ratio > 0.0 {
            padding = (ratio * self.base.width() as f64) as usize;
            if padding < 1 {
                padding = 2;
            }
        }
        if padding % 2 != 0 {
            padding += 1;
        }
        self.padding = padding;
        self.generate_cells();
        self
    }

    fn generate_cells(&mut self) {
        let half = (self.padding / 2) as i32;
        let total_w: usize = self.cell_widths.iter().sum();
        let total_h: usize = self.cell_heights.iter().sum();
        let origin = self.base.min;

        self.cells.clear();
        self.padded.clear();

        let mut real_y0 = 0i32;
        for (row, &ch) in self.cell_heights.iter().enumerate() {
            let real_y1 = real_y0 + ch as i32;
            let mut real_x0 = 0i32;
            for (col, &cw) in self.cell_widths.iter().enumerate() {
                let real_x1 = real_x0 + cw as i32;
                let inner = Rect::new(
                    real_x0 + half,
                    real_y0 + half,
                    (real_x1 - half).max(real_x0 + half),
                    (real_y1 - half).max(real_y0 + half),
                );

                if half > 0 {
                    for y in real_y0..real_y1 {
                        let outer_y = (real_y0 == 0 && y < inner.min.y)
                            || (real_y1 == total_h as i32 && y >= inner.max.y);
                        if outer_y {
                            continue;
                        }
                        for x in real_x0..real_x1 {
                            let outer_x = (real_x0 == 0 && x < inner.min.x)
                                || (real_x1 == total_w as i32 && x >= inner.max.x);
                            if outer_x || inner.contains(x, y) {
                                continue;
                            }
                            self.padded.push(Point::new(origin.x + x, origin.y + y));
                        }
                    }
                }

                let bounds = inner.translate(origin.x, origin.y);
                self.cells.push(Cell {
                    surface: Surface::new(bounds.zeroed()),
                    bounds,
                    col,
                    row,
                });
                real_x0 = real_x1;
            }
            real_y0 = real_y1;
        }
    }

    pub fn num_cols(&self) -> usize {
        self.cell_widths.len()
    }

    pub fn num_rows(&self) -> usize {
        self.cell_heights.len()
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Throw away all drawn content and start over with fresh cells.
    pub fn clear(&mut self) {
        self.generate_cells();
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn cell(&self, index: usize) -> MatrixResult<&Cell> {
        let max = self.cells.len().saturating_sub(1);
        self.cells
            .get(index)
            .ok_or_else(|| MatrixError::validation(format!("no cell at index {index}, max of {max}")))
    }

    pub fn cell_mut(&mut self, index: usize) -> MatrixResult<&mut Cell> {
        let max = self.cells.len().saturating_sub(1);
        self.cells
            .get_mut(index)
            .ok_or_else(|| MatrixError::validation(format!("no cell at index {index}, max of {max}")))
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(move |c| c.row == row)
    }

    pub fn col(&self, col: usize) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(move |c| c.col == col)
    }

    /// Paint the gaps between cells. The outer margin of the base canvas is left alone.
    pub fn fill_padded(&self, canvas: &mut dyn Canvas, color: Color) {
        for p in &self.padded {
            canvas.set(p.x, p.y, color);
        }
    }

    pub fn draw_to_base(&self, base: &mut dyn Canvas) {
        for cell in &self.cells {
            draw_over(base, cell.surface.buffer(), cell.bounds.min);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{TRANSPARENT, rgb};

    #[test]
    fn fixed_cell_size_over_square_canvas() {
        let grid = Grid::new(
            Rect::from_size(100, 100),
            CellSizing::CellSize {
                width: 50,
                height: 50,
            },
        )
        .unwrap();
        assert_eq!(grid.cells().len(), 4);
        for cell in grid.cells() {
            assert_eq!(cell.bounds.width(), 50);
            assert_eq!(cell.bounds.height(), 50);
        }
        assert_eq!(grid.cell(3).unwrap().bounds, Rect::new(50, 50, 100, 100));
        assert!(grid.cell(4).is_err());
    }

    #[test]
    fn rows_and_cols_select_cells() {
        let grid = Grid::new(Rect::from_size(90, 20), CellSizing::Uniform { cols: 3, rows: 2 }).unwrap();
        assert_eq!(grid.row(1).count(), 3);
        assert_eq!(grid.col(2).count(), 2);
        assert!(grid.col(2).all(|c| c.bounds.min.x == 60));
    }

    #[test]
    fn ratios_floor_to_whole_pixels() {
        let grid = Grid::new(
            Rect::from_size(64, 32),
            CellSizing::Ratios {
                cols: vec![0.25, 0.75],
                rows: vec![1.0],
            },
        )
        .unwrap();
        assert_eq!(grid.cell(0).unwrap().bounds, Rect::new(0, 0, 16, 32));
        assert_eq!(grid.cell(1).unwrap().bounds, Rect::new(16, 0, 64, 32));
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(Grid::new(Rect::from_size(10, 10), CellSizing::Uniform { cols: 0, rows: 1 }).is_err());
        assert!(
            Grid::new(
                Rect::from_size(10, 10),
                CellSizing::CellSize {
                    width: 20,
                    height: 5
                }
            )
            .is_err()
        );
    }

    #[test]
    fn padding_fills_only_inner_gaps() {
        let grid = Grid::new(
            Rect::from_size(100, 100),
            CellSizing::CellSize {
                width: 50,
                height: 50,
            },
        )
        .unwrap()
        .with_padding(0.1);
        assert_eq!(grid.padding(), 10);
        assert_eq!(grid.cell(0).unwrap().bounds, Rect::new(5, 5, 45, 45));

        let mut base = Surface::new(Rect::from_size(100, 100));
        grid.fill_padded(&mut base, rgb(255, 0, 0));
        assert_eq!(base.at(47, 10), rgb(255, 0, 0));
        assert_eq!(base.at(10, 47), rgb(255, 0, 0));
        assert_eq!(base.at(2, 10), TRANSPARENT);
        assert_eq!(base.at(98, 60), TRANSPARENT);
        assert_eq!(base.at(20, 20), TRANSPARENT);
    }

    #[test]
    fn cells_composite_at_their_bounds() {
        let mut grid = Grid::new(Rect::from_size(4, 2), CellSizing::Uniform { cols: 2, rows: 1 }).unwrap();
        grid.cell_mut(1).unwrap().surface.set(0, 1, rgb(0, 255, 0));
        let mut base = Surface::new(Rect::from_size(4, 2));
        grid.draw_to_base(&mut base);
        assert_eq!(base.at(2, 1), rgb(0, 255, 0));
        assert_eq!(base.at(0, 1), TRANSPARENT);

        grid.clear();
        assert_eq!(grid.cell(1).unwrap().surface.at(0, 1), TRANSPARENT);
    }
}
