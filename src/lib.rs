//! sportsmatrix drives an RGB LED matrix by rotating through a set of boards.
//!
//! - A [`SportsMatrix`] controller owns the shared [`Canvas`] and hands it to one
//!   [`Board`] at a time, with screen on/off handling and render pacing
//! - Boards compose frames with a [`LayerDrawer`] (concurrent, priority-tiered layers)
//!   and fetch live data ahead of time with [`Preload`] / [`Prefetcher`]
//! - Canvases push to a [`Matrix`] device either as a still frame ([`MatrixCanvas`]) or as
//!   a marquee ([`ScrollCanvas`])
#![forbid(unsafe_code)]

mod foundation;

pub mod board;
pub mod canvas;
pub mod composite;
pub mod config;
pub mod controller;
pub mod demo;
pub mod enabler;
pub mod grid;
pub mod http;
pub mod layer;
pub mod matrix;
pub mod preload;
pub mod schedule;
pub mod scroll_canvas;

pub use crate::foundation::core::{BLACK, Color, Point, Rect, TRANSPARENT, WHITE, is_blank, rgb};
pub use crate::foundation::error::{MatrixError, MatrixResult};

pub use crate::board::{Board, HttpHandler, hold};
pub use crate::canvas::{Canvas, MatrixCanvas, PixelBuffer, Surface, draw_over, fill_rect};
pub use crate::config::{Config, HardwareConfig, Pacing};
pub use crate::controller::{BoardStatus, ScreenSignal, ScreenState, SportsMatrix};
pub use crate::enabler::Enabler;
pub use crate::grid::{Cell, CellSizing, Grid};
pub use crate::layer::{BACKGROUND_PRIORITY, FOREGROUND_PRIORITY, Layer, LayerDrawer, TextLayer};
pub use crate::matrix::{ConsoleMatrix, FrameProbe, ImageMatrix, Matrix, SharedMatrix};
pub use crate::preload::{MAX_ATTEMPTS, Outcome, Prefetcher, Preload};
pub use crate::schedule::ScreenSchedule;
pub use crate::scroll_canvas::{ScrollCanvas, ScrollDirection};
