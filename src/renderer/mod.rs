//! Drawing abstraction consumed by the layout engine.
//!
//! The engine never creates a surface itself. It asks a [`Renderer`] for
//! the staff-space scale (`unit_size`) during layout and draws through an
//! optional [`DrawSurface`] afterwards. A headless renderer lays out
//! without drawing anything.

pub(crate) mod constants;
pub mod svg_builder;

use crate::geometry::Rect;

use constants::DEBUG_COLOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// Immediate-mode 2D drawing surface.
pub trait DrawSurface {
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64);
    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, stroke: &str, stroke_width: f64);
    fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, filled: bool, color: &str, stroke_width: f64);
    /// SVG path data (`M`, `L`, `C`, `Q`, `Z` commands).
    fn path(&mut self, d: &str, fill: &str, stroke: &str, stroke_width: f64);
    /// Text vertically centered on `y`.
    fn text(&mut self, x: f64, y: f64, content: &str, size: f64, fill: &str, anchor: TextAnchor);
    fn image(&mut self, x: f64, y: f64, w: f64, h: f64, href: &str);
}

pub struct Renderer<'s> {
    unit_size: f64,
    line_width: f64,
    debug_rects: bool,
    surface: Option<&'s mut dyn DrawSurface>,
}

impl Renderer<'static> {
    /// Renderer without a surface: layout works, drawing is a no-op.
    pub fn headless(unit_size: f64) -> Self {
        Self {
            unit_size,
            line_width: unit_size * 0.1,
            debug_rects: false,
            surface: None,
        }
    }
}

impl<'s> Renderer<'s> {
    pub fn new(unit_size: f64, surface: &'s mut dyn DrawSurface) -> Self {
        Self {
            unit_size,
            line_width: unit_size * 0.1,
            debug_rects: false,
            surface: Some(surface),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }

    /// Outline every laid-out object's bounding rect when drawing.
    pub fn with_debug_rects(mut self, on: bool) -> Self {
        self.debug_rects = on;
        self
    }

    /// Distance between two staff lines.
    pub fn unit_size(&self) -> f64 {
        self.unit_size
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    pub fn debug_rects(&self) -> bool {
        self.debug_rects
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    pub fn surface(&mut self) -> Option<&mut (dyn DrawSurface + 's)> {
        self.surface.as_deref_mut()
    }

    /// Rough advance width of `text` at font size `size`. Good enough for
    /// spacing; no font metrics are available to the engine.
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        text.chars().count() as f64 * size * 0.55
    }

    pub fn draw_debug_rect(&mut self, rect: &Rect) {
        if !self.debug_rects {
            return;
        }
        let width = self.line_width * 0.5;
        if let Some(s) = self.surface() {
            s.rect(rect.left, rect.top, rect.width(), rect.height(), "none", DEBUG_COLOR, width);
        }
    }
}
