//! Annotations stacked above or below a staff or layout group, and
//! extension lines continuing from a text annotation.

use std::str::FromStr;

use serde::Serialize;

use super::{AnnotationId, ColumnId, ExtensionId, LayoutGroupId, MeasureId, MusicObject, RowId};
use crate::error::{Result, ScoreError};
use crate::geometry::{union_all, Rect};
use crate::renderer::constants::*;
use crate::renderer::{Renderer, TextAnchor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VerticalPos {
    Above,
    Below,
}

impl FromStr for VerticalPos {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(VerticalPos::Above),
            "below" => Ok(VerticalPos::Below),
            _ => Err(ScoreError::invalid("vertical position", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Target {
    Staff(usize),
    Group(LayoutGroupId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnnotationAnchor {
    /// Centered on a column's note heads.
    Column(ColumnId),
    MeasureStart(MeasureId),
    /// Right-aligned to the end of the measure content.
    MeasureEnd(MeasureId),
    /// Spanning the whole measure.
    Measure(MeasureId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AnnotationKind {
    Fermata,
    Text { text: String, italic: bool },
    /// An image; `size` (in units) is `None` until the image is decoded.
    Image { src: String, size: Option<(f64, f64)> },
    Ending { passes: Vec<u8> },
}

impl AnnotationKind {
    pub fn text(text: &str) -> Self {
        AnnotationKind::Text { text: text.to_string(), italic: false }
    }
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub id: AnnotationId,
    pub measure: MeasureId,
    pub anchor: AnnotationAnchor,
    pub target: Target,
    pub position: VerticalPos,
    pub kind: AnnotationKind,
    rect: Rect,
    unit: f64,
}

impl Annotation {
    pub(crate) fn new(
        id: AnnotationId,
        measure: MeasureId,
        anchor: AnnotationAnchor,
        target: Target,
        position: VerticalPos,
        kind: AnnotationKind,
    ) -> Self {
        Self { id, measure, anchor, target, position, kind, rect: Rect::default(), unit: 0.0 }
    }

    /// Width and height of the box to stack; `span` is the anchor's
    /// horizontal extent, used by brackets.
    pub(crate) fn size(&self, r: &Renderer<'_>, span: f64) -> (f64, f64) {
        let unit = r.unit_size();
        match &self.kind {
            AnnotationKind::Fermata => (FERMATA_WIDTH * unit, FERMATA_HEIGHT * unit),
            AnnotationKind::Text { text, .. } => (r.text_width(text, TEXT_SIZE * unit), TEXT_SIZE * unit * 1.2),
            AnnotationKind::Image { size: Some((w, h)), .. } => (w * unit, h * unit),
            AnnotationKind::Image { src, size: None } => {
                tracing::debug!(src = %src, "image not decoded yet, laid out empty");
                (0.0, 0.0)
            }
            AnnotationKind::Ending { .. } => (span, ENDING_HEIGHT * unit),
        }
    }

    pub(crate) fn set_rect(&mut self, rect: Rect, unit: f64) {
        self.rect = rect;
        self.unit = unit;
    }

    /// Drawn only once it has a size.
    pub fn is_visible(&self) -> bool {
        !self.rect.is_empty()
    }
}

impl MusicObject for Annotation {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        if !self.is_visible() {
            return;
        }
        r.draw_debug_rect(&self.rect);
        let lw = r.line_width();
        let unit = self.unit;
        let rect = self.rect;
        let Some(s) = r.surface() else { return };
        match &self.kind {
            AnnotationKind::Fermata => {
                let (edge, tip, dot_y) = match self.position {
                    VerticalPos::Above => (rect.bottom, rect.top, rect.bottom - unit * 0.3),
                    VerticalPos::Below => (rect.top, rect.bottom, rect.top + unit * 0.3),
                };
                let d = format!(
                    "M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}",
                    rect.left,
                    edge,
                    rect.left,
                    tip,
                    rect.right,
                    tip,
                    rect.right,
                    edge
                );
                s.path(&d, "none", NOTE_COLOR, lw * 1.5);
                let rad = DOT_RADIUS * unit;
                s.ellipse(rect.center_x(), dot_y, rad, rad, true, NOTE_COLOR, 0.0);
            }
            AnnotationKind::Text { text, .. } => {
                s.text(rect.left, rect.center_y(), text, TEXT_SIZE * unit, TEXT_COLOR, TextAnchor::Start);
            }
            AnnotationKind::Image { src, .. } => {
                s.image(rect.left, rect.top, rect.width(), rect.height(), src);
            }
            AnnotationKind::Ending { passes } => {
                let label: Vec<String> = passes.iter().map(|p| format!("{p}.")).collect();
                let d = format!(
                    "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1}",
                    rect.left,
                    rect.bottom,
                    rect.left,
                    rect.top,
                    rect.right - unit,
                    rect.top
                );
                s.path(&d, "none", BARLINE_COLOR, lw);
                s.text(rect.left + unit * 0.5, rect.top + unit, &label.join(" "), TEXT_SIZE * unit * 0.8, TEXT_COLOR, TextAnchor::Start);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtensionSpan {
    /// Up to the n-th following column, across measures.
    Columns(usize),
    /// To the end of the n-th measure counting the current one.
    Measures(usize),
    ToMeasureEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtensionEnd {
    Column(ColumnId),
    MeasureEnd(MeasureId),
}

/// One row's piece of an extension line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtensionSegment {
    pub row: RowId,
    pub x0: f64,
    pub x1: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub id: ExtensionId,
    /// Text the line continues from.
    pub label: AnnotationId,
    pub measure: MeasureId,
    pub start: Option<ColumnId>,
    pub span: ExtensionSpan,
    pub(crate) end: Option<ExtensionEnd>,
    pub(crate) segments: Vec<ExtensionSegment>,
    unit: f64,
}

impl Extension {
    pub(crate) fn new(id: ExtensionId, label: AnnotationId, measure: MeasureId, start: Option<ColumnId>, span: ExtensionSpan) -> Self {
        Self { id, label, measure, start, span, end: None, segments: Vec::new(), unit: 0.0 }
    }

    pub fn segments(&self) -> &[ExtensionSegment] {
        &self.segments
    }

    pub(crate) fn set_segments(&mut self, segments: Vec<ExtensionSegment>, unit: f64) {
        self.segments = segments;
        self.unit = unit;
    }

    pub(crate) fn offset_row(&mut self, row: RowId, dx: f64, dy: f64) {
        for seg in self.segments.iter_mut().filter(|s| s.row == row) {
            seg.x0 += dx;
            seg.x1 += dx;
            seg.y += dy;
        }
    }
}

impl MusicObject for Extension {
    fn rect(&self) -> Rect {
        let rects: Vec<Rect> = self
            .segments
            .iter()
            .map(|s| Rect::new(s.x0, s.y - self.unit * 0.1, s.x1, s.y + self.unit * 0.1))
            .collect();
        union_all(&rects).unwrap_or_default()
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        for seg in &mut self.segments {
            seg.x0 += dx;
            seg.x1 += dx;
            seg.y += dy;
        }
    }

    fn hit(&self, x: f64, y: f64) -> bool {
        self.segments.iter().any(|s| {
            Rect::new(s.x0, s.y - self.unit * 0.5, s.x1, s.y + self.unit * 0.5).contains(x, y)
        })
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        let lw = r.line_width();
        let dash = self.unit * 0.6;
        let Some(s) = r.surface() else { return };
        for seg in &self.segments {
            let mut d = String::new();
            let mut x = seg.x0;
            while x < seg.x1 {
                let end = (x + dash).min(seg.x1);
                d.push_str(&format!("M{:.1},{:.1} L{:.1},{:.1} ", x, seg.y, end, seg.y));
                x += dash * 2.0;
            }
            if !d.is_empty() {
                s.path(d.trim_end(), "none", TEXT_COLOR, lw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecoded_image_is_empty_and_hidden() {
        let r = Renderer::headless(10.0);
        let mut a = Annotation::new(
            AnnotationId(0),
            MeasureId(0),
            AnnotationAnchor::MeasureStart(MeasureId(0)),
            Target::Staff(0),
            VerticalPos::Above,
            AnnotationKind::Image { src: "diagram.png".into(), size: None },
        );
        assert_eq!(a.size(&r, 100.0), (0.0, 0.0));
        a.set_rect(Rect::point(5.0, 5.0), 10.0);
        assert!(!a.is_visible());
    }

    #[test]
    fn vertical_pos_parsing() {
        assert_eq!("Below".parse::<VerticalPos>().unwrap(), VerticalPos::Below);
        assert!("left".parse::<VerticalPos>().unwrap_err().to_string().contains("left"));
    }
}
