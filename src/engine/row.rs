//! Rows: a horizontal band of measures sharing staff positions.

use std::collections::HashMap;

use super::annotations::VerticalPos;
use super::glyphs::{ObjSignature, SignatureGlyph};
use super::layout_groups::Bucket;
use super::staff::StaffDef;
use super::{MeasureId, MusicObject, RowId};
use crate::geometry::Rect;
use crate::renderer::constants::*;
use crate::renderer::Renderer;
use crate::theory::KeySignature;

#[derive(Debug, Clone)]
pub struct Row {
    pub id: RowId,
    pub(crate) measures: Vec<MeasureId>,
    pub(crate) needs_layout: bool,
    header: Vec<ObjSignature>,
    header_width: f64,
    staff_tops: Vec<f64>,
    staff_heights: Vec<f64>,
    staff_lines: Vec<(usize, f64)>,
    pub(crate) staff_buckets: HashMap<(usize, VerticalPos), Bucket>,
    width: f64,
    x: f64,
    rect: Rect,
}

impl Row {
    pub(crate) fn new(id: RowId) -> Self {
        Self {
            id,
            measures: Vec::new(),
            needs_layout: true,
            header: Vec::new(),
            header_width: 0.0,
            staff_tops: Vec::new(),
            staff_heights: Vec::new(),
            staff_lines: Vec::new(),
            staff_buckets: HashMap::new(),
            width: 0.0,
            x: 0.0,
            rect: Rect::default(),
        }
    }

    pub fn measures(&self) -> &[MeasureId] {
        &self.measures
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    /// y of each staff's top line.
    pub fn staff_tops(&self) -> &[f64] {
        &self.staff_tops
    }

    pub fn staff_top(&self, staff: usize) -> f64 {
        self.staff_tops.get(staff).copied().unwrap_or(0.0)
    }

    /// Staff lines of one staff across the whole row.
    pub fn staff_rect(&self, staff: usize) -> Option<Rect> {
        let top = *self.staff_tops.get(staff)?;
        let h = self.staff_heights.get(staff).copied().unwrap_or(0.0);
        Some(Rect::new(self.x, top, self.x + self.width, top + h))
    }

    pub fn header_width(&self) -> f64 {
        self.header_width
    }

    /// Stretched width of the row content, header included.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Where arcs crossing a row break are cut: after the header on the
    /// left, the row end on the right.
    pub fn arcs_content_rect(&self) -> Rect {
        let top = self.staff_tops.first().copied().unwrap_or(0.0);
        let bottom = self
            .staff_tops
            .iter()
            .zip(&self.staff_heights)
            .map(|(t, h)| t + h)
            .fold(top, f64::max);
        Rect::new(self.x + self.header_width, top, self.x + self.width, bottom)
    }

    pub(crate) fn clear_placements(&mut self) {
        self.staff_buckets.clear();
    }

    /// Clef and key signature opening each staff.
    pub(crate) fn layout_header(&mut self, key: KeySignature, staves: &[StaffDef], unit: f64) {
        self.header.clear();
        for (i, st) in staves.iter().enumerate() {
            match st.clef {
                Some(clef) => {
                    self.header.push(ObjSignature::new(i, SignatureGlyph::Clef(clef)));
                    self.header.push(ObjSignature::new(i, SignatureGlyph::Key(key, clef)));
                }
                None => self.header.push(ObjSignature::new(i, SignatureGlyph::Tab)),
            }
        }
        let mut key_w = 0.0_f64;
        for sig in &mut self.header {
            sig.layout(&staves[sig.staff], unit);
            if let SignatureGlyph::Key(..) = sig.glyph {
                key_w = key_w.max(sig.width());
            }
        }
        self.header_width = (CLEF_WIDTH + SIGNATURE_PAD) * unit + key_w;
        self.needs_layout = false;
    }

    /// Extent of the header glyphs per staff, relative to the staff top.
    pub(crate) fn header_extents(&self, staves: usize) -> Vec<(f64, f64)> {
        let mut out: Vec<(f64, f64)> = vec![(0.0, 0.0); staves];
        for sig in &self.header {
            let r = sig.local_rect();
            if let Some(e) = out.get_mut(sig.staff) {
                e.0 = e.0.min(r.top);
                e.1 = e.1.max(r.bottom);
            }
        }
        out
    }

    /// Stack staves from the top, each clearing the content of the one
    /// above it by the staff gap.
    pub(crate) fn layout_staves(&mut self, extents: &[(f64, f64)], staves: &[StaffDef], unit: f64) {
        self.staff_tops.clear();
        self.staff_heights.clear();
        self.staff_lines.clear();
        let mut cursor = 0.0;
        for (i, st) in staves.iter().enumerate() {
            let (above, below) = extents.get(i).copied().unwrap_or((0.0, st.height(unit)));
            let top = cursor + (-above).max(0.0);
            self.staff_tops.push(top);
            self.staff_heights.push(st.height(unit));
            self.staff_lines.push((st.line_count(), st.line_y(1, unit)));
            cursor = top + below.max(st.height(unit)) + STAFF_GAP * unit;
        }
    }

    /// Stretched width of every measure for a row of `target` width.
    /// Extra space is shared in proportion to the measures' minimums.
    pub(crate) fn measure_widths(&self, mins: &[f64], target: f64) -> Vec<f64> {
        let total: f64 = mins.iter().sum();
        let extra = (target - self.header_width - total).max(0.0);
        mins.iter()
            .map(|m| if total > 0.0 { m + extra * m / total } else { *m })
            .collect()
    }

    /// Row placed at the local origin with its final width.
    pub(crate) fn place(&mut self, width: f64, unit: f64) {
        self.x = 0.0;
        self.width = width;
        for sig in &mut self.header {
            let top = self.staff_tops.get(sig.staff).copied().unwrap_or(0.0);
            let sx = match sig.glyph {
                SignatureGlyph::Key(..) => CLEF_WIDTH * unit,
                _ => 0.0,
            };
            sig.place(sx, top);
        }
        let mut rect = self.arcs_content_rect();
        rect.left = self.x;
        for sig in &self.header {
            rect.expand(&sig.rect());
        }
        self.rect = rect;
    }

    pub(crate) fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    pub fn header(&self) -> &[ObjSignature] {
        &self.header
    }
}

impl MusicObject for Row {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        for t in &mut self.staff_tops {
            *t += dy;
        }
        for sig in &mut self.header {
            sig.offset(dx, dy);
        }
        for bucket in self.staff_buckets.values_mut() {
            bucket.offset(dx, dy);
        }
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        let unit = r.unit_size();
        r.draw_debug_rect(&self.rect);
        if let Some(s) = r.surface() {
            for (top, (lines, spacing)) in self.staff_tops.iter().zip(&self.staff_lines) {
                for i in 0..*lines {
                    let y = top + i as f64 * spacing;
                    s.line(self.x, y, self.x + self.width, y, STAFF_COLOR, STAFF_LINE_WIDTH * unit);
                }
            }
        }
        for sig in &self.header {
            sig.draw(r);
        }
    }
}
