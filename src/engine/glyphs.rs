//! Bar lines and signature glyphs (clef, key, time).

use serde::Serialize;

use super::staff::{position_y, StaffDef};
use super::MusicObject;
use crate::geometry::Rect;
use crate::renderer::constants::*;
use crate::renderer::{Renderer, TextAnchor};
use crate::theory::{Clef, KeySignature, TimeSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BarLineKind {
    Single,
    Double,
    Final,
    StartRepeat,
    EndRepeat,
}

impl BarLineKind {
    pub(crate) fn width(self, unit: f64) -> f64 {
        let gap = 0.4 * unit;
        match self {
            BarLineKind::Single => BARLINE_WIDTH * unit,
            BarLineKind::Double => 2.0 * BARLINE_WIDTH * unit + gap,
            BarLineKind::Final => (BARLINE_WIDTH + THICK_BARLINE_WIDTH) * unit + gap,
            BarLineKind::StartRepeat | BarLineKind::EndRepeat => {
                (BARLINE_WIDTH + THICK_BARLINE_WIDTH) * unit + gap + REPEAT_BARLINE_SPACE * unit
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjBarLine {
    pub kind: BarLineKind,
    /// Top and bottom line of every staff it crosses.
    spans: Vec<(f64, f64)>,
    rect: Rect,
    unit: f64,
}

impl ObjBarLine {
    pub(crate) fn new(kind: BarLineKind) -> Self {
        Self { kind, spans: Vec::new(), rect: Rect::default(), unit: 0.0 }
    }

    pub(crate) fn place(&mut self, left: f64, spans: Vec<(f64, f64)>, unit: f64) {
        let top = spans.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
        let bottom = spans.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
        self.rect = if spans.is_empty() {
            Rect::point(left, 0.0)
        } else {
            Rect::new(left, top, left + self.kind.width(unit), bottom)
        };
        self.spans = spans;
        self.unit = unit;
    }
}

impl MusicObject for ObjBarLine {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.rect.offset(dx, dy);
        for s in &mut self.spans {
            s.0 += dy;
            s.1 += dy;
        }
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        let unit = self.unit;
        let Some(s) = r.surface() else { return };
        let thin = BARLINE_WIDTH * unit;
        let thick = THICK_BARLINE_WIDTH * unit;
        let gap = 0.4 * unit;
        let dot = DOT_RADIUS * 1.4 * unit;
        let (l, rt) = (self.rect.left, self.rect.right);

        for &(top, bottom) in &self.spans {
            let mid = (top + bottom) / 2.0;
            let mut vline = |x: f64, w: f64| s.line(x, top, x, bottom, BARLINE_COLOR, w);
            match self.kind {
                BarLineKind::Single => vline(l + thin / 2.0, thin),
                BarLineKind::Double => {
                    vline(l + thin / 2.0, thin);
                    vline(rt - thin / 2.0, thin);
                }
                BarLineKind::Final => {
                    vline(l + thin / 2.0, thin);
                    vline(rt - thick / 2.0, thick);
                }
                BarLineKind::StartRepeat => {
                    vline(l + thick / 2.0, thick);
                    vline(l + thick + gap + thin / 2.0, thin);
                }
                BarLineKind::EndRepeat => {
                    vline(rt - thick / 2.0, thick);
                    vline(rt - thick - gap - thin / 2.0, thin);
                }
            }
            let dot_x = match self.kind {
                BarLineKind::StartRepeat => Some(rt - REPEAT_BARLINE_SPACE * unit / 2.0),
                BarLineKind::EndRepeat => Some(l + REPEAT_BARLINE_SPACE * unit / 2.0),
                _ => None,
            };
            if let Some(x) = dot_x {
                s.ellipse(x, mid - unit / 2.0, dot, dot, true, BARLINE_COLOR, 0.0);
                s.ellipse(x, mid + unit / 2.0, dot, dot, true, BARLINE_COLOR, 0.0);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureGlyph {
    Clef(Clef),
    Tab,
    Key(KeySignature, Clef),
    Time(TimeSignature),
}

/// A clef, key or time signature drawn on one staff.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjSignature {
    pub staff: usize,
    pub glyph: SignatureGlyph,
    local: Rect,
    rect: Rect,
    unit: f64,
}

impl ObjSignature {
    pub(crate) fn new(staff: usize, glyph: SignatureGlyph) -> Self {
        Self { staff, glyph, local: Rect::default(), rect: Rect::default(), unit: 0.0 }
    }

    /// Local shape: x from 0, y relative to the staff top.
    pub(crate) fn layout(&mut self, staff: &StaffDef, unit: f64) {
        let h = staff.height(unit);
        self.unit = unit;
        self.local = match &self.glyph {
            SignatureGlyph::Clef(_) => Rect::new(0.0, -unit, CLEF_WIDTH * unit, h + unit),
            SignatureGlyph::Tab => Rect::new(0.0, 0.0, CLEF_WIDTH * unit, h),
            SignatureGlyph::Key(key, clef) => {
                let positions = key.staff_positions(*clef);
                if positions.is_empty() {
                    Rect::new(0.0, 0.0, 0.0, h)
                } else {
                    let top = positions.iter().map(|p| position_y(p.0, unit)).fold(f64::INFINITY, f64::min);
                    let bottom = positions.iter().map(|p| position_y(p.0, unit)).fold(f64::NEG_INFINITY, f64::max);
                    let half = ACCIDENTAL_HEIGHT * unit / 2.0;
                    Rect::new(0.0, top - half, positions.len() as f64 * KEY_ACCIDENTAL_WIDTH * unit, bottom + half)
                }
            }
            SignatureGlyph::Time(_) => Rect::new(0.0, 0.0, TIME_SIG_WIDTH * unit, h),
        };
    }

    pub(crate) fn width(&self) -> f64 {
        self.local.width()
    }

    pub(crate) fn local_rect(&self) -> Rect {
        self.local
    }

    pub(crate) fn place(&mut self, x: f64, staff_top: f64) {
        self.rect = self.local.translated(x, staff_top);
    }
}

impl MusicObject for ObjSignature {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        let unit = self.unit;
        let rect = self.rect;
        r.draw_debug_rect(&rect);
        let Some(s) = r.surface() else { return };
        match &self.glyph {
            SignatureGlyph::Clef(clef) => {
                s.text(rect.center_x(), rect.center_y(), clef.glyph(), rect.height(), NOTE_COLOR, TextAnchor::Middle);
            }
            SignatureGlyph::Tab => {
                let step = rect.height() / 4.0;
                for (i, c) in ["T", "A", "B"].iter().enumerate() {
                    let y = rect.top + step * (i as f64 + 1.0);
                    s.text(rect.center_x(), y, c, step * 1.1, NOTE_COLOR, TextAnchor::Middle);
                }
            }
            SignatureGlyph::Key(key, clef) => {
                // Staff top sits above the first accidental's band.
                let positions = key.staff_positions(*clef);
                let first_y = positions.iter().map(|p| position_y(p.0, unit)).fold(f64::INFINITY, f64::min);
                let staff_top = rect.top + ACCIDENTAL_HEIGHT * unit / 2.0 - first_y;
                for (i, (pos, acc)) in positions.iter().enumerate() {
                    let x = rect.left + (i as f64 + 0.5) * KEY_ACCIDENTAL_WIDTH * unit;
                    s.text(x, staff_top + position_y(*pos, unit), acc.glyph(), ACCIDENTAL_HEIGHT * unit, NOTE_COLOR, TextAnchor::Middle);
                }
            }
            SignatureGlyph::Time(ts) => {
                let size = rect.height() / 2.0;
                let cx = rect.center_x();
                s.text(cx, rect.top + size / 2.0, &ts.beats.to_string(), size * 1.1, NOTE_COLOR, TextAnchor::Middle);
                s.text(cx, rect.bottom - size / 2.0, &ts.beat_type.to_string(), size * 1.1, NOTE_COLOR, TextAnchor::Middle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaffConfig, StaffKind};

    #[test]
    fn key_signature_width_grows_with_accidentals() {
        let staff = StaffDef::from_config(&StaffConfig::new("s", StaffKind::Treble, &[0])).unwrap();
        let mut none = ObjSignature::new(0, SignatureGlyph::Key(KeySignature::default(), Clef::Treble));
        none.layout(&staff, 10.0);
        assert_eq!(none.width(), 0.0);
        let mut three = ObjSignature::new(0, SignatureGlyph::Key("A".parse().unwrap(), Clef::Treble));
        three.layout(&staff, 10.0);
        assert_eq!(three.width(), 30.0);
    }

    #[test]
    fn bar_line_spans_staves() {
        let mut bar = ObjBarLine::new(BarLineKind::Final);
        bar.place(100.0, vec![(0.0, 40.0), (70.0, 110.0)], 10.0);
        assert_eq!(bar.rect().top, 0.0);
        assert_eq!(bar.rect().bottom, 110.0);
        bar.offset(0.0, 10.0);
        assert_eq!(bar.spans[1], (80.0, 120.0));
    }
}
