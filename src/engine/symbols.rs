//! Rhythm symbols: note groups (one note or a chord sharing a stem) and
//! rests, together with their accidentals, arpeggio, dots, flags and
//! ledger lines.
//!
//! Geometry is kept twice. The local shape is relative to the column
//! anchor (x) and the staff's top line (y) and only changes when the
//! owning measure is laid out again. The placed rect is rebuilt from the
//! local shape on every pass, so repeated layout never accumulates
//! offsets.

use serde::Serialize;

use super::staff::{position_y, StaffDef};
use super::{BeamId, ColumnId, MeasureId, MusicObject, SymbolId};
use crate::geometry::{union_all, Rect};
use crate::renderer::constants::*;
use crate::renderer::{Renderer, TextAnchor};
use crate::theory::{Accidental, Note, NoteLength, Rhythm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum StemDir {
    #[default]
    Auto,
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct NoteHead {
    pub note: Note,
    /// Staff position, steps above the bottom line.
    pub position: i32,
    /// Accidental actually drawn, decided per measure.
    pub shown_accidental: Option<Accidental>,
    /// Pushed to the other side of the stem (chord seconds).
    pub displaced: bool,
    /// Preferred tab string, 0 = highest.
    pub string: Option<usize>,
    /// Tab placement (string, fret).
    pub fret: Option<(usize, i32)>,
}

impl NoteHead {
    pub(crate) fn new(note: Note) -> Self {
        Self {
            note,
            position: 0,
            shown_accidental: None,
            displaced: false,
            string: None,
            fret: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    NoteGroup {
        heads: Vec<NoteHead>,
        stem: StemDir,
        arpeggio: bool,
    },
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjAccidental {
    pub accidental: Accidental,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjArpeggio {
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Stem {
    x: f64,
    base: f64,
    tip: f64,
}

/// Shape relative to the column anchor and staff top.
#[derive(Debug, Clone, Default)]
struct LocalShape {
    heads: Vec<Rect>,
    accidentals: Vec<ObjAccidental>,
    arpeggio: Option<ObjArpeggio>,
    stem: Option<Stem>,
    flags: u8,
    dots: Vec<(f64, f64)>,
    ledgers: Vec<(f64, f64, f64)>,
    frets: Vec<(String, Rect)>,
    rest: Option<Rect>,
    /// Everything except the stem and flags.
    body: Rect,
    unit: f64,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub measure: MeasureId,
    pub column: ColumnId,
    pub voice: usize,
    pub staff: usize,
    pub rhythm: Rhythm,
    /// Offset from the start of the measure.
    pub tick: u32,
    pub kind: SymbolKind,
    pub(crate) stem_up: bool,
    pub(crate) beam: Option<BeamId>,
    /// Vertical shift for rests sharing a staff with other voices.
    pub(crate) rest_shift: i32,
    local: LocalShape,
    origin: (f64, f64),
    stem_tip: Option<f64>,
    rect: Rect,
}

impl Symbol {
    pub(crate) fn new(
        id: SymbolId,
        measure: MeasureId,
        column: ColumnId,
        voice: usize,
        staff: usize,
        rhythm: Rhythm,
        tick: u32,
        kind: SymbolKind,
    ) -> Self {
        Self {
            id,
            measure,
            column,
            voice,
            staff,
            rhythm,
            tick,
            kind,
            stem_up: true,
            beam: None,
            rest_shift: 0,
            local: LocalShape::default(),
            origin: (0.0, 0.0),
            stem_tip: None,
            rect: Rect::default(),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, SymbolKind::Rest)
    }

    pub fn heads(&self) -> &[NoteHead] {
        match &self.kind {
            SymbolKind::NoteGroup { heads, .. } => heads,
            SymbolKind::Rest => &[],
        }
    }

    pub(crate) fn heads_mut(&mut self) -> &mut [NoteHead] {
        match &mut self.kind {
            SymbolKind::NoteGroup { heads, .. } => heads,
            SymbolKind::Rest => &mut [],
        }
    }

    pub fn duration(&self) -> u32 {
        self.rhythm.ticks()
    }

    pub fn stem_up(&self) -> bool {
        self.stem_up
    }

    pub fn beam(&self) -> Option<BeamId> {
        self.beam
    }

    pub(crate) fn explicit_stem(&self) -> StemDir {
        match &self.kind {
            SymbolKind::NoteGroup { stem, .. } => *stem,
            SymbolKind::Rest => StemDir::Auto,
        }
    }

    /// Can take part in a beam: a stemmed, flagged note group.
    pub(crate) fn is_beamable(&self) -> bool {
        !self.is_rest() && self.rhythm.flag_count() > 0
    }

    /// Average staff position of the heads, for stem direction.
    pub(crate) fn mean_position(&self) -> f64 {
        let heads = self.heads();
        if heads.is_empty() {
            return 4.0;
        }
        heads.iter().map(|h| h.position as f64).sum::<f64>() / heads.len() as f64
    }

    /// Compute the local shape for the owning staff.
    pub(crate) fn layout_local(&mut self, staff: &StaffDef, unit: f64) {
        self.local = if self.is_rest() {
            self.rest_shape(staff, unit)
        } else if staff.is_tab() {
            self.tab_shape(staff, unit)
        } else {
            self.note_shape(unit)
        };
        self.local.unit = unit;
    }

    fn note_shape(&mut self, unit: f64) -> LocalShape {
        let stem_up = self.stem_up;
        let length = self.rhythm.length;
        let dots = self.rhythm.dots;
        let beamed = self.beam.is_some();
        let (heads, arpeggio) = match &mut self.kind {
            SymbolKind::NoteGroup { heads, arpeggio, .. } => (heads, *arpeggio),
            SymbolKind::Rest => return LocalShape::default(),
        };
        let nw = NOTEHEAD_WIDTH * unit;
        let half = NOTEHEAD_HEIGHT * unit / 2.0;

        // Seconds alternate sides of the stem, starting from the stem end
        // of the chord opposite the tip.
        for h in heads.iter_mut() {
            h.displaced = false;
        }
        let order: Vec<usize> = if stem_up {
            (0..heads.len()).collect()
        } else {
            (0..heads.len()).rev().collect()
        };
        for w in 1..order.len() {
            let (prev, cur) = (order[w - 1], order[w]);
            if (heads[cur].position - heads[prev].position).abs() == 1 && !heads[prev].displaced {
                heads[cur].displaced = true;
            }
        }

        let mut shape = LocalShape::default();
        for h in heads.iter() {
            let y = position_y(h.position, unit);
            let x = match (h.displaced, stem_up) {
                (false, _) => 0.0,
                (true, true) => nw,
                (true, false) => -nw,
            };
            shape.heads.push(Rect::new(x, y - half, x + nw, y + half));
        }
        let heads_rect = union_all(&shape.heads).unwrap_or_default();

        // Ledger lines.
        let lowest = heads.iter().map(|h| h.position).min().unwrap_or(0);
        let highest = heads.iter().map(|h| h.position).max().unwrap_or(0);
        let lx0 = heads_rect.left - LEDGER_EXTEND * unit;
        let lx1 = heads_rect.right + LEDGER_EXTEND * unit;
        let mut p = -2;
        while p >= lowest {
            shape.ledgers.push((lx0, lx1, position_y(p, unit)));
            p -= 2;
        }
        let mut p = 10;
        while p <= highest {
            shape.ledgers.push((lx0, lx1, position_y(p, unit)));
            p += 2;
        }

        // Dots sit in a space: heads on a line move their dot up.
        let dot_x0 = heads_rect.right + DOT_GAP * unit;
        for h in heads.iter() {
            let pos = if h.position % 2 == 0 { h.position + 1 } else { h.position };
            for d in 0..dots {
                shape.dots.push((dot_x0 + d as f64 * DOT_SPACING * unit, position_y(pos, unit)));
            }
        }

        // Accidentals, top down, stepping left while they collide.
        let acc_w = ACCIDENTAL_WIDTH * unit;
        let acc_h = ACCIDENTAL_HEIGHT * unit;
        let acc_right = heads_rect.left - ACCIDENTAL_GAP * unit;
        for (i, h) in heads.iter().enumerate().rev() {
            let Some(acc) = h.shown_accidental else { continue };
            let cy = shape.heads[i].center_y();
            let mut col = 0;
            let rect = loop {
                let right = acc_right - col as f64 * (acc_w + ACCIDENTAL_GAP * unit);
                let r = Rect::new(right - acc_w, cy - acc_h / 2.0, right, cy + acc_h / 2.0);
                if shape.accidentals.iter().any(|a| a.rect.overlaps(&r)) {
                    col += 1;
                } else {
                    break r;
                }
            };
            shape.accidentals.push(ObjAccidental { accidental: acc, rect });
        }

        if arpeggio {
            let left_edge = shape
                .accidentals
                .iter()
                .map(|a| a.rect.left)
                .fold(heads_rect.left, f64::min);
            let right = left_edge - ACCIDENTAL_GAP * unit;
            shape.arpeggio = Some(ObjArpeggio {
                rect: Rect::new(right - ARPEGGIO_WIDTH * unit, heads_rect.top - half, right, heads_rect.bottom + half),
            });
        }

        if length.has_stem() {
            let middle = position_y(4, unit);
            let (x, base, tip) = if stem_up {
                let top = heads_rect.top + half;
                (nw, heads_rect.bottom - half, (top - STEM_LENGTH * unit).min(middle))
            } else {
                let bottom = heads_rect.bottom - half;
                (0.0, heads_rect.top + half, (bottom + STEM_LENGTH * unit).max(middle))
            };
            shape.stem = Some(Stem { x, base, tip });
            if !beamed {
                shape.flags = length.flag_count();
            }
        }

        let mut body = heads_rect;
        for (x0, x1, y) in &shape.ledgers {
            body.expand(&Rect::new(*x0, *y, *x1, *y));
        }
        for (x, y) in &shape.dots {
            body.expand(&Rect::new(x - DOT_RADIUS * unit, y - DOT_RADIUS * unit, x + DOT_RADIUS * unit, y + DOT_RADIUS * unit));
        }
        for a in &shape.accidentals {
            body.expand(&a.rect);
        }
        if let Some(a) = &shape.arpeggio {
            body.expand(&a.rect);
        }
        shape.body = body;
        shape
    }

    fn tab_shape(&mut self, staff: &StaffDef, unit: f64) -> LocalShape {
        let mut shape = LocalShape::default();
        let Some(tuning) = &staff.tuning else { return shape };
        let heads = self.heads_mut();
        let notes: Vec<Note> = heads.iter().map(|h| h.note).collect();
        let preferred: Vec<Option<usize>> = heads.iter().map(|h| h.string).collect();
        let frets = tuning.assign_frets(&notes, &preferred);
        for (h, f) in heads.iter_mut().zip(frets) {
            h.fret = f;
            let Some((string, fret)) = f else {
                tracing::debug!(note = %h.note, tuning = %tuning.name, "note not playable on tab staff");
                continue;
            };
            let text = fret.to_string();
            let w = text.len() as f64 * FRET_DIGIT_WIDTH * unit;
            let y = staff.line_y(string, unit);
            let h2 = FRET_HEIGHT * unit / 2.0;
            shape.frets.push((text, Rect::new(0.0, y - h2, w, y + h2)));
        }
        let rects: Vec<Rect> = shape.frets.iter().map(|(_, r)| *r).collect();
        shape.body = union_all(&rects).unwrap_or_else(|| Rect::point(0.0, staff.height(unit) / 2.0));
        shape
    }

    fn rest_shape(&self, staff: &StaffDef, unit: f64) -> LocalShape {
        let mut shape = LocalShape::default();
        let cy = staff.height(unit) / 2.0 + self.rest_shift as f64 * unit / 2.0;
        let (w, h) = match self.rhythm.length {
            NoteLength::Whole | NoteLength::Half => (1.2, 0.5),
            NoteLength::Quarter => (1.0, 3.0),
            NoteLength::Eighth => (1.0, 2.0),
            _ => (1.2, 3.0),
        };
        let rect = Rect::new(0.0, cy - h * unit / 2.0, w * unit, cy + h * unit / 2.0);
        shape.rest = Some(rect);
        let mut body = rect;
        for d in 0..self.rhythm.dots {
            let x = rect.right + DOT_GAP * unit + d as f64 * DOT_SPACING * unit;
            shape.dots.push((x, cy - unit / 2.0));
            body.expand(&Rect::new(x, cy - unit / 2.0, x + DOT_RADIUS * 2.0 * unit, cy));
        }
        shape.body = body;
        shape
    }

    /// Local extent, relative to column anchor and staff top.
    pub(crate) fn local_bounds(&self) -> Rect {
        let mut r = self.local.body;
        if let Some(stem) = &self.local.stem {
            r.expand(&Rect::new(stem.x, stem.base.min(stem.tip), stem.x, stem.base.max(stem.tip)));
        }
        r
    }

    /// Move the symbol to its column anchor and staff top.
    pub(crate) fn place(&mut self, anchor_x: f64, staff_top: f64) {
        self.origin = (anchor_x, staff_top);
        self.stem_tip = None;
        self.refresh_rect();
    }

    /// Override the stem tip (absolute y), used by beams.
    pub(crate) fn set_stem_tip(&mut self, y: f64) {
        if self.local.stem.is_some() {
            self.stem_tip = Some(y);
            self.refresh_rect();
        }
    }

    fn refresh_rect(&mut self) {
        let (ox, oy) = self.origin;
        let mut r = self.local.body.translated(ox, oy);
        if let Some((x, base, tip)) = self.stem_line() {
            r.expand(&Rect::new(x, base.min(tip), x, base.max(tip)));
            if self.local.flags > 0 {
                r.expand(&Rect::new(x, tip, x + FLAG_WIDTH * self.local.unit, tip));
            }
        }
        self.rect = r;
    }

    /// Placed stem as (x, base y, tip y).
    pub(crate) fn stem_line(&self) -> Option<(f64, f64, f64)> {
        let (ox, oy) = self.origin;
        self.local.stem.map(|s| (ox + s.x, oy + s.base, self.stem_tip.unwrap_or(oy + s.tip)))
    }

    /// Placed rect of one note head.
    pub fn head_rect(&self, index: usize) -> Option<Rect> {
        let (ox, oy) = self.origin;
        self.local.heads.get(index).map(|r| r.translated(ox, oy))
    }

    /// Placed rect of a tab fret number, or of the head on notation staves.
    pub(crate) fn anchor_rect(&self, index: usize) -> Option<Rect> {
        if let Some(r) = self.head_rect(index) {
            return Some(r);
        }
        let (ox, oy) = self.origin;
        self.heads().get(index)?.fret?;
        let pos = self.heads()[..index].iter().filter(|h| h.fret.is_some()).count();
        self.local.frets.get(pos).map(|(_, r)| r.translated(ox, oy))
    }

    pub fn accidentals(&self) -> &[ObjAccidental] {
        &self.local.accidentals
    }

    pub fn arpeggio(&self) -> Option<&ObjArpeggio> {
        self.local.arpeggio.as_ref()
    }
}

impl MusicObject for Symbol {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.origin.0 += dx;
        self.origin.1 += dy;
        if let Some(t) = self.stem_tip.as_mut() {
            *t += dy;
        }
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        let unit = r.unit_size();
        let lw = r.line_width();
        let (ox, oy) = self.origin;
        let shape = &self.local;
        r.draw_debug_rect(&self.rect);
        let Some(s) = r.surface() else { return };

        if let Some(rest) = &shape.rest {
            let glyph = match self.rhythm.length {
                NoteLength::Whole => "\u{1D13B}",
                NoteLength::Half => "\u{1D13C}",
                NoteLength::Quarter => "\u{1D13D}",
                NoteLength::Eighth => "\u{1D13E}",
                NoteLength::Sixteenth => "\u{1D13F}",
                NoteLength::ThirtySecond => "\u{1D140}",
                NoteLength::SixtyFourth => "\u{1D141}",
            };
            let rr = rest.translated(ox, oy);
            s.text(rr.center_x(), rr.center_y(), glyph, 3.0 * unit, REST_COLOR, TextAnchor::Middle);
        }

        for (x0, x1, y) in &shape.ledgers {
            s.line(ox + x0, oy + y, ox + x1, oy + y, STAFF_COLOR, lw);
        }

        let filled = self.rhythm.length.is_filled();
        for h in &shape.heads {
            let h = h.translated(ox, oy);
            s.ellipse(h.center_x(), h.center_y(), h.width() / 2.0, h.height() / 2.0, filled, NOTE_COLOR, lw * 1.5);
        }

        for (text, rect) in &shape.frets {
            let rr = rect.translated(ox, oy);
            s.rect(rr.left, rr.top, rr.width(), rr.height(), "white", "none", 0.0);
            s.text(rr.center_x(), rr.center_y(), text, FRET_HEIGHT * unit, NOTE_COLOR, TextAnchor::Middle);
        }

        for (x, y) in &shape.dots {
            let rad = DOT_RADIUS * unit;
            s.ellipse(ox + x, oy + y, rad, rad, true, NOTE_COLOR, 0.0);
        }

        for a in &shape.accidentals {
            let ar = a.rect.translated(ox, oy);
            s.text(ar.center_x(), ar.center_y(), a.accidental.glyph(), ACCIDENTAL_HEIGHT * unit, NOTE_COLOR, TextAnchor::Middle);
        }

        if let Some(arp) = &shape.arpeggio {
            let ar = arp.rect.translated(ox, oy);
            let step = unit / 2.0;
            let mut d = format!("M{:.1},{:.1}", ar.center_x(), ar.bottom);
            let mut y = ar.bottom;
            let mut left = true;
            while y - step >= ar.top {
                let x = if left { ar.left } else { ar.right };
                d.push_str(&format!(" Q{:.1},{:.1} {:.1},{:.1}", x, y - step / 2.0, ar.center_x(), y - step));
                y -= step;
                left = !left;
            }
            s.path(&d, "none", NOTE_COLOR, lw);
        }

        if let Some(stem) = &shape.stem {
            let x = ox + stem.x;
            let base = oy + stem.base;
            let tip = self.stem_tip.unwrap_or(oy + stem.tip);
            s.line(x, base, x, tip, NOTE_COLOR, STEM_WIDTH * unit);

            let dir = if self.stem_up { 1.0 } else { -1.0 };
            for f in 0..shape.flags {
                let fy = tip + dir * f as f64 * BEAM_SPACING * unit;
                let d = format!(
                    "M{:.1},{:.1} c{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}",
                    x,
                    fy,
                    0.3 * FLAG_WIDTH * unit,
                    dir * 0.8 * unit,
                    FLAG_WIDTH * unit,
                    dir * 1.2 * unit,
                    0.6 * FLAG_WIDTH * unit,
                    dir * 2.6 * unit
                );
                s.path(&d, "none", NOTE_COLOR, STEM_WIDTH * unit * 1.5);
            }
        }
    }
}
