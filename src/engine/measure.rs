//! Measures and rhythm columns.
//!
//! A measure holds one column per distinct tick offset; a column holds at
//! most one symbol per voice. Local layout packs the columns at their
//! minimum widths; placement stretches them into the width the row hands
//! out.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::glyphs::{BarLineKind, ObjBarLine, ObjSignature, SignatureGlyph};
use super::staff::StaffDef;
use super::symbols::Symbol;
use super::{AnnotationId, ArcId, BeamId, ColumnId, MeasureId, MusicObject, RowId, SymbolId};
use crate::config::MAX_VOICES;
use crate::error::{Result, ScoreError};
use crate::geometry::Rect;
use crate::renderer::constants::*;
use crate::renderer::Renderer;
use crate::theory::{Accidental, KeySignature, Tempo, TimeSignature, TICKS_PER_WHOLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeasureEnd {
    /// Next measure starts a new row.
    Row,
    /// Double bar line.
    Section,
    /// Final bar line; also ends the row.
    Song,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Navigation {
    StartRepeat,
    EndRepeat { times: u8 },
    /// Volta bracket over the measure, listing the passes it plays on.
    Ending(Vec<u8>),
    Segno,
    Coda,
    ToCoda,
    Fine,
    DaCapo,
    DaCapoAlFine,
    DaCapoAlCoda,
    DalSegno,
    DalSegnoAlFine,
    DalSegnoAlCoda,
}

impl Navigation {
    /// Text drawn above the staff, if any.
    pub fn text(&self) -> Option<String> {
        let s = match self {
            Navigation::StartRepeat | Navigation::Ending(_) => return None,
            Navigation::EndRepeat { times } if *times > 2 => return Some(format!("{times}x")),
            Navigation::EndRepeat { .. } => return None,
            Navigation::Segno => "\u{1D10B}",
            Navigation::Coda => "\u{1D10C}",
            Navigation::ToCoda => "To Coda",
            Navigation::Fine => "Fine",
            Navigation::DaCapo => "D.C.",
            Navigation::DaCapoAlFine => "D.C. al Fine",
            Navigation::DaCapoAlCoda => "D.C. al Coda",
            Navigation::DalSegno => "D.S.",
            Navigation::DalSegnoAlFine => "D.S. al Fine",
            Navigation::DalSegnoAlCoda => "D.S. al Coda",
        };
        Some(s.to_string())
    }

    /// Marks read at the end of the measure are right-aligned there.
    pub(crate) fn at_measure_end(&self) -> bool {
        !matches!(self, Navigation::StartRepeat | Navigation::Ending(_) | Navigation::Segno | Navigation::Coda)
    }
}

impl FromStr for Navigation {
    type Err = ScoreError;

    /// `start-repeat`, `end-repeat`, `end-repeat:3`, `ending:1,2`, `segno`,
    /// `coda`, `to-coda`, `fine`, `dc`, `dc-al-fine`, `dc-al-coda`, `ds`,
    /// `ds-al-fine`, `ds-al-coda`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScoreError::invalid("navigation", s);
        let lower = s.trim().to_ascii_lowercase();
        let (name, arg) = match lower.split_once(':') {
            Some((n, a)) => (n.to_string(), Some(a.to_string())),
            None => (lower.clone(), None),
        };
        let nav = match (name.as_str(), arg) {
            ("start-repeat", None) => Navigation::StartRepeat,
            ("end-repeat", None) => Navigation::EndRepeat { times: 2 },
            ("end-repeat", Some(n)) => {
                let times: u8 = n.trim().parse().map_err(|_| invalid())?;
                if times < 2 {
                    return Err(invalid());
                }
                Navigation::EndRepeat { times }
            }
            ("ending", Some(list)) => {
                let passes = list
                    .split(',')
                    .map(|p| p.trim().parse::<u8>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>>>()?;
                if passes.is_empty() || passes.contains(&0) {
                    return Err(invalid());
                }
                Navigation::Ending(passes)
            }
            ("segno", None) => Navigation::Segno,
            ("coda", None) => Navigation::Coda,
            ("to-coda", None) => Navigation::ToCoda,
            ("fine", None) => Navigation::Fine,
            ("dc", None) => Navigation::DaCapo,
            ("dc-al-fine", None) => Navigation::DaCapoAlFine,
            ("dc-al-coda", None) => Navigation::DaCapoAlCoda,
            ("ds", None) => Navigation::DalSegno,
            ("ds-al-fine", None) => Navigation::DalSegnoAlFine,
            ("ds-al-coda", None) => Navigation::DalSegnoAlCoda,
            _ => return Err(invalid()),
        };
        Ok(nav)
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Navigation::Ending(passes) => {
                let list: Vec<String> = passes.iter().map(|p| format!("{p}.")).collect();
                write!(f, "{}", list.join(" "))
            }
            Navigation::StartRepeat => f.write_str("|:"),
            Navigation::EndRepeat { .. } => f.write_str(":|"),
            other => write!(f, "{}", other.text().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RhythmColumn {
    pub id: ColumnId,
    pub measure: MeasureId,
    pub tick: u32,
    pub(crate) symbols: [Option<SymbolId>; MAX_VOICES],
    pub(crate) needs_layout: bool,
    local_left: f64,
    local_right: f64,
    min_width: f64,
    x: f64,
    width: f64,
    rect: Rect,
}

impl RhythmColumn {
    pub(crate) fn new(id: ColumnId, measure: MeasureId, tick: u32) -> Self {
        Self {
            id,
            measure,
            tick,
            symbols: [None; MAX_VOICES],
            needs_layout: true,
            local_left: 0.0,
            local_right: 0.0,
            min_width: 0.0,
            x: 0.0,
            width: 0.0,
            rect: Rect::default(),
        }
    }

    pub fn symbol(&self, voice: usize) -> Option<SymbolId> {
        self.symbols.get(voice).copied().flatten()
    }

    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols.iter().flatten().copied()
    }

    pub fn min_width(&self) -> f64 {
        self.min_width
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// x where note heads of this column start.
    pub fn anchor_x(&self) -> f64 {
        self.x - self.local_left
    }
}

impl MusicObject for RhythmColumn {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        r.draw_debug_rect(&self.rect);
    }
}

#[derive(Debug, Clone, Default)]
struct MeasureLocal {
    left_inset: f64,
    right_inset: f64,
    key_width: f64,
    min_width: f64,
    /// Content extent per staff, relative to the staff top.
    staff_extents: Vec<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct Measure {
    pub id: MeasureId,
    pub row: RowId,
    pub(crate) columns: Vec<ColumnId>,
    pub(crate) voice_ticks: [u32; MAX_VOICES],
    /// Voice of the most recently appended symbol.
    pub(crate) last_voice: usize,
    pub(crate) last_column: Option<ColumnId>,
    pub(crate) key: Option<KeySignature>,
    pub(crate) time: Option<TimeSignature>,
    pub(crate) tempo: Option<Tempo>,
    /// Text annotation showing the explicit tempo.
    pub(crate) tempo_mark: Option<AnnotationId>,
    pub(crate) resolved_key: KeySignature,
    pub(crate) resolved_time: TimeSignature,
    pub(crate) resolved_tempo: Tempo,
    pub(crate) show_key: bool,
    pub(crate) show_time: bool,
    pub(crate) row_start: bool,
    pub(crate) navigation: Vec<Navigation>,
    pub(crate) end: Option<MeasureEnd>,
    /// Arcs whose fragments this measure draws.
    pub(crate) arcs: Vec<ArcId>,
    pub(crate) beams: Vec<BeamId>,
    pub(crate) needs_layout: bool,
    signatures: Vec<ObjSignature>,
    start_bar: Option<ObjBarLine>,
    end_bar: ObjBarLine,
    local: MeasureLocal,
    x: f64,
    width: f64,
    rect: Rect,
}

impl Measure {
    pub(crate) fn new(id: MeasureId, row: RowId) -> Self {
        Self {
            id,
            row,
            columns: Vec::new(),
            voice_ticks: [0; MAX_VOICES],
            last_voice: 0,
            last_column: None,
            key: None,
            time: None,
            tempo: None,
            tempo_mark: None,
            resolved_key: KeySignature::default(),
            resolved_time: TimeSignature::default(),
            resolved_tempo: Tempo::default(),
            show_key: false,
            show_time: false,
            row_start: false,
            navigation: Vec::new(),
            end: None,
            arcs: Vec::new(),
            beams: Vec::new(),
            needs_layout: true,
            signatures: Vec::new(),
            start_bar: None,
            end_bar: ObjBarLine::new(BarLineKind::Single),
            local: MeasureLocal::default(),
            x: 0.0,
            width: 0.0,
            rect: Rect::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.id.0
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    pub fn key_signature(&self) -> KeySignature {
        self.resolved_key
    }

    pub fn time_signature(&self) -> &TimeSignature {
        &self.resolved_time
    }

    pub fn tempo(&self) -> Tempo {
        self.resolved_tempo
    }

    pub fn navigation(&self) -> &[Navigation] {
        &self.navigation
    }

    pub fn end(&self) -> Option<MeasureEnd> {
        self.end
    }

    pub fn arcs(&self) -> &[ArcId] {
        &self.arcs
    }

    pub fn beams(&self) -> &[BeamId] {
        &self.beams
    }

    /// Ticks written in a voice so far.
    pub fn voice_ticks(&self, voice: usize) -> u32 {
        self.voice_ticks.get(voice).copied().unwrap_or(0)
    }

    /// Ticks of the longest voice, or zero for an empty measure.
    pub fn content_ticks(&self) -> u32 {
        self.voice_ticks.iter().copied().max().unwrap_or(0)
    }

    pub fn min_width(&self) -> f64 {
        self.local.min_width
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    /// Left edge of the column area, after start bar and signatures.
    pub fn content_left(&self) -> f64 {
        self.x + self.local.left_inset
    }

    pub fn content_right(&self) -> f64 {
        self.x + self.width - self.local.right_inset
    }

    pub fn signatures(&self) -> &[ObjSignature] {
        &self.signatures
    }

    pub fn end_bar(&self) -> &ObjBarLine {
        &self.end_bar
    }

    pub(crate) fn staff_extents(&self) -> &[(f64, f64)] {
        &self.local.staff_extents
    }

    pub(crate) fn key_width(&self) -> f64 {
        self.local.key_width
    }

    /// Show accidentals against the key signature, carried through the
    /// measure per staff and pitch.
    fn resolve_accidentals(&self, columns: &[RhythmColumn], symbols: &mut [Symbol], staves: &[StaffDef]) {
        let key = self.resolved_key;
        let mut carry: Vec<std::collections::HashMap<i32, i32>> = vec![Default::default(); staves.len()];
        for cid in &self.columns {
            for sid in columns[cid.0].symbols() {
                let sym = &mut symbols[sid.0];
                let staff = sym.staff;
                if staves.get(staff).map_or(true, StaffDef::is_tab) {
                    continue;
                }
                for head in sym.heads_mut() {
                    let diatonic = head.note.diatonic();
                    let current = carry[staff]
                        .get(&diatonic)
                        .copied()
                        .unwrap_or_else(|| key.alter_for(head.note.step));
                    let alter = head.note.alter();
                    head.shown_accidental = if alter != current {
                        Accidental::from_alter(alter)
                    } else {
                        None
                    };
                    carry[staff].insert(diatonic, alter);
                }
            }
        }
    }

    fn end_tick(&self) -> u32 {
        self.resolved_time.measure_ticks().max(self.content_ticks())
    }

    /// Lay out symbols, columns, signatures and bar lines relative to the
    /// measure origin and compute the minimum width.
    pub(crate) fn layout_local(
        &mut self,
        columns: &mut [RhythmColumn],
        symbols: &mut [Symbol],
        staves: &[StaffDef],
        unit: f64,
    ) {
        let _span = tracing::trace_span!("measure_layout", measure = self.id.0).entered();
        self.resolve_accidentals(columns, symbols, staves);

        let mut extents: Vec<(f64, f64)> = staves.iter().map(|s| (0.0, s.height(unit))).collect();
        let end_tick = self.end_tick();
        let mut content_width = 0.0;

        for (i, cid) in self.columns.iter().enumerate() {
            let next_tick = self
                .columns
                .get(i + 1)
                .map_or(end_tick, |n| columns[n.0].tick);
            let col = &mut columns[cid.0];
            let (mut left, mut right) = (0.0_f64, 0.0_f64);
            let mut shortest = u32::MAX;
            for sid in col.symbols.iter().flatten() {
                let sym = &mut symbols[sid.0];
                let Some(staff) = staves.get(sym.staff) else { continue };
                sym.layout_local(staff, unit);
                let b = sym.local_bounds();
                left = left.min(b.left);
                right = right.max(b.right);
                let e = &mut extents[sym.staff];
                e.0 = e.0.min(b.top);
                e.1 = e.1.max(b.bottom);
                shortest = shortest.min(sym.duration());
            }
            let gap = next_tick.saturating_sub(col.tick);
            let duration = if gap > 0 || shortest == u32::MAX { gap } else { shortest };
            let quarter = (TICKS_PER_WHOLE / 4) as f64;
            let spacing = COLUMN_QUARTER_SPACING * unit * (duration as f64 / quarter).powf(0.6);
            col.local_left = left;
            col.local_right = right;
            col.min_width = (right - left + COLUMN_MIN_SPACING * unit).max(spacing);
            col.needs_layout = false;
            content_width += col.min_width;
        }

        self.signatures.clear();
        if self.show_key {
            for (i, st) in staves.iter().enumerate() {
                if let Some(clef) = st.clef {
                    self.signatures.push(ObjSignature::new(i, SignatureGlyph::Key(self.resolved_key, clef)));
                }
            }
        }
        if self.show_time {
            for i in 0..staves.len() {
                self.signatures.push(ObjSignature::new(i, SignatureGlyph::Time(self.resolved_time.clone())));
            }
        }
        let (mut key_w, mut time_w) = (0.0_f64, 0.0_f64);
        for sig in &mut self.signatures {
            sig.layout(&staves[sig.staff], unit);
            match sig.glyph {
                SignatureGlyph::Time(_) => time_w = time_w.max(sig.width()),
                _ => key_w = key_w.max(sig.width()),
            }
            let r = sig.local_rect();
            let e = &mut extents[sig.staff];
            e.0 = e.0.min(r.top);
            e.1 = e.1.max(r.bottom);
        }
        if key_w > 0.0 {
            key_w += SIGNATURE_PAD * unit;
        }
        if time_w > 0.0 {
            time_w += SIGNATURE_PAD * unit;
        }

        self.start_bar = self
            .navigation
            .contains(&Navigation::StartRepeat)
            .then(|| ObjBarLine::new(BarLineKind::StartRepeat));
        let end_kind = if self.navigation.iter().any(|n| matches!(n, Navigation::EndRepeat { .. })) {
            BarLineKind::EndRepeat
        } else {
            match self.end {
                Some(MeasureEnd::Song) => BarLineKind::Final,
                Some(MeasureEnd::Section) => BarLineKind::Double,
                _ => BarLineKind::Single,
            }
        };
        self.end_bar = ObjBarLine::new(end_kind);

        let start_w = self.start_bar.as_ref().map_or(0.0, |b| b.kind.width(unit));
        self.local.key_width = key_w;
        self.local.left_inset = start_w + MEASURE_PAD_LEFT * unit + key_w + time_w;
        self.local.right_inset = MEASURE_PAD_RIGHT * unit + end_kind.width(unit);
        self.local.min_width = self.local.left_inset + content_width + self.local.right_inset;
        self.local.staff_extents = extents;
        self.needs_layout = false;
    }

    /// Place the measure at `x` with a stretched `width`, in row-local
    /// coordinates.
    pub(crate) fn place(
        &mut self,
        x: f64,
        width: f64,
        columns: &mut [RhythmColumn],
        symbols: &mut [Symbol],
        staff_tops: &[f64],
        staves: &[StaffDef],
        unit: f64,
    ) {
        self.x = x;
        self.width = width;
        let top = staff_tops.first().copied().unwrap_or(0.0);
        let bottom = staff_tops
            .iter()
            .zip(staves)
            .map(|(t, s)| t + s.height(unit))
            .fold(top, f64::max);
        let spans: Vec<(f64, f64)> = staff_tops.iter().zip(staves).map(|(t, s)| (*t, t + s.height(unit))).collect();

        let start_w = match &mut self.start_bar {
            Some(bar) => {
                bar.place(x, spans.clone(), unit);
                bar.kind.width(unit)
            }
            None => 0.0,
        };
        let sig_x = x + start_w + MEASURE_PAD_LEFT * unit;
        let key_w = self.local.key_width;
        for sig in &mut self.signatures {
            let sx = match sig.glyph {
                SignatureGlyph::Time(_) => sig_x + key_w,
                _ => sig_x,
            };
            sig.place(sx, staff_tops.get(sig.staff).copied().unwrap_or(top));
        }

        let min_content: f64 = self.columns.iter().map(|c| columns[c.0].min_width).sum();
        let extra = (width - self.local.min_width).max(0.0);
        let mut cx = x + self.local.left_inset;
        let mut rect = Rect::new(x, top, x + width, bottom);
        for cid in &self.columns {
            let col = &mut columns[cid.0];
            let share = if min_content > 0.0 { col.min_width / min_content } else { 0.0 };
            col.x = cx;
            col.width = col.min_width + extra * share;
            let anchor = col.anchor_x();
            for sid in col.symbols.iter().flatten() {
                let sym = &mut symbols[sid.0];
                sym.place(anchor, staff_tops.get(sym.staff).copied().unwrap_or(top));
                rect.expand(&sym.rect());
            }
            col.rect = Rect::new(cx, top, cx + col.width, bottom);
            cx += col.width;
        }
        // Without columns the slack lands before the end bar.
        let end_w = self.end_bar.kind.width(unit);
        self.end_bar.place(x + width - end_w, spans, unit);
        for sig in &self.signatures {
            rect.expand(&sig.rect());
        }
        self.rect = rect;
    }
}

impl MusicObject for Measure {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.rect.offset(dx, dy);
        for sig in &mut self.signatures {
            sig.offset(dx, dy);
        }
        if let Some(bar) = &mut self.start_bar {
            bar.offset(dx, dy);
        }
        self.end_bar.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        r.draw_debug_rect(&self.rect);
        for sig in &self.signatures {
            sig.draw(r);
        }
        if let Some(bar) = &self.start_bar {
            bar.draw(r);
        }
        self.end_bar.draw(r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_parsing() {
        assert_eq!("segno".parse::<Navigation>().unwrap(), Navigation::Segno);
        assert_eq!("End-Repeat:3".parse::<Navigation>().unwrap(), Navigation::EndRepeat { times: 3 });
        assert_eq!("ending:1,2".parse::<Navigation>().unwrap(), Navigation::Ending(vec![1, 2]));
        assert_eq!(Navigation::Ending(vec![1, 2]).to_string(), "1. 2.");
        assert_eq!(Navigation::DalSegnoAlCoda.text().as_deref(), Some("D.S. al Coda"));
        for bad in ["repeat", "ending:", "ending:0", "end-repeat:1", "segno:2"] {
            let err = bad.parse::<Navigation>().unwrap_err().to_string();
            assert!(err.contains("navigation"), "{bad}: {err}");
        }
    }

    #[test]
    fn navigation_placement() {
        assert!(Navigation::Fine.at_measure_end());
        assert!(!Navigation::Segno.at_measure_end());
    }
}
