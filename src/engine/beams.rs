//! Beam groups.
//!
//! Grouping is decided per voice and measure during the update pass from
//! the time signature's beam spans; geometry is laid out after rows are
//! stretched, when stem x positions are final.

use serde::Serialize;

use super::symbols::Symbol;
use super::{BeamId, MeasureId, MusicObject, SymbolId};
use crate::geometry::{union_all, Rect};
use crate::renderer::constants::*;
use crate::renderer::{Renderer, TextAnchor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BeamSegment {
    /// Beam joining notes `from..=to` at a level (1 = primary).
    Full { level: u8, from: usize, to: usize },
    /// Stub on a single note, pointing right or left.
    Partial { level: u8, at: usize, right: bool },
}

fn span_index(tick: u32, spans: &[u32]) -> usize {
    let mut start = 0;
    for (i, len) in spans.iter().enumerate() {
        if tick < start + len {
            return i;
        }
        start += len;
    }
    spans.len()
}

/// Split a voice into beam groups. `entries` are (tick, beam count) in
/// voice order; a zero beam count (rest, quarter or longer) breaks the
/// group, and so does crossing into the next beam span.
pub(crate) fn group_voice(entries: &[(u32, u8)], spans: &[u32]) -> Vec<Vec<usize>> {
    let mut groups = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_span = None;
    for (i, &(tick, beams)) in entries.iter().enumerate() {
        let span = span_index(tick, spans);
        if beams == 0 || current_span != Some(span) {
            if current.len() >= 2 {
                groups.push(std::mem::take(&mut current));
            }
            current.clear();
        }
        if beams > 0 {
            current.push(i);
            current_span = Some(span);
        } else {
            current_span = None;
        }
    }
    if current.len() >= 2 {
        groups.push(current);
    }
    groups
}

/// Beam segments for one group. Secondary beams break at beats; a lone
/// note at a level gets a partial beam.
pub(crate) fn beam_segments(beams: &[u8], ticks: &[u32], beat: u32) -> Vec<BeamSegment> {
    let n = beams.len();
    if n == 0 {
        return Vec::new();
    }
    let beat = beat.max(1);
    let beat_of = |i: usize| ticks[i] / beat;
    let mut out = vec![BeamSegment::Full { level: 1, from: 0, to: n - 1 }];
    let max_level = beams.iter().copied().max().unwrap_or(1);
    for level in 2..=max_level {
        let mut i = 0;
        while i < n {
            if beams[i] < level {
                i += 1;
                continue;
            }
            let start = i;
            while i + 1 < n && beams[i + 1] >= level && beat_of(i + 1) == beat_of(start) {
                i += 1;
            }
            if i > start {
                out.push(BeamSegment::Full { level, from: start, to: i });
            } else {
                let same_next = i + 1 < n && beat_of(i + 1) == beat_of(i);
                let same_prev = i > 0 && beat_of(i - 1) == beat_of(i);
                let right = same_next || (!same_prev && i + 1 < n);
                out.push(BeamSegment::Partial { level, at: i, right });
            }
            i += 1;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct ObjBeamGroup {
    pub id: BeamId,
    pub measure: MeasureId,
    pub voice: usize,
    pub symbols: Vec<SymbolId>,
    pub stem_up: bool,
    /// Draw a `3` over the group.
    pub tuplet: bool,
    pub segments: Vec<BeamSegment>,
    lines: Vec<(f64, f64, f64, f64)>,
    tuplet_at: Option<(f64, f64)>,
    thickness: f64,
    rect: Rect,
}

impl ObjBeamGroup {
    pub(crate) fn new(id: BeamId, measure: MeasureId, voice: usize, symbols: Vec<SymbolId>, stem_up: bool) -> Self {
        Self {
            id,
            measure,
            voice,
            symbols,
            stem_up,
            tuplet: false,
            segments: Vec::new(),
            lines: Vec::new(),
            tuplet_at: None,
            thickness: 0.0,
            rect: Rect::default(),
        }
    }

    /// Beam lines as (x0, y0, x1, y1), primary first.
    pub fn lines(&self) -> &[(f64, f64, f64, f64)] {
        &self.lines
    }

    /// Slope the beam between the outer stems, clamp it, then shift it
    /// away from the heads until every stem is long enough.
    pub(crate) fn layout(&mut self, symbols: &mut [Symbol], unit: f64) {
        struct Stem {
            x: f64,
            base: f64,
            tip: f64,
        }
        let stems: Vec<Stem> = self
            .symbols
            .iter()
            .filter_map(|s| symbols[s.0].stem_line())
            .map(|(x, base, tip)| Stem { x, base, tip })
            .collect();
        self.lines.clear();
        self.tuplet_at = None;
        self.thickness = BEAM_THICKNESS * unit;
        if stems.len() < 2 || stems.len() != self.symbols.len() {
            self.rect = Rect::default();
            return;
        }

        let (first, last) = (&stems[0], &stems[stems.len() - 1]);
        let dx = last.x - first.x;
        let slope = if dx.abs() > 0.1 {
            ((last.tip - first.tip) / dx).clamp(-BEAM_MAX_SLOPE, BEAM_MAX_SLOPE)
        } else {
            0.0
        };
        let beam_y = |x: f64| first.tip + slope * (x - first.x);

        let levels = self
            .segments
            .iter()
            .map(|s| match s {
                BeamSegment::Full { level, .. } | BeamSegment::Partial { level, .. } => *level,
            })
            .max()
            .unwrap_or(1);
        let min_stem = MIN_BEAMED_STEM * unit + (levels as f64 - 1.0) * BEAM_SPACING * unit;
        let mut shift = 0.0_f64;
        for st in &stems {
            let len = (st.base - (beam_y(st.x) + shift)).abs();
            if len < min_stem {
                let needed = min_stem - len;
                if self.stem_up {
                    shift -= needed;
                } else {
                    shift += needed;
                }
            }
        }
        let at = |x: f64| beam_y(x) + shift;

        for (sid, st) in self.symbols.iter().zip(&stems) {
            symbols[sid.0].set_stem_tip(at(st.x));
        }

        let toward_heads = if self.stem_up { 1.0 } else { -1.0 };
        for seg in &self.segments {
            let (level, x0, x1) = match *seg {
                BeamSegment::Full { level, from, to } => (level, stems[from].x, stems[to].x),
                BeamSegment::Partial { level, at, right } => {
                    let x = stems[at].x;
                    let len = PARTIAL_BEAM_LENGTH * unit;
                    if right {
                        (level, x, x + len)
                    } else {
                        (level, x - len, x)
                    }
                }
            };
            let dy = toward_heads * (level as f64 - 1.0) * BEAM_SPACING * unit;
            self.lines.push((x0, at(x0) + dy, x1, at(x1) + dy));
        }

        if self.tuplet {
            let cx = (first.x + last.x) / 2.0;
            self.tuplet_at = Some((cx, at(cx) - toward_heads * unit));
        }

        let t = self.thickness * toward_heads;
        let mut rects: Vec<Rect> = self
            .lines
            .iter()
            .map(|&(x0, y0, x1, y1)| {
                Rect::new(x0, y0.min(y1).min(y0 + t).min(y1 + t), x1, y0.max(y1).max(y0 + t).max(y1 + t))
            })
            .collect();
        if let Some((x, y)) = self.tuplet_at {
            rects.push(Rect::new(x - unit / 2.0, y - unit / 2.0, x + unit / 2.0, y + unit / 2.0));
        }
        self.rect = union_all(&rects).unwrap_or_default();
    }
}

impl MusicObject for ObjBeamGroup {
    fn rect(&self) -> Rect {
        self.rect
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        for l in &mut self.lines {
            l.0 += dx;
            l.1 += dy;
            l.2 += dx;
            l.3 += dy;
        }
        if let Some(t) = self.tuplet_at.as_mut() {
            t.0 += dx;
            t.1 += dy;
        }
        self.rect.offset(dx, dy);
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        r.draw_debug_rect(&self.rect);
        let unit = r.unit_size();
        let t = if self.stem_up { self.thickness } else { -self.thickness };
        let Some(s) = r.surface() else { return };
        for &(x0, y0, x1, y1) in &self.lines {
            let d = format!(
                "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} Z",
                x0,
                y0,
                x1,
                y1,
                x1,
                y1 + t,
                x0,
                y0 + t
            );
            s.path(&d, NOTE_COLOR, "none", 0.0);
        }
        if let Some((x, y)) = self.tuplet_at {
            s.text(x, y, "3", TEXT_SIZE * unit * 0.8, NOTE_COLOR, TextAnchor::Middle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_eighths_in_common_time_make_two_groups() {
        let entries: Vec<(u32, u8)> = (0..8).map(|i| (i * 96, 1)).collect();
        let groups = group_voice(&entries, &[384, 384]);
        assert_eq!(groups, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
    }

    #[test]
    fn rests_and_quarters_break_groups() {
        // 8 8 4 8 r8 8 8
        let entries = [(0, 1), (96, 1), (192, 0), (384, 1), (480, 0), (576, 1), (672, 1)];
        let groups = group_voice(&entries, &[192, 192, 192, 192]);
        assert_eq!(groups, vec![vec![0, 1], vec![5, 6]]);
    }

    #[test]
    fn sixteenth_beams_break_at_beats() {
        // four sixteenths then a dotted eighth and a sixteenth
        let beams = [2, 2, 2, 2, 1, 2];
        let ticks = [0, 48, 96, 144, 192, 336];
        let segs = beam_segments(&beams, &ticks, 192);
        assert_eq!(
            segs,
            vec![
                BeamSegment::Full { level: 1, from: 0, to: 5 },
                BeamSegment::Full { level: 2, from: 0, to: 3 },
                BeamSegment::Partial { level: 2, at: 5, right: false },
            ]
        );
    }
}
