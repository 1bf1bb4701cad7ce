//! Ties, slurs and slides.
//!
//! Arcs are declared as [`ArcProps`] when the left note is written, often
//! before the right note exists. Every update pass throws away the
//! materialized [`ObjArc`]s and rebuilds them from the declarations, so no
//! arc survives an edit pointing at a stale note group.
//!
//! An arc may cross one row break. Each row it touches gets one fragment;
//! the y where the two fragments meet the row edges is interpolated
//! between the true endpoints in staff-relative coordinates, weighted by
//! the horizontal run each fragment covers, so both halves agree.

use std::collections::HashMap;

use serde::Serialize;

use super::measure::Measure;
use super::row::Row;
use super::symbols::Symbol;
use super::{ArcId, MeasureId, MusicObject, RowId, SymbolId};
use crate::error::{Result, ScoreError};
use crate::geometry::{union_all, Rect};
use crate::renderer::constants::*;
use crate::renderer::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArcKind {
    Tie,
    Slur,
    Slide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArcSpan {
    /// Ends on the n-th note group of the voice, counting the left one.
    Notes(usize),
    /// Open arc running to the end of the left measure.
    ToMeasureEnd,
    /// Open arc of fixed length.
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ArcDirection {
    /// Opposite the left note's stem.
    #[default]
    Auto,
    Up,
    Down,
}

/// A declared arc, materialized on every update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcProps {
    pub kind: ArcKind,
    pub measure: MeasureId,
    pub left: SymbolId,
    /// Note of the chord; `None` ties every note, or slurs the outer one.
    pub note: Option<usize>,
    pub span: ArcSpan,
    pub direction: ArcDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcFragment {
    pub row: RowId,
    /// Measure that draws this fragment.
    pub owner: MeasureId,
    pub start: (f64, f64),
    pub end: (f64, f64),
    /// Top line of the anchor staff in this row.
    pub staff_top: f64,
    /// Signed bulge; negative bends upwards.
    pub height: f64,
}

impl ArcFragment {
    pub fn rect(&self) -> Rect {
        let mid = (self.start.1 + self.end.1) / 2.0 + self.height * 0.75;
        let pts = [
            Rect::point(self.start.0, self.start.1),
            Rect::point(self.end.0, self.end.1),
            Rect::point((self.start.0 + self.end.0) / 2.0, mid),
        ];
        union_all(&pts).unwrap_or_default()
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        self.start.0 += dx;
        self.start.1 += dy;
        self.end.0 += dx;
        self.end.1 += dy;
        self.staff_top += dy;
    }
}

#[derive(Debug, Clone)]
pub struct ObjArc {
    pub id: ArcId,
    pub kind: ArcKind,
    pub left: (SymbolId, usize),
    pub right: Option<(SymbolId, usize)>,
    pub span: ArcSpan,
    pub up: bool,
    /// Row and drawing measure of each fragment, known at materialization.
    pieces: Vec<(RowId, MeasureId)>,
    fragments: Vec<ArcFragment>,
    unit: f64,
}

impl ObjArc {
    pub fn fragments(&self) -> &[ArcFragment] {
        &self.fragments
    }

    /// Measures that draw a fragment of this arc.
    pub(crate) fn owners(&self) -> impl Iterator<Item = MeasureId> + '_ {
        self.pieces.iter().map(|p| p.1)
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = RowId> + '_ {
        self.pieces.iter().map(|p| p.0)
    }

    pub(crate) fn offset_row(&mut self, row: RowId, dx: f64, dy: f64) {
        for f in self.fragments.iter_mut().filter(|f| f.row == row) {
            f.offset(dx, dy);
        }
    }

    /// Compute the fragment for `row`; rows are laid out one at a time and
    /// both anchors' rows are already stretched by then.
    pub(crate) fn layout_row(&mut self, row: RowId, symbols: &[Symbol], measures: &[Measure], rows: &[Row], unit: f64) {
        self.unit = unit;
        self.fragments.retain(|f| f.row != row);
        let Some(&(_, owner)) = self.pieces.iter().find(|p| p.0 == row) else { return };
        let (lsym, lnote) = self.left;
        let left = &symbols[lsym.0];
        let Some(lrect) = left.anchor_rect(lnote) else { return };
        let lrow = measures[left.measure.0].row;
        let gap = ARC_NOTEHEAD_GAP * unit;
        let sign = if self.up { -1.0 } else { 1.0 };
        let edge_y = |r: &Rect| match (self.kind, self.up) {
            (ArcKind::Slide, _) => r.center_y(),
            (_, true) => r.top - gap,
            (_, false) => r.bottom + gap,
        };

        let ltop = rows[lrow.0].staff_top(left.staff);
        let lx = match self.kind {
            ArcKind::Slur => lrect.center_x(),
            _ => lrect.right + gap,
        };
        let ly = edge_y(&lrect) - ltop;

        let (rrow, rtop, rx, ry) = match self.right {
            Some((rsym, rnote)) => {
                let right = &symbols[rsym.0];
                let Some(rrect) = right.anchor_rect(rnote) else { return };
                let rrow = measures[right.measure.0].row;
                let rtop = rows[rrow.0].staff_top(right.staff);
                let rx = match self.kind {
                    ArcKind::Slur => rrect.center_x(),
                    _ => rrect.left - gap,
                };
                (rrow, rtop, rx, edge_y(&rrect) - rtop)
            }
            None => {
                let rx = match self.span {
                    ArcSpan::ToMeasureEnd => measures[left.measure.0].content_right(),
                    _ => lx + ARC_SHORT_LENGTH * unit,
                };
                let ry = if self.kind == ArcKind::Slide { ly + unit } else { ly };
                (lrow, ltop, rx, ry)
            }
        };

        let (start, end, top) = if lrow == rrow {
            ((lx, ly), (rx, ry), ltop)
        } else {
            let lc = rows[lrow.0].arcs_content_rect().right;
            let rc = rows[rrow.0].arcs_content_rect().left;
            let split = split_y(lx, ly, rx, ry, lc, rc);
            if row == lrow {
                ((lx, ly), (lc, split), ltop)
            } else {
                ((rc, split), (rx, ry), rtop)
            }
        };

        let height = match self.kind {
            ArcKind::Slide => 0.0,
            _ => sign * arc_height(end.0 - start.0, unit),
        };
        self.fragments.push(ArcFragment {
            row,
            owner,
            start: (start.0, start.1 + top),
            end: (end.0, end.1 + top),
            staff_top: top,
            height,
        });
    }

    pub(crate) fn draw_owned(&self, owner: MeasureId, r: &mut Renderer<'_>) {
        for f in self.fragments.iter().filter(|f| f.owner == owner) {
            r.draw_debug_rect(&f.rect());
            self.draw_fragment(f, r);
        }
    }

    fn draw_fragment(&self, f: &ArcFragment, r: &mut Renderer<'_>) {
        let lw = r.line_width();
        let unit = self.unit;
        let Some(s) = r.surface() else { return };
        let (sx, sy) = f.start;
        let (ex, ey) = f.end;
        if self.kind == ArcKind::Slide {
            s.line(sx, sy, ex, ey, ARC_COLOR, lw * 1.5);
            return;
        }
        let dx = ex - sx;
        let mid_y = (sy + ey) / 2.0;
        let (cp1x, cp2x) = (sx + dx * 0.25, sx + dx * 0.75);
        let cpy = mid_y + f.height;
        let dir = f.height.signum();
        let ep = ARC_ENDPOINT_THICKNESS * unit * dir;
        let cp = ARC_MID_THICKNESS * unit * dir;
        let d = format!(
            "M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} L{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} Z",
            sx, sy,
            cp1x, cpy,
            cp2x, cpy,
            ex, ey,
            ex, ey + ep,
            cp2x, cpy + cp,
            cp1x, cpy + cp,
            sx, sy + ep,
        );
        s.path(&d, ARC_COLOR, "none", 0.0);
    }
}

impl MusicObject for ObjArc {
    fn rect(&self) -> Rect {
        let rects: Vec<Rect> = self.fragments.iter().map(ArcFragment::rect).collect();
        union_all(&rects).unwrap_or_default()
    }

    fn offset(&mut self, dx: f64, dy: f64) {
        for f in &mut self.fragments {
            f.offset(dx, dy);
        }
    }

    fn draw(&self, r: &mut Renderer<'_>) {
        for f in &self.fragments {
            self.draw_fragment(f, r);
        }
    }

    fn hit(&self, x: f64, y: f64) -> bool {
        self.fragments.iter().any(|f| f.rect().contains(x, y))
    }
}

/// `sign * unit * log2(span) / 3` without the sign; short spans are
/// floored so the log stays positive.
pub(crate) fn arc_height(span: f64, unit: f64) -> f64 {
    unit * span.abs().max(2.0).log2() / 3.0
}

/// Staff-relative y where an arc crossing a row break meets the row
/// edges: `lc` is the left row's right content edge, `rc` the right row's
/// left content edge.
pub(crate) fn split_y(lx: f64, ly: f64, rx: f64, ry: f64, lc: f64, rc: f64) -> f64 {
    let d1 = (lc - lx).max(0.0);
    let d2 = (rx - rc).max(0.0);
    if d1 + d2 <= 0.0 {
        return ly;
    }
    ly + (ry - ly) * d1 / (d1 + d2)
}

/// Resolve declarations into arcs. `voice_order` lists every note group
/// of each voice in document order.
pub(crate) fn materialize_arcs(
    props: &[ArcProps],
    symbols: &[Symbol],
    measures: &[Measure],
    voice_order: &[Vec<SymbolId>],
) -> Result<Vec<ObjArc>> {
    let positions: HashMap<SymbolId, usize> = voice_order
        .iter()
        .flat_map(|v| v.iter().enumerate().map(|(i, s)| (*s, i)))
        .collect();
    let mut arcs = Vec::new();

    for p in props {
        let left = &symbols[p.left.0];
        let heads = left.heads();
        if heads.is_empty() {
            continue;
        }
        let up = match p.direction {
            ArcDirection::Up => true,
            ArcDirection::Down => false,
            ArcDirection::Auto => !left.stem_up(),
        };

        let right = match p.span {
            ArcSpan::Notes(n) if n < 2 => return Err(ScoreError::ArcWithoutEndpoint { measure: p.measure.0 }),
            ArcSpan::Notes(n) => {
                let order = voice_order.get(left.voice);
                let found = positions
                    .get(&p.left)
                    .and_then(|&i| order.and_then(|o| o.get(i.saturating_add(n - 1))));
                match found {
                    Some(s) => Some(&symbols[s.0]),
                    None => {
                        tracing::debug!(measure = p.measure.0, "right arc anchor not written yet, skipped");
                        continue;
                    }
                }
            }
            ArcSpan::ToMeasureEnd | ArcSpan::Short => None,
        };

        let lrow = measures[left.measure.0].row;
        let pieces = match right {
            None => vec![(lrow, left.measure)],
            Some(r) => {
                let rrow = measures[r.measure.0].row;
                if rrow.0 > lrow.0 + 1 {
                    return Err(ScoreError::ArcSpansTooManyRows { from: left.measure.0, to: r.measure.0 });
                }
                if r.measure == left.measure {
                    vec![(lrow, left.measure)]
                } else if rrow == lrow {
                    vec![(lrow, r.measure)]
                } else {
                    vec![(lrow, left.measure), (rrow, r.measure)]
                }
            }
        };

        let pairs: Vec<(usize, Option<usize>)> = match (p.kind, p.note) {
            (ArcKind::Tie, None) => (0..heads.len()).map(|i| (i, right.and_then(|r| matching_head(left, i, r)))).collect(),
            (ArcKind::Tie, Some(i)) => vec![(i, right.and_then(|r| matching_head(left, i, r)))],
            (_, note) => {
                let outer = if up { heads.len() - 1 } else { 0 };
                let i = note.unwrap_or(outer).min(heads.len() - 1);
                let j = right.map(|r| {
                    let n = r.heads().len();
                    if note.is_some() {
                        i.min(n.saturating_sub(1))
                    } else if up {
                        n.saturating_sub(1)
                    } else {
                        0
                    }
                });
                vec![(i, j)]
            }
        };

        for (i, j) in pairs {
            if i >= heads.len() {
                continue;
            }
            let right_anchor = match (right, j) {
                (Some(r), Some(j)) => Some((r.id, j)),
                (Some(_), None) => continue,
                (None, _) => None,
            };
            arcs.push(ObjArc {
                id: ArcId(arcs.len()),
                kind: p.kind,
                left: (p.left, i),
                right: right_anchor,
                span: p.span,
                up,
                pieces: pieces.clone(),
                fragments: Vec::new(),
                unit: 0.0,
            });
        }
    }
    Ok(arcs)
}

/// Head of `right` with the pitch of head `i` of `left`.
fn matching_head(left: &Symbol, i: usize, right: &Symbol) -> Option<usize> {
    let midi = left.heads().get(i)?.note.midi();
    right.heads().iter().position(|h| h.note.midi() == midi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_point_weights_by_distance() {
        // left fragment covers 30, right covers 10: three quarters of the way
        let y = split_y(70.0, 0.0, 30.0, 40.0, 100.0, 20.0);
        assert!((y - 30.0).abs() < 1e-9);
        assert_eq!(split_y(100.0, 5.0, 20.0, 9.0, 100.0, 20.0), 5.0);
    }

    #[test]
    fn arc_height_grows_sub_linearly() {
        let short = arc_height(16.0, 3.0);
        let long = arc_height(256.0, 3.0);
        assert!((short - 4.0).abs() < 1e-9);
        assert!((long - 8.0).abs() < 1e-9);
        assert!(arc_height(0.0, 3.0) > 0.0);
    }
}
