//! The document root: arenas, dirty flags and the layout pass.
//!
//! Content is appended through [`MeasureEditor`]; every mutation only
//! raises flags. `update` rebuilds the derived structure (inherited
//! signatures, stems and beams, extension ends, arcs) and `layout` turns
//! it into geometry, laying each row out at the origin and moving it into
//! place last, so a second pass starts from the same state as the first.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, debug_span, trace};

use super::annotations::{Annotation, AnnotationAnchor, Extension, ExtensionEnd, ExtensionSegment, ExtensionSpan, Target, VerticalPos};
use super::arcs::{materialize_arcs, ArcProps, ObjArc};
use super::beams::{beam_segments, group_voice, ObjBeamGroup};
use super::editor::MeasureEditor;
use super::header::Header;
use super::layout_groups::{find_group, resolve_staves, GroupMember, LayoutGroup};
use super::measure::{Measure, MeasureEnd, RhythmColumn};
use super::row::Row;
use super::staff::StaffDef;
use super::symbols::{StemDir, Symbol};
use super::{BeamId, ColumnId, LayoutGroupId, MeasureId, MusicObject, ObjRef, RowId, SymbolId};
use crate::config::{LayoutConfig, MAX_VOICES};
use crate::error::{Result, ScoreError};
use crate::geometry::{union_all, Rect};
use crate::renderer::constants::*;
use crate::renderer::Renderer;
use crate::theory::{KeySignature, Note, Tempo, TimeSignature};

/// Pitch under a point on a notation staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PitchPick {
    pub staff: usize,
    pub measure: MeasureId,
    pub position: i32,
    /// Natural note at that staff position.
    pub note: Note,
}

pub struct Document {
    config: LayoutConfig,
    staves: Vec<StaffDef>,
    pub(crate) rows: Vec<Row>,
    pub(crate) measures: Vec<Measure>,
    pub(crate) columns: Vec<RhythmColumn>,
    pub(crate) symbols: Vec<Symbol>,
    header: Option<Header>,
    layout_groups: Vec<Option<LayoutGroup>>,
    pub(crate) arc_props: Vec<ArcProps>,
    arcs: Vec<ObjArc>,
    beams: Vec<ObjBeamGroup>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) extensions: Vec<Extension>,
    need_layout: bool,
    need_update: bool,
    /// Unit size of the last completed layout.
    unit: Option<f64>,
    rect: Rect,
}

impl Document {
    pub fn new(config: LayoutConfig) -> Result<Self> {
        config.validate()?;
        let staves = config.staves.iter().map(StaffDef::from_config).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            staves,
            rows: Vec::new(),
            measures: Vec::new(),
            columns: Vec::new(),
            symbols: Vec::new(),
            header: None,
            layout_groups: Vec::new(),
            arc_props: Vec::new(),
            arcs: Vec::new(),
            beams: Vec::new(),
            annotations: Vec::new(),
            extensions: Vec::new(),
            need_layout: true,
            need_update: true,
            unit: None,
            rect: Rect::default(),
        })
    }

    // ── Read access ──

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn staves(&self) -> &[StaffDef] {
        &self.staves
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(id.0)
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn measure(&self, id: MeasureId) -> Option<&Measure> {
        self.measures.get(id.0)
    }

    pub fn column(&self, id: ColumnId) -> Option<&RhythmColumn> {
        self.columns.get(id.0)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0)
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn layout_groups(&self) -> impl Iterator<Item = &LayoutGroup> {
        self.layout_groups.iter().flatten()
    }

    pub fn arc_props(&self) -> &[ArcProps] {
        &self.arc_props
    }

    /// Arcs materialized by the last update.
    pub fn arcs(&self) -> &[ObjArc] {
        &self.arcs
    }

    pub fn beams(&self) -> &[ObjBeamGroup] {
        &self.beams
    }

    pub fn beam(&self, id: BeamId) -> Option<&ObjBeamGroup> {
        self.beams.get(id.0)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn needs_layout(&self) -> bool {
        self.need_layout
    }

    pub fn needs_update(&self) -> bool {
        self.need_update
    }

    /// Unit size of the last completed layout.
    pub fn unit_size(&self) -> Option<f64> {
        self.unit
    }

    /// Union of the header and every row.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    // ── Mutation ──

    pub fn set_header(&mut self, header: Header) {
        self.header = Some(header);
        self.request_layout();
    }

    /// Append a measure, starting a new row when the current one is full
    /// or was explicitly ended.
    pub fn add_measure(&mut self) -> Result<MeasureEditor<'_>> {
        let id = MeasureId(self.measures.len());
        let new_row = match (self.rows.last(), self.measures.last()) {
            (Some(row), Some(prev)) => self.breaks_after(row.measures.len(), prev),
            _ => true,
        };
        if new_row {
            self.rows.push(Row::new(RowId(self.rows.len())));
        }
        let row = self.rows.last_mut().ok_or(ScoreError::NoCurrentRow)?;
        row.measures.push(id);
        row.needs_layout = true;
        let mut measure = Measure::new(id, row.id);
        measure.row_start = row.measures.len() == 1;
        trace!(measure = id.0, row = row.id.0, "measure appended");
        self.measures.push(measure);
        self.request_layout();
        Ok(MeasureEditor::new(self, id))
    }

    /// Editor for a measure added earlier.
    pub fn measure_mut(&mut self, id: MeasureId) -> Result<MeasureEditor<'_>> {
        if id.0 >= self.measures.len() {
            return Err(ScoreError::invalid("measure", id.0.to_string()));
        }
        Ok(MeasureEditor::new(self, id))
    }

    /// Named group of staves (by staff name) and other groups (by group
    /// name). Group members are looked up when the layout runs.
    pub fn add_layout_group(&mut self, name: &str, members: &[&str]) -> Result<LayoutGroupId> {
        if find_group(&self.layout_groups, name).is_some() || self.staves.iter().any(|s| s.name == name) {
            return Err(ScoreError::invalid("layout group", name));
        }
        let members = members
            .iter()
            .map(|m| match self.staves.iter().position(|s| s.name == *m) {
                Some(i) => GroupMember::Staff(i),
                None => GroupMember::Group(m.to_string()),
            })
            .collect();
        let id = LayoutGroupId(self.layout_groups.len());
        self.layout_groups.push(Some(LayoutGroup::new(id, name, members)));
        self.request_layout();
        Ok(id)
    }

    pub fn remove_layout_group(&mut self, id: LayoutGroupId) -> Option<LayoutGroup> {
        let group = self.layout_groups.get_mut(id.0)?.take();
        self.request_layout();
        group
    }

    /// Change the row capacity and re-flow every measure into rows.
    pub fn set_measures_per_row(&mut self, measures_per_row: Option<usize>) -> Result<()> {
        if measures_per_row == Some(0) {
            return Err(ScoreError::invalid("measures per row", "0"));
        }
        self.config.measures_per_row = measures_per_row;
        self.reflow();
        Ok(())
    }

    pub fn request_layout(&mut self) {
        self.need_layout = true;
        self.need_update = true;
    }

    /// Also drop every cached local layout.
    pub fn request_full_layout(&mut self) {
        self.request_layout();
        for row in &mut self.rows {
            row.needs_layout = true;
        }
        for m in &mut self.measures {
            m.needs_layout = true;
        }
        for c in &mut self.columns {
            c.needs_layout = true;
        }
    }

    // ── Crate helpers for the editor ──

    pub(crate) fn staff_for_voice(&self, voice: usize) -> Result<usize> {
        self.staves
            .iter()
            .position(|s| s.voices.contains(&voice))
            .ok_or_else(|| ScoreError::invalid("voice", voice.to_string()))
    }

    pub(crate) fn staff(&self, index: usize) -> Option<&StaffDef> {
        self.staves.get(index)
    }

    /// A staff name or a layout group name.
    pub(crate) fn resolve_target(&self, name: &str) -> Result<Target> {
        if let Some(i) = self.staves.iter().position(|s| s.name == name) {
            return Ok(Target::Staff(i));
        }
        find_group(&self.layout_groups, name)
            .map(Target::Group)
            .ok_or_else(|| ScoreError::invalid("target", name))
    }

    /// Time signature in effect for a measure, without waiting for an
    /// update.
    pub(crate) fn time_at(&self, measure: MeasureId) -> TimeSignature {
        self.measures[..=measure.0.min(self.measures.len().saturating_sub(1))]
            .iter()
            .rev()
            .find_map(|m| m.time.clone())
            .unwrap_or_default()
    }

    fn breaks_after(&self, row_len: usize, prev: &Measure) -> bool {
        row_len > 0
            && (self.config.measures_per_row.is_some_and(|n| row_len >= n)
                || matches!(prev.end, Some(MeasureEnd::Row | MeasureEnd::Song)))
    }

    /// Rebuild the row list from the measures' row-end flags and the
    /// configured capacity.
    pub(crate) fn reflow(&mut self) {
        let _span = debug_span!("reflow", measures = self.measures.len()).entered();
        let mut rows: Vec<Row> = Vec::new();
        for i in 0..self.measures.len() {
            let start = match rows.last() {
                Some(row) => self.breaks_after(row.measures.len(), &self.measures[i - 1]),
                None => true,
            };
            if start {
                rows.push(Row::new(RowId(rows.len())));
            }
            let ri = rows.len() - 1;
            rows[ri].measures.push(MeasureId(i));
            let m = &mut self.measures[i];
            if m.row_start != start {
                m.needs_layout = true;
            }
            m.row = RowId(ri);
            m.row_start = start;
        }
        if rows.len() != self.rows.len() {
            debug!(from = self.rows.len(), to = rows.len(), "rows reflowed");
        }
        self.rows = rows;
        self.request_layout();
    }

    // ── Update pass ──

    /// Rebuild derived structure: inherited signatures, stems and beams,
    /// extension ends, and all arcs from their declarations.
    pub fn update(&mut self) -> Result<()> {
        if !self.need_update {
            return Ok(());
        }
        let _span = debug_span!("update", measures = self.measures.len()).entered();
        self.resolve_signatures();
        self.update_beams();
        self.update_extensions();
        self.arcs.clear();
        for m in &mut self.measures {
            m.arcs.clear();
        }
        self.rebuild_arcs()?;
        self.need_update = false;
        Ok(())
    }

    fn resolve_signatures(&mut self) {
        let mut key = KeySignature::default();
        let mut time = TimeSignature::default();
        let mut tempo = Tempo::default();
        let mut prev_key: Option<KeySignature> = None;
        let mut prev_time: Option<TimeSignature> = None;
        for (i, m) in self.measures.iter_mut().enumerate() {
            if let Some(k) = m.key {
                key = k;
            }
            if let Some(t) = &m.time {
                time = t.clone();
            }
            if let Some(t) = m.tempo {
                tempo = t;
            }
            // A row start shows its key in the row header instead.
            let show_key = m.key.is_some() && !m.row_start && prev_key != Some(key);
            let show_time = i == 0 || (m.time.is_some() && prev_time.as_ref() != Some(&time));
            if show_key != m.show_key || show_time != m.show_time || key != m.resolved_key || time != m.resolved_time {
                m.needs_layout = true;
            }
            m.show_key = show_key;
            m.show_time = show_time;
            m.resolved_key = key;
            m.resolved_time = time.clone();
            m.resolved_tempo = tempo;
            prev_key = Some(key);
            prev_time = Some(time.clone());
        }
    }

    fn update_beams(&mut self) {
        self.beams.clear();
        for mi in 0..self.measures.len() {
            self.measures[mi].beams.clear();
            let mut voices: Vec<Vec<SymbolId>> = vec![Vec::new(); MAX_VOICES];
            for cid in &self.measures[mi].columns {
                for (v, s) in self.columns[cid.0].symbols.iter().enumerate() {
                    if let Some(s) = s {
                        voices[v].push(*s);
                    }
                }
            }
            let mut sharing: HashMap<usize, Vec<usize>> = HashMap::new();
            for (v, list) in voices.iter().enumerate() {
                if let Some(first) = list.first() {
                    sharing.entry(self.symbols[first.0].staff).or_default().push(v);
                }
            }
            let snapshot = |symbols: &[Symbol]| -> Vec<(bool, bool, i32)> {
                voices
                    .iter()
                    .flatten()
                    .map(|s| {
                        let sym = &symbols[s.0];
                        (sym.stem_up, sym.beam.is_some(), sym.rest_shift)
                    })
                    .collect()
            };
            let before = snapshot(&self.symbols);

            let time = self.measures[mi].resolved_time.clone();
            let spans = time.beam_group_ticks();
            let beat = time.beat_ticks();

            for (v, list) in voices.iter().enumerate() {
                let Some(first) = list.first() else { continue };
                let staff = self.symbols[first.0].staff;
                let on_staff = sharing.get(&staff).map_or(&[][..], Vec::as_slice);
                // Several voices on a staff: the first stems up, the rest down.
                let voice_up = (on_staff.len() > 1).then(|| on_staff.first() == Some(&v));
                for sid in list {
                    let sym = &mut self.symbols[sid.0];
                    sym.stem_up = stem_direction(sym.explicit_stem(), voice_up, sym.mean_position());
                    sym.beam = None;
                    sym.rest_shift = match voice_up {
                        Some(true) => -4,
                        Some(false) => 4,
                        None => 0,
                    };
                }

                let entries: Vec<(u32, u8)> = list
                    .iter()
                    .map(|s| {
                        let sym = &self.symbols[s.0];
                        (sym.tick, if sym.is_beamable() { sym.rhythm.flag_count() } else { 0 })
                    })
                    .collect();
                for group in group_voice(&entries, &spans) {
                    let ids: Vec<SymbolId> = group.iter().map(|&i| list[i]).collect();
                    let syms: Vec<&Symbol> = ids.iter().map(|s| &self.symbols[s.0]).collect();
                    let explicit = syms
                        .iter()
                        .map(|s| s.explicit_stem())
                        .find(|d| *d != StemDir::Auto)
                        .unwrap_or_default();
                    let mean = syms.iter().map(|s| s.mean_position()).sum::<f64>() / syms.len() as f64;
                    let up = stem_direction(explicit, voice_up, mean);
                    let counts: Vec<u8> = syms.iter().map(|s| s.rhythm.flag_count()).collect();
                    let ticks: Vec<u32> = syms.iter().map(|s| s.tick).collect();
                    let tuplet = syms.iter().all(|s| s.rhythm.triplet);

                    let id = BeamId(self.beams.len());
                    let mut beam = ObjBeamGroup::new(id, MeasureId(mi), v, ids.clone(), up);
                    beam.segments = beam_segments(&counts, &ticks, beat);
                    beam.tuplet = tuplet;
                    for s in &ids {
                        let sym = &mut self.symbols[s.0];
                        sym.beam = Some(id);
                        sym.stem_up = up;
                    }
                    self.measures[mi].beams.push(id);
                    self.beams.push(beam);
                }
            }

            if snapshot(&self.symbols) != before {
                self.measures[mi].needs_layout = true;
            }
        }
        trace!(beams = self.beams.len(), "beams regrouped");
    }

    fn update_extensions(&mut self) {
        let order: Vec<ColumnId> = self.measures.iter().flat_map(|m| m.columns.iter().copied()).collect();
        let last = MeasureId(self.measures.len().saturating_sub(1));
        for ext in &mut self.extensions {
            let m = ext.measure.0;
            ext.end = Some(match ext.span {
                ExtensionSpan::ToMeasureEnd => ExtensionEnd::MeasureEnd(ext.measure),
                ExtensionSpan::Measures(n) => ExtensionEnd::MeasureEnd(MeasureId(m.saturating_add(n.max(1) - 1).min(last.0))),
                ExtensionSpan::Columns(n) => {
                    let start = ext.start.or_else(|| self.measures[m].columns.first().copied());
                    let at = start.and_then(|s| order.iter().position(|c| *c == s));
                    match at.and_then(|i| order.get(i.saturating_add(n))) {
                        Some(c) => ExtensionEnd::Column(*c),
                        None => ExtensionEnd::MeasureEnd(last),
                    }
                }
            });
        }
    }

    fn rebuild_arcs(&mut self) -> Result<()> {
        let mut voice_order: Vec<Vec<SymbolId>> = vec![Vec::new(); MAX_VOICES];
        for m in &self.measures {
            for cid in &m.columns {
                for sid in self.columns[cid.0].symbols() {
                    let sym = &self.symbols[sid.0];
                    if !sym.is_rest() {
                        voice_order[sym.voice].push(sid);
                    }
                }
            }
        }
        let arcs = materialize_arcs(&self.arc_props, &self.symbols, &self.measures, &voice_order)?;
        for arc in &arcs {
            for owner in arc.owners() {
                let list = &mut self.measures[owner.0].arcs;
                if !list.contains(&arc.id) {
                    list.push(arc.id);
                }
            }
        }
        trace!(declared = self.arc_props.len(), materialized = arcs.len(), "arcs rebuilt");
        self.arcs = arcs;
        Ok(())
    }

    // ── Layout pass ──

    /// Lay out everything that is dirty. A changed unit size relayouts
    /// from scratch. Errors leave the flags raised.
    pub fn layout(&mut self, r: &Renderer<'_>) -> Result<()> {
        let unit = r.unit_size();
        if !(unit.is_finite() && unit > 0.0) {
            return Err(ScoreError::invalid("unit size", unit.to_string()));
        }
        if self.unit != Some(unit) {
            if let Some(prev) = self.unit {
                debug!(from = prev, to = unit, "unit size changed, full layout");
            }
            self.request_full_layout();
        }
        if !self.need_layout && !self.need_update {
            return Ok(());
        }
        let _span = debug_span!("layout", unit, rows = self.rows.len(), measures = self.measures.len()).entered();
        self.update()?;

        for g in self.layout_groups.iter_mut().flatten() {
            g.clear_position_and_layout();
        }
        for row in &mut self.rows {
            row.clear_placements();
        }

        self.layout_measures(unit);
        let target = self.layout_rows(unit);
        for beam in &mut self.beams {
            beam.layout(&mut self.symbols, unit);
        }
        for arc in &mut self.arcs {
            let rows: Vec<RowId> = arc.rows().collect();
            for row in rows {
                arc.layout_row(row, &self.symbols, &self.measures, &self.rows, unit);
            }
        }
        self.layout_annotations(r)?;
        self.layout_extensions(unit)?;
        self.finish_rows(unit);
        self.stack_rows(target, r);

        self.need_layout = false;
        self.unit = Some(unit);
        Ok(())
    }

    fn layout_measures(&mut self, unit: f64) {
        for m in &mut self.measures {
            let dirty = m.needs_layout || m.columns.iter().any(|c| self.columns[c.0].needs_layout);
            if dirty {
                m.layout_local(&mut self.columns, &mut self.symbols, &self.staves, unit);
            }
        }
    }

    /// Headers and staff positions, then stretch every row to the common
    /// target width. Returns the target.
    fn layout_rows(&mut self, unit: f64) -> f64 {
        let mut mins = Vec::with_capacity(self.rows.len());
        for row in &mut self.rows {
            let key = row
                .measures
                .first()
                .map(|m| self.measures[m.0].resolved_key)
                .unwrap_or_default();
            row.layout_header(key, &self.staves, unit);
            let mut extents = row.header_extents(self.staves.len());
            for mid in &row.measures {
                for (e, m) in extents.iter_mut().zip(self.measures[mid.0].staff_extents()) {
                    e.0 = e.0.min(m.0);
                    e.1 = e.1.max(m.1);
                }
            }
            row.layout_staves(&extents, &self.staves, unit);
            let min = row.header_width() + row.measures.iter().map(|m| self.measures[m.0].min_width()).sum::<f64>();
            mins.push(min);
        }

        let floor = self.config.min_row_width * unit;
        let target = mins
            .iter()
            .map(|m| (m * self.config.row_width_factor).max(floor))
            .fold(floor, f64::max);

        for row in &mut self.rows {
            row.place(target, unit);
            let mins: Vec<f64> = row.measures.iter().map(|m| self.measures[m.0].min_width()).collect();
            let widths = row.measure_widths(&mins, target);
            let mut x = row.header_width();
            for (mid, w) in row.measures.iter().zip(widths) {
                self.measures[mid.0].place(x, w, &mut self.columns, &mut self.symbols, row.staff_tops(), &self.staves, unit);
                x += w;
            }
        }
        target
    }

    /// Rects an annotation on `staves` of `row` must clear: the staves,
    /// everything drawn on them, and staff annotations already stacked.
    fn obstacles(&self, row: RowId, staves: &[usize]) -> Vec<Rect> {
        let r = &self.rows[row.0];
        let mut out = Vec::new();
        for &s in staves {
            out.extend(r.staff_rect(s));
            for pos in [VerticalPos::Above, VerticalPos::Below] {
                if let Some(bucket) = r.staff_buckets.get(&(s, pos)) {
                    out.extend_from_slice(bucket.rects());
                }
            }
        }
        for mid in &r.measures {
            let m = &self.measures[mid.0];
            for cid in &m.columns {
                for sid in self.columns[cid.0].symbols() {
                    let sym = &self.symbols[sid.0];
                    if staves.contains(&sym.staff) {
                        out.push(sym.rect());
                    }
                }
            }
            for bid in &m.beams {
                let beam = &self.beams[bid.0];
                let on = beam.symbols.first().is_some_and(|s| staves.contains(&self.symbols[s.0].staff));
                if on {
                    out.push(beam.rect());
                }
            }
        }
        out
    }

    /// Horizontal extent and height of an annotation at its anchor.
    fn annotation_box(&self, a: &Annotation, r: &Renderer<'_>) -> (f64, f64, f64) {
        let unit = r.unit_size();
        match a.anchor {
            AnnotationAnchor::Column(cid) => {
                let (w, h) = a.size(r, 0.0);
                let cx = self.columns[cid.0].anchor_x() + NOTEHEAD_WIDTH * unit / 2.0;
                (cx - w / 2.0, cx + w / 2.0, h)
            }
            AnnotationAnchor::MeasureStart(m) => {
                let (w, h) = a.size(r, 0.0);
                let x = self.measures[m.0].content_left();
                (x, x + w, h)
            }
            AnnotationAnchor::MeasureEnd(m) => {
                let (w, h) = a.size(r, 0.0);
                let x = self.measures[m.0].content_right();
                (x - w, x, h)
            }
            AnnotationAnchor::Measure(m) => {
                let m = &self.measures[m.0];
                let (w, h) = a.size(r, (m.width() - unit).max(0.0));
                let x = m.x() + unit * 0.5;
                (x, x + w, h)
            }
        }
    }

    /// Staff targets stack first so group annotations clear them.
    fn layout_annotations(&mut self, r: &Renderer<'_>) -> Result<()> {
        let unit = r.unit_size();
        let gap = ANNOTATION_GAP * unit;
        let order: Vec<usize> = (0..self.annotations.len())
            .filter(|&i| matches!(self.annotations[i].target, Target::Staff(_)))
            .chain((0..self.annotations.len()).filter(|&i| matches!(self.annotations[i].target, Target::Group(_))))
            .collect();

        for i in order {
            let a = &self.annotations[i];
            let row = self.measures[a.measure.0].row;
            let pos = a.position;
            let (x0, x1, h) = self.annotation_box(a, r);
            let staves = match a.target {
                Target::Staff(s) => vec![s],
                Target::Group(g) => resolve_staves(&self.layout_groups, g)?,
            };
            let edge = content_edge(&self.obstacles(row, &staves), x0, x1, pos).unwrap_or(0.0);
            if x1 - x0 <= 0.0 && h <= 0.0 {
                self.annotations[i].set_rect(Rect::point(x0, edge), unit);
                continue;
            }
            let rect = match a.target {
                Target::Staff(s) => self.rows[row.0]
                    .staff_buckets
                    .entry((s, pos))
                    .or_default()
                    .place(x0, x1, h, edge, pos, gap),
                Target::Group(g) => self
                    .layout_groups
                    .get_mut(g.0)
                    .and_then(Option::as_mut)
                    .ok_or_else(|| ScoreError::UnknownGroupMember(format!("#{}", g.0)))?
                    .bucket(row, pos)
                    .place(x0, x1, h, edge, pos, gap),
            };
            self.annotations[i].set_rect(rect, unit);
        }
        Ok(())
    }

    /// Extension lines continue from their label to the resolved end,
    /// one segment per row, at the label's height relative to its staff.
    fn layout_extensions(&mut self, unit: f64) -> Result<()> {
        for ei in 0..self.extensions.len() {
            let ext = &self.extensions[ei];
            let label = &self.annotations[ext.label.0];
            let mut segments = Vec::new();
            // A blank label still carries its line.
            if let (true, Some(end)) = (label.rect().height() > 0.0, ext.end) {
                let staff = match label.target {
                    Target::Staff(s) => s,
                    Target::Group(g) => resolve_staves(&self.layout_groups, g)?.first().copied().unwrap_or(0),
                };
                let lrect = label.rect();
                let start_row = self.measures[ext.measure.0].row;
                let (end_measure, end_x) = match end {
                    ExtensionEnd::Column(c) => {
                        let col = &self.columns[c.0];
                        (col.measure, col.anchor_x() + NOTEHEAD_WIDTH * unit)
                    }
                    ExtensionEnd::MeasureEnd(m) => (m, self.measures[m.0].content_right()),
                };
                let end_row = self.measures[end_measure.0].row;
                let rel = lrect.center_y() - self.rows[start_row.0].staff_top(staff);
                for ri in start_row.0..=end_row.0 {
                    let row = &self.rows[ri];
                    let x0 = if ri == start_row.0 { lrect.right + EXTENSION_GAP * unit } else { row.header_width() };
                    let x1 = if ri == end_row.0 { end_x } else { row.width() };
                    if x1 > x0 {
                        segments.push(ExtensionSegment { row: row.id, x0, x1, y: row.staff_top(staff) + rel });
                    }
                }
            }
            self.extensions[ei].set_segments(segments, unit);
        }
        Ok(())
    }

    /// Row rect: everything laid out in the row, plus padding.
    fn finish_rows(&mut self, unit: f64) {
        let pad = self.config.row_padding * unit;
        for ri in 0..self.rows.len() {
            let id = RowId(ri);
            let mut rects = vec![self.rows[ri].rect()];
            for mid in &self.rows[ri].measures {
                let m = &self.measures[mid.0];
                rects.push(m.rect());
                for cid in &m.columns {
                    rects.extend(self.columns[cid.0].symbols().map(|s| self.symbols[s.0].rect()));
                }
                rects.extend(m.beams.iter().map(|b| self.beams[b.0].rect()));
            }
            rects.extend(
                self.arcs
                    .iter()
                    .flat_map(ObjArc::fragments)
                    .filter(|f| f.row == id)
                    .map(|f| f.rect()),
            );
            rects.extend(
                self.annotations
                    .iter()
                    .filter(|a| a.is_visible() && self.measures[a.measure.0].row == id)
                    .map(MusicObject::rect),
            );
            rects.extend(
                self.extensions
                    .iter()
                    .flat_map(Extension::segments)
                    .filter(|s| s.row == id)
                    .map(|s| Rect::new(s.x0, s.y, s.x1, s.y)),
            );
            let mut rect = union_all(&rects).unwrap_or_default();
            rect.inflate(pad);
            self.rows[ri].set_rect(rect);
        }
    }

    /// Header on top, then rows one below the other.
    fn stack_rows(&mut self, target: f64, r: &Renderer<'_>) {
        let unit = r.unit_size();
        let pad = self.config.row_padding * unit;
        let gap = self.config.row_gap * unit;
        let mut cursor = 0.0;
        let mut rects = Vec::new();
        if let Some(header) = &mut self.header {
            header.layout(target + 2.0 * pad, r);
            let hr = header.rect();
            if !hr.is_empty() {
                cursor = hr.bottom + gap;
                rects.push(hr);
            }
        }
        for ri in 0..self.rows.len() {
            let top = self.rows[ri].rect().top;
            self.offset_row(RowId(ri), pad, cursor - top);
            let placed = self.rows[ri].rect();
            cursor = placed.bottom + gap;
            rects.push(placed);
        }
        self.rect = union_all(&rects).unwrap_or_default();
    }

    /// Move a row and everything laid out in it.
    fn offset_row(&mut self, row: RowId, dx: f64, dy: f64) {
        let Some(r) = self.rows.get_mut(row.0) else { return };
        r.offset(dx, dy);
        for mid in &r.measures {
            let m = &mut self.measures[mid.0];
            m.offset(dx, dy);
            for cid in &m.columns {
                let col = &mut self.columns[cid.0];
                col.offset(dx, dy);
                for sid in col.symbols.iter().flatten() {
                    self.symbols[sid.0].offset(dx, dy);
                }
            }
            for bid in &m.beams {
                self.beams[bid.0].offset(dx, dy);
            }
        }
        for arc in &mut self.arcs {
            arc.offset_row(row, dx, dy);
        }
        for a in &mut self.annotations {
            if self.measures[a.measure.0].row == row {
                a.offset(dx, dy);
            }
        }
        for e in &mut self.extensions {
            e.offset_row(row, dx, dy);
        }
        for g in self.layout_groups.iter_mut().flatten() {
            g.offset_row(row, dx, dy);
        }
    }

    // ── Drawing and picking ──

    /// Lay out if needed, then draw. Every arc fragment is drawn once, by
    /// the measure that owns it.
    pub fn draw(&mut self, r: &mut Renderer<'_>) -> Result<()> {
        self.layout(r)?;
        let _span = debug_span!("draw", rows = self.rows.len()).entered();
        if let Some(h) = &self.header {
            h.draw(r);
        }
        for row in &self.rows {
            row.draw(r);
            for mid in &row.measures {
                let m = &self.measures[mid.0];
                m.draw(r);
                for cid in &m.columns {
                    let col = &self.columns[cid.0];
                    col.draw(r);
                    for sid in col.symbols() {
                        self.symbols[sid.0].draw(r);
                    }
                }
                for bid in &m.beams {
                    self.beams[bid.0].draw(r);
                }
                for aid in &m.arcs {
                    self.arcs[aid.0].draw_owned(m.id, r);
                }
            }
        }
        for a in &self.annotations {
            a.draw(r);
        }
        for e in &self.extensions {
            e.draw(r);
        }
        Ok(())
    }

    /// Objects under a point, most specific first, ending with the
    /// document. Empty outside the document.
    pub fn pick(&self, x: f64, y: f64) -> Vec<ObjRef> {
        if !self.rect.contains(x, y) {
            return Vec::new();
        }
        if self.header.as_ref().is_some_and(|h| h.hit(x, y)) {
            return vec![ObjRef::Header, ObjRef::Document];
        }
        let Some(row) = self.rows.iter().find(|r| r.hit(x, y)) else {
            return vec![ObjRef::Document];
        };
        let mut chain = self.pick_in_row(row, x, y);
        chain.push(ObjRef::Row(row.id));
        chain.push(ObjRef::Document);
        chain
    }

    fn pick_in_row(&self, row: &Row, x: f64, y: f64) -> Vec<ObjRef> {
        for &mid in &row.measures {
            let m = &self.measures[mid.0];
            for &cid in &m.columns {
                for sid in self.columns[cid.0].symbols() {
                    if self.symbols[sid.0].hit(x, y) {
                        return vec![ObjRef::Symbol(sid), ObjRef::Column(cid), ObjRef::Measure(mid)];
                    }
                }
            }
            for &bid in &m.beams {
                if self.beams[bid.0].hit(x, y) {
                    return vec![ObjRef::Beam(bid), ObjRef::Measure(mid)];
                }
            }
            for &aid in &m.arcs {
                let hit = self.arcs[aid.0]
                    .fragments()
                    .iter()
                    .any(|f| f.owner == mid && f.rect().contains(x, y));
                if hit {
                    return vec![ObjRef::Arc(aid), ObjRef::Measure(mid)];
                }
            }
        }
        for a in &self.annotations {
            if self.measures[a.measure.0].row == row.id && a.is_visible() && a.hit(x, y) {
                return vec![ObjRef::Annotation(a.id), ObjRef::Measure(a.measure)];
            }
        }
        for e in &self.extensions {
            if e.segments().iter().any(|s| s.row == row.id) && e.hit(x, y) {
                return vec![ObjRef::Extension(e.id), ObjRef::Measure(e.measure)];
            }
        }
        for &mid in &row.measures {
            let m = &self.measures[mid.0];
            if m.end_bar().hit(x, y) {
                return vec![ObjRef::BarLine(mid), ObjRef::Measure(mid)];
            }
            for &cid in &m.columns {
                if self.columns[cid.0].hit(x, y) {
                    return vec![ObjRef::Column(cid), ObjRef::Measure(mid)];
                }
            }
            if m.hit(x, y) {
                return vec![ObjRef::Measure(mid)];
            }
        }
        Vec::new()
    }

    /// Natural pitch under a point, on the nearest notation staff of the
    /// row. `None` before the first layout, off the measures, or on tab.
    pub fn pick_pitch(&self, x: f64, y: f64) -> Option<PitchPick> {
        let unit = self.unit?;
        let row = self.rows.iter().find(|r| r.hit(x, y))?;
        let measure = row.measures.iter().copied().find(|m| {
            let m = &self.measures[m.0];
            x >= m.x() && x <= m.x() + m.width()
        })?;
        let distance = |(i, top): (usize, f64)| {
            let bottom = top + self.staves[i].height(unit);
            if y < top {
                top - y
            } else if y > bottom {
                y - bottom
            } else {
                0.0
            }
        };
        let (staff, top) = row
            .staff_tops()
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| distance(*a).total_cmp(&distance(*b)))?;
        let def = &self.staves[staff];
        let position = def.position_at(y - top, unit);
        let note = def.note_at(position)?;
        Some(PitchPick { staff, measure, position, note })
    }
}

fn stem_direction(explicit: StemDir, voice_up: Option<bool>, mean_position: f64) -> bool {
    match explicit {
        StemDir::Up => true,
        StemDir::Down => false,
        StemDir::Auto => voice_up.unwrap_or(mean_position < 4.0),
    }
}

/// Outermost edge of the obstacles overlapping `x0..x1` on the side an
/// annotation stacks towards.
fn content_edge(obstacles: &[Rect], x0: f64, x1: f64, pos: VerticalPos) -> Option<f64> {
    let hits = obstacles.iter().filter(|r| r.left <= x1 && x0 <= r.right);
    match pos {
        VerticalPos::Above => hits.map(|r| r.top).reduce(f64::min),
        VerticalPos::Below => hits.map(|r| r.bottom).reduce(f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaffConfig, StaffKind};
    use pretty_assertions::assert_eq;

    fn doc(per_row: Option<usize>) -> Document {
        let mut config = LayoutConfig::default();
        config.measures_per_row = per_row;
        Document::new(config).unwrap()
    }

    fn row_sizes(d: &Document) -> Vec<usize> {
        d.rows().iter().map(|r| r.measures().len()).collect()
    }

    #[test]
    fn rows_fill_to_capacity() {
        let mut d = doc(Some(2));
        for _ in 0..5 {
            d.add_measure().unwrap();
        }
        assert_eq!(row_sizes(&d), vec![2, 2, 1]);
        let starts: Vec<bool> = d.measures().iter().map(|m| m.row_start).collect();
        assert_eq!(starts, vec![true, false, true, false, true]);
    }

    #[test]
    fn explicit_row_end_and_reflow() {
        let mut d = doc(None);
        d.add_measure().unwrap();
        d.add_measure().unwrap().end_row();
        d.add_measure().unwrap();
        assert_eq!(row_sizes(&d), vec![2, 1]);

        d.set_measures_per_row(Some(1)).unwrap();
        assert_eq!(row_sizes(&d), vec![1, 1, 1]);
        d.set_measures_per_row(None).unwrap();
        assert_eq!(row_sizes(&d), vec![2, 1]);
        assert!(d.set_measures_per_row(Some(0)).is_err());
    }

    #[test]
    fn no_trailing_empty_row() {
        let mut d = doc(Some(1));
        d.add_measure().unwrap().end_song();
        assert_eq!(d.rows().len(), 1);
    }

    #[test]
    fn signatures_are_inherited() {
        let mut d = doc(None);
        d.add_measure().unwrap().set_time_signature("3/4").unwrap();
        d.add_measure().unwrap().set_key_signature("D").unwrap();
        d.add_measure().unwrap();
        d.update().unwrap();
        let m = d.measures();
        assert_eq!(m[2].time_signature().to_string(), "3/4");
        assert_eq!(m[2].key_signature().fifths(), 2);
        assert!(m[0].show_time && !m[1].show_time);
        assert!(m[1].show_key && !m[2].show_key);
    }

    #[test]
    fn voices_sharing_a_staff_split_stems() {
        let mut d = doc(None);
        {
            let mut m = d.add_measure().unwrap();
            m.add_note(0, "C4", "2").unwrap();
            m.add_note(1, "C5", "2").unwrap();
        }
        d.update().unwrap();
        let s = d.symbols();
        assert!(s[0].stem_up());
        assert!(!s[1].stem_up());
    }

    #[test]
    fn unknown_voice_is_rejected() {
        let config = LayoutConfig::default().with_staves(vec![StaffConfig::new("s", StaffKind::Treble, &[0])]);
        let mut d = Document::new(config).unwrap();
        let err = d.add_measure().unwrap().add_note(2, "C4", "4").unwrap_err();
        assert!(err.to_string().contains("voice"), "{err}");
    }

    #[test]
    fn duplicate_group_is_rejected() {
        let mut d = doc(None);
        d.add_layout_group("all", &["staff"]).unwrap();
        assert!(d.add_layout_group("all", &["staff"]).is_err());
        assert!(d.add_layout_group("staff", &[]).is_err());
    }

    #[test]
    fn invalid_unit_size_fails() {
        let mut d = doc(None);
        d.add_measure().unwrap();
        assert!(d.layout(&Renderer::headless(0.0)).is_err());
        assert!(d.needs_layout());
    }

    #[test]
    fn edge_of_obstacles() {
        let obstacles = [Rect::new(0.0, 10.0, 100.0, 50.0), Rect::new(20.0, -5.0, 30.0, 60.0)];
        assert_eq!(content_edge(&obstacles, 40.0, 50.0, VerticalPos::Above), Some(10.0));
        assert_eq!(content_edge(&obstacles, 25.0, 50.0, VerticalPos::Above), Some(-5.0));
        assert_eq!(content_edge(&obstacles, 25.0, 50.0, VerticalPos::Below), Some(60.0));
        assert_eq!(content_edge(&obstacles, 200.0, 300.0, VerticalPos::Below), None);
    }
}
