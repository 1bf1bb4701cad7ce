//! Per-measure mutators.
//!
//! A [`MeasureEditor`] borrows the document for one measure. Symbols are
//! appended per voice at that voice's tick cursor; the column for the
//! tick is created on demand. Modifiers such as ties, stems and arpeggios
//! apply to the most recently appended symbol.

use std::str::FromStr;

use super::annotations::{Annotation, AnnotationAnchor, AnnotationKind, Extension, ExtensionSpan, Target, VerticalPos};
use super::arcs::{ArcDirection, ArcKind, ArcProps, ArcSpan};
use super::document::Document;
use super::measure::{MeasureEnd, Navigation, RhythmColumn};
use super::symbols::{NoteHead, StemDir, Symbol, SymbolKind};
use super::{AnnotationId, ColumnId, ExtensionId, MeasureId, SymbolId};
use crate::config::MAX_VOICES;
use crate::error::{Result, ScoreError};
use crate::theory::{KeySignature, Note, Rhythm, Tempo, TimeSignature};

pub struct MeasureEditor<'d> {
    doc: &'d mut Document,
    measure: MeasureId,
}

impl<'d> MeasureEditor<'d> {
    pub(crate) fn new(doc: &'d mut Document, measure: MeasureId) -> Self {
        Self { doc, measure }
    }

    pub fn id(&self) -> MeasureId {
        self.measure
    }

    // ── Rhythm content ──

    pub fn add_note(&mut self, voice: usize, note: &str, rhythm: &str) -> Result<SymbolId> {
        self.add_chord(voice, &[note], rhythm)
    }

    /// Notes sharing one stem; sorted bottom to top.
    pub fn add_chord(&mut self, voice: usize, notes: &[&str], rhythm: &str) -> Result<SymbolId> {
        let notes = notes.iter().map(|n| n.parse::<Note>()).collect::<Result<Vec<_>>>()?;
        let rhythm = rhythm.parse::<Rhythm>()?;
        self.add_notes(voice, notes, rhythm)
    }

    pub fn add_notes(&mut self, voice: usize, mut notes: Vec<Note>, rhythm: Rhythm) -> Result<SymbolId> {
        if notes.is_empty() {
            return Err(ScoreError::invalid("chord", "[]"));
        }
        notes.sort_by_key(|n| (n.diatonic(), n.alter()));
        let staff = self.doc.staff_for_voice(voice)?;
        let heads = notes
            .into_iter()
            .map(|n| {
                let mut head = NoteHead::new(n);
                head.position = self.doc.staff(staff).map_or(0, |s| s.position_of(&n));
                head
            })
            .collect();
        self.push_symbol(voice, staff, rhythm, SymbolKind::NoteGroup { heads, stem: StemDir::Auto, arpeggio: false })
    }

    pub fn add_rest(&mut self, voice: usize, rhythm: &str) -> Result<SymbolId> {
        let rhythm = rhythm.parse::<Rhythm>()?;
        let staff = self.doc.staff_for_voice(voice)?;
        self.push_symbol(voice, staff, rhythm, SymbolKind::Rest)
    }

    fn push_symbol(&mut self, voice: usize, staff: usize, rhythm: Rhythm, kind: SymbolKind) -> Result<SymbolId> {
        if voice >= MAX_VOICES {
            return Err(ScoreError::invalid("voice", voice.to_string()));
        }
        let doc = &mut *self.doc;
        let mid = self.measure;
        let tick = doc.measures[mid.0].voice_ticks[voice];

        let existing = doc.measures[mid.0]
            .columns
            .iter()
            .copied()
            .find(|c| doc.columns[c.0].tick == tick);
        let cid = match existing {
            Some(c) => c,
            None => {
                let cid = ColumnId(doc.columns.len());
                doc.columns.push(RhythmColumn::new(cid, mid, tick));
                let columns = &doc.columns;
                let m = &mut doc.measures[mid.0];
                let at = m.columns.partition_point(|c| columns[c.0].tick < tick);
                m.columns.insert(at, cid);
                cid
            }
        };

        let sid = SymbolId(doc.symbols.len());
        doc.symbols.push(Symbol::new(sid, mid, cid, voice, staff, rhythm, tick, kind));
        let col = &mut doc.columns[cid.0];
        col.symbols[voice] = Some(sid);
        col.needs_layout = true;
        let m = &mut doc.measures[mid.0];
        m.voice_ticks[voice] += rhythm.ticks();
        m.last_voice = voice;
        m.last_column = Some(cid);
        m.needs_layout = true;
        doc.request_layout();
        Ok(sid)
    }

    fn last_symbol(&self) -> Option<SymbolId> {
        let m = &self.doc.measures[self.measure.0];
        self.doc.columns[m.last_column?.0].symbol(m.last_voice)
    }

    /// The last appended symbol, which must be a note group.
    fn last_note_group(&mut self) -> Result<&mut Symbol> {
        let sid = self
            .last_symbol()
            .ok_or_else(|| ScoreError::invalid("note group", "none"))?;
        let sym = &mut self.doc.symbols[sid.0];
        if sym.is_rest() {
            return Err(ScoreError::invalid("note group", "rest"));
        }
        Ok(sym)
    }

    /// Fill the current voice with rests up to the end of the measure.
    pub fn fill_with_rests(&mut self) -> Result<&mut Self> {
        let voice = self.doc.measures[self.measure.0].last_voice;
        self.fill_voice(voice)?;
        Ok(self)
    }

    /// Fill every voice that has content; an empty measure gets a full
    /// rest in the first staff's first voice.
    pub fn complete_rests(&mut self) -> Result<&mut Self> {
        let m = &self.doc.measures[self.measure.0];
        let mut voices: Vec<usize> = (0..MAX_VOICES).filter(|&v| m.voice_ticks[v] > 0).collect();
        if voices.is_empty() {
            let first = self.doc.staves().first().and_then(|s| s.voices.first()).copied().unwrap_or(0);
            voices.push(first);
        }
        for v in voices {
            self.fill_voice(v)?;
        }
        Ok(self)
    }

    fn fill_voice(&mut self, voice: usize) -> Result<()> {
        let staff = self.doc.staff_for_voice(voice)?;
        let total = self.doc.time_at(self.measure).measure_ticks();
        let written = self.doc.measures[self.measure.0].voice_ticks(voice);
        let (rests, left) = Rhythm::fill(total.saturating_sub(written));
        if left > 0 {
            tracing::debug!(measure = self.measure.0, voice, ticks = left, "remainder too short for a rest");
        }
        for rhythm in rests {
            self.push_symbol(voice, staff, rhythm, SymbolKind::Rest)?;
        }
        Ok(())
    }

    // ── Modifiers of the last symbol ──

    pub fn set_stem(&mut self, dir: StemDir) -> Result<&mut Self> {
        if let SymbolKind::NoteGroup { stem, .. } = &mut self.last_note_group()?.kind {
            *stem = dir;
        }
        self.touch();
        Ok(self)
    }

    pub fn set_arpeggio(&mut self) -> Result<&mut Self> {
        if let SymbolKind::NoteGroup { arpeggio, .. } = &mut self.last_note_group()?.kind {
            *arpeggio = true;
        }
        self.touch();
        Ok(self)
    }

    /// Preferred tab string (0 = highest) for one note of the last chord.
    pub fn set_string(&mut self, note: usize, string: usize) -> Result<&mut Self> {
        let sym = self.last_note_group()?;
        let head = sym
            .heads_mut()
            .get_mut(note)
            .ok_or_else(|| ScoreError::invalid("note index", note.to_string()))?;
        head.string = Some(string);
        self.touch();
        Ok(self)
    }

    /// Tie every note of the last note group to the same pitch further on.
    pub fn add_tie(&mut self, span: ArcSpan) -> Result<&mut Self> {
        self.add_arc(ArcKind::Tie, None, span, ArcDirection::Auto)
    }

    pub fn add_slur(&mut self, span: ArcSpan, direction: ArcDirection) -> Result<&mut Self> {
        self.add_arc(ArcKind::Slur, None, span, direction)
    }

    pub fn add_slide(&mut self, note: Option<usize>, span: ArcSpan) -> Result<&mut Self> {
        self.add_arc(ArcKind::Slide, note, span, ArcDirection::Auto)
    }

    fn add_arc(&mut self, kind: ArcKind, note: Option<usize>, span: ArcSpan, direction: ArcDirection) -> Result<&mut Self> {
        let left = self.last_note_group()?.id;
        self.doc.arc_props.push(ArcProps { kind, measure: self.measure, left, note, span, direction });
        self.doc.request_layout();
        Ok(self)
    }

    fn touch(&mut self) {
        self.doc.measures[self.measure.0].needs_layout = true;
        self.doc.request_layout();
    }

    // ── Signatures ──

    pub fn set_key_signature(&mut self, key: &str) -> Result<&mut Self> {
        let key = KeySignature::from_str(key)?;
        self.doc.measures[self.measure.0].key = Some(key);
        self.touch();
        Ok(self)
    }

    pub fn set_time_signature(&mut self, time: &str) -> Result<&mut Self> {
        let time = TimeSignature::from_str(time)?;
        self.doc.measures[self.measure.0].time = Some(time);
        self.touch();
        Ok(self)
    }

    /// Set the tempo and show it above the first staff.
    pub fn set_tempo(&mut self, bpm: f64, beat: &str) -> Result<&mut Self> {
        let tempo = Tempo::new(bpm, beat.parse::<Rhythm>()?)?;
        let label = AnnotationKind::text(&tempo.label());
        let mid = self.measure;
        self.doc.measures[mid.0].tempo = Some(tempo);
        let mark = self.doc.measures[mid.0].tempo_mark;
        match mark {
            Some(id) => self.doc.annotations[id.0].kind = label,
            None => {
                let id = self.push_annotation(AnnotationAnchor::MeasureStart(mid), Target::Staff(0), VerticalPos::Above, label);
                self.doc.measures[mid.0].tempo_mark = Some(id);
            }
        }
        self.touch();
        Ok(self)
    }

    // ── Navigation and row structure ──

    /// Repeats change the bar lines; endings draw a bracket over the
    /// measure; the rest are text above the first staff.
    pub fn add_navigation(&mut self, nav: &str) -> Result<&mut Self> {
        let nav = Navigation::from_str(nav)?;
        let mid = self.measure;
        match &nav {
            Navigation::Ending(passes) => {
                let kind = AnnotationKind::Ending { passes: passes.clone() };
                self.push_annotation(AnnotationAnchor::Measure(mid), Target::Staff(0), VerticalPos::Above, kind);
            }
            other => {
                if let Some(text) = other.text() {
                    let anchor = if other.at_measure_end() {
                        AnnotationAnchor::MeasureEnd(mid)
                    } else {
                        AnnotationAnchor::MeasureStart(mid)
                    };
                    let kind = AnnotationKind::Text { text, italic: true };
                    self.push_annotation(anchor, Target::Staff(0), VerticalPos::Above, kind);
                }
            }
        }
        self.doc.measures[mid.0].navigation.push(nav);
        self.touch();
        Ok(self)
    }

    /// The next measure starts a new row.
    pub fn end_row(&mut self) -> &mut Self {
        self.set_end(MeasureEnd::Row)
    }

    /// Double bar line.
    pub fn end_section(&mut self) -> &mut Self {
        self.set_end(MeasureEnd::Section)
    }

    /// Final bar line; also ends the row.
    pub fn end_song(&mut self) -> &mut Self {
        self.set_end(MeasureEnd::Song)
    }

    fn set_end(&mut self, end: MeasureEnd) -> &mut Self {
        self.doc.measures[self.measure.0].end = Some(end);
        self.touch();
        self.doc.reflow();
        self
    }

    // ── Annotations ──

    fn anchor_here(&self) -> AnnotationAnchor {
        match self.doc.measures[self.measure.0].last_column {
            Some(c) => AnnotationAnchor::Column(c),
            None => AnnotationAnchor::MeasureStart(self.measure),
        }
    }

    fn push_annotation(&mut self, anchor: AnnotationAnchor, target: Target, position: VerticalPos, kind: AnnotationKind) -> AnnotationId {
        let id = AnnotationId(self.doc.annotations.len());
        self.doc.annotations.push(Annotation::new(id, self.measure, anchor, target, position, kind));
        self.doc.request_layout();
        id
    }

    /// Annotation at the last appended column, on a staff or layout group
    /// given by name.
    pub fn add_annotation(&mut self, kind: AnnotationKind, target: &str, position: VerticalPos) -> Result<AnnotationId> {
        let target = self.doc.resolve_target(target)?;
        let anchor = self.anchor_here();
        Ok(self.push_annotation(anchor, target, position, kind))
    }

    pub fn add_label(&mut self, text: &str, target: &str, position: VerticalPos) -> Result<AnnotationId> {
        self.add_annotation(AnnotationKind::text(text), target, position)
    }

    /// Image annotation; `size` in units, `None` while not decoded.
    pub fn add_image(&mut self, src: &str, size: Option<(f64, f64)>, target: &str, position: VerticalPos) -> Result<AnnotationId> {
        self.add_annotation(AnnotationKind::Image { src: src.to_string(), size }, target, position)
    }

    /// Decoded size for an image added earlier.
    pub fn set_image_size(&mut self, id: AnnotationId, w: f64, h: f64) -> Result<&mut Self> {
        let a = self
            .doc
            .annotations
            .get_mut(id.0)
            .ok_or_else(|| ScoreError::invalid("annotation", id.0.to_string()))?;
        match &mut a.kind {
            AnnotationKind::Image { size, .. } => *size = Some((w, h)),
            _ => return Err(ScoreError::invalid("image annotation", id.0.to_string())),
        }
        self.doc.request_layout();
        Ok(self)
    }

    /// Text label with a dashed line continuing from it, such as `rit.`
    /// or `8va`.
    pub fn add_extension(&mut self, text: &str, target: &str, position: VerticalPos, span: ExtensionSpan) -> Result<ExtensionId> {
        let label = self.add_annotation(AnnotationKind::Text { text: text.to_string(), italic: true }, target, position)?;
        let start = self.doc.measures[self.measure.0].last_column;
        let id = ExtensionId(self.doc.extensions.len());
        self.doc.extensions.push(Extension::new(id, label, self.measure, start, span));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::theory::TICKS_PER_WHOLE;
    use pretty_assertions::assert_eq;

    fn doc() -> Document {
        Document::new(LayoutConfig::default()).unwrap()
    }

    #[test]
    fn voices_share_columns_by_tick() {
        let mut d = doc();
        let mut m = d.add_measure().unwrap();
        m.add_note(0, "C5", "2").unwrap();
        m.add_note(0, "D5", "2").unwrap();
        m.add_note(1, "C4", "4").unwrap();
        m.add_note(1, "D4", "4").unwrap();
        m.add_note(1, "E4", "2").unwrap();
        let id = m.id();
        let measure = d.measure(id).unwrap();
        let ticks: Vec<u32> = measure.columns().iter().map(|c| d.column(*c).unwrap().tick).collect();
        assert_eq!(ticks, vec![0, 192, 384]);
        let first = d.column(measure.columns()[0]).unwrap();
        assert_eq!(first.symbols().count(), 2);
    }

    #[test]
    fn fill_with_rests_completes_the_voice() {
        let mut d = doc();
        let mut m = d.add_measure().unwrap();
        m.add_note(0, "G4", "4.").unwrap();
        m.fill_with_rests().unwrap();
        let id = m.id();
        assert_eq!(d.measure(id).unwrap().voice_ticks(0), TICKS_PER_WHOLE);
    }

    #[test]
    fn complete_rests_fills_empty_measure() {
        let mut d = doc();
        let mut m = d.add_measure().unwrap();
        m.set_time_signature("3/4").unwrap();
        m.complete_rests().unwrap();
        let id = m.id();
        assert_eq!(d.measure(id).unwrap().voice_ticks(0), 576);
    }

    #[test]
    fn modifiers_need_a_note_group() {
        let mut d = doc();
        let mut m = d.add_measure().unwrap();
        assert!(m.add_tie(ArcSpan::Notes(2)).is_err());
        m.add_rest(0, "4").unwrap();
        assert!(m.set_arpeggio().is_err());
        assert!(m.add_chord(0, &[], "4").is_err());
        m.add_chord(0, &["E4", "C4", "G4"], "4").unwrap();
        m.set_arpeggio().unwrap().set_stem(StemDir::Down).unwrap();
        let sym = &d.symbols()[1];
        let notes: Vec<String> = sym.heads().iter().map(|h| h.note.to_string()).collect();
        assert_eq!(notes, vec!["C4", "E4", "G4"]);
    }

    #[test]
    fn tempo_mark_is_replaced() {
        let mut d = doc();
        let mut m = d.add_measure().unwrap();
        m.set_tempo(90.0, "4").unwrap();
        m.set_tempo(100.0, "4").unwrap();
        assert_eq!(d.annotations().len(), 1);
        assert!(matches!(&d.annotations()[0].kind, AnnotationKind::Text { text, .. } if text.ends_with("100")));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut d = doc();
        let mut m = d.add_measure().unwrap();
        let err = m.add_label("dolce", "violin", VerticalPos::Below).unwrap_err();
        assert!(err.to_string().contains("violin"));
    }
}
