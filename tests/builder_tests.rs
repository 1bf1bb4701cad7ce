//! Building documents through the measure editor: beams, rests,
//! multi-staff groups, annotations and extension lines.

use pretty_assertions::assert_eq;
use scorelayout::engine::{AnnotationKind, BeamSegment, ExtensionSpan, VerticalPos};
use scorelayout::theory::TICKS_PER_WHOLE;
use scorelayout::{Document, LayoutConfig, MusicObject, Renderer, ScoreError, StaffConfig, StaffKind};

const UNIT: f64 = 10.0;

fn piano() -> Document {
    let config = LayoutConfig::default().with_staves(vec![
        StaffConfig::new("right", StaffKind::Treble, &[0]),
        StaffConfig::new("left", StaffKind::Bass, &[1]),
    ]);
    Document::new(config).unwrap()
}

#[test]
fn eight_eighths_make_two_beam_groups() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        for n in ["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"] {
            m.add_note(0, n, "8").unwrap();
        }
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();

    let beams = doc.beams();
    assert_eq!(beams.len(), 2);
    for beam in beams {
        assert_eq!(beam.symbols.len(), 4);
        assert_eq!(beam.segments, vec![BeamSegment::Full { level: 1, from: 0, to: 3 }]);
        assert_eq!(beam.lines().len(), 1);
    }
    let grouped: Vec<_> = doc.symbols().iter().map(|s| s.beam().map(|b| b.index())).collect();
    assert_eq!(grouped, vec![Some(0), Some(0), Some(0), Some(0), Some(1), Some(1), Some(1), Some(1)]);
    assert_eq!(doc.measures()[0].beams().len(), 2);
}

#[test]
fn triplet_eighths_carry_a_tuplet_number() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.set_time_signature("2/4").unwrap();
        for n in ["E4", "F4", "G4"] {
            m.add_note(0, n, "8t").unwrap();
        }
        m.add_note(0, "A4", "4").unwrap();
    }
    doc.update().unwrap();
    assert_eq!(doc.beams().len(), 1);
    assert!(doc.beams()[0].tuplet);
}

#[test]
fn beamed_stems_share_a_direction() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        // Low notes pull the group stems up even though the last is high.
        for n in ["C4", "D4", "E4", "D5"] {
            m.add_note(0, n, "8").unwrap();
        }
        m.fill_with_rests().unwrap();
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    let ups: Vec<bool> = doc.symbols()[..4].iter().map(|s| s.stem_up()).collect();
    assert_eq!(ups, vec![true; 4]);
}

#[test]
fn fill_with_rests_reaches_a_whole_measure() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    let id = {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C4", "8").unwrap();
        m.add_note(0, "D4", "16").unwrap();
        m.fill_with_rests().unwrap();
        m.id()
    };
    let measure = doc.measure(id).unwrap();
    assert_eq!(measure.voice_ticks(0), TICKS_PER_WHOLE);
    assert_eq!(TICKS_PER_WHOLE, 768);
    let rests = doc.symbols().iter().filter(|s| s.is_rest()).count();
    assert!(rests >= 2);
    let total: u32 = doc.symbols().iter().map(|s| s.duration()).sum();
    assert_eq!(total, 768);
}

#[test]
fn fill_with_rests_after_a_triplet() {
    for rhythm in ["4t", "8t"] {
        let mut doc = Document::new(LayoutConfig::default()).unwrap();
        let id = {
            let mut m = doc.add_measure().unwrap();
            m.add_note(0, "C4", rhythm).unwrap();
            m.fill_with_rests().unwrap();
            m.id()
        };
        assert_eq!(doc.measure(id).unwrap().voice_ticks(0), TICKS_PER_WHOLE, "after {rhythm}");
    }
}

#[test]
fn complete_rests_fills_every_written_voice() {
    let mut doc = piano();
    let id = {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "E5", "2").unwrap();
        m.add_note(1, "C3", "4").unwrap();
        m.complete_rests().unwrap();
        m.id()
    };
    let m = doc.measure(id).unwrap();
    assert_eq!((m.voice_ticks(0), m.voice_ticks(1)), (768, 768));
}

#[test]
fn group_fermata_clears_both_staves() {
    let mut doc = piano();
    doc.add_layout_group("piano", &["right", "left"]).unwrap();
    let fermata = {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C6", "1").unwrap();
        m.add_note(1, "C3", "1").unwrap();
        m.add_annotation(AnnotationKind::Fermata, "piano", VerticalPos::Above).unwrap()
    };
    doc.layout(&Renderer::headless(UNIT)).unwrap();

    let rect = doc.annotations()[fermata.index()].rect();
    let row = &doc.rows()[0];
    let top_staff = row.staff_rect(0).unwrap();
    let high_note = doc.symbols()[0].rect();
    assert!(rect.bottom <= top_staff.top);
    assert!(rect.bottom <= high_note.top, "fermata {rect:?} overlaps {high_note:?}");
    assert!(!rect.is_empty());
}

#[test]
fn nested_groups_and_cycles() {
    let mut doc = piano();
    doc.add_layout_group("upper", &["right"]).unwrap();
    doc.add_layout_group("all", &["upper", "left"]).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C5", "1").unwrap();
        m.add_label("cresc.", "all", VerticalPos::Below).unwrap();
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    let label = doc.annotations()[0].rect();
    let bass = doc.rows()[0].staff_rect(1).unwrap();
    assert!(label.top >= bass.bottom);

    doc.add_layout_group("a", &["b"]).unwrap();
    let b = doc.add_layout_group("b", &["a"]).unwrap();
    doc.measure_mut(doc.measures()[0].id).unwrap().add_label("x", "a", VerticalPos::Above).unwrap();
    assert!(matches!(doc.layout(&Renderer::headless(UNIT)), Err(ScoreError::LayoutGroupCycle(_))));

    doc.remove_layout_group(b).unwrap();
    assert!(matches!(doc.layout(&Renderer::headless(UNIT)), Err(ScoreError::UnknownGroupMember(name)) if name == "b"));
}

#[test]
fn staff_annotations_stack_outwards() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "G4", "1").unwrap();
        m.add_label("first", "staff", VerticalPos::Above).unwrap();
        m.add_label("second", "staff", VerticalPos::Above).unwrap();
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    let a = doc.annotations()[0].rect();
    let b = doc.annotations()[1].rect();
    assert!(b.bottom <= a.top);
}

#[test]
fn undecoded_image_degrades_to_nothing() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    let id = {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "G4", "1").unwrap();
        m.add_image("logo.png", None, "staff", VerticalPos::Below).unwrap()
    };
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    assert!(!doc.annotations()[id.index()].is_visible());

    let mid = doc.measures()[0].id;
    doc.measure_mut(mid).unwrap().set_image_size(id, 4.0, 2.0).unwrap();
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    let rect = doc.annotations()[id.index()].rect();
    assert!((rect.width() - 40.0).abs() < 1e-6);
    assert!((rect.height() - 20.0).abs() < 1e-6);
}

#[test]
fn extension_line_crosses_rows() {
    let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(1)).unwrap();
    let ext = {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C5", "2").unwrap();
        let ext = m.add_extension("rit.", "staff", VerticalPos::Below, ExtensionSpan::Measures(2)).unwrap();
        m.add_note(0, "B4", "2").unwrap();
        ext
    };
    doc.add_measure().unwrap().add_note(0, "A4", "1").unwrap();
    doc.layout(&Renderer::headless(UNIT)).unwrap();

    let segs = doc.extensions()[ext.index()].segments();
    assert_eq!(segs.len(), 2);
    assert_eq!(segs[0].row, doc.rows()[0].id);
    assert_eq!(segs[1].row, doc.rows()[1].id);
    let label = doc.annotations()[doc.extensions()[ext.index()].label.index()].rect();
    assert!(segs[0].x0 > label.right);
    // Same distance below the staff in both rows.
    let rel0 = segs[0].y - doc.rows()[0].staff_top(0);
    let rel1 = segs[1].y - doc.rows()[1].staff_top(0);
    assert!((rel0 - rel1).abs() < 1e-6);
}

#[test]
fn huge_extension_spans_stop_at_the_last_measure() {
    let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(1)).unwrap();
    let (by_measures, by_columns) = {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C5", "1").unwrap();
        let a = m.add_extension("rit.", "staff", VerticalPos::Below, ExtensionSpan::Measures(usize::MAX)).unwrap();
        let b = m.add_extension("", "staff", VerticalPos::Above, ExtensionSpan::Columns(usize::MAX)).unwrap();
        (a, b)
    };
    doc.add_measure().unwrap().add_note(0, "A4", "1").unwrap();
    doc.layout(&Renderer::headless(UNIT)).unwrap();

    for ext in [by_measures, by_columns] {
        let segs = doc.extensions()[ext.index()].segments();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].row, doc.rows()[1].id);
    }
    // A blank label is not drawn but its line is.
    let blank = doc.extensions()[by_columns.index()].label;
    assert!(!doc.annotations()[blank.index()].is_visible());
}

#[test]
fn navigation_marks() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_navigation("start-repeat").unwrap();
        m.add_navigation("segno").unwrap();
        m.add_note(0, "C5", "1").unwrap();
    }
    {
        let mut m = doc.add_measure().unwrap();
        m.add_navigation("ending:1").unwrap();
        m.add_navigation("end-repeat:2").unwrap();
        m.add_note(0, "D5", "1").unwrap();
        m.end_song();
    }
    assert!(doc.add_measure().unwrap().add_navigation("da capo al nowhere").is_err());
    doc.layout(&Renderer::headless(UNIT)).unwrap();

    let kinds: Vec<&AnnotationKind> = doc.annotations().iter().map(|a| &a.kind).collect();
    assert!(matches!(kinds[0], AnnotationKind::Text { italic: true, .. }));
    assert!(matches!(kinds[1], AnnotationKind::Ending { passes } if passes == &vec![1]));
    assert_eq!(doc.measures()[0].navigation().len(), 2);
    // end_song closed the row, so the rejected measure landed in a new one.
    assert_eq!(doc.rows().len(), 2);
}

#[test]
fn tab_staff_picks_frets() {
    let config = LayoutConfig::default().with_staves(vec![
        StaffConfig::new("guitar", StaffKind::GuitarTreble, &[0]),
        StaffConfig::new("tab", StaffKind::Tab, &[1]).with_tuning("standard"),
    ]);
    let mut doc = Document::new(config).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "E4", "1").unwrap();
        m.add_note(1, "E4", "2").unwrap();
        m.add_note(1, "A3", "2").unwrap();
        m.set_string(0, 3).unwrap();
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    let tab: Vec<_> = doc.symbols().iter().filter(|s| s.staff == 1).collect();
    assert_eq!(tab[0].heads()[0].fret, Some((0, 0)));
    // A3 would sit at fret 2 on the G string; the D string was asked for.
    assert_eq!(tab[1].heads()[0].fret, Some((3, 7)));
}
