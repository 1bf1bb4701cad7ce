//! Ties, slurs and slides, including arcs that cross a row break.

use pretty_assertions::assert_eq;
use scorelayout::engine::{ArcDirection, ArcKind, ArcSpan};
use scorelayout::{Document, LayoutConfig, MusicObject, Renderer, ScoreError};

const UNIT: f64 = 10.0;

/// Half notes G4 C5 | whole C5, with the C5s tied over the bar line.
fn tie_over_bar(per_row: usize) -> Document {
    let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(per_row)).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "G4", "2").unwrap();
        m.add_note(0, "C5", "2").unwrap();
        m.add_tie(ArcSpan::Notes(2)).unwrap();
    }
    doc.add_measure().unwrap().add_note(0, "C5", "1").unwrap();
    doc
}

#[test]
fn tie_inside_one_row() {
    let mut doc = tie_over_bar(4);
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    assert_eq!(doc.arcs().len(), 1);
    let arc = &doc.arcs()[0];
    assert_eq!(arc.kind, ArcKind::Tie);
    assert_eq!(arc.fragments().len(), 1);
    // Same row, different measures: the right measure draws it.
    assert_eq!(arc.fragments()[0].owner, doc.measures()[1].id);
    assert_eq!(doc.measures()[1].arcs(), &[arc.id]);
    assert!(doc.measures()[0].arcs().is_empty());
}

#[test]
fn tie_across_a_row_break_is_continuous() {
    let mut doc = tie_over_bar(1);
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    assert_eq!(doc.rows().len(), 2);

    let arc = &doc.arcs()[0];
    let frags = arc.fragments();
    assert_eq!(frags.len(), 2);
    let (left, right) = if frags[0].row == doc.rows()[0].id { (&frags[0], &frags[1]) } else { (&frags[1], &frags[0]) };
    assert_eq!(left.owner, doc.measures()[0].id);
    assert_eq!(right.owner, doc.measures()[1].id);

    let (row0, row1) = (&doc.rows()[0], &doc.rows()[1]);
    assert!((left.end.0 - row0.arcs_content_rect().right).abs() < 1e-6);
    assert!((right.start.0 - row1.arcs_content_rect().left).abs() < 1e-6);

    // Both halves meet at the same height relative to their staff.
    let l = left.end.1 - left.staff_top;
    let r = right.start.1 - right.staff_top;
    assert!((l - r).abs() < 1e-6, "{l} vs {r}");
    assert!(right.staff_top > left.staff_top);
}

#[test]
fn repeated_updates_rebuild_the_same_arcs() {
    let mut doc = tie_over_bar(1);
    doc.update().unwrap();
    let first: Vec<_> = doc.arcs().iter().map(|a| (a.id, a.left, a.right, a.up)).collect();
    for _ in 0..3 {
        doc.request_layout();
        doc.update().unwrap();
    }
    let again: Vec<_> = doc.arcs().iter().map(|a| (a.id, a.left, a.right, a.up)).collect();
    assert_eq!(again, first);
    assert_eq!(doc.measures()[0].arcs().len(), 1);
    assert_eq!(doc.measures()[1].arcs().len(), 1);
}

#[test]
fn tie_follows_matching_pitches() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_chord(0, &["C4", "E4", "G4"], "2").unwrap();
        m.add_tie(ArcSpan::Notes(2)).unwrap();
        m.add_chord(0, &["E4", "G4", "B4"], "2").unwrap();
    }
    doc.update().unwrap();
    let pairs: Vec<(usize, Option<usize>)> = doc.arcs().iter().map(|a| (a.left.1, a.right.map(|r| r.1))).collect();
    assert_eq!(pairs, vec![(1, Some(0)), (2, Some(1))]);
}

#[test]
fn right_anchor_not_yet_written_is_skipped() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C4", "2").unwrap();
        m.add_slur(ArcSpan::Notes(3), ArcDirection::Up).unwrap();
        m.add_note(0, "D4", "2").unwrap();
    }
    doc.update().unwrap();
    assert!(doc.arcs().is_empty());

    doc.add_measure().unwrap().add_note(0, "E4", "1").unwrap();
    doc.update().unwrap();
    assert_eq!(doc.arcs().len(), 1);
    assert!(doc.arcs()[0].up);
}

#[test]
fn huge_note_span_waits_for_its_anchor() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C4", "2").unwrap();
        m.add_slur(ArcSpan::Notes(usize::MAX), ArcDirection::Down).unwrap();
        m.add_note(0, "D4", "2").unwrap();
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    assert!(doc.arcs().is_empty());
}

#[test]
fn open_arcs_end_in_their_measure() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "A4", "2").unwrap();
        m.add_tie(ArcSpan::ToMeasureEnd).unwrap();
        m.add_note(0, "B4", "2").unwrap();
        m.add_slide(None, ArcSpan::Short).unwrap();
    }
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    assert_eq!(doc.arcs().len(), 2);
    let m = &doc.measures()[0];
    let tie = &doc.arcs()[0];
    assert!(tie.right.is_none());
    assert!((tie.fragments()[0].end.0 - m.content_right()).abs() < 1e-6);
    let slide = &doc.arcs()[1];
    assert_eq!(slide.kind, ArcKind::Slide);
    assert_eq!(slide.fragments()[0].height, 0.0);
}

#[test]
fn arc_over_two_row_breaks_is_rejected() {
    let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(1)).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C4", "1").unwrap();
        m.add_slur(ArcSpan::Notes(3), ArcDirection::Auto).unwrap();
    }
    doc.add_measure().unwrap().add_note(0, "D4", "1").unwrap();
    doc.add_measure().unwrap().add_note(0, "E4", "1").unwrap();

    let err = doc.layout(&Renderer::headless(UNIT)).unwrap_err();
    assert!(matches!(err, ScoreError::ArcSpansTooManyRows { from: 0, to: 2 }), "{err}");
    assert!(doc.needs_layout());

    // Two per row brings it back within one break.
    doc.set_measures_per_row(Some(2)).unwrap();
    doc.layout(&Renderer::headless(UNIT)).unwrap();
    assert_eq!(doc.arcs()[0].fragments().len(), 2);
}

#[test]
fn arc_to_itself_is_rejected() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C4", "1").unwrap();
        m.add_tie(ArcSpan::Notes(1)).unwrap();
    }
    assert!(matches!(doc.update(), Err(ScoreError::ArcWithoutEndpoint { measure: 0 })));
}

#[test]
fn arcs_are_drawn_once() {
    let mut doc = tie_over_bar(1);
    let svg = scorelayout::render_document_to_svg(&mut doc, UNIT).unwrap();
    // Two fragments, each outlined by two curves.
    assert_eq!(svg.matches(" C").count(), 4);
    assert!(doc.arcs()[0].rect().height() > 0.0);
}
