//! Drawing through the surface trait and the SVG backend.

use pretty_assertions::assert_eq;
use scorelayout::renderer::TextAnchor;
use scorelayout::{render_document_to_svg, DrawSurface, Document, Header, LayoutConfig, Renderer};

/// Surface that only counts what it is asked to draw.
#[derive(Default)]
struct Tally {
    lines: usize,
    ellipses: usize,
    paths: usize,
    texts: Vec<String>,
}

impl DrawSurface for Tally {
    fn line(&mut self, _: f64, _: f64, _: f64, _: f64, _: &str, _: f64) {
        self.lines += 1;
    }
    fn rect(&mut self, _: f64, _: f64, _: f64, _: f64, _: &str, _: &str, _: f64) {}
    fn ellipse(&mut self, _: f64, _: f64, _: f64, _: f64, _: bool, _: &str, _: f64) {
        self.ellipses += 1;
    }
    fn path(&mut self, _: &str, _: &str, _: &str, _: f64) {
        self.paths += 1;
    }
    fn text(&mut self, _: f64, _: f64, content: &str, _: f64, _: &str, _: TextAnchor) {
        self.texts.push(content.to_string());
    }
    fn image(&mut self, _: f64, _: f64, _: f64, _: f64, _: &str) {}
}

fn melody() -> Document {
    let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(2)).unwrap();
    doc.set_header(Header::new("Romance").with_composer("Anon."));
    {
        let mut m = doc.add_measure().unwrap();
        m.set_time_signature("3/4").unwrap();
        m.set_key_signature("G").unwrap();
        m.add_chord(0, &["B4", "D5"], "4").unwrap();
        m.add_note(0, "F#5", "4").unwrap();
        m.add_note(0, "G5", "4").unwrap();
    }
    {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "A5", "2.").unwrap();
        m.add_label("dolce", "staff", "below".parse().unwrap()).unwrap();
        m.end_song();
    }
    doc
}

#[test]
fn headless_draw_lays_out_without_output() {
    let mut doc = melody();
    let mut r = Renderer::headless(8.0);
    doc.draw(&mut r).unwrap();
    assert!(!doc.needs_layout());
    assert!(doc.rect().width() > 0.0);
}

#[test]
fn draw_reaches_the_surface() {
    let mut doc = melody();
    let mut tally = Tally::default();
    {
        let mut r = Renderer::new(8.0, &mut tally).with_line_width(1.0);
        doc.draw(&mut r).unwrap();
    }
    // Chord of two, three single notes and one augmentation dot.
    assert_eq!(tally.ellipses, 6);
    // Five staff lines, stems and bar lines.
    assert!(tally.lines >= 5 + 4 + 2);
    assert!(tally.texts.iter().any(|t| t == "Romance"));
    assert!(tally.texts.iter().any(|t| t == "dolce"));
}

#[test]
fn svg_output() {
    let mut doc = melody();
    let svg = render_document_to_svg(&mut doc, 10.0).unwrap();
    assert!(svg.starts_with("<svg"));
    assert!(svg.trim_end().ends_with("</svg>"));
    assert!(svg.contains(">Romance<"));
    assert!(svg.contains(">Anon.<"));
    assert!(svg.contains("<line"));
}

#[test]
fn empty_document_renders_a_placeholder() {
    let mut doc = Document::new(LayoutConfig::default()).unwrap();
    let svg = render_document_to_svg(&mut doc, 10.0).unwrap();
    assert!(svg.contains("Empty document"));
}

#[test]
fn config_round_trips_through_json() {
    let config = LayoutConfig::default().with_measures_per_row(3);
    let json = scorelayout::config_to_json(&config).unwrap();
    assert_eq!(LayoutConfig::from_json(&json).unwrap(), config);
}
