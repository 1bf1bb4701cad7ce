//! Playback map tests: measure boxes, row positions and the timemap a
//! player uses to move its cursor.

use pretty_assertions::assert_eq;
use scorelayout::playback::playback_map_to_json;
use scorelayout::{generate_playback_map, Document, LayoutConfig, Renderer};

fn song() -> Document {
    let mut doc = Document::new(LayoutConfig::default().with_measures_per_row(2)).unwrap();
    {
        // Pickup: one quarter before the first full bar.
        let mut m = doc.add_measure().unwrap();
        m.set_time_signature("3/4").unwrap();
        m.set_tempo(120.0, "4").unwrap();
        m.add_note(0, "G4", "4").unwrap();
    }
    for _ in 0..2 {
        let mut m = doc.add_measure().unwrap();
        m.add_note(0, "C5", "2.").unwrap();
    }
    {
        let mut m = doc.add_measure().unwrap();
        m.set_tempo(60.0, "4").unwrap();
        m.add_note(0, "E5", "2.").unwrap();
        m.end_song();
    }
    doc
}

#[test]
fn playback_map_positions_and_timing() {
    let mut doc = song();
    let pmap = generate_playback_map(&mut doc, &Renderer::headless(10.0)).unwrap();

    assert_eq!(pmap.measures.len(), 4, "one position per measure");
    assert_eq!(pmap.rows.len(), 2);
    assert_eq!(pmap.timemap.len(), 4);

    for m in &pmap.measures {
        assert!(m.width > 0.0, "measure {} should have a width", m.measure_idx);
        assert!(m.row_idx < pmap.rows.len());
    }
    assert!(pmap.rows[1].y > pmap.rows[0].y);

    let durations: Vec<f64> = pmap.timemap.iter().map(|e| e.duration_ms.round()).collect();
    assert_eq!(durations, vec![500.0, 1500.0, 1500.0, 3000.0]);
    let starts: Vec<f64> = pmap.timemap.iter().map(|e| e.timestamp_ms.round()).collect();
    assert_eq!(starts, vec![0.0, 500.0, 2000.0, 3500.0]);
    assert_eq!(pmap.timemap[3].tempo_bpm, 60.0);
    assert_eq!(pmap.timemap[2].time_sig, (3, 4));
    assert!((pmap.duration_ms() - 6500.0).abs() < 1e-6);
}

#[test]
fn cursor_moves_through_measure_boxes() {
    let mut doc = song();
    let pmap = generate_playback_map(&mut doc, &Renderer::headless(10.0)).unwrap();

    let start = pmap.cursor_at(500.5).unwrap();
    assert_eq!(start.measure_idx, 1);
    assert!((start.x - pmap.measures[1].x) < 1.0);

    let mid = pmap.cursor_at(1250.0).unwrap();
    let m = &pmap.measures[1];
    assert!((mid.x - (m.x + m.width / 2.0)).abs() < 1e-3);

    let later = pmap.cursor_at(5000.0).unwrap();
    assert_eq!(later.measure_idx, 3);
    assert_eq!(later.y, pmap.rows[1].y);
}

#[test]
fn playback_map_serializes_to_json() {
    let mut doc = song();
    let pmap = generate_playback_map(&mut doc, &Renderer::headless(10.0)).unwrap();
    let json = playback_map_to_json(&pmap).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["timemap"].as_array().map(Vec::len), Some(4));
    assert_eq!(value["measures"][0]["measure_idx"], 0);
    assert!(value["rows"][0]["height"].as_f64().unwrap() > 0.0);
}
