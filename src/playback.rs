//! Playback map: joins the laid-out measure and row positions with a
//! per-measure timemap so a player can move a cursor over the rendered
//! score.
//!
//! The cursor interpolates linearly through a measure's box:
//!   `cursor_x = measure.x + (offset / duration) * measure.width`
//!
//! Measures are timed in document order; repeats and jumps are not
//! unrolled here.

use serde::Serialize;
use tracing::debug;

use crate::engine::{Document, MusicObject};
use crate::error::Result;
use crate::renderer::Renderer;

/// Complete playback map combining visual positions with timing data.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackMap {
    /// Visual position of each measure.
    pub measures: Vec<MeasurePosition>,
    /// Visual position of each row.
    pub rows: Vec<RowPosition>,
    /// Timing of each measure, in document order.
    pub timemap: Vec<TimemapEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurePosition {
    pub measure_idx: usize,
    /// Left edge of the measure box.
    pub x: f64,
    pub width: f64,
    pub row_idx: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowPosition {
    pub y: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimemapEntry {
    pub measure_idx: usize,
    /// Start time in milliseconds.
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub tempo_bpm: f64,
    /// Time signature as (beats, beat type).
    pub time_sig: (u8, u8),
}

/// Where the playback cursor sits at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CursorPosition {
    pub measure_idx: usize,
    pub x: f64,
    pub y: f64,
    pub height: f64,
}

impl PlaybackMap {
    /// Total length of the timemap in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.timemap.last().map_or(0.0, |e| e.timestamp_ms + e.duration_ms)
    }

    /// Cursor for a time in ms. Times past the end park the cursor at the
    /// right edge of the last measure; negative times return `None`.
    pub fn cursor_at(&self, ms: f64) -> Option<CursorPosition> {
        if ms.is_nan() || ms < 0.0 {
            return None;
        }
        let entry = self
            .timemap
            .iter()
            .find(|e| ms < e.timestamp_ms + e.duration_ms)
            .or_else(|| self.timemap.last())?;
        let pos = self.measures.get(entry.measure_idx)?;
        let row = self.rows.get(pos.row_idx)?;
        let frac = if entry.duration_ms > 0.0 {
            ((ms - entry.timestamp_ms) / entry.duration_ms).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(CursorPosition {
            measure_idx: entry.measure_idx,
            x: pos.x + frac * pos.width,
            y: row.y,
            height: row.height,
        })
    }
}

/// Lay the document out with `r` and collect its playback map.
///
/// A first measure holding less than a full bar is treated as a pickup
/// and timed by its written content.
pub fn generate_playback_map(doc: &mut Document, r: &Renderer<'_>) -> Result<PlaybackMap> {
    doc.layout(r)?;

    let measures = doc
        .measures()
        .iter()
        .map(|m| MeasurePosition { measure_idx: m.index(), x: m.x(), width: m.width(), row_idx: m.row.index() })
        .collect();

    let rows = doc
        .rows()
        .iter()
        .map(|row| {
            let rect = row.rect();
            RowPosition { y: rect.top, height: rect.height() }
        })
        .collect();

    let mut timemap = Vec::with_capacity(doc.measures().len());
    let mut now = 0.0;
    for (i, m) in doc.measures().iter().enumerate() {
        let time = m.time_signature();
        let full = time.measure_ticks();
        let content = m.content_ticks();
        let ticks = if i == 0 && content > 0 && content < full {
            debug!(ticks = content, "pickup measure");
            content
        } else {
            full
        };
        let tempo = m.tempo();
        let duration_ms = ticks as f64 * tempo.ms_per_tick();
        timemap.push(TimemapEntry {
            measure_idx: m.index(),
            timestamp_ms: now,
            duration_ms,
            tempo_bpm: tempo.bpm,
            time_sig: (time.beats, time.beat_type),
        });
        now += duration_ms;
    }

    Ok(PlaybackMap { measures, rows, timemap })
}

/// Serialize a PlaybackMap to JSON.
pub fn playback_map_to_json(map: &PlaybackMap) -> Result<String> {
    Ok(serde_json::to_string(map)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map() -> PlaybackMap {
        PlaybackMap {
            measures: vec![
                MeasurePosition { measure_idx: 0, x: 10.0, width: 100.0, row_idx: 0 },
                MeasurePosition { measure_idx: 1, x: 110.0, width: 50.0, row_idx: 0 },
            ],
            rows: vec![RowPosition { y: 5.0, height: 40.0 }],
            timemap: vec![
                TimemapEntry { measure_idx: 0, timestamp_ms: 0.0, duration_ms: 2000.0, tempo_bpm: 120.0, time_sig: (4, 4) },
                TimemapEntry { measure_idx: 1, timestamp_ms: 2000.0, duration_ms: 1000.0, tempo_bpm: 120.0, time_sig: (2, 4) },
            ],
        }
    }

    #[test]
    fn cursor_interpolates_inside_measure() {
        let m = map();
        let c = m.cursor_at(500.0).unwrap();
        assert_eq!(c, CursorPosition { measure_idx: 0, x: 35.0, y: 5.0, height: 40.0 });
        let c = m.cursor_at(2500.0).unwrap();
        assert_eq!(c.measure_idx, 1);
        assert_eq!(c.x, 135.0);
    }

    #[test]
    fn cursor_parks_at_end() {
        let m = map();
        assert_eq!(m.duration_ms(), 3000.0);
        assert_eq!(m.cursor_at(9000.0).unwrap().x, 160.0);
        assert!(m.cursor_at(-1.0).is_none());
    }
}
