//! Shared layout constants, in unit sizes unless noted.

// ── Staff dimensions ────────────────────────────────────────────────
pub(crate) const STAFF_LINES: usize = 5;
pub(crate) const STAFF_HEIGHT: f64 = 4.0; // 5 lines, 4 spaces
pub(crate) const TAB_LINE_SPACING: f64 = 1.5;
pub(crate) const STAFF_GAP: f64 = 3.0; // minimum clearance between staves of a row
pub(crate) const STAFF_LINE_WIDTH: f64 = 0.08;

// ── Row header & signatures ─────────────────────────────────────────
pub(crate) const CLEF_WIDTH: f64 = 3.0;
pub(crate) const KEY_ACCIDENTAL_WIDTH: f64 = 1.0;
pub(crate) const TIME_SIG_WIDTH: f64 = 2.2;
pub(crate) const SIGNATURE_PAD: f64 = 0.6;

// ── Measure packing ─────────────────────────────────────────────────
pub(crate) const MEASURE_PAD_LEFT: f64 = 1.2;
pub(crate) const MEASURE_PAD_RIGHT: f64 = 1.0;
pub(crate) const COLUMN_MIN_SPACING: f64 = 1.2;
pub(crate) const COLUMN_QUARTER_SPACING: f64 = 2.4;
pub(crate) const BARLINE_WIDTH: f64 = 0.1;
pub(crate) const THICK_BARLINE_WIDTH: f64 = 0.45;
pub(crate) const REPEAT_BARLINE_SPACE: f64 = 1.6;

// ── Note dimensions ─────────────────────────────────────────────────
pub(crate) const NOTEHEAD_WIDTH: f64 = 1.3;
pub(crate) const NOTEHEAD_HEIGHT: f64 = 1.0;
pub(crate) const STEM_LENGTH: f64 = 3.5;
pub(crate) const STEM_WIDTH: f64 = 0.12;
pub(crate) const MIN_BEAMED_STEM: f64 = 2.5;
pub(crate) const BEAM_THICKNESS: f64 = 0.5;
pub(crate) const BEAM_SPACING: f64 = 0.75;
pub(crate) const BEAM_MAX_SLOPE: f64 = 0.25;
pub(crate) const PARTIAL_BEAM_LENGTH: f64 = 1.2;
pub(crate) const FLAG_WIDTH: f64 = 1.0;
pub(crate) const LEDGER_EXTEND: f64 = 0.4;
pub(crate) const DOT_GAP: f64 = 0.5;
pub(crate) const DOT_SPACING: f64 = 0.6;
pub(crate) const DOT_RADIUS: f64 = 0.18;
pub(crate) const ACCIDENTAL_WIDTH: f64 = 1.0;
pub(crate) const ACCIDENTAL_HEIGHT: f64 = 2.5;
pub(crate) const ACCIDENTAL_GAP: f64 = 0.2;
pub(crate) const ARPEGGIO_WIDTH: f64 = 0.8;
pub(crate) const FRET_DIGIT_WIDTH: f64 = 0.7;
pub(crate) const FRET_HEIGHT: f64 = 1.2;

// ── Arcs ────────────────────────────────────────────────────────────
pub(crate) const ARC_NOTEHEAD_GAP: f64 = 0.2;
pub(crate) const ARC_SHORT_LENGTH: f64 = 2.5;
pub(crate) const ARC_ENDPOINT_THICKNESS: f64 = 0.05;
pub(crate) const ARC_MID_THICKNESS: f64 = 0.15;

// ── Annotations ─────────────────────────────────────────────────────
pub(crate) const ANNOTATION_GAP: f64 = 0.5;
pub(crate) const FERMATA_WIDTH: f64 = 2.0;
pub(crate) const FERMATA_HEIGHT: f64 = 1.2;
pub(crate) const TEXT_SIZE: f64 = 1.6;
pub(crate) const ENDING_HEIGHT: f64 = 2.0;
pub(crate) const EXTENSION_GAP: f64 = 0.3;

// ── Header ──────────────────────────────────────────────────────────
pub(crate) const TITLE_SIZE: f64 = 3.0;
pub(crate) const CREDIT_SIZE: f64 = 1.6;

// ── Colors ──────────────────────────────────────────────────────────
pub(crate) const NOTE_COLOR: &str = "#1a1a1a";
pub(crate) const STAFF_COLOR: &str = "#555555";
pub(crate) const BARLINE_COLOR: &str = "#333333";
pub(crate) const ARC_COLOR: &str = "#1a1a1a";
pub(crate) const TEXT_COLOR: &str = "#1a1a1a";
pub(crate) const REST_COLOR: &str = "#1a1a1a";
pub(crate) const DEBUG_COLOR: &str = "#e0306080";
