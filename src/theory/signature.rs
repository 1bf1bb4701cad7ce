//! Key signatures, time signatures and tempo marks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pitch::{Accidental, Clef, Step};
use super::rhythm::{NoteLength, Rhythm, TICKS_PER_WHOLE};
use crate::error::{Result, ScoreError};

const SHARP_ORDER: [Step; 7] = [Step::F, Step::C, Step::G, Step::D, Step::A, Step::E, Step::B];
const FLAT_ORDER: [Step; 7] = [Step::B, Step::E, Step::A, Step::D, Step::G, Step::C, Step::F];

// Positions above the bottom line of a treble staff.
const SHARP_POSITIONS: [i32; 7] = [8, 5, 9, 6, 3, 7, 4];
const FLAT_POSITIONS: [i32; 7] = [4, 7, 3, 6, 2, 5, 1];

/// Number of sharps (positive) or flats (negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeySignature {
    fifths: i8,
}

impl KeySignature {
    pub fn new(fifths: i8) -> Result<Self> {
        if (-7..=7).contains(&fifths) {
            Ok(Self { fifths })
        } else {
            Err(ScoreError::invalid("key signature", fifths.to_string()))
        }
    }

    pub fn fifths(&self) -> i8 {
        self.fifths
    }

    pub fn accidental_count(&self) -> usize {
        self.fifths.unsigned_abs() as usize
    }

    /// Alteration implied by the signature for a step.
    pub fn alter_for(&self, step: Step) -> i32 {
        let n = self.accidental_count();
        if self.fifths > 0 && SHARP_ORDER[..n].contains(&step) {
            1
        } else if self.fifths < 0 && FLAT_ORDER[..n].contains(&step) {
            -1
        } else {
            0
        }
    }

    /// Accidentals to draw, with their staff position above the bottom line.
    pub fn staff_positions(&self, clef: Clef) -> Vec<(i32, Accidental)> {
        let n = self.accidental_count();
        let shift = clef.key_shift();
        if self.fifths > 0 {
            SHARP_POSITIONS[..n].iter().map(|p| (p + shift, Accidental::Sharp)).collect()
        } else {
            FLAT_POSITIONS[..n].iter().map(|p| (p + shift, Accidental::Flat)).collect()
        }
    }
}

impl FromStr for KeySignature {
    type Err = ScoreError;

    /// Parses a tonic with an optional `m` for minor: `G`, `Bb`, `F#m`.
    fn from_str(s: &str) -> Result<Self> {
        let fifths = match s.trim() {
            "Cb" | "Abm" => -7,
            "Gb" | "Ebm" => -6,
            "Db" | "Bbm" => -5,
            "Ab" | "Fm" => -4,
            "Eb" | "Cm" => -3,
            "Bb" | "Gm" => -2,
            "F" | "Dm" => -1,
            "C" | "Am" => 0,
            "G" | "Em" => 1,
            "D" | "Bm" => 2,
            "A" | "F#m" => 3,
            "E" | "C#m" => 4,
            "B" | "G#m" => 5,
            "F#" | "D#m" => 6,
            "C#" | "A#m" => 7,
            _ => return Err(ScoreError::invalid("key signature", s)),
        };
        KeySignature::new(fifths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
    /// Beam groups in beat-type units, e.g. `[2, 2, 3]` for 7/8.
    pub beam_grouping: Option<Vec<u8>>,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { beats: 4, beat_type: 4, beam_grouping: None }
    }
}

impl TimeSignature {
    pub fn new(beats: u8, beat_type: u8) -> Result<Self> {
        let valid_type = NoteLength::from_denominator(beat_type as u32).is_some() && beat_type <= 32;
        if beats == 0 || beats > 32 || !valid_type {
            return Err(ScoreError::invalid("time signature", format!("{beats}/{beat_type}")));
        }
        Ok(Self { beats, beat_type, beam_grouping: None })
    }

    /// Custom beam grouping; groups must add up to `beats`.
    pub fn with_beam_grouping(mut self, groups: &[u8]) -> Result<Self> {
        let sum: u32 = groups.iter().map(|&g| g as u32).sum();
        if groups.is_empty() || groups.contains(&0) || sum != self.beats as u32 {
            return Err(ScoreError::invalid("beam grouping", format!("{groups:?} in {self}")));
        }
        self.beam_grouping = Some(groups.to_vec());
        Ok(self)
    }

    pub fn measure_ticks(&self) -> u32 {
        self.beats as u32 * self.beat_unit_ticks()
    }

    fn beat_unit_ticks(&self) -> u32 {
        TICKS_PER_WHOLE / self.beat_type as u32
    }

    pub fn is_compound(&self) -> bool {
        self.beat_type == 8 && self.beats > 3 && self.beats % 3 == 0
    }

    /// Length of one felt beat (dotted quarter in compound meters).
    pub fn beat_ticks(&self) -> u32 {
        if self.is_compound() {
            3 * self.beat_unit_ticks()
        } else {
            self.beat_unit_ticks()
        }
    }

    /// Lengths of the spans inside which eighth notes are beamed together.
    pub fn beam_group_ticks(&self) -> Vec<u32> {
        let unit = self.beat_unit_ticks();
        if let Some(groups) = &self.beam_grouping {
            return groups.iter().map(|&g| g as u32 * unit).collect();
        }
        if self.beats == 4 && self.beat_type == 4 {
            return vec![2 * unit, 2 * unit];
        }
        let beat = self.beat_ticks();
        let count = (self.measure_ticks() / beat).max(1);
        vec![beat; count as usize]
    }
}

impl FromStr for TimeSignature {
    type Err = ScoreError;

    /// Parses `4/4`, `6/8`, `C`, `C|` and an optional grouping: `7/8:2-2-3`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScoreError::invalid("time signature", s);
        let (sig, grouping) = match s.trim().split_once(':') {
            Some((a, b)) => (a.trim(), Some(b.trim())),
            None => (s.trim(), None),
        };
        let ts = match sig {
            "C" => TimeSignature::new(4, 4)?,
            "C|" => TimeSignature::new(2, 2)?,
            _ => {
                let (b, t) = sig.split_once('/').ok_or_else(invalid)?;
                let beats: u8 = b.trim().parse().map_err(|_| invalid())?;
                let beat_type: u8 = t.trim().parse().map_err(|_| invalid())?;
                TimeSignature::new(beats, beat_type).map_err(|_| invalid())?
            }
        };
        match grouping {
            Some(g) => {
                let groups = g
                    .split('-')
                    .map(|p| p.trim().parse::<u8>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>>>()?;
                ts.with_beam_grouping(&groups)
            }
            None => Ok(ts),
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub bpm: f64,
    pub beat: Rhythm,
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0, beat: Rhythm::new(NoteLength::Quarter) }
    }
}

impl Tempo {
    pub fn new(bpm: f64, beat: Rhythm) -> Result<Self> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(ScoreError::invalid("tempo", bpm.to_string()));
        }
        Ok(Self { bpm, beat })
    }

    pub fn ms_per_tick(&self) -> f64 {
        60_000.0 / (self.bpm * self.beat.ticks() as f64)
    }

    /// Text such as `♩ = 120`.
    pub fn label(&self) -> String {
        let glyph = match self.beat.length {
            NoteLength::Whole => "\u{1D15D}",
            NoteLength::Half => "\u{1D15E}",
            NoteLength::Quarter => "\u{2669}",
            _ => "\u{266A}",
        };
        let dots = ".".repeat(self.beat.dots as usize);
        format!("{glyph}{dots} = {}", self.bpm.round())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_alterations() {
        let d: KeySignature = "D".parse().unwrap();
        assert_eq!(d.fifths(), 2);
        assert_eq!(d.alter_for(Step::F), 1);
        assert_eq!(d.alter_for(Step::C), 1);
        assert_eq!(d.alter_for(Step::G), 0);
        let eb: KeySignature = "Cm".parse().unwrap();
        assert_eq!(eb.alter_for(Step::A), -1);
        assert_eq!(eb.staff_positions(Clef::Bass)[0], (2, Accidental::Flat));
        assert!("H".parse::<KeySignature>().is_err());
        assert!(KeySignature::new(8).is_err());
    }

    #[test]
    fn beam_groups_by_meter() {
        let q = 192;
        let common: TimeSignature = "4/4".parse().unwrap();
        assert_eq!(common.beam_group_ticks(), vec![2 * q, 2 * q]);
        let waltz: TimeSignature = "3/4".parse().unwrap();
        assert_eq!(waltz.beam_group_ticks(), vec![q, q, q]);
        let six: TimeSignature = "6/8".parse().unwrap();
        assert!(six.is_compound());
        assert_eq!(six.beam_group_ticks(), vec![288, 288]);
        let seven: TimeSignature = "7/8:2-2-3".parse().unwrap();
        assert_eq!(seven.beam_group_ticks(), vec![192, 192, 288]);
        assert_eq!("C|".parse::<TimeSignature>().unwrap().measure_ticks(), 768);
    }

    #[test]
    fn time_signature_errors_name_the_value() {
        for bad in ["4/5", "x/4", "0/4", "7/8:2-2", "44"] {
            let err = bad.parse::<TimeSignature>().unwrap_err().to_string();
            assert!(err.contains(bad.split(':').next().unwrap_or(bad)) || err.contains("beam grouping"), "{err}");
        }
    }

    #[test]
    fn tempo_timing() {
        let t = Tempo::default();
        assert!((t.ms_per_tick() * 192.0 - 500.0).abs() < 1e-9);
        assert!(Tempo::new(0.0, Rhythm::new(NoteLength::Quarter)).is_err());
        assert_eq!(t.label(), "\u{2669} = 120");
    }
}
