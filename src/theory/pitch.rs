//! Note names, accidentals, clefs and string tunings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub const ALL: [Step; 7] = [Step::C, Step::D, Step::E, Step::F, Step::G, Step::A, Step::B];

    /// Position within the octave, C = 0.
    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn semitone(self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    fn from_char(c: char) -> Option<Step> {
        match c.to_ascii_uppercase() {
            'C' => Some(Step::C),
            'D' => Some(Step::D),
            'E' => Some(Step::E),
            'F' => Some(Step::F),
            'G' => Some(Step::G),
            'A' => Some(Step::A),
            'B' => Some(Step::B),
            _ => None,
        }
    }

    fn letter(self) -> char {
        match self {
            Step::C => 'C',
            Step::D => 'D',
            Step::E => 'E',
            Step::F => 'F',
            Step::G => 'G',
            Step::A => 'A',
            Step::B => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accidental {
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

impl Accidental {
    pub fn alter(self) -> i32 {
        match self {
            Accidental::DoubleFlat => -2,
            Accidental::Flat => -1,
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::DoubleSharp => 2,
        }
    }

    /// Accidental that spells a chromatic alteration; `0` spells a natural.
    pub fn from_alter(alter: i32) -> Option<Accidental> {
        match alter {
            -2 => Some(Accidental::DoubleFlat),
            -1 => Some(Accidental::Flat),
            0 => Some(Accidental::Natural),
            1 => Some(Accidental::Sharp),
            2 => Some(Accidental::DoubleSharp),
            _ => None,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Accidental::DoubleFlat => "\u{266D}\u{266D}",
            Accidental::Flat => "\u{266D}",
            Accidental::Natural => "\u{266E}",
            Accidental::Sharp => "\u{266F}",
            Accidental::DoubleSharp => "\u{1D12A}",
        }
    }
}

/// A written note: step, optional accidental, octave (middle C = C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub step: Step,
    pub accidental: Option<Accidental>,
    pub octave: i32,
}

impl Note {
    pub fn new(step: Step, octave: i32) -> Self {
        Self { step, accidental: None, octave }
    }

    /// Natural note at a diatonic position.
    pub fn from_diatonic(id: i32) -> Self {
        let octave = id.div_euclid(7);
        let step = Step::ALL[id.rem_euclid(7) as usize];
        Self::new(step, octave)
    }

    /// Diatonic position, 7 per octave; C4 = 28.
    pub fn diatonic(&self) -> i32 {
        self.octave * 7 + self.step.index()
    }

    pub fn alter(&self) -> i32 {
        self.accidental.map_or(0, Accidental::alter)
    }

    /// MIDI note number, C4 = 60.
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.step.semitone() + self.alter()
    }
}

impl FromStr for Note {
    type Err = ScoreError;

    /// Parses `C4`, `F#3`, `Bb2`, `Ebb5`, `G##4`, `En4`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScoreError::invalid("note", s);
        let mut chars = s.trim().chars().peekable();
        let step = chars.next().and_then(Step::from_char).ok_or_else(invalid)?;

        let mut acc = String::new();
        while let Some(&c) = chars.peek() {
            if c == '#' || c == 'b' || c == 'n' {
                acc.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let accidental = match acc.as_str() {
            "" => None,
            "#" => Some(Accidental::Sharp),
            "##" => Some(Accidental::DoubleSharp),
            "b" => Some(Accidental::Flat),
            "bb" => Some(Accidental::DoubleFlat),
            "n" => Some(Accidental::Natural),
            _ => return Err(invalid()),
        };

        let rest: String = chars.collect();
        let octave: i32 = rest.parse().map_err(|_| invalid())?;
        if !(-1..=9).contains(&octave) {
            return Err(invalid());
        }
        Ok(Note { step, accidental, octave })
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let acc = match self.accidental {
            None => "",
            Some(Accidental::DoubleFlat) => "bb",
            Some(Accidental::Flat) => "b",
            Some(Accidental::Natural) => "n",
            Some(Accidental::Sharp) => "#",
            Some(Accidental::DoubleSharp) => "##",
        };
        write!(f, "{}{}{}", self.step.letter(), acc, self.octave)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clef {
    Treble,
    Bass,
    /// Treble clef sounding an octave lower (guitar).
    GuitarTreble,
}

impl Clef {
    /// Diatonic position of the note that sits on the bottom staff line.
    pub fn bottom_line(self) -> i32 {
        match self {
            Clef::Treble => 30,       // E4
            Clef::GuitarTreble => 23, // E3
            Clef::Bass => 18,         // G2
        }
    }

    /// Offset applied to treble-clef key signature positions.
    pub(crate) fn key_shift(self) -> i32 {
        match self {
            Clef::Treble | Clef::GuitarTreble => 0,
            Clef::Bass => -2,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Clef::Treble | Clef::GuitarTreble => "\u{1D11E}",
            Clef::Bass => "\u{1D122}",
        }
    }
}

/// Open-string pitches of a fretted instrument, highest string first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tuning {
    pub name: String,
    pub strings: Vec<Note>,
}

impl Tuning {
    fn from_names(name: &str, low_to_high: &[&str]) -> Result<Self> {
        let mut strings = low_to_high
            .iter()
            .map(|s| s.parse::<Note>())
            .collect::<Result<Vec<_>>>()?;
        strings.reverse();
        Ok(Self { name: name.to_string(), strings })
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Pick a (string, fret) for each note, no string used twice.
    /// Preferred strings are honoured when playable; otherwise the string
    /// with the lowest fret wins.
    pub fn assign_frets(&self, notes: &[Note], preferred: &[Option<usize>]) -> Vec<Option<(usize, i32)>> {
        const MAX_FRET: i32 = 24;
        let mut used = vec![false; self.strings.len()];
        let mut out = vec![None; notes.len()];

        // Highest notes first so they land on the high strings.
        let mut order: Vec<usize> = (0..notes.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(notes[i].midi()));

        for i in order {
            let midi = notes[i].midi();
            let fret_on = |s: usize| midi - self.strings[s].midi();

            if let Some(Some(s)) = preferred.get(i) {
                if *s < self.strings.len() && !used[*s] && (0..=MAX_FRET).contains(&fret_on(*s)) {
                    used[*s] = true;
                    out[i] = Some((*s, fret_on(*s)));
                    continue;
                }
            }

            let best = (0..self.strings.len())
                .filter(|&s| !used[s] && (0..=MAX_FRET).contains(&fret_on(s)))
                .min_by_key(|&s| fret_on(s));
            if let Some(s) = best {
                used[s] = true;
                out[i] = Some((s, fret_on(s)));
            }
        }
        out
    }
}

impl FromStr for Tuning {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "guitar" => Tuning::from_names("standard", &["E2", "A2", "D3", "G3", "B3", "E4"]),
            "drop-d" | "drop d" => Tuning::from_names("drop-d", &["D2", "A2", "D3", "G3", "B3", "E4"]),
            "dadgad" => Tuning::from_names("dadgad", &["D2", "A2", "D3", "G3", "A3", "D4"]),
            "open-g" | "open g" => Tuning::from_names("open-g", &["D2", "G2", "D3", "G3", "B3", "D4"]),
            "bass" => Tuning::from_names("bass", &["E1", "A1", "D2", "G2"]),
            _ => Err(ScoreError::invalid("tuning", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_notes() {
        let n: Note = "F#3".parse().unwrap();
        assert_eq!(n.step, Step::F);
        assert_eq!(n.accidental, Some(Accidental::Sharp));
        assert_eq!(n.octave, 3);
        assert_eq!("C4".parse::<Note>().unwrap().midi(), 60);
        assert_eq!("Bb3".parse::<Note>().unwrap().midi(), 58);
        assert_eq!("C4".parse::<Note>().unwrap().diatonic(), 28);
        assert_eq!("Ebb5".parse::<Note>().unwrap().to_string(), "Ebb5");
    }

    #[test]
    fn reject_bad_notes() {
        for bad in ["", "H4", "C", "C#x4", "Cb#4", "C12"] {
            let err = bad.parse::<Note>().unwrap_err();
            assert!(err.to_string().contains("invalid note"), "{bad}: {err}");
        }
    }

    #[test]
    fn diatonic_round_trip() {
        let n = Note::from_diatonic(30);
        assert_eq!(n, Note::new(Step::E, 4));
        assert_eq!(Note::from_diatonic(-1), Note::new(Step::B, -1));
    }

    #[test]
    fn tunings() {
        let t: Tuning = "standard".parse().unwrap();
        assert_eq!(t.string_count(), 6);
        assert_eq!(t.strings[0].to_string(), "E4");
        assert!("banjo".parse::<Tuning>().unwrap_err().to_string().contains("banjo"));
    }

    #[test]
    fn fret_assignment_uses_each_string_once() {
        let t: Tuning = "standard".parse().unwrap();
        let chord: Vec<Note> = ["E2", "B2", "E3", "G#3", "B3", "E4"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let frets = t.assign_frets(&chord, &[None; 6]);
        let mut strings: Vec<usize> = frets.iter().map(|f| f.unwrap().0).collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), 6);
        // open high E
        assert_eq!(frets[5], Some((0, 0)));
    }
}
