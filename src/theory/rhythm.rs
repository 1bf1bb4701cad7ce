//! Note lengths and rhythmic durations in ticks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};

/// Ticks in a whole note. Divisible by 3 down to sixty-fourth triplets.
pub const TICKS_PER_WHOLE: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NoteLength {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl NoteLength {
    pub const ALL: [NoteLength; 7] = [
        NoteLength::Whole,
        NoteLength::Half,
        NoteLength::Quarter,
        NoteLength::Eighth,
        NoteLength::Sixteenth,
        NoteLength::ThirtySecond,
        NoteLength::SixtyFourth,
    ];

    pub fn ticks(self) -> u32 {
        TICKS_PER_WHOLE >> (self as u32)
    }

    pub fn denominator(self) -> u32 {
        1 << (self as u32)
    }

    pub fn from_denominator(d: u32) -> Option<NoteLength> {
        NoteLength::ALL.iter().copied().find(|l| l.denominator() == d)
    }

    /// Flags on an unbeamed stem, beams when beamed.
    pub fn flag_count(self) -> u8 {
        match self {
            NoteLength::Whole | NoteLength::Half | NoteLength::Quarter => 0,
            NoteLength::Eighth => 1,
            NoteLength::Sixteenth => 2,
            NoteLength::ThirtySecond => 3,
            NoteLength::SixtyFourth => 4,
        }
    }

    pub fn has_stem(self) -> bool {
        self != NoteLength::Whole
    }

    pub fn is_filled(self) -> bool {
        self >= NoteLength::Quarter
    }
}

/// Length plus dots and triplet flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rhythm {
    pub length: NoteLength,
    pub dots: u8,
    pub triplet: bool,
}

impl Rhythm {
    pub fn new(length: NoteLength) -> Self {
        Self { length, dots: 0, triplet: false }
    }

    pub fn dotted(mut self, dots: u8) -> Self {
        self.dots = dots;
        self
    }

    pub fn triplet(mut self) -> Self {
        self.triplet = true;
        self
    }

    pub fn ticks(&self) -> u32 {
        let base = self.length.ticks();
        let mut total = base;
        let mut add = base;
        for _ in 0..self.dots {
            add /= 2;
            total += add;
        }
        if self.triplet {
            total * 2 / 3
        } else {
            total
        }
    }

    pub fn flag_count(&self) -> u8 {
        self.length.flag_count()
    }

    /// Rests that fill `ticks`: the fewest rests, triplets first, then
    /// plain lengths longest first. Leftovers that no combination can
    /// express (odd dotted remainders) are returned as the second value.
    pub fn fill(ticks: u32) -> (Vec<Rhythm>, u32) {
        (0..=ticks)
            .find_map(|left| Rhythm::fill_exact(ticks - left).map(|out| (out, left)))
            .unwrap_or_default()
    }

    fn fill_exact(ticks: u32) -> Option<Vec<Rhythm>> {
        let plain: Vec<Rhythm> = NoteLength::ALL.iter().map(|&l| Rhythm::new(l)).collect();
        let triplets: Vec<Rhythm> = plain.iter().map(|r| r.triplet()).collect();
        let unit = NoteLength::SixtyFourth.ticks();
        let step = Rhythm::new(NoteLength::SixtyFourth).triplet().ticks();

        let mut best: Option<Vec<Rhythm>> = None;
        for t in (0..=ticks).step_by(step as usize) {
            if (ticks - t) % unit != 0 {
                continue;
            }
            let mut out = greedy(t, &triplets);
            out.extend(greedy(ticks - t, &plain));
            if best.as_ref().map_or(true, |b| out.len() < b.len()) {
                best = Some(out);
            }
        }
        best
    }
}

/// Longest-first decomposition over `candidates`, sorted longest first.
/// Callers only pass totals the candidates divide.
fn greedy(mut ticks: u32, candidates: &[Rhythm]) -> Vec<Rhythm> {
    let mut out = Vec::new();
    while let Some(r) = candidates.iter().find(|r| r.ticks() <= ticks) {
        ticks -= r.ticks();
        out.push(*r);
    }
    out
}

impl From<NoteLength> for Rhythm {
    fn from(length: NoteLength) -> Self {
        Rhythm::new(length)
    }
}

impl FromStr for Rhythm {
    type Err = ScoreError;

    /// Parses a denominator with optional dots and a `t` triplet suffix:
    /// `4`, `8.`, `2..`, `8t`, `16.t`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScoreError::invalid("rhythm", s);
        let mut body = s.trim();
        let triplet = body.ends_with('t');
        if triplet {
            body = &body[..body.len() - 1];
        }
        let dots = body.chars().rev().take_while(|&c| c == '.').count();
        body = &body[..body.len() - dots];
        if dots > 2 {
            return Err(invalid());
        }
        let denominator: u32 = body.parse().map_err(|_| invalid())?;
        let length = NoteLength::from_denominator(denominator).ok_or_else(invalid)?;
        Ok(Rhythm { length, dots: dots as u8, triplet })
    }
}

impl fmt::Display for Rhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.length.denominator())?;
        for _ in 0..self.dots {
            f.write_str(".")?;
        }
        if self.triplet {
            f.write_str("t")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks() {
        assert_eq!(NoteLength::Quarter.ticks(), 192);
        assert_eq!(NoteLength::SixtyFourth.ticks(), 12);
        assert_eq!("4.".parse::<Rhythm>().unwrap().ticks(), 288);
        assert_eq!("2..".parse::<Rhythm>().unwrap().ticks(), 672);
        assert_eq!("8t".parse::<Rhythm>().unwrap().ticks(), 64);
        assert_eq!(Rhythm::new(NoteLength::Eighth).triplet().to_string(), "8t");
    }

    #[test]
    fn rejects_unknown_rhythms() {
        for bad in ["3", "4...", "", "q", "128"] {
            let err = bad.parse::<Rhythm>().unwrap_err();
            assert!(err.to_string().contains("invalid rhythm"), "{bad}: {err}");
        }
    }

    #[test]
    fn fill_three_quarters() {
        let (rests, left) = Rhythm::fill(3 * 192);
        assert_eq!(left, 0);
        assert_eq!(
            rests,
            vec![Rhythm::new(NoteLength::Half), Rhythm::new(NoteLength::Quarter)]
        );
    }

    #[test]
    fn fill_after_triplets_is_exact() {
        for written in ["4t", "8t", "16t", "2t"] {
            let used = written.parse::<Rhythm>().unwrap().ticks();
            let (rests, left) = Rhythm::fill(TICKS_PER_WHOLE - used);
            assert_eq!(left, 0, "after {written}");
            assert_eq!(rests.iter().map(Rhythm::ticks).sum::<u32>() + used, TICKS_PER_WHOLE);
        }
        let (rests, _) = Rhythm::fill(TICKS_PER_WHOLE - 64);
        assert!(rests[0].triplet);
    }

    #[test]
    fn fill_reports_what_cannot_be_expressed() {
        let (rests, left) = Rhythm::fill(18 + 3);
        assert_eq!(left, 1);
        assert_eq!(rests.iter().map(Rhythm::ticks).sum::<u32>(), 20);
    }
}
