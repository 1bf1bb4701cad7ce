//! Resolved staff definitions.
//!
//! Vertical positions on a staff are relative to its top line. A notation
//! staff is five lines one unit apart; a tab staff has one line per
//! string, spaced wider so fret numbers fit.

use crate::config::{StaffConfig, StaffKind};
use crate::error::Result;
use crate::renderer::constants::{STAFF_HEIGHT, STAFF_LINES, TAB_LINE_SPACING};
use crate::theory::{Clef, Note, Tuning};

#[derive(Debug, Clone)]
pub struct StaffDef {
    pub name: String,
    pub kind: StaffKind,
    pub clef: Option<Clef>,
    pub tuning: Option<Tuning>,
    pub voices: Vec<usize>,
}

impl StaffDef {
    pub(crate) fn from_config(config: &StaffConfig) -> Result<Self> {
        let (clef, tuning) = match config.kind {
            StaffKind::Treble => (Some(Clef::Treble), None),
            StaffKind::Bass => (Some(Clef::Bass), None),
            StaffKind::GuitarTreble => (Some(Clef::GuitarTreble), None),
            StaffKind::Tab => {
                let name = config.tuning.as_deref().unwrap_or("standard");
                (None, Some(name.parse::<Tuning>()?))
            }
        };
        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            clef,
            tuning,
            voices: config.voices.clone(),
        })
    }

    pub fn is_tab(&self) -> bool {
        self.tuning.is_some()
    }

    pub fn line_count(&self) -> usize {
        match &self.tuning {
            Some(t) => t.string_count(),
            None => STAFF_LINES,
        }
    }

    pub(crate) fn line_spacing(&self) -> f64 {
        if self.is_tab() {
            TAB_LINE_SPACING
        } else {
            1.0
        }
    }

    /// Distance from top to bottom line.
    pub fn height(&self, unit: f64) -> f64 {
        match &self.tuning {
            Some(t) => t.string_count().saturating_sub(1) as f64 * TAB_LINE_SPACING * unit,
            None => STAFF_HEIGHT * unit,
        }
    }

    pub(crate) fn line_y(&self, line: usize, unit: f64) -> f64 {
        line as f64 * self.line_spacing() * unit
    }

    /// Staff position of a note: diatonic steps above the bottom line.
    pub fn position_of(&self, note: &Note) -> i32 {
        let bottom = self.clef.map_or(Clef::Treble.bottom_line(), Clef::bottom_line);
        note.diatonic() - bottom
    }

    /// Nearest staff position to a staff-relative y.
    pub fn position_at(&self, y: f64, unit: f64) -> i32 {
        ((STAFF_HEIGHT * unit - y) / (unit / 2.0)).round() as i32
    }

    /// Natural note drawn at a staff position; `None` on tab staves.
    pub fn note_at(&self, position: i32) -> Option<Note> {
        self.clef.map(|c| Note::from_diatonic(c.bottom_line() + position))
    }
}

/// Staff-relative y of a notation staff position.
pub(crate) fn position_y(position: i32, unit: f64) -> f64 {
    (STAFF_HEIGHT - position as f64 * 0.5) * unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_on_treble_staff() {
        let staff = StaffDef::from_config(&StaffConfig::new("s", StaffKind::Treble, &[0])).unwrap();
        let e4: Note = "E4".parse().unwrap();
        let f5: Note = "F5".parse().unwrap();
        assert_eq!(staff.position_of(&e4), 0);
        assert_eq!(staff.position_of(&f5), 8);
        assert_eq!(position_y(8, 10.0), 0.0);
        assert_eq!(staff.position_at(40.0, 10.0), 0);
        assert_eq!(staff.note_at(2), Some("G4".parse().unwrap()));
    }

    #[test]
    fn tab_staff_uses_tuning() {
        let cfg = StaffConfig::new("tab", StaffKind::Tab, &[0]).with_tuning("bass");
        let staff = StaffDef::from_config(&cfg).unwrap();
        assert!(staff.is_tab());
        assert_eq!(staff.line_count(), 4);
        assert_eq!(staff.height(10.0), 45.0);
        assert!(staff.note_at(0).is_none());

        let bad = StaffConfig::new("tab", StaffKind::Tab, &[0]).with_tuning("sitar");
        assert!(StaffDef::from_config(&bad).unwrap_err().to_string().contains("sitar"));
    }
}
