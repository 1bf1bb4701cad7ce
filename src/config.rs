//! Document layout configuration.
//!
//! Lengths are in unit sizes so a configuration stays valid when the
//! renderer's scale changes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};

/// Number of voices a measure can hold.
pub const MAX_VOICES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaffKind {
    Treble,
    Bass,
    GuitarTreble,
    Tab,
}

impl FromStr for StaffKind {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "treble" => Ok(StaffKind::Treble),
            "bass" => Ok(StaffKind::Bass),
            "guitar-treble" | "guitar" => Ok(StaffKind::GuitarTreble),
            "tab" => Ok(StaffKind::Tab),
            _ => Err(ScoreError::invalid("staff kind", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffConfig {
    pub name: String,
    pub kind: StaffKind,
    /// Tuning name for tab staves (`standard` when absent).
    #[serde(default)]
    pub tuning: Option<String>,
    /// Voices drawn on this staff.
    #[serde(default)]
    pub voices: Vec<usize>,
}

impl StaffConfig {
    pub fn new(name: &str, kind: StaffKind, voices: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            tuning: None,
            voices: voices.to_vec(),
        }
    }

    pub fn with_tuning(mut self, tuning: &str) -> Self {
        self.tuning = Some(tuning.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fixed row capacity; `None` breaks rows only on explicit row ends.
    pub measures_per_row: Option<usize>,
    /// Narrowest row width, in unit sizes.
    pub min_row_width: f64,
    /// Factor applied to each row's natural width before picking the
    /// common target width.
    pub row_width_factor: f64,
    /// Vertical gap between rows, in unit sizes.
    pub row_gap: f64,
    /// Padding added around each row's content, in unit sizes.
    pub row_padding: f64,
    pub staves: Vec<StaffConfig>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            measures_per_row: None,
            min_row_width: 60.0,
            row_width_factor: 1.25,
            row_gap: 3.0,
            row_padding: 1.0,
            staves: vec![StaffConfig::new("staff", StaffKind::Treble, &[0, 1, 2, 3])],
        }
    }
}

impl LayoutConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LayoutConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_measures_per_row(mut self, n: usize) -> Self {
        self.measures_per_row = Some(n);
        self
    }

    pub fn with_staves(mut self, staves: Vec<StaffConfig>) -> Self {
        self.staves = staves;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.staves.is_empty() {
            return Err(ScoreError::invalid("staff list", "[]"));
        }
        if self.measures_per_row == Some(0) {
            return Err(ScoreError::invalid("measures per row", "0"));
        }
        if !(self.row_width_factor.is_finite() && self.row_width_factor >= 1.0) {
            return Err(ScoreError::invalid("row width factor", self.row_width_factor.to_string()));
        }
        for (kind, value) in [
            ("min row width", self.min_row_width),
            ("row gap", self.row_gap),
            ("row padding", self.row_padding),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ScoreError::invalid(kind, value.to_string()));
            }
        }
        for (i, staff) in self.staves.iter().enumerate() {
            if self.staves[..i].iter().any(|s| s.name == staff.name) {
                return Err(ScoreError::invalid("staff name", staff.name.clone()));
            }
            if let Some(v) = staff.voices.iter().find(|&&v| v >= MAX_VOICES) {
                return Err(ScoreError::invalid("voice", v.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_json_fills_defaults() {
        let json = r#"{
            "measures_per_row": 2,
            "staves": [
                { "name": "guitar", "kind": "guitar-treble", "voices": [0] },
                { "name": "tab", "kind": "tab", "tuning": "drop-d", "voices": [0] }
            ]
        }"#;
        let config = LayoutConfig::from_json(json).unwrap();
        assert_eq!(config.measures_per_row, Some(2));
        assert_eq!(config.staves[1].kind, StaffKind::Tab);
        assert_eq!(config.staves[1].tuning.as_deref(), Some("drop-d"));
        assert_eq!(config.row_gap, LayoutConfig::default().row_gap);
    }

    #[test]
    fn config_rejects_bad_values() {
        let err = LayoutConfig::from_json(r#"{ "staves": [{ "name": "a", "kind": "alto" }] }"#).unwrap_err();
        assert!(err.to_string().starts_with("config error"), "{err}");

        let dup = LayoutConfig::default().with_staves(vec![
            StaffConfig::new("a", StaffKind::Treble, &[0]),
            StaffConfig::new("a", StaffKind::Bass, &[1]),
        ]);
        assert!(dup.validate().unwrap_err().to_string().contains("\"a\""));
        assert!("viola".parse::<StaffKind>().is_err());
    }

    #[test]
    fn config_rejects_negative_or_nan_distances() {
        let err = LayoutConfig::from_json(r#"{ "row_gap": -2.0 }"#).unwrap_err();
        assert!(err.to_string().contains("row gap"), "{err}");

        let config = LayoutConfig { min_row_width: f64::NAN, ..LayoutConfig::default() };
        assert!(config.validate().unwrap_err().to_string().contains("min row width"));
        let config = LayoutConfig { row_padding: f64::INFINITY, ..LayoutConfig::default() };
        assert!(config.validate().is_err());
        assert!(LayoutConfig::default().validate().is_ok());
    }
}
