//! Score model: staves, chords, and the orders in which they are played.
//!
//! A score is loaded from JSON and validated once; after that every chord has
//! a known staff and a positive duration, so play heads built from it can rely
//! on strictly increasing end times.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse score: {0}")]
    Parse(#[from] serde_json::Error),

    /// Every chord must sit on a staff to be ordered for playback.
    #[error("Chord {0} has no staff index")]
    MissingStaffIndex(ChordId),

    #[error("Chord {chord} references staff {staff}, which is not in the score")]
    UnknownStaff { chord: ChordId, staff: StaffIndex },

    #[error("Chord {chord} has non-positive duration {beats} beats")]
    NonPositiveDuration { chord: ChordId, beats: f64 },

    #[error("Chord id {0} is used more than once")]
    DuplicateChord(ChordId),

    #[error("No chord with id {0}")]
    UnknownChord(ChordId),

    #[error("Tempo must be positive, got {0} bpm")]
    InvalidTempo(f64),

    #[error("Nothing to play")]
    EmptySequence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    pub staves: Vec<StaffSpec>,
    #[serde(default)]
    pub chords: Vec<ChordSpec>,
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

impl Score {
    pub fn load(path: &Path) -> Result<Self, ScoreError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ScoreError> {
        let score: Score = serde_json::from_str(text)?;
        score.validate()?;
        Ok(score)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if !(self.bpm > 0.0) {
            return Err(ScoreError::InvalidTempo(self.bpm));
        }
        let staves: HashSet<StaffIndex> = self.staves.iter().map(|s| s.index).collect();
        let mut seen = HashSet::new();
        for chord in &self.chords {
            if !seen.insert(chord.id.as_str()) {
                return Err(ScoreError::DuplicateChord(chord.id.clone()));
            }
            let staff = chord
                .staff_index
                .ok_or_else(|| ScoreError::MissingStaffIndex(chord.id.clone()))?;
            if !staves.contains(&staff) {
                return Err(ScoreError::UnknownStaff {
                    chord: chord.id.clone(),
                    staff,
                });
            }
            if !(chord.beats > 0.0) {
                return Err(ScoreError::NonPositiveDuration {
                    chord: chord.id.clone(),
                    beats: chord.beats,
                });
            }
        }
        Ok(())
    }

    pub fn beat_seconds(&self) -> f64 {
        beat_seconds(self.bpm)
    }

    pub fn chord(&self, id: &str) -> Result<&ChordSpec, ScoreError> {
        self.chords
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ScoreError::UnknownChord(id.to_string()))
    }

    /// `id` as it should sound: a copy with the staff's octave applied.
    pub fn playback_chord(&self, id: &str) -> Result<ChordSpec, ScoreError> {
        self.chord(id).map(|c| self.voiced(c))
    }

    /// Copy of `chord` with every note shifted into its staff's octave.
    fn voiced(&self, chord: &ChordSpec) -> ChordSpec {
        let shift = self
            .staves
            .iter()
            .find(|s| Some(s.index) == chord.staff_index)
            .map_or(0, StaffSpec::transpose);
        let mut voiced = chord.clone();
        for note in &mut voiced.notes {
            note.pitch = (note.pitch as i16 + shift).clamp(0, 127) as u8;
        }
        voiced
    }

    /// All chords, staff by staff, left to right, ready for playback.
    pub fn sheet_order(&self) -> Vec<ChordSpec> {
        let mut chords: Vec<ChordSpec> = self.chords.iter().map(|c| self.voiced(c)).collect();
        chords.sort_by(|a, b| {
            a.staff_index
                .cmp(&b.staff_index)
                .then(a.x.total_cmp(&b.x))
        });
        chords
    }

    /// One staff's chords, left to right, ready for playback.
    pub fn staff_order(&self, staff: StaffIndex) -> Vec<ChordSpec> {
        let mut chords: Vec<ChordSpec> = self
            .chords
            .iter()
            .filter(|c| c.staff_index == Some(staff))
            .map(|c| self.voiced(c))
            .collect();
        chords.sort_by(|a, b| a.x.total_cmp(&b.x));
        chords
    }

    /// Staves that have at least one chord, in index order.
    pub fn occupied_staves(&self) -> Vec<StaffIndex> {
        let mut staves: Vec<StaffIndex> = self.chords.iter().filter_map(|c| c.staff_index).collect();
        staves.sort_unstable();
        staves.dedup();
        staves
    }
}

/// A short two-staff phrase for trying the scheduler without a score file.
pub fn demo_score() -> Score {
    let chord = |id: &str, staff: StaffIndex, x: f64, beats: f64, pitches: &[u8]| ChordSpec {
        id: id.to_string(),
        staff_index: Some(staff),
        x,
        beats,
        notes: pitches
            .iter()
            .enumerate()
            .map(|(i, &p)| NoteSpec {
                id: format!("{}-n{}", id, i),
                pitch: p,
                accidental: Accidental::Natural,
            })
            .collect(),
    };

    Score {
        bpm: DEFAULT_BPM,
        staves: vec![
            StaffSpec { index: 0, clef: Some(Clef::Treble), octave: 4 },
            StaffSpec { index: 1, clef: Some(Clef::Bass), octave: 3 },
        ],
        chords: vec![
            chord("m1", 0, 40.0, 1.0, &[64]),
            chord("m2", 0, 80.0, 1.0, &[67]),
            chord("m3", 0, 120.0, 0.5, &[]),
            chord("m4", 0, 160.0, 1.5, &[72]),
            chord("b1", 1, 40.0, 2.0, &[60, 67]),
            chord("b2", 1, 120.0, 2.0, &[55, 62]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_score_is_valid() {
        demo_score().validate().unwrap();
    }

    #[test]
    fn test_sheet_order_sorts_by_staff_then_x() {
        let mut score = demo_score();
        score.chords.reverse();
        let ids: Vec<_> = score.sheet_order().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3", "m4", "b1", "b2"]);
    }

    #[test]
    fn test_staff_order_filters_one_staff() {
        let ids: Vec<_> = demo_score().staff_order(1).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
        assert!(demo_score().staff_order(5).is_empty());
    }

    #[test]
    fn test_staff_octave_shifts_playback_pitch() {
        let score = demo_score();
        let b1 = score.staff_order(1).remove(0);
        let pitches: Vec<u8> = b1.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![48, 55], "bass staff sounds an octave down");
        assert_eq!(score.chord("b1").unwrap().notes[0].pitch, 60, "written pitch untouched");

        let m1 = score.playback_chord("m1").unwrap();
        assert_eq!(m1.notes[0].pitch, 64, "reference octave plays as written");

        let mut high = score.clone();
        high.staves[0].octave = 6;
        assert_eq!(high.sheet_order()[0].notes[0].pitch, 88);
    }

    #[test]
    fn test_occupied_staves() {
        assert_eq!(demo_score().occupied_staves(), vec![0, 1]);
    }

    #[test]
    fn test_missing_staff_index_rejected() {
        let json = r#"{"staves":[{"index":0,"octave":4}],
                       "chords":[{"id":"c1","staff_index":null,"x":1.0}]}"#;
        let err = Score::from_json(json).unwrap_err();
        assert!(matches!(err, ScoreError::MissingStaffIndex(ref id) if id == "c1"), "got: {}", err);
    }

    #[test]
    fn test_unknown_staff_rejected() {
        let json = r#"{"staves":[{"index":0,"octave":4}],
                       "chords":[{"id":"c1","staff_index":3,"x":1.0}]}"#;
        let err = Score::from_json(json).unwrap_err();
        assert!(matches!(err, ScoreError::UnknownStaff { staff: 3, .. }));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let json = r#"{"staves":[{"index":0,"octave":4}],
                       "chords":[{"id":"c1","staff_index":0,"x":1.0,"beats":0.0}]}"#;
        assert!(matches!(
            Score::from_json(json),
            Err(ScoreError::NonPositiveDuration { .. })
        ));
    }

    #[test]
    fn test_duplicate_chord_rejected() {
        let json = r#"{"staves":[{"index":0,"octave":4}],
                       "chords":[{"id":"c1","staff_index":0,"x":1.0},
                                 {"id":"c1","staff_index":0,"x":2.0}]}"#;
        assert!(matches!(Score::from_json(json), Err(ScoreError::DuplicateChord(_))));
    }

    #[test]
    fn test_parse_error_reported() {
        let err = Score::from_json("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse score"));
    }

    #[test]
    fn test_beat_seconds_from_bpm() {
        let mut score = demo_score();
        score.bpm = 120.0;
        assert!((score.beat_seconds() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_chord_lookup() {
        assert!(demo_score().chord("m2").is_ok());
        assert!(matches!(demo_score().chord("zz"), Err(ScoreError::UnknownChord(_))));
    }
}
