use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ─── Identifiers ────────────────────────────────────────────────────────────

pub type ChordId = String;
pub type NoteId = String;
pub type StaffIndex = usize;

// ─── Score elements ─────────────────────────────────────────────────────────

/// Accidental applied to a single note.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Accidental {
    Flat,
    Sharp,
    #[default]
    Natural,
}

impl Accidental {
    pub fn semitones(self) -> i8 {
        match self {
            Accidental::Flat => -1,
            Accidental::Sharp => 1,
            Accidental::Natural => 0,
        }
    }
}

/// One notehead within a chord.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteSpec {
    pub id: NoteId,
    /// Written pitch as a MIDI note number in `REFERENCE_OCTAVE`, before
    /// accidentals and the staff's octave
    pub pitch: u8,
    #[serde(default)]
    pub accidental: Accidental,
}

impl NoteSpec {
    /// Pitch the engine should sound, accidental included.
    pub fn sounding_pitch(&self) -> u8 {
        (self.pitch as i16 + self.accidental.semitones() as i16).clamp(0, 127) as u8
    }
}

/// The atomic playable unit: simultaneous notes (or a rest) on one staff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChordSpec {
    pub id: ChordId,
    /// Staff the chord sits on. Required for playback ordering.
    pub staff_index: Option<StaffIndex>,
    /// Horizontal position on the staff; playback order within a staff.
    pub x: f64,
    /// Duration in beats
    #[serde(default = "default_beats")]
    pub beats: f64,
    /// Empty for a rest
    #[serde(default)]
    pub notes: Vec<NoteSpec>,
}

fn default_beats() -> f64 {
    1.0
}

impl ChordSpec {
    pub fn is_rest(&self) -> bool {
        self.notes.is_empty()
    }
}

impl fmt::Display for ChordSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let staff = match self.staff_index {
            Some(s) => s.to_string(),
            None => "-".to_string(),
        };
        if self.is_rest() {
            return write!(f, "{}[staff {} rest {:.2}b]", self.id, staff, self.beats);
        }
        let pitches: Vec<String> = self
            .notes
            .iter()
            .map(|n| n.sounding_pitch().to_string())
            .collect();
        write!(
            f,
            "{}[staff {} ({}) {:.2}b]",
            self.id,
            staff,
            pitches.join(" "),
            self.beats
        )
    }
}

/// Clef shown on a staff. Display only; playback ignores it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Clef {
    Treble,
    Bass,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffSpec {
    pub index: StaffIndex,
    #[serde(default)]
    pub clef: Option<Clef>,
    /// Octave the staff sounds in. Notes are written relative to
    /// `REFERENCE_OCTAVE` and shifted by whole octaves from there.
    #[serde(default = "default_octave")]
    pub octave: i8,
}

fn default_octave() -> i8 {
    REFERENCE_OCTAVE
}

impl StaffSpec {
    /// Semitone shift applied to every note on this staff.
    pub fn transpose(&self) -> i16 {
        (self.octave as i16 - REFERENCE_OCTAVE as i16) * 12
    }
}

// ─── Playback intent ────────────────────────────────────────────────────────

/// How a play head decides it is finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EndCondition {
    /// Walk every staff in sheet order, then stop.
    EndOfScore,
    /// Walk a single staff, then stop.
    EndOfStaff,
    /// Preview exactly one chord. Only these can be cancelled by chord id.
    SampleElement,
}

// ─── Engine messages ────────────────────────────────────────────────────────

pub type VoiceId = u64;

/// A booking handed back by the audio engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Voice {
    pub id: VoiceId,
    /// Audio-clock seconds
    pub start_time: f64,
    /// Audio-clock seconds at which the sound finishes
    pub end_time: f64,
}

/// What the scheduler side asks of the synth.
/// Serialized as one JSON object per line by the event logger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Play {
        voice: Voice,
        chord: ChordId,
        pitches: Vec<u8>,
    },
    Cancel {
        voice: VoiceId,
    },
}

/// One feedback sample: the chords sounding at `time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackFrame {
    pub time: f64,
    pub chords: Vec<ChordId>,
    /// Every note of every sounding chord, for note highlighting
    pub notes: Vec<NoteId>,
}

impl FeedbackFrame {
    pub fn from_chords(time: f64, chords: &[ChordSpec]) -> Self {
        Self {
            time,
            chords: chords.iter().map(|c| c.id.clone()).collect(),
            notes: chords
                .iter()
                .flat_map(|c| c.notes.iter().map(|n| n.id.clone()))
                .collect(),
        }
    }
}

impl fmt::Display for FeedbackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:>8.3}s  playing [{}]", self.time, self.chords.join(", "))
    }
}

// ─── Audio clock ────────────────────────────────────────────────────────────

/// Monotonic time source in seconds. Read-only and shared by every play head.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock for a playback session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SessionClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to. Drives offline runs and tests.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, time: f64) {
        self.bits.store(time.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Period of the scheduling pass.
pub const SCHEDULER_INTERVAL_MS: u64 = 25;
/// Lookahead window length. Must exceed the pass interval.
pub const SCHEDULER_LOOKAHEAD_MS: u64 = 100;
/// Feedback cadence, roughly one display frame at 60 Hz.
pub const FEEDBACK_FRAME_MS: u64 = 16;

pub const DEFAULT_BPM: f64 = 100.0;
/// Octave of middle C; a staff in this octave plays notes as written.
pub const REFERENCE_OCTAVE: i8 = 4;

/// Seconds per beat at the given tempo.
pub fn beat_seconds(bpm: f64) -> f64 {
    60.0 / bpm
}
