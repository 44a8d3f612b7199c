use crate::engine::AudioEngine;
use crate::score::ScoreError;
use crate::types::*;
use log::{debug, trace};
use std::sync::Arc;

/// A cursor over a sequence of chords, as driven by the scheduler.
///
/// Lifecycle: unstarted (`end_time() == None`) → active after `play_current()`
/// → exhausted once `next()` returns false, or stopped after `stop()`.
pub trait PlayHead: Send {
    /// The chord currently due, `None` once exhausted.
    fn current_chord(&self) -> Option<&ChordSpec>;

    /// Audio-clock seconds at which the current chord finishes.
    /// `None` until the head has been started.
    fn end_time(&self) -> Option<f64>;

    fn end_condition(&self) -> EndCondition;

    /// Book the current chord to start now.
    fn play_current(&mut self);

    /// Book the following chord to start when the current one ends.
    /// Returns false when there is nothing left to play.
    fn next(&mut self) -> bool;

    /// Cancel everything this head has booked. Idempotent.
    fn stop(&mut self);
}

/// Play head that walks a fixed list of chords back to back.
pub struct SequencePlayHead {
    chords: Vec<ChordSpec>,
    index: usize,
    end_condition: EndCondition,
    beat_seconds: f64,
    engine: Arc<dyn AudioEngine>,
    clock: Arc<dyn AudioClock>,
    end_time: Option<f64>,
    /// Bookings that may still be sounding
    voices: Vec<Voice>,
    stopped: bool,
}

impl SequencePlayHead {
    /// `chords` is played in the given order. A `SampleElement` head keeps
    /// only the first chord.
    pub fn new(
        mut chords: Vec<ChordSpec>,
        end_condition: EndCondition,
        beat_seconds: f64,
        engine: Arc<dyn AudioEngine>,
        clock: Arc<dyn AudioClock>,
    ) -> Result<Self, ScoreError> {
        if chords.is_empty() {
            return Err(ScoreError::EmptySequence);
        }
        if end_condition == EndCondition::SampleElement {
            chords.truncate(1);
        }
        Ok(Self {
            chords,
            index: 0,
            end_condition,
            beat_seconds,
            engine,
            clock,
            end_time: None,
            voices: Vec::new(),
            stopped: false,
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Books `chords[index]` at `start` and records its end time.
    fn book(&mut self, start: f64) {
        let chord = &self.chords[self.index];
        let duration = chord.beats * self.beat_seconds;
        let end = if chord.is_rest() {
            start + duration
        } else {
            let voice = self.engine.commit(chord, start, duration);
            self.voices.push(voice);
            voice.end_time
        };
        trace!("{} booked {:.3}s → {:.3}s", chord.id, start, end);
        self.end_time = Some(end);
    }
}

impl PlayHead for SequencePlayHead {
    fn current_chord(&self) -> Option<&ChordSpec> {
        self.chords.get(self.index)
    }

    fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    fn end_condition(&self) -> EndCondition {
        self.end_condition
    }

    fn play_current(&mut self) {
        if self.stopped || self.index >= self.chords.len() {
            return;
        }
        let now = self.clock.now();
        self.book(now);
    }

    fn next(&mut self) -> bool {
        if self.stopped || self.index >= self.chords.len() {
            return false;
        }
        if self.end_condition == EndCondition::SampleElement {
            self.index = self.chords.len();
            return false;
        }
        let now = self.clock.now();
        self.voices.retain(|v| v.end_time > now);

        self.index += 1;
        if self.index >= self.chords.len() {
            debug!("Play head exhausted after {} chords", self.chords.len());
            return false;
        }
        let start = self.end_time.unwrap_or(now);
        self.book(start);
        true
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let now = self.clock.now();
        for voice in self.voices.drain(..) {
            if voice.end_time > now {
                self.engine.cancel(voice.id);
            }
        }
    }
}
