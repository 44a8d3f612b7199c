use crate::engine::AudioEngine;
use crate::play_head::{PlayHead, SequencePlayHead};
use crate::scheduler::Scheduler;
use crate::score::{Score, ScoreError};
use crate::types::*;
use log::info;
use std::sync::Arc;

/// Play controls for one score: whole score, one staff, or a single chord
/// preview. Each action queues play heads on the shared scheduler and starts
/// it.
///
/// # Play modes
///
/// - `play_all` starts one head per occupied staff, so staves sound together.
/// - `play_sheet` walks every chord in sheet order (staff by staff, left to
///   right) with a single head.
/// - `play_chord` previews one chord, typically while a note is being
///   dragged; `release_chord` cuts that preview short.
pub struct Transport {
    score: Score,
    scheduler: Scheduler,
    engine: Arc<dyn AudioEngine>,
    clock: Arc<dyn AudioClock>,
}

impl Transport {
    pub fn new<F>(
        score: Score,
        engine: Arc<dyn AudioEngine>,
        clock: Arc<dyn AudioClock>,
        on_feedback: F,
    ) -> Result<Self, ScoreError>
    where
        F: Fn(&FeedbackFrame) + Send + Sync + 'static,
    {
        score.validate()?;
        let feedback_clock = clock.clone();
        let scheduler = Scheduler::new(clock.clone(), move |chords: &[ChordSpec]| {
            on_feedback(&FeedbackFrame::from_chords(feedback_clock.now(), chords));
        });
        Ok(Self {
            score,
            scheduler,
            engine,
            clock,
        })
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn play_head(
        &self,
        chords: Vec<ChordSpec>,
        end_condition: EndCondition,
    ) -> Result<SequencePlayHead, ScoreError> {
        SequencePlayHead::new(
            chords,
            end_condition,
            self.score.beat_seconds(),
            self.engine.clone(),
            self.clock.clone(),
        )
    }

    pub fn play_all(&self) -> Result<(), ScoreError> {
        let staves = self.score.occupied_staves();
        if staves.is_empty() {
            return Err(ScoreError::EmptySequence);
        }
        let mut heads: Vec<Box<dyn PlayHead>> = Vec::with_capacity(staves.len());
        for &staff in &staves {
            let head = self.play_head(self.score.staff_order(staff), EndCondition::EndOfStaff)?;
            heads.push(Box::new(head));
        }
        self.scheduler.push_play_heads(heads);
        info!("Playing all: {} staves at {} bpm", staves.len(), self.score.bpm);
        self.scheduler.start();
        Ok(())
    }

    pub fn play_sheet(&self) -> Result<(), ScoreError> {
        let head = self.play_head(self.score.sheet_order(), EndCondition::EndOfScore)?;
        self.scheduler.push_play_head(Box::new(head));
        info!("Playing sheet: {} chords at {} bpm", self.score.chords.len(), self.score.bpm);
        self.scheduler.start();
        Ok(())
    }

    pub fn play_staff(&self, staff: StaffIndex) -> Result<(), ScoreError> {
        let head = self.play_head(self.score.staff_order(staff), EndCondition::EndOfStaff)?;
        self.scheduler.push_play_head(Box::new(head));
        info!("Playing staff {}", staff);
        self.scheduler.start();
        Ok(())
    }

    pub fn play_chord(&self, chord_id: &str) -> Result<(), ScoreError> {
        let chord = self.score.playback_chord(chord_id)?;
        let head = self.play_head(vec![chord], EndCondition::SampleElement)?;
        self.scheduler.push_play_head(Box::new(head));
        self.scheduler.start();
        Ok(())
    }

    pub fn release_chord(&self, chord_id: &str) {
        self.scheduler.stop_chord(chord_id);
    }

    pub fn stop_all(&self) {
        self.scheduler.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelEngine;
    use crate::score::demo_score;
    use crossbeam_channel::{unbounded, Receiver};

    fn transport() -> (Transport, ManualClock, Receiver<EngineEvent>) {
        let (tx, rx) = unbounded();
        let clock = ManualClock::new(0.0);
        let t = Transport::new(
            demo_score(),
            Arc::new(ChannelEngine::new(vec![tx])),
            Arc::new(clock.clone()),
            |_: &FeedbackFrame| {},
        )
        .unwrap();
        (t, clock, rx)
    }

    fn played(rx: &Receiver<EngineEvent>) -> Vec<ChordId> {
        rx.try_iter()
            .filter_map(|e| match e {
                EngineEvent::Play { chord, .. } => Some(chord),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_play_all_starts_every_staff_at_once() {
        let (t, _clock, rx) = transport();
        t.play_all().unwrap();
        assert_eq!(t.scheduler().play_head_count(), 2);
        let mut first = played(&rx);
        first.sort();
        assert_eq!(first, vec!["b1", "m1"]);
        t.stop_all();
    }

    #[test]
    fn test_staff_octave_reaches_engine() {
        let (t, _clock, rx) = transport();
        t.play_staff(1).unwrap();
        match rx.try_recv() {
            Ok(EngineEvent::Play { chord, pitches, .. }) => {
                assert_eq!(chord, "b1");
                assert_eq!(pitches, vec![48, 55]);
            }
            other => panic!("expected a play event, got {:?}", other),
        }
        t.stop_all();
    }

    #[test]
    fn test_play_chord_then_release_cancels() {
        let (t, _clock, rx) = transport();
        t.play_chord("m2").unwrap();
        assert_eq!(played(&rx), vec!["m2"]);
        t.release_chord("m2");
        assert_eq!(t.scheduler().play_head_count(), 0);
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Cancel { .. })));
        t.stop_all();
    }

    #[test]
    fn test_play_unknown_chord_errors() {
        let (t, _clock, _rx) = transport();
        assert!(matches!(t.play_chord("nope"), Err(ScoreError::UnknownChord(_))));
        assert_eq!(t.scheduler().play_head_count(), 0);
    }

    #[test]
    fn test_play_empty_staff_errors() {
        let (t, _clock, _rx) = transport();
        assert!(matches!(t.play_staff(4), Err(ScoreError::EmptySequence)));
    }

    #[test]
    fn test_stop_all_silences_everything() {
        let (t, _clock, rx) = transport();
        t.play_sheet().unwrap();
        assert!(t.is_playing());
        t.stop_all();
        assert!(!t.is_playing());
        let cancels = rx
            .try_iter()
            .filter(|e| matches!(e, EngineEvent::Cancel { .. }))
            .count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn test_invalid_score_rejected() {
        let mut score = demo_score();
        score.bpm = 0.0;
        let (tx, _rx) = unbounded();
        let result = Transport::new(
            score,
            Arc::new(ChannelEngine::new(vec![tx])),
            Arc::new(ManualClock::new(0.0)),
            |_: &FeedbackFrame| {},
        );
        assert!(matches!(result, Err(ScoreError::InvalidTempo(_))));
    }
}
