use crate::types::*;
use crossbeam_channel::Sender;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The sound-producing side, as seen by a play head.
///
/// `commit` books a chord to start at `start_time` and returns the voice,
/// whose `end_time` is when the sound will have finished. `cancel` silences a
/// booked voice whether or not it has started.
pub trait AudioEngine: Send + Sync {
    fn commit(&self, chord: &ChordSpec, start_time: f64, duration: f64) -> Voice;
    fn cancel(&self, voice: VoiceId);
}

/// Engine front-end that forwards bookings over a channel.
///
/// The receiving end is whatever renders or records the audio: a synth
/// thread, the event logger, or a test. Cloning shares the voice counter so
/// ids stay unique across play heads.
#[derive(Clone)]
pub struct ChannelEngine {
    txs: Vec<Sender<EngineEvent>>,
    next_voice: Arc<AtomicU64>,
}

impl ChannelEngine {
    pub fn new(txs: Vec<Sender<EngineEvent>>) -> Self {
        Self {
            txs,
            next_voice: Arc::new(AtomicU64::new(1)),
        }
    }

    fn broadcast(&self, event: EngineEvent) {
        for tx in &self.txs {
            if tx.send(event.clone()).is_err() {
                warn!("Engine consumer disconnected, dropping {:?}", event);
            }
        }
    }
}

impl AudioEngine for ChannelEngine {
    fn commit(&self, chord: &ChordSpec, start_time: f64, duration: f64) -> Voice {
        let voice = Voice {
            id: self.next_voice.fetch_add(1, Ordering::Relaxed),
            start_time,
            end_time: start_time + duration,
        };
        debug!(
            "Engine: voice {} {} @ {:.3}s → {:.3}s",
            voice.id, chord, voice.start_time, voice.end_time
        );
        self.broadcast(EngineEvent::Play {
            voice,
            chord: chord.id.clone(),
            pitches: chord.notes.iter().map(|n| n.sounding_pitch()).collect(),
        });
        voice
    }

    fn cancel(&self, voice: VoiceId) {
        debug!("Engine: cancel voice {}", voice);
        self.broadcast(EngineEvent::Cancel { voice });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn chord() -> ChordSpec {
        ChordSpec {
            id: "c1".into(),
            staff_index: Some(0),
            x: 0.0,
            beats: 1.0,
            notes: vec![NoteSpec {
                id: "n1".into(),
                pitch: 60,
                accidental: Accidental::Sharp,
            }],
        }
    }

    #[test]
    fn test_commit_sends_play_with_end_time() {
        let (tx, rx) = unbounded();
        let engine = ChannelEngine::new(vec![tx]);
        let voice = engine.commit(&chord(), 2.0, 0.5);
        assert!((voice.end_time - 2.5).abs() < 1e-12);
        match rx.try_recv().unwrap() {
            EngineEvent::Play { voice: v, chord, pitches } => {
                assert_eq!(v, voice);
                assert_eq!(chord, "c1");
                assert_eq!(pitches, vec![61]);
            }
            other => panic!("expected Play, got {:?}", other),
        }
    }

    #[test]
    fn test_voice_ids_unique_across_clones() {
        let (tx, _rx) = unbounded();
        let a = ChannelEngine::new(vec![tx]);
        let b = a.clone();
        let v1 = a.commit(&chord(), 0.0, 1.0);
        let v2 = b.commit(&chord(), 0.0, 1.0);
        assert_ne!(v1.id, v2.id);
    }

    #[test]
    fn test_cancel_broadcasts_to_every_consumer() {
        let (tx1, rx1) = unbounded();
        let (tx2, rx2) = unbounded();
        let engine = ChannelEngine::new(vec![tx1, tx2]);
        engine.cancel(9);
        assert_eq!(rx1.try_recv().unwrap(), EngineEvent::Cancel { voice: 9 });
        assert_eq!(rx2.try_recv().unwrap(), EngineEvent::Cancel { voice: 9 });
    }

    #[test]
    fn test_disconnected_consumer_is_tolerated() {
        let (tx, rx) = unbounded();
        drop(rx);
        let engine = ChannelEngine::new(vec![tx]);
        let voice = engine.commit(&chord(), 1.0, 1.0);
        assert!((voice.end_time - 2.0).abs() < 1e-12);
    }
}
