use crate::play_head::PlayHead;
use crate::types::*;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, trace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback receiving the chords currently sounding, once per display frame.
pub type FeedbackFn = dyn Fn(&[ChordSpec]) + Send + Sync;

/// Lookahead scheduler.
///
/// Every `SCHEDULER_INTERVAL_MS` a pass looks `SCHEDULER_LOOKAHEAD_MS` into
/// the future on the audio clock and books whatever the active play heads need
/// inside that window. A second, frame-rate loop reports the sounding chords
/// through the feedback callback.
///
/// Passes and public operations all run under one lock, so they never
/// interleave. Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

struct Shared {
    clock: Arc<dyn AudioClock>,
    on_feedback: Box<FeedbackFn>,
    state: Mutex<State>,
}

struct State {
    play_heads: Vec<Box<dyn PlayHead>>,
    /// Present iff the periodic pass is armed
    ticker: Option<Ticker>,
    feedback_running: bool,
    /// Times the stop path has run
    #[cfg(test)]
    stops: u64,
}

/// Named thread calling `tick` every `period` until cancelled or `tick`
/// returns false.
struct Ticker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn<F>(name: &str, period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);
        let handle = thread::Builder::new().name(name.into()).spawn(move || loop {
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    if !tick() {
                        break;
                    }
                }
                // Stop requested, or the scheduler was dropped with the ticker
                _ => break,
            }
        })?;
        Ok(Self { stop_tx, handle })
    }

    /// Must not be called with the scheduler lock held: the ticker thread may
    /// be waiting on it.
    fn cancel(self) {
        let _ = self.stop_tx.try_send(());
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

/// What a stop leaves to be torn down once the lock is released.
struct Halted {
    ticker: Option<Ticker>,
    play_heads: Vec<Box<dyn PlayHead>>,
}

impl Halted {
    fn finish(self) {
        for mut play_head in self.play_heads {
            play_head.stop();
        }
        if let Some(ticker) = self.ticker {
            ticker.cancel();
        }
    }
}

impl Scheduler {
    pub fn new<F>(clock: Arc<dyn AudioClock>, on_feedback: F) -> Self
    where
        F: Fn(&[ChordSpec]) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                clock,
                on_feedback: Box::new(on_feedback),
                state: Mutex::new(State {
                    play_heads: Vec::new(),
                    ticker: None,
                    feedback_running: false,
                    #[cfg(test)]
                    stops: 0,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Background threads hold the scheduler weakly so that dropping the last
    /// handle ends them.
    fn upgrade(shared: &Weak<Shared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    /// Run one pass now, then arm the periodic pass and the feedback loop.
    /// Calling again while running does not add a second timer.
    pub fn start(&self) {
        self.schedule();

        let mut state = self.lock();
        if state.ticker.is_none() {
            let shared = Arc::downgrade(&self.shared);
            let period = Duration::from_millis(SCHEDULER_INTERVAL_MS);
            match Ticker::spawn("scheduler-pass", period, move || {
                match Self::upgrade(&shared) {
                    Some(scheduler) => {
                        scheduler.schedule();
                        true
                    }
                    None => false,
                }
            }) {
                Ok(ticker) => {
                    info!(
                        "Scheduler started ({} play heads, {}ms interval, {}ms lookahead)",
                        state.play_heads.len(),
                        SCHEDULER_INTERVAL_MS,
                        SCHEDULER_LOOKAHEAD_MS
                    );
                    state.ticker = Some(ticker);
                }
                Err(e) => error!("Failed to spawn scheduler thread: {}", e),
            }
        }

        if !state.feedback_running {
            let shared = Arc::downgrade(&self.shared);
            let frame = Duration::from_millis(FEEDBACK_FRAME_MS);
            let spawned = thread::Builder::new()
                .name("scheduler-feedback".into())
                .spawn(move || loop {
                    thread::sleep(frame);
                    match Self::upgrade(&shared) {
                        Some(scheduler) if scheduler.update_feedback() => {}
                        _ => break,
                    }
                });
            match spawned {
                Ok(_) => state.feedback_running = true,
                Err(e) => error!("Failed to spawn feedback thread: {}", e),
            }
        }
    }

    /// Cancel the periodic pass, stop every play head, and forget them.
    pub fn stop(&self) {
        let halted = {
            let mut state = self.lock();
            Self::halt(&mut state)
        };
        halted.finish();
    }

    fn halt(state: &mut State) -> Halted {
        #[cfg(test)]
        {
            state.stops += 1;
        }
        if state.ticker.is_some() {
            info!("Scheduler stopped");
        }
        Halted {
            ticker: state.ticker.take(),
            play_heads: state.play_heads.drain(..).collect(),
        }
    }

    /// Stop and remove the single-chord previews of `chord_id`.
    /// Sequence play heads on the same chord keep playing.
    pub fn stop_chord(&self, chord_id: &str) {
        let matching: Vec<Box<dyn PlayHead>> = {
            let mut state = self.lock();
            let (matching, kept): (Vec<_>, Vec<_>) = state.play_heads.drain(..).partition(|ph| {
                ph.end_condition() == EndCondition::SampleElement
                    && ph.current_chord().map_or(false, |c| c.id == chord_id)
            });
            state.play_heads = kept;
            matching
        };
        if !matching.is_empty() {
            debug!("Stopping {} preview(s) of {}", matching.len(), chord_id);
        }
        for mut play_head in matching {
            play_head.stop();
        }
    }

    pub fn push_play_head(&self, play_head: Box<dyn PlayHead>) {
        self.lock().play_heads.push(play_head);
    }

    /// Push several heads at once. No pass can run between them, so heads
    /// meant to sound together are started by the same pass.
    pub fn push_play_heads(&self, play_heads: Vec<Box<dyn PlayHead>>) {
        self.lock().play_heads.extend(play_heads);
    }

    /// One scheduling pass over every active play head.
    pub fn schedule(&self) {
        let halted = {
            let mut state = self.lock();
            let start_window = self.shared.clock.now();
            let end_window = start_window + SCHEDULER_LOOKAHEAD_MS as f64 / 1000.0;

            state.play_heads.retain_mut(|ph| match ph.end_time() {
                None => {
                    ph.play_current();
                    true
                }
                Some(end) if end >= start_window && end < end_window => {
                    let scheduled = ph.next();
                    if !scheduled {
                        debug!("Play head finished at {:.3}s", end);
                    }
                    scheduled
                }
                Some(end) if end < start_window => {
                    trace!("Dropping stale play head (ended {:.3}s, now {:.3}s)", end, start_window);
                    false
                }
                Some(_) => true,
            });

            if state.play_heads.is_empty() {
                Some(Self::halt(&mut state))
            } else {
                None
            }
        };
        if let Some(halted) = halted {
            halted.finish();
        }
    }

    /// One feedback pass. Returns whether another frame should follow.
    pub fn update_feedback(&self) -> bool {
        let (playing, remaining) = {
            let mut state = self.lock();
            let now = self.shared.clock.now();
            let playing: Vec<ChordSpec> = state
                .play_heads
                .iter()
                .filter(|ph| ph.end_time().map_or(false, |end| end >= now))
                .filter_map(|ph| ph.current_chord().cloned())
                .collect();
            let remaining = !state.play_heads.is_empty();
            if !remaining {
                state.feedback_running = false;
            }
            (playing, remaining)
        };
        (self.shared.on_feedback)(&playing);
        remaining
    }

    pub fn is_running(&self) -> bool {
        self.lock().ticker.is_some()
    }

    pub fn play_head_count(&self) -> usize {
        self.lock().play_heads.len()
    }
}
