use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Prints which chords are sounding, as reported by the feedback loop.
///
/// Frames arrive at display rate; a line is only printed when the set of
/// sounding chords changes, and never faster than `update_hz`.
pub struct ConsoleDisplay {
    rx: Receiver<FeedbackFrame>,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<FeedbackFrame>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    /// Blocks until every feedback sender is dropped.
    pub fn run(&self) {
        let mut stdout = io::stdout();
        let mut shown: Option<Vec<ChordId>> = None;
        let min_gap = if self.update_hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.update_hz as f64)
        };
        let mut last_print: Option<Instant> = None;

        for frame in self.rx.iter() {
            if shown.as_ref() == Some(&frame.chords) {
                continue;
            }
            if last_print.map_or(false, |t| t.elapsed() < min_gap) {
                continue;
            }
            let _ = writeln!(stdout, "{}", render_line(&frame));
            let _ = stdout.flush();
            shown = Some(frame.chords);
            last_print = Some(Instant::now());
        }
    }
}

/// `♪ t=   1.200s  playing [m2, b1]  (3 notes)`, or a rest marker when
/// nothing sounds.
pub fn render_line(frame: &FeedbackFrame) -> String {
    if frame.chords.is_empty() {
        return format!("  t={:>8.3}s  ·", frame.time);
    }
    format!("♪ {}  ({} notes)", frame, frame.notes.len())
}
