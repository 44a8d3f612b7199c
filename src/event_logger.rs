use crate::score::Score;
use crate::types::*;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Header `format` value identifying an engine event log.
pub const EVENT_LOG_FORMAT: &str = "stave-scheduler-events";

/// Totals reported when the logger's channel closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    pub plays: u64,
    pub cancels: u64,
}

/// Records engine events as JSONL: one header line, then one event per line.
pub struct EventLogger<W: Write> {
    rx: Receiver<EngineEvent>,
    writer: W,
    header: serde_json::Value,
}

impl EventLogger<BufWriter<File>> {
    pub fn create(rx: Receiver<EngineEvent>, path: &Path, score: &Score) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        info!("Event logger → {:?}", path);
        Ok(Self::new(rx, BufWriter::new(file), score))
    }
}

impl<W: Write> EventLogger<W> {
    pub fn new(rx: Receiver<EngineEvent>, writer: W, score: &Score) -> Self {
        let header = json!({
            "format": EVENT_LOG_FORMAT,
            "version": env!("CARGO_PKG_VERSION"),
            "bpm": score.bpm,
            "staves": score.staves.len(),
            "chords": score.chords.len(),
        });
        Self { rx, writer, header }
    }

    /// Run until every engine handle is dropped. Blocks the calling thread.
    pub fn run(mut self) -> LogStats {
        let mut stats = LogStats::default();
        if let Err(e) = writeln!(self.writer, "{}", self.header) {
            error!("Failed to write event log header: {}", e);
            return stats;
        }

        for event in self.rx.iter() {
            match &event {
                EngineEvent::Play { .. } => stats.plays += 1,
                EngineEvent::Cancel { .. } => stats.cancels += 1,
            }
            let line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize {:?}: {}", event, e);
                    continue;
                }
            };
            if let Err(e) = writeln!(self.writer, "{}", line) {
                error!("Event log write failed, stopping: {}", e);
                break;
            }
            if (stats.plays + stats.cancels) % 256 == 0 {
                let _ = self.writer.flush();
            }
        }

        let _ = self.writer.flush();
        info!(
            "Event log closed: {} plays, {} cancels",
            stats.plays, stats.cancels
        );
        stats
    }
}
