//! Event log reader: parses a recorded JSONL log back into `EngineEvent`s.
//!
//! Reads the header line first, then yields events one at a time. Works with
//! any `BufRead`: files, in-memory buffers, stdin.

use crate::event_logger::EVENT_LOG_FORMAT;
use crate::types::EngineEvent;
use std::io::BufRead;

/// Parsed header (first line of an event log).
#[derive(Debug)]
pub struct LogHeader {
    pub version: String,
    pub bpm: f64,
    pub raw: serde_json::Value,
}

pub struct EventLogReader<R: BufRead> {
    reader: R,
    pub header: LogHeader,
    line_buf: String,
}

impl<R: BufRead> EventLogReader<R> {
    /// Read and validate the header line.
    pub fn open(mut reader: R) -> Result<Self, String> {
        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .map_err(|e| format!("read header: {}", e))?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err("empty file".into());
        }

        let raw: serde_json::Value =
            serde_json::from_str(first_line).map_err(|e| format!("parse header: {}", e))?;

        let format = raw["format"].as_str().ok_or("missing \"format\" field")?;
        if format != EVENT_LOG_FORMAT {
            return Err(format!("unknown format: {}", format));
        }

        let version = raw["version"].as_str().unwrap_or("").to_string();
        let bpm = raw["bpm"].as_f64().unwrap_or(crate::types::DEFAULT_BPM);

        Ok(Self {
            reader,
            header: LogHeader { version, bpm, raw },
            line_buf: String::new(),
        })
    }

    /// `None` at EOF, `Err` for an unparseable line.
    pub fn next_event(&mut self) -> Option<Result<EngineEvent, String>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<EngineEvent>(trimmed)
                            .map_err(|e| format!("parse event: {}", e)),
                    );
                }
                Err(e) => return Some(Err(format!("read line: {}", e))),
            }
        }
    }

    /// All remaining events, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.next_event() {
            if let Ok(event) = result {
                events.push(event);
            }
        }
        events
    }
}
