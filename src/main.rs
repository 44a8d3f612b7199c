use stave_scheduler::console_display::ConsoleDisplay;
use stave_scheduler::engine::ChannelEngine;
use stave_scheduler::event_logger::EventLogger;
use stave_scheduler::score::{demo_score, Score, ScoreError};
use stave_scheduler::transport::Transport;
use stave_scheduler::types::*;

use clap::{Parser, ValueEnum};
use crossbeam_channel::{bounded, unbounded};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PlayMode {
    /// Every staff at once
    All,
    /// All chords in sheet order, one after another
    Sheet,
    /// A single staff (see --staff)
    Staff,
    /// Preview one chord (see --chord)
    Chord,
}

#[derive(Parser)]
#[command(name = "stave-scheduler")]
#[command(about = "Lookahead playback scheduler for chords on musical staves")]
struct Cli {
    /// Score JSON file. Plays a built-in demo when omitted.
    #[arg(long)]
    score: Option<PathBuf>,

    /// What to play
    #[arg(long, value_enum, default_value_t = PlayMode::All)]
    play: PlayMode,

    /// Staff index for --play staff
    #[arg(long, default_value_t = 0)]
    staff: StaffIndex,

    /// Chord id for --play chord
    #[arg(long, required_if_eq("play", "chord"))]
    chord: Option<String>,

    /// Override the score tempo (beats per minute)
    #[arg(long)]
    bpm: Option<f64>,

    /// Record engine events to this JSONL file
    #[arg(long)]
    log_events: Option<PathBuf>,

    /// Disable the "now playing" console output
    #[arg(long)]
    no_console: bool,

    /// Max console refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ScoreError> {
    let mut score = match &cli.score {
        Some(path) => Score::load(path)?,
        None => demo_score(),
    };
    if let Some(bpm) = cli.bpm {
        score.bpm = bpm;
    }
    score.validate()?;

    info!("═══════════════════════════════════════════════");
    info!("  STAVE SCHEDULER v{}", env!("CARGO_PKG_VERSION"));
    info!("  Score: {}", cli.score.as_ref().map_or("demo".into(), |p| p.display().to_string()));
    info!("  {} staves, {} chords, {} bpm", score.staves.len(), score.chords.len(), score.bpm);
    info!("═══════════════════════════════════════════════");

    let mut handles = Vec::new();
    let mut engine_txs = Vec::new();

    // ─── Event logger ───────────────────────────────────────────────
    if let Some(path) = &cli.log_events {
        let (tx, rx) = unbounded::<EngineEvent>();
        engine_txs.push(tx);
        let logger = EventLogger::create(rx, path, &score)?;
        handles.push(thread::Builder::new().name("event-logger".into()).spawn(move || {
            logger.run();
        })?);
    }

    // ─── Console display ────────────────────────────────────────────
    let (feedback_tx, feedback_rx) = bounded::<FeedbackFrame>(256);
    if !cli.no_console {
        let hz = cli.display_hz;
        handles.push(thread::Builder::new().name("display".into()).spawn(move || {
            ConsoleDisplay::new(feedback_rx, hz).run();
        })?);
    } else {
        drop(feedback_rx);
    }

    // ─── Transport ──────────────────────────────────────────────────
    let engine = Arc::new(ChannelEngine::new(engine_txs));
    let clock = Arc::new(SessionClock::new());
    let transport = Transport::new(score, engine, clock, move |frame: &FeedbackFrame| {
        // Never block the feedback loop on a slow terminal
        let _ = feedback_tx.try_send(frame.clone());
    })?;

    match cli.play {
        PlayMode::All => transport.play_all()?,
        PlayMode::Sheet => transport.play_sheet()?,
        PlayMode::Staff => transport.play_staff(cli.staff)?,
        PlayMode::Chord => transport.play_chord(cli.chord.as_deref().unwrap_or_default())?,
    }

    while transport.is_playing() {
        thread::sleep(Duration::from_millis(50));
    }
    info!("Playback finished");

    // Dropping the transport releases the engine and feedback senders,
    // which lets the sink threads drain and exit.
    drop(transport);
    for h in handles {
        let _ = h.join();
    }
    Ok(())
}
