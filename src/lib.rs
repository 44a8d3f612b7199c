pub mod console_display;
pub mod engine;
pub mod event_logger;
pub mod jsonl_reader;
pub mod play_head;
pub mod scheduler;
pub mod score;
pub mod transport;
pub mod types;
