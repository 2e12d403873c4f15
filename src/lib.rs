pub mod cli;
pub mod config;
pub mod fatal;
pub mod generate;
pub mod ingest;
pub mod live;
pub mod progress;
pub mod sink;
pub mod storage;
pub mod synth;

pub use fatal::FatalAbort;
