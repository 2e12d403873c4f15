pub mod batch;
pub mod monitor;
pub mod pipeline;

pub use batch::{count_lines, read_batches, Batch, ReadStats};
pub use monitor::{spawn_monitor, IngestProgress, StallPolicy, Verdict};
pub use pipeline::{probe_records, IngestError, IngestSummary, Ingestor};
