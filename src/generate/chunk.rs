use crate::generate::{GenerateError, GenerationPlan, Partition, SecondWriter};
use crate::progress::{ProgressEvent, ProgressSink};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// A finished chunk file for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkArtifact {
    pub partition: usize,
    pub path: PathBuf,
    pub offsets: u64,
    pub bytes: u64,
}

/// Generate every record of `partition` into its own chunk file. Blocking; run it on a
/// worker thread. The worker owns its random source and its file, and stops between seconds
/// once `cancel` is set.
pub fn generate_chunk(
    plan: &GenerationPlan,
    partition: Partition,
    progress: &dyn ProgressSink,
    cancel: &AtomicBool,
) -> Result<ChunkArtifact, GenerateError> {
    let path = plan.chunk_path(partition.index);
    let total = partition.len();
    let step = (total / 10).max(1);

    progress.report(ProgressEvent::ChunkStarted {
        partition: partition.index,
        start: partition.start,
        end: partition.end,
    });

    let mut writer = SecondWriter::new(plan, plan.worker_seed(partition.index as u64 + 1))?;
    let file = File::create(&path).map_err(|e| GenerateError::io(&path, e))?;
    let mut out = BufWriter::new(file);

    let mut bytes = 0;
    let mut processed = 0;
    for offset in partition.offsets() {
        if cancel.load(Ordering::Relaxed) {
            return Err(GenerateError::Cancelled(partition.index));
        }
        bytes += writer
            .write_second(&mut out, plan.timestamp(offset))
            .map_err(|e| e.at(&path))?;

        processed += 1;
        if processed % step == 0 {
            progress.report(ProgressEvent::ChunkProgress {
                partition: partition.index,
                processed,
                total,
            });
        }
    }
    out.flush().map_err(|e| GenerateError::io(&path, e))?;

    progress.report(ProgressEvent::ChunkComplete {
        partition: partition.index,
        records: total * plan.services.len() as u64,
        path: path.clone(),
    });

    Ok(ChunkArtifact {
        partition: partition.index,
        path,
        offsets: total,
        bytes,
    })
}
