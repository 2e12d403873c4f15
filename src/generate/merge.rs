use crate::generate::{ChunkArtifact, GenerateError, GenerationPlan, GenerationSummary};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{CheckpointStore, GenerationCheckpoint};
use std::fs::File;
use std::io::{BufWriter, Read, Write};

/// Concatenate chunk files into the plan's output in ascending partition order, whatever
/// order they arrive in. Each chunk is deleted once copied. Blocking.
pub fn merge_chunks(
    plan: &GenerationPlan,
    mut chunks: Vec<ChunkArtifact>,
    buffer_bytes: usize,
    store: &CheckpointStore<GenerationCheckpoint>,
    progress: &dyn ProgressSink,
) -> Result<GenerationSummary, GenerateError> {
    chunks.sort_by_key(|c| c.partition);
    let partitions = chunks.len();

    let output = &plan.output;
    let file = File::create(output).map_err(|e| GenerateError::io(output, e))?;
    let mut out = BufWriter::with_capacity(buffer_bytes, file);
    let mut buf = vec![0u8; buffer_bytes.max(1)];
    let mut bytes = 0u64;

    for chunk in &chunks {
        let mut reader = File::open(&chunk.path).map_err(|e| GenerateError::io(&chunk.path, e))?;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| GenerateError::io(&chunk.path, e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .map_err(|e| GenerateError::io(output, e))?;
            bytes += n as u64;
        }
        drop(reader);
        std::fs::remove_file(&chunk.path).map_err(|e| GenerateError::io(&chunk.path, e))?;

        progress.report(ProgressEvent::MergeProgress {
            partition: chunk.partition,
            partitions,
            bytes,
        });
    }
    out.flush().map_err(|e| GenerateError::io(output, e))?;

    let total = plan.total_seconds;
    store.save(&GenerationCheckpoint::new(total, total, output, plan.start_time, bytes).completed())?;

    tracing::info!(
        output = %output.display(),
        chunks = partitions,
        bytes,
        "Merged generated chunks"
    );

    Ok(GenerationSummary {
        output: output.clone(),
        records: plan.total_records(),
        bytes,
    })
}
