use crate::config::GenerationConfig;
use crate::generate::{GenerateError, GenerationPlan, GenerationSummary, SecondWriter};
use crate::progress::{eta, ProgressEvent, ProgressSink};
use crate::storage::{CheckpointStore, GenerationCheckpoint};
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

struct ResumePoint {
    offset: u64,
    total_offsets: u64,
    start_time: DateTime<Utc>,
    bytes: u64,
}

/// Single-threaded generation that checkpoints as it goes and picks up where an interrupted
/// run left off. Blocking.
///
/// A resumed run keeps the interrupted run's start time and length, and truncates the artifact
/// back to the last checkpointed byte so nothing is duplicated.
pub fn generate_sequential(
    plan: &GenerationPlan,
    config: &GenerationConfig,
    store: &CheckpointStore<GenerationCheckpoint>,
    progress: &dyn ProgressSink,
) -> Result<GenerationSummary, GenerateError> {
    let output = &plan.output;
    let resume = resume_point(store.load()?, output);

    let (file, mut resume) = match resume {
        Some(point) => {
            let file = OpenOptions::new()
                .append(true)
                .open(output)
                .map_err(|e| GenerateError::io(output, e))?;
            file.set_len(point.bytes)
                .map_err(|e| GenerateError::io(output, e))?;
            info!(
                offset = point.offset,
                total = point.total_offsets,
                percent = %format!("{:.2}", crate::progress::percent(point.offset, point.total_offsets)),
                "Resuming generation"
            );
            (file, point)
        }
        None => {
            let file = File::create(output).map_err(|e| GenerateError::io(output, e))?;
            info!(
                output = %output.display(),
                records = plan.total_records(),
                start = %plan.start_time.to_rfc3339(),
                "Generating backfill (sequential)"
            );
            let point = ResumePoint {
                offset: 0,
                total_offsets: plan.total_seconds,
                start_time: plan.start_time,
                bytes: 0,
            };
            (file, point)
        }
    };

    let mut plan = plan.clone();
    plan.start_time = resume.start_time;
    plan.total_seconds = resume.total_offsets;
    let total = resume.total_offsets;
    let services = plan.services.len() as u64;

    let mut writer = SecondWriter::new(&plan, plan.worker_seed(0))?;
    let mut out = BufWriter::new(file);

    let mut last_flush = Instant::now();
    let mut last_offset = resume.offset;

    for offset in resume.offset..total {
        resume.bytes += writer
            .write_second(&mut out, plan.timestamp(offset))
            .map_err(|e| e.at(output))?;

        let current = offset + 1;
        let due = current - last_offset >= config.checkpoint_every
            || last_flush.elapsed() >= config.checkpoint_interval;
        if due && current < total {
            out.flush().map_err(|e| GenerateError::io(output, e))?;

            let elapsed = last_flush.elapsed().as_secs_f64();
            let interval_records = (current - last_offset) * services;
            let rate = if elapsed > 0.0 {
                interval_records as f64 / elapsed
            } else {
                0.0
            };
            let seconds_rate = rate / services.max(1) as f64;
            progress.report(ProgressEvent::SequentialProgress {
                current_offset: current,
                total_offsets: total,
                rate,
                eta: eta(total - current, seconds_rate),
            });

            store.save(&GenerationCheckpoint::new(
                current,
                total,
                output,
                plan.start_time,
                resume.bytes,
            ))?;
            last_flush = Instant::now();
            last_offset = current;
        }
    }
    out.flush().map_err(|e| GenerateError::io(output, e))?;

    store.save(
        &GenerationCheckpoint::new(total, total, output, plan.start_time, resume.bytes).completed(),
    )?;
    info!(output = %output.display(), records = plan.total_records(), bytes = resume.bytes, "Generation complete");

    Ok(GenerationSummary {
        output: output.clone(),
        records: plan.total_records(),
        bytes: resume.bytes,
    })
}

fn resume_point(checkpoint: Option<GenerationCheckpoint>, output: &Path) -> Option<ResumePoint> {
    let checkpoint = checkpoint?;
    if checkpoint.completed || checkpoint.current_offset == 0 {
        return None;
    }
    if checkpoint.output_path != output {
        warn!(
            checkpoint = %checkpoint.output_path.display(),
            output = %output.display(),
            "Generation checkpoint belongs to another output, starting fresh"
        );
        return None;
    }

    let on_disk = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    if on_disk < checkpoint.artifact_bytes {
        warn!(
            expected = checkpoint.artifact_bytes,
            found = on_disk,
            "Artifact is shorter than its checkpoint, starting fresh"
        );
        return None;
    }

    Some(ResumePoint {
        offset: checkpoint.current_offset,
        total_offsets: checkpoint.total_offsets,
        start_time: checkpoint.start_time,
        bytes: checkpoint.artifact_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::test_support::plan;
    use crate::progress::RecordingProgress;
    use crate::synth::Record;
    use std::time::Duration;

    fn config(every: u64) -> GenerationConfig {
        GenerationConfig {
            checkpoint_every: every,
            checkpoint_interval: Duration::from_secs(3600),
            ..GenerationConfig::default()
        }
    }

    fn read_records(path: &Path) -> Vec<Record> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| Record::from_json_line(l).unwrap())
            .collect()
    }

    #[test]
    fn test_fresh_run_checkpoints_every_n_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan(dir.path(), 10, 0.0);
        let store = CheckpointStore::new(dir.path().join("gen.json"));
        let progress = RecordingProgress::default();

        let summary = generate_sequential(&plan, &config(3), &store, &progress).unwrap();
        assert_eq!(summary.records, 20);
        assert_eq!(read_records(&plan.output).len(), 20);

        let offsets: Vec<u64> = progress
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::SequentialProgress { current_offset, .. } => Some(current_offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![3, 6, 9]);

        let checkpoint = store.load().unwrap().unwrap();
        assert!(checkpoint.is_complete_for(&plan.output));
        assert_eq!(checkpoint.artifact_bytes, summary.bytes);
    }

    #[test]
    fn test_resume_truncates_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan(dir.path(), 10, 0.0);
        let store = CheckpointStore::new(dir.path().join("gen.json"));

        // An interrupted run: 4 offsets checkpointed, then a torn partial line.
        generate_sequential(&plan, &config(4), &store, &RecordingProgress::default()).unwrap();
        let full = std::fs::read_to_string(&plan.output).unwrap();
        let kept: String = full.lines().take(8).map(|l| format!("{l}\n")).collect();
        std::fs::write(&plan.output, format!("{kept}{{\"@timestamp\":")).unwrap();

        let mut later = plan.clone();
        later.start_time = plan.start_time + chrono::Duration::days(1);
        store
            .save(&GenerationCheckpoint::new(
                4,
                10,
                &plan.output,
                plan.start_time,
                kept.len() as u64,
            ))
            .unwrap();

        generate_sequential(&later, &config(4), &store, &RecordingProgress::default()).unwrap();

        let records = read_records(&plan.output);
        assert_eq!(records.len(), 20);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.timestamp, plan.timestamp(i as u64 / 2));
        }
        assert!(store.load().unwrap().unwrap().completed);
    }

    #[test]
    fn test_checkpoint_for_other_output_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan(dir.path(), 3, 0.0);
        let store = CheckpointStore::new(dir.path().join("gen.json"));
        store
            .save(&GenerationCheckpoint::new(
                2,
                3,
                &dir.path().join("other.jsonl"),
                plan.start_time,
                100,
            ))
            .unwrap();

        generate_sequential(&plan, &config(1000), &store, &RecordingProgress::default()).unwrap();
        assert_eq!(read_records(&plan.output).len(), 6);
    }
}
