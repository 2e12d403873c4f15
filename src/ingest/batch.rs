use crate::synth::Record;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use tokio::sync::mpsc;

/// Consecutive artifact lines `[start_line, end_line)` parsed into records.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based submission order.
    pub number: u64,
    pub records: Vec<Record>,
    pub start_line: u64,
    pub end_line: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub batches: u64,
    pub records: u64,
    pub malformed: u64,
}

/// Number of lines in the artifact, counting a final line without a trailing newline.
pub fn count_lines(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::with_capacity(1 << 20, File::open(path)?);
    let mut buf = vec![0u8; 1 << 20];
    let mut lines = 0;
    let mut last = b'\n';
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = buf[n - 1];
    }
    if last != b'\n' {
        lines += 1;
    }
    Ok(lines)
}

/// Read the artifact after its first `skip` lines and send it on as batches of up to
/// `batch_size` records. Blocking; stops early if the receiver goes away.
///
/// Unparseable lines are skipped but still count towards line numbers.
pub fn read_batches(
    path: &Path,
    skip: u64,
    batch_size: usize,
    tx: mpsc::Sender<Batch>,
) -> io::Result<ReadStats> {
    let reader = BufReader::with_capacity(1 << 20, File::open(path)?);
    let batch_size = batch_size.max(1);
    let mut stats = ReadStats::default();

    let mut records = Vec::with_capacity(batch_size);
    let mut start_line = skip;
    let mut next_line = skip;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index as u64;
        if line_no < skip {
            continue;
        }
        let line = line?;
        next_line = line_no + 1;
        if line.trim().is_empty() {
            continue;
        }

        match Record::from_json_line(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(line = line_no, error = %e, "Skipping unparseable line");
                continue;
            }
        }

        if records.len() >= batch_size {
            let batch = Batch {
                number: stats.batches + 1,
                records: std::mem::replace(&mut records, Vec::with_capacity(batch_size)),
                start_line,
                end_line: line_no + 1,
            };
            stats.batches += 1;
            stats.records += batch.records.len() as u64;
            if tx.blocking_send(batch).is_err() {
                return Ok(stats);
            }
            start_line = line_no + 1;
        }
    }

    if !records.is_empty() {
        stats.batches += 1;
        stats.records += records.len() as u64;
        let batch = Batch {
            number: stats.batches,
            records,
            start_line,
            end_line: next_line,
        };
        let _ = tx.blocking_send(batch);
    }

    Ok(stats)
}
