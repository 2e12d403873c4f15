use std::ops::Range;

/// One contiguous slice `[start, end)` of the generated time range, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Partition {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn offsets(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// Split `[0, total_seconds)` into `worker_count` disjoint partitions. Every partition gets
/// `total_seconds / worker_count` seconds except the last, which also takes the remainder.
///
/// `worker_count` of zero is treated as one.
pub fn partition(total_seconds: u64, worker_count: usize) -> Vec<Partition> {
    let workers = worker_count.max(1);
    let chunk_size = total_seconds / workers as u64;

    (0..workers)
        .map(|index| {
            let start = chunk_size * index as u64;
            let end = if index == workers - 1 {
                total_seconds
            } else {
                start + chunk_size
            };
            Partition { index, start, end }
        })
        .collect()
}
