use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("checkpoint serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// A small progress record persisted at a fixed path.
pub trait Checkpoint: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn version(&self) -> u32;
}

/// Progress of file generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationCheckpoint {
    pub version: u32,
    pub current_offset: u64,
    pub total_offsets: u64,
    pub output_path: PathBuf,
    pub start_time: DateTime<Utc>,
    /// Artifact length when this checkpoint was written. Bytes past it were never checkpointed.
    pub artifact_bytes: u64,
    #[serde(default)]
    pub completed: bool,
    pub last_updated: DateTime<Utc>,
}

impl GenerationCheckpoint {
    pub fn new(
        current_offset: u64,
        total_offsets: u64,
        output_path: &Path,
        start_time: DateTime<Utc>,
        artifact_bytes: u64,
    ) -> Self {
        Self {
            version: CURRENT_VERSION,
            current_offset: current_offset.min(total_offsets),
            total_offsets,
            output_path: output_path.to_path_buf(),
            start_time,
            artifact_bytes,
            completed: false,
            last_updated: Utc::now(),
        }
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self.current_offset = self.total_offsets;
        self
    }

    /// Whether this checkpoint describes a finished artifact at `output`.
    pub fn is_complete_for(&self, output: &Path) -> bool {
        self.completed && self.current_offset >= self.total_offsets && self.output_path == output
    }
}

impl Checkpoint for GenerationCheckpoint {
    const KIND: &'static str = "generation";

    fn version(&self) -> u32 {
        self.version
    }
}

/// Progress of bulk ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionCheckpoint {
    pub version: u32,
    /// Leading artifact lines that a resumed run skips.
    pub last_line: u64,
    pub total_lines: u64,
    pub indexed_total: u64,
    #[serde(default)]
    pub completed: bool,
    pub last_updated: DateTime<Utc>,
}

impl IngestionCheckpoint {
    pub fn new(last_line: u64, total_lines: u64, indexed_total: u64) -> Self {
        Self {
            version: CURRENT_VERSION,
            last_line,
            total_lines,
            indexed_total,
            completed: false,
            last_updated: Utc::now(),
        }
    }
}

impl Checkpoint for IngestionCheckpoint {
    const KIND: &'static str = "ingestion";

    fn version(&self) -> u32 {
        self.version
    }
}

/// Reads and overwrites one checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Checkpoint> CheckpointStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. Missing, unreadable or version-mismatched files count as "no checkpoint".
    pub fn load(&self) -> Result<Option<T>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(kind = T::KIND, path = %self.path.display(), "No checkpoint found");
                return Ok(None);
            }
            Err(source) => return Err(self.io_error(source)),
        };

        let checkpoint: T = match serde_json::from_str(&text) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!(
                    kind = T::KIND,
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable checkpoint, ignoring it"
                );
                return Ok(None);
            }
        };

        if checkpoint.version() != CURRENT_VERSION {
            tracing::warn!(
                kind = T::KIND,
                "Checkpoint version mismatch: {} vs {}, ignoring checkpoint",
                checkpoint.version(),
                CURRENT_VERSION
            );
            return Ok(None);
        }

        Ok(Some(checkpoint))
    }

    /// Overwrite the checkpoint. The file is replaced by rename so readers never see half a record.
    pub fn save(&self, checkpoint: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        tracing::debug!(kind = T::KIND, path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CheckpointStore<IngestionCheckpoint> {
    /// Save without ever moving `last_line` backwards. Batches complete out of order, so a
    /// late save for an earlier batch must not undo a later one. Returns what was persisted.
    pub fn save_monotonic(&self, mut checkpoint: IngestionCheckpoint) -> Result<IngestionCheckpoint> {
        if let Some(existing) = self.load()? {
            if existing.last_line > checkpoint.last_line {
                checkpoint.last_line = existing.last_line;
            }
        }
        self.save(&checkpoint)?;
        Ok(checkpoint)
    }
}
