use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Business-incident marker: a file whose presence means "incident requested".
#[derive(Debug, Clone)]
pub struct IncidentFlag {
    path: PathBuf,
}

impl IncidentFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    /// Remove the marker. Already gone is fine.
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_presence_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let flag = IncidentFlag::new(dir.path().join("business_incident_active"));
        assert!(!flag.is_present());
        flag.clear().unwrap();

        std::fs::write(flag.path(), "").unwrap();
        assert!(flag.is_present());
        flag.clear().unwrap();
        assert!(!flag.is_present());
    }
}
