use crate::core::{TesterError, TesterResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;

/// Extracts commit tarballs into a scratch directory
pub struct ArchiveExtractor {
    scratch_dir: PathBuf,
}

impl ArchiveExtractor {
    /// Extract into `scratch_dir`, which is wiped first
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    /// Extract a `.tar.gz` archive
    ///
    /// Returns the root directory of the archive. GitHub tarballs carry a
    /// single top-level `<owner>-<repo>-<sha>/` directory.
    pub fn extract(&self, archive_path: &Path) -> TesterResult<PathBuf> {
        let result = self.extract_targz(archive_path);
        if result.is_err() {
            let _ = fs::remove_dir_all(&self.scratch_dir);
        }
        result
    }

    /// Remove the scratch directory
    pub fn cleanup(&self) {
        let _ = fs::remove_dir_all(&self.scratch_dir);
    }

    fn extract_targz(&self, archive_path: &Path) -> TesterResult<PathBuf> {
        let file = File::open(archive_path)?;
        let decoder = GzDecoder::new(file);
        let mut archive = Archive::new(decoder);

        if self.scratch_dir.exists() {
            fs::remove_dir_all(&self.scratch_dir)?;
        }
        fs::create_dir_all(&self.scratch_dir)?;

        archive
            .unpack(&self.scratch_dir)
            .map_err(|e| TesterError::Install(format!("Failed to unpack archive: {}", e)))?;

        let mut entries = fs::read_dir(&self.scratch_dir)?;
        entries
            .find_map(|e| {
                let entry = e.ok()?;
                if entry.file_type().ok()?.is_dir() {
                    Some(entry.path())
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                TesterError::Install("Archive has no root directory".to_string())
            })
    }
}
