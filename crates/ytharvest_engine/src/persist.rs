use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use ytharvest_core::{CheckpointSink, Dataset};
use ytharvest_logging::harvest_info;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("checkpoint path has no file name: {0:?}")]
    InvalidPath(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file,
/// syncing it, then renaming it over the target.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Checkpoint store writing the dataset as indented JSON to one fixed file.
///
/// Every save replaces the previous one; only the latest is kept.
pub struct JsonCheckpoint {
    filename: String,
    writer: AtomicFileWriter,
}

impl JsonCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            return Err(PersistError::InvalidPath(path));
        };
        let filename = filename.to_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            filename,
            writer: AtomicFileWriter::new(dir),
        })
    }
}

impl CheckpointSink for JsonCheckpoint {
    type Error = PersistError;

    fn save(&mut self, dataset: &Dataset) -> Result<(), PersistError> {
        let content = dataset.to_pretty_json()?;
        let target = self.writer.write(&self.filename, &content)?;
        harvest_info!(
            "Checkpoint written to {:?} ({} channel(s), {} video(s))",
            target,
            dataset.len(),
            dataset.video_count()
        );
        Ok(())
    }
}

/// Read a checkpoint written by [`JsonCheckpoint`].
pub fn load_checkpoint(path: &Path) -> Result<Dataset, PersistError> {
    let content = fs::read_to_string(path)?;
    let dataset = serde_json::from_str(&content)?;
    harvest_info!("Loaded checkpoint from {:?}", path);
    Ok(dataset)
}
