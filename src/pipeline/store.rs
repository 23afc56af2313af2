//! Artifact persistence and upload
//!
//! Fitted preprocessors and trained bundles are stored as JSON documents.
//! Promotion uploads the whole artifact directory as one zip archive.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Storage for opaque serialized artifacts
pub trait ArtifactStore {
    fn save(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Copy the contents of `dir` to the remote `destination`
    fn upload_directory(&self, dir: &Path, destination: &str) -> Result<()>;
}

/// Serialize `object` as JSON and store it at `path`
pub fn save_object<T: Serialize>(store: &dyn ArtifactStore, path: &Path, object: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(object)
        .map_err(|e| PipelineError::artifact(path, "failed to serialize artifact", e))?;
    store.save(path, &bytes)
}

/// Load and deserialize the JSON artifact stored at `path`
pub fn load_object<T: DeserializeOwned>(store: &dyn ArtifactStore, path: &Path) -> Result<T> {
    let bytes = store.load(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::artifact(path, "failed to deserialize artifact", e))
}

/// Artifact store on the local filesystem.
///
/// Uploads land under `remote_root/<destination>/<dir name>.zip`, which stands
/// in for a bucket on object storage.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    remote_root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(remote_root: impl Into<PathBuf>) -> Self {
        Self {
            remote_root: remote_root.into(),
        }
    }

    /// Path of the archive `upload_directory` produces for `dir`
    pub fn archive_path(&self, dir: &Path, destination: &str) -> PathBuf {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifacts");
        self.remote_root
            .join(destination)
            .join(format!("{}.zip", name))
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn save(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write_atomically(path, bytes)
            .map_err(|e| PipelineError::artifact(path, "failed to write artifact", e))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved artifact");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| PipelineError::artifact(path, "failed to read artifact", e))
    }

    fn upload_directory(&self, dir: &Path, destination: &str) -> Result<()> {
        let archive = self.archive_path(dir, destination);
        let files = zip_directory(dir, &archive)?;
        info!(
            dir = %dir.display(),
            archive = %archive.display(),
            files,
            "Uploaded artifact directory"
        );
        Ok(())
    }
}

/// Write `bytes` to a sibling temporary file and rename it over `path`
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

/// Package every regular file under `dir` into a deflated zip archive
fn zip_directory(dir: &Path, archive: &Path) -> Result<usize> {
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    let mut files = Vec::new();
    collect_files(dir, &mut files)
        .map_err(|e| PipelineError::artifact(dir, "failed to list artifact directory", e))?;
    files.sort();

    if let Some(parent) = archive.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::artifact(parent, "failed to create upload destination", e))?;
    }
    let zip_file = File::create(archive)
        .map_err(|e| PipelineError::artifact(archive, "failed to create archive", e))?;

    let mut zip = ZipWriter::new(zip_file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for file in &files {
        let name = file
            .strip_prefix(dir)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        zip.start_file(name.as_str(), options)
            .map_err(|e| PipelineError::artifact(archive, format!("failed to add {}", name), e))?;
        let content = std::fs::read(file)
            .map_err(|e| PipelineError::artifact(file, "failed to read artifact", e))?;
        zip.write_all(&content)
            .map_err(|e| PipelineError::artifact(archive, format!("failed to add {}", name), e))?;
    }

    zip.finish()
        .map_err(|e| PipelineError::artifact(archive, "failed to finalize archive", e))?;
    Ok(files.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
