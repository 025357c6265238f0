//! Content-addressed artifact storage on disk
//!
//! Artifacts live under `<dir>/<first two hex digits>/<artifact hex>/`, one
//! LZ4-compressed file per import output. The artifact id is a hash of the
//! import inputs, so producing an artifact that already exists is a lookup.

use crate::assets::importer::{ArtifactKey, Importer};
use crate::core::{ArtifactId, Error, Hash128, Result};
use std::io;
use std::path::{Path, PathBuf};

/// File extension for artifact outputs
const OUTPUT_EXTENSION: &str = "art";

/// On-disk artifact cache
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compute the artifact id for a key and its source content
    pub fn artifact_id(key: &ArtifactKey, importer_version: u32, source: &[u8]) -> ArtifactId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(key.asset.as_bytes());
        hasher.update(key.importer_type.as_bytes());
        hasher.update(&importer_version.to_le_bytes());
        if let Some(extra) = key.extra {
            hasher.update(&extra.0.to_le_bytes());
        }
        hasher.update(&(source.len() as u64).to_le_bytes());
        hasher.update(source);

        let id = Hash128::from_hasher(&hasher);
        // Zero is reserved for "no artifact"
        if id.is_zero() { Hash128(1) } else { id }
    }

    /// Directory holding the outputs of one artifact
    pub fn artifact_path(&self, artifact: ArtifactId) -> PathBuf {
        let hex = artifact.to_hex();
        self.dir.join(&hex[0..2]).join(hex)
    }

    /// Import `source` with `importer` and store the outputs.
    ///
    /// Returns the artifact id and the sorted output paths. If the artifact
    /// already exists on disk the importer is not run again. Blocking: runs
    /// the importer and writes to disk on the calling thread.
    ///
    /// Outputs are written to a private staging directory which is then
    /// renamed to the artifact directory in one step, so an artifact is either
    /// absent or complete. Concurrent producers of the same artifact all
    /// succeed; the first rename wins and the others adopt its outputs.
    pub fn produce(
        &self,
        key: &ArtifactKey,
        importer: &dyn Importer,
        source: &[u8],
    ) -> Result<(ArtifactId, Vec<PathBuf>)> {
        let artifact = Self::artifact_id(key, importer.version(), source);

        let existing = self.lookup(artifact);
        if !existing.is_empty() {
            log::debug!("Artifact {} already present for {}", artifact, key.asset);
            return Ok((artifact, existing));
        }

        let outputs = importer.import(key.asset, source)?;
        if outputs.is_empty() {
            return Err(Error::Import(format!(
                "importer '{}' produced no outputs for {}",
                key.importer_type, key.asset
            )));
        }

        let artifact_dir = self.artifact_path(artifact);
        let shard = artifact_dir.parent().unwrap_or(self.dir.as_path());
        std::fs::create_dir_all(shard)?;

        let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(shard)?;
        for output in &outputs {
            let compressed = lz4_flex::compress_prepend_size(&output.bytes);
            std::fs::write(staging.path().join(Self::output_file_name(&output.name)), compressed)?;
        }

        if let Err(e) = std::fs::rename(staging.path(), &artifact_dir) {
            // Another producer published the same artifact first
            let existing = self.lookup(artifact);
            if existing.is_empty() {
                return Err(e.into());
            }
            log::debug!("Artifact {} was published concurrently for {}", artifact, key.asset);
            return Ok((artifact, existing));
        }

        let paths = self.lookup(artifact);
        log::debug!("Produced artifact {} ({} outputs) for {}", artifact, paths.len(), key.asset);
        Ok((artifact, paths))
    }

    fn output_file_name(name: &str) -> String {
        format!("{}.{}", name, OUTPUT_EXTENSION)
    }

    /// Output paths of an artifact, sorted. Empty if it does not exist.
    pub fn lookup(&self, artifact: ArtifactId) -> Vec<PathBuf> {
        if artifact.is_zero() {
            return Vec::new();
        }

        let Ok(entries) = std::fs::read_dir(self.artifact_path(artifact)) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == OUTPUT_EXTENSION))
            .collect();
        paths.sort();
        paths
    }

    /// Read and decompress one artifact output
    pub fn read_output(path: &Path) -> Result<Vec<u8>> {
        let compressed = std::fs::read(path)?;
        let bytes = lz4_flex::decompress_size_prepended(&compressed).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("LZ4 decompression failed: {}", e))
        })?;
        Ok(bytes)
    }
}
