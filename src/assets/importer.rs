//! Importer seam: turns source bytes into named artifact outputs

use crate::core::{AssetId, Hash128, Result};

/// Identifies one artifact production: which asset, which importer,
/// and an optional hash of extra importer settings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub asset: AssetId,
    pub importer_type: String,
    pub extra: Option<Hash128>,
}

impl ArtifactKey {
    pub fn new(asset: AssetId, importer_type: impl Into<String>) -> Self {
        Self {
            asset,
            importer_type: importer_type.into(),
            extra: None,
        }
    }

    /// Attach extra importer settings to the key
    pub fn with_extra(mut self, extra: Hash128) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// One file produced by an import
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportOutput {
    /// File name inside the artifact directory
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Produces artifact outputs from source content.
///
/// Implementations must be deterministic: identical source bytes must
/// produce identical outputs.
pub trait Importer: Send + Sync {
    /// Stable name of the importer, part of every artifact key
    fn importer_type(&self) -> &str;

    /// Bump to invalidate artifacts produced by older importer code
    fn version(&self) -> u32 {
        1
    }

    /// Import source bytes. An error means the asset is unimportable.
    fn import(&self, asset: AssetId, source: &[u8]) -> Result<Vec<ImportOutput>>;
}

/// Importer that stores the source content unchanged as a single output
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceImporter;

impl Importer for SourceImporter {
    fn importer_type(&self) -> &str {
        "source"
    }

    fn import(&self, _asset: AssetId, source: &[u8]) -> Result<Vec<ImportOutput>> {
        Ok(vec![ImportOutput {
            name: "main".to_string(),
            bytes: source.to_vec(),
        }])
    }
}
