//! Asset database: stable GUIDs for source files and content change detection
//!
//! Every source file under the database root gets a GUID derived from its
//! normalized relative path, so the same file maps to the same id across runs.
//! `refresh()` rehashes tracked files and bumps a per-asset version whenever
//! the content (or its existence) changes.

use crate::core::{AssetId, Hash128, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Namespace for path-derived asset GUIDs
const ASSET_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a47_93d5_4e8b_a0c1_5d2e_7b39_f604);

/// Bookkeeping for one source asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRecord {
    /// Path relative to the database root, '/' separated
    pub path: PathBuf,
    /// Hash of the file contents, `None` while the file is missing
    pub content_hash: Option<Hash128>,
    /// Incremented every time `content_hash` changes
    pub version: u64,
}

/// Directory-rooted asset database shared between clients and trackers
pub struct AssetDatabase {
    root: PathBuf,
    records: RwLock<HashMap<AssetId, AssetRecord>>,
}

impl AssetDatabase {
    /// Create a database rooted at `root`. Nothing is scanned until
    /// `import_asset` or `import_all` is called.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Root directory of the source assets
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// GUID for a root-relative path. Pure function of the normalized path.
    pub fn guid_for_path(relative: impl AsRef<Path>) -> AssetId {
        let normalized = normalize(relative.as_ref());
        Uuid::new_v5(&ASSET_NAMESPACE, normalized.as_bytes())
    }

    /// Register a root-relative path and return its GUID.
    ///
    /// Registering a path that does not exist yet is allowed; the asset is
    /// tracked as missing until the file appears and `refresh()` runs.
    pub fn import_asset(&self, relative: impl AsRef<Path>) -> AssetId {
        let relative = PathBuf::from(normalize(relative.as_ref()));
        let id = Self::guid_for_path(&relative);

        let mut records = self.write();
        if !records.contains_key(&id) {
            let content_hash = hash_file(&self.root.join(&relative));
            log::debug!("Registered asset {} ({})", relative.display(), id);
            records.insert(id, AssetRecord {
                path: relative,
                content_hash,
                version: 0,
            });
        }
        id
    }

    /// Register every file below the root. Returns the ids sorted.
    pub fn import_all(&self) -> Result<Vec<AssetId>> {
        let mut files = Vec::new();
        collect_files(&self.root, &self.root, &mut files)?;

        let mut ids: Vec<AssetId> = files.iter().map(|f| self.import_asset(f)).collect();
        ids.sort();
        Ok(ids)
    }

    /// Rehash every tracked file and bump the version of those whose
    /// content changed, appeared or disappeared. Returns the changed ids sorted.
    pub fn refresh(&self) -> Vec<AssetId> {
        let mut records = self.write();
        let mut changed = Vec::new();

        for (id, record) in records.iter_mut() {
            let current = hash_file(&self.root.join(&record.path));
            if current != record.content_hash {
                record.content_hash = current;
                record.version += 1;
                changed.push(*id);
            }
        }

        changed.sort();
        if !changed.is_empty() {
            log::debug!("Asset refresh found {} changed assets", changed.len());
        }
        changed
    }

    /// Absolute source path of an asset
    pub fn path_of(&self, id: AssetId) -> Option<PathBuf> {
        self.read().get(&id).map(|r| self.root.join(&r.path))
    }

    /// Current content version of an asset
    pub fn version(&self, id: AssetId) -> Option<u64> {
        self.read().get(&id).map(|r| r.version)
    }

    /// Snapshot of an asset's record
    pub fn record(&self, id: AssetId) -> Option<AssetRecord> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<AssetId, AssetRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<AssetId, AssetRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").trim_start_matches("./").to_string()
}

fn hash_file(path: &Path) -> Option<Hash128> {
    std::fs::read(path).ok().map(|bytes| Hash128::of(&bytes))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}
