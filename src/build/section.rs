//! Scene sections, content object ids and per-section dependency listings

use crate::core::{AssetId, Result, SceneId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One streaming section of a scene
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneSection {
    pub scene: SceneId,
    pub section: i32,
}

impl SceneSection {
    pub fn new(scene: SceneId, section: i32) -> Self {
        Self { scene, section }
    }
}

impl fmt::Display for SceneSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scene, self.section)
    }
}

/// Reference to one object inside an asset's content
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub guid: AssetId,
    pub local_id: i64,
}

impl ObjectId {
    pub fn new(guid: AssetId, local_id: i64) -> Self {
        Self { guid, local_id }
    }

    /// An object id with a nil GUID references nothing
    pub fn is_valid(&self) -> bool {
        !self.guid.is_nil()
    }
}

/// Flattened dependencies of one section.
///
/// `dependencies`, `types` and `paths` are positionally aligned. The
/// `Option`s model the nulls a manifest may contain; validation rejects them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDependencyInfo {
    pub section: SceneSection,
    pub dependencies: Option<Vec<ObjectId>>,
    pub types: Option<Vec<Option<String>>>,
    pub paths: Option<Vec<String>>,
}

impl SectionDependencyInfo {
    /// Listing with every array present
    pub fn new(
        section: SceneSection,
        dependencies: Vec<ObjectId>,
        types: Vec<Option<String>>,
        paths: Vec<String>,
    ) -> Self {
        Self {
            section,
            dependencies: Some(dependencies),
            types: Some(types),
            paths: Some(paths),
        }
    }

    /// Number of dependencies (0 if the array is null)
    pub fn len(&self) -> usize {
        self.dependencies.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// JSON manifest of section dependency listings, as consumed by the
/// `dedupe_bundles` binary
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
    pub sections: Option<Vec<SectionDependencyInfo>>,
}

impl DependencyManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
