//! Sub-scene bundle deduplication
//!
//! Objects referenced by two or more sections are moved into dedupe bundles.
//! Objects are grouped by the exact set of sections that reference them: all
//! objects with the same section set share one bundle, whose id is a hash of
//! that set. Objects referenced by a single section stay with that section.
//!
//! Every collection in the output is ordered (`BTreeMap`, sorted `Vec`), so
//! the serialized layout is byte-identical across runs.

use super::section::{ObjectId, SceneSection, SectionDependencyInfo};
use crate::core::{BundleId, Hash128, Result, SceneId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

/// Why a dependency input was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Dependency input is null")]
    NullInput,

    #[error("Section {section}: {field} array is null")]
    NullArray {
        section: SceneSection,
        field: &'static str,
    },

    #[error("Section {section}: array lengths differ (dependencies {dependencies}, types {types}, paths {paths})")]
    LengthMismatch {
        section: SceneSection,
        dependencies: usize,
        types: usize,
        paths: usize,
    },

    #[error("Section {section}: invalid object identifier at index {index}")]
    InvalidObject { section: SceneSection, index: usize },

    #[error("Section {section}: type at index {index} is null")]
    NullType { section: SceneSection, index: usize },

    #[error("Section {section}: path at index {index} is empty")]
    EmptyPath { section: SceneSection, index: usize },
}

/// Dedupe bundle contents and the bundles each section must load
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLayout {
    /// Bundle id -> sorted object ids
    pub bundles: BTreeMap<BundleId, Vec<ObjectId>>,
    /// Scene -> section index -> sorted bundle ids
    pub dependency_mapping: BTreeMap<SceneId, BTreeMap<i32, Vec<BundleId>>>,
}

impl BundleLayout {
    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }

    /// Bundles a section depends on; empty for unknown sections
    pub fn bundles_for(&self, section: SceneSection) -> &[BundleId] {
        self.dependency_mapping
            .get(&section.scene)
            .and_then(|sections| sections.get(&section.section))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Bundle holding `object`, if it was deduplicated
    pub fn bundle_of(&self, object: ObjectId) -> Option<BundleId> {
        self.bundles
            .iter()
            .find(|(_, objects)| objects.binary_search(&object).is_ok())
            .map(|(id, _)| *id)
    }

    /// Deterministic JSON encoding
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_bytes()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Check that every section listing is complete and consistent
pub fn validate_input(input: Option<&[SectionDependencyInfo]>) -> std::result::Result<(), ValidationError> {
    let sections = input.ok_or(ValidationError::NullInput)?;

    for info in sections {
        let section = info.section;
        let dependencies = info.dependencies.as_ref()
            .ok_or(ValidationError::NullArray { section, field: "dependencies" })?;
        let types = info.types.as_ref()
            .ok_or(ValidationError::NullArray { section, field: "types" })?;
        let paths = info.paths.as_ref()
            .ok_or(ValidationError::NullArray { section, field: "paths" })?;

        if dependencies.len() != types.len() || dependencies.len() != paths.len() {
            return Err(ValidationError::LengthMismatch {
                section,
                dependencies: dependencies.len(),
                types: types.len(),
                paths: paths.len(),
            });
        }

        for (index, ((object, type_name), path)) in dependencies.iter().zip(types).zip(paths).enumerate() {
            if !object.is_valid() {
                return Err(ValidationError::InvalidObject { section, index });
            }
            if type_name.is_none() {
                return Err(ValidationError::NullType { section, index });
            }
            if path.is_empty() {
                return Err(ValidationError::EmptyPath { section, index });
            }
        }
    }

    Ok(())
}

/// Bundle id for a set of sections
fn bundle_id(sections: &BTreeSet<SceneSection>) -> BundleId {
    let mut hasher = blake3::Hasher::new();
    for section in sections {
        hasher.update(section.scene.as_bytes());
        hasher.update(&section.section.to_le_bytes());
    }
    Hash128::from_hasher(&hasher)
}

/// Compute dedupe bundles for a set of section listings.
///
/// Fails without producing any output if the input does not validate.
/// Every input section appears in the dependency mapping, with an empty
/// list if it shares nothing.
pub fn compute_dedupe_bundles(
    input: Option<&[SectionDependencyInfo]>,
) -> std::result::Result<BundleLayout, ValidationError> {
    validate_input(input)?;
    let sections = input.ok_or(ValidationError::NullInput)?;

    // Object -> sections referencing it
    let mut users: HashMap<ObjectId, BTreeSet<SceneSection>> = HashMap::new();
    for info in sections {
        for object in info.dependencies.as_deref().unwrap_or_default() {
            users.entry(*object).or_default().insert(info.section);
        }
    }

    let mut layout = BundleLayout::default();
    let mut bundle_sections: BTreeMap<BundleId, BTreeSet<SceneSection>> = BTreeMap::new();

    for (object, referencing) in users {
        if referencing.len() < 2 {
            continue;
        }
        let id = bundle_id(&referencing);
        layout.bundles.entry(id).or_default().push(object);
        bundle_sections.entry(id).or_insert(referencing);
    }
    for objects in layout.bundles.values_mut() {
        objects.sort();
    }

    for info in sections {
        layout.dependency_mapping
            .entry(info.section.scene)
            .or_default()
            .entry(info.section.section)
            .or_default();
    }
    // Bundle ids are visited in order, so each section's list ends up sorted
    for (id, referencing) in &bundle_sections {
        for section in referencing {
            layout.dependency_mapping
                .entry(section.scene)
                .or_default()
                .entry(section.section)
                .or_default()
                .push(*id);
        }
    }

    log::debug!(
        "Dedupe: {} sections, {} shared objects in {} bundles",
        sections.len(),
        layout.bundles.values().map(Vec::len).sum::<usize>(),
        layout.bundle_count()
    );

    Ok(layout)
}
