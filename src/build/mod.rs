//! Build-time sub-scene bundle deduplication

pub mod section;
pub mod graph;
pub mod dedupe;

pub use section::{DependencyManifest, ObjectId, SceneSection, SectionDependencyInfo};
pub use graph::{ContentGraph, ContentNode};
pub use dedupe::{compute_dedupe_bundles, validate_input, BundleLayout, ValidationError};
