//! Asset-side collaborators of the tracker: GUID database, importers,
//! artifact storage and the async import pipeline

pub mod database;
pub mod importer;
pub mod artifact_store;
pub mod pipeline;

pub use database::{AssetDatabase, AssetRecord};
pub use importer::{ArtifactKey, ImportOutput, Importer, SourceImporter};
pub use artifact_store::ArtifactStore;
pub use pipeline::{ImportOutcome, ImportPipeline, ImportRequest, ImportResult};
