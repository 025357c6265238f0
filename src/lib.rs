//! scenedeps - asset dependency tracking and sub-scene bundle deduplication

pub mod core;
pub mod assets;
pub mod tracker;
pub mod build;
