//! Asset dependency tracking with a polled completion feed

pub mod slots;
pub mod config;
#[allow(clippy::module_inception)]
pub mod tracker;

pub use slots::{SlotArena, SlotId};
pub use config::TrackerConfig;
pub use tracker::{AssetDependencyTracker, Completed};
