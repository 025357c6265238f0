//! Asset dependency tracker
//!
//! Tracks registrations of `(asset, user key)` pairs and reports, through a
//! polled completion feed, when each asset's import artifact resolves or
//! changes. Import work is shared per asset: however many keys reference an
//! asset, at most one import for it is in flight.

use super::config::TrackerConfig;
use super::slots::{SlotArena, SlotId};
use crate::assets::{
    ArtifactKey, ArtifactStore, AssetDatabase, ImportOutcome, ImportPipeline, ImportRequest,
    ImportResult, Importer,
};
use crate::core::{ArtifactId, AssetId, Error, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

/// A registration whose artifact changed since it was last reported.
///
/// `artifact` is `ArtifactId::ZERO` when the asset could not be imported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completed<K> {
    pub asset: AssetId,
    pub key: K,
    pub artifact: ArtifactId,
}

/// Identifies one import request: which entry, and which attempt
#[derive(Clone, Copy, Debug)]
struct Ticket {
    slot: SlotId,
    sequence: u64,
}

struct Subscriber {
    watch: bool,
    /// Artifact last handed out for this key
    reported: Option<ArtifactId>,
}

/// Shared state of one distinct asset
struct AssetEntry<K> {
    asset: AssetId,
    artifact: ArtifactId,
    /// Set once the first import finished
    resolved: bool,
    subscribers: HashMap<K, Subscriber>,
    /// Subscribers that asked for change watching
    watchers: usize,
    /// Database version of the source when the last import was scheduled
    source_version: Option<u64>,
    /// Sequence number of the import in flight
    in_flight: Option<u64>,
    /// Source changed while an import was in flight
    reimport_pending: bool,
    /// Already in the changed list
    queued: bool,
}

impl<K> AssetEntry<K> {
    fn new(asset: AssetId) -> Self {
        Self {
            asset,
            artifact: ArtifactId::ZERO,
            resolved: false,
            subscribers: HashMap::new(),
            watchers: 0,
            source_version: None,
            in_flight: None,
            reimport_pending: false,
            queued: false,
        }
    }
}

struct TrackerState<K> {
    database: Arc<AssetDatabase>,
    pipeline: ImportPipeline<Ticket>,
    importer_type: String,
    entries: SlotArena<AssetEntry<K>>,
    index: HashMap<AssetId, SlotId>,
    /// Entries whose subscribers may have something to report
    changed: Vec<SlotId>,
    /// Reused buffer for polled import results
    results: Vec<ImportResult<Ticket>>,
    /// Watching registrations across all entries
    watchers: usize,
    next_sequence: u64,
    refresh_requested: bool,
}

impl<K: Eq + Hash + Clone> TrackerState<K> {
    fn schedule_import(&mut self, slot: SlotId) -> Result<()> {
        let Some(entry) = self.entries.get_mut(slot) else {
            return Ok(());
        };

        self.next_sequence += 1;
        let sequence = self.next_sequence;
        let asset = entry.asset;

        entry.source_version = self.database.version(asset);
        entry.in_flight = Some(sequence);
        entry.reimport_pending = false;

        log::debug!("Scheduling import of {} (#{})", asset, sequence);

        self.pipeline.submit(ImportRequest {
            tag: Ticket { slot, sequence },
            key: ArtifactKey::new(asset, self.importer_type.clone()),
            source_path: self.database.path_of(asset),
        })
    }

    fn mark_changed(&mut self, slot: SlotId) {
        if let Some(entry) = self.entries.get_mut(slot) {
            if !entry.queued {
                entry.queued = true;
                self.changed.push(slot);
            }
        }
    }

    /// Refresh the database, schedule re-imports for stale sources and apply
    /// finished imports.
    fn pump(&mut self) -> Result<()> {
        let force = self.refresh_requested;
        if force || self.watchers > 0 {
            self.refresh_requested = false;
            self.database.refresh();

            let stale: Vec<SlotId> = self
                .entries
                .iter()
                .filter(|(_, e)| force || e.watchers > 0)
                .filter(|(_, e)| self.database.version(e.asset) != e.source_version)
                .map(|(slot, _)| slot)
                .collect();

            for slot in stale {
                let Some(entry) = self.entries.get_mut(slot) else { continue };
                if entry.in_flight.is_some() {
                    entry.reimport_pending = true;
                } else {
                    log::debug!("Source of {} changed, reimporting", entry.asset);
                    self.schedule_import(slot)?;
                }
            }
        }

        let mut results = std::mem::take(&mut self.results);
        self.pipeline.poll(&mut results);
        // Every result is applied; the first error is returned
        let mut outcome = Ok(());
        for result in results.drain(..) {
            let applied = self.apply_result(result);
            if outcome.is_ok() {
                outcome = applied;
            }
        }
        self.results = results;
        outcome
    }

    fn apply_result(&mut self, result: ImportResult<Ticket>) -> Result<()> {
        let Ticket { slot, sequence } = result.tag;

        let Some(entry) = self.entries.get_mut(slot) else {
            log::debug!("Dropping import of {}: no longer tracked", result.asset);
            return Ok(());
        };
        if entry.in_flight != Some(sequence) {
            log::debug!("Dropping superseded import of {}", result.asset);
            return Ok(());
        }

        entry.in_flight = None;
        if entry.reimport_pending {
            log::debug!("Source of {} changed during import, reimporting", result.asset);
            return self.schedule_import(slot);
        }

        if let ImportOutcome::Failed(reason) = &result.outcome {
            log::warn!("Import of {} failed: {}", result.asset, reason);
        }

        entry.artifact = result.outcome.artifact();
        entry.resolved = true;
        self.mark_changed(slot);
        Ok(())
    }

    fn drain_completed(&mut self, out: &mut Vec<Completed<K>>) {
        for slot in self.changed.drain(..) {
            let Some(entry) = self.entries.get_mut(slot) else { continue };
            entry.queued = false;
            if !entry.resolved {
                continue;
            }

            let asset = entry.asset;
            let artifact = entry.artifact;
            for (key, subscriber) in entry.subscribers.iter_mut() {
                if subscriber.reported != Some(artifact) {
                    subscriber.reported = Some(artifact);
                    out.push(Completed { asset, key: key.clone(), artifact });
                }
            }
        }
    }
}

/// Registry of asset interest with a polled completion feed.
///
/// The tracker owns an import pipeline and must be released with
/// [`close`](Self::close) (or by dropping it). Every call after `close`
/// fails with [`Error::Disposed`].
pub struct AssetDependencyTracker<K> {
    state: Option<TrackerState<K>>,
}

impl<K: Eq + Hash + Clone> AssetDependencyTracker<K> {
    /// Create a tracker importing assets of `database` with `importer`
    pub fn new(
        database: Arc<AssetDatabase>,
        importer: Arc<dyn Importer>,
        config: &TrackerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let importer_type = importer.importer_type().to_string();
        let store = ArtifactStore::new(&config.artifact_dir);
        let pipeline = ImportPipeline::new(store, importer, config.max_concurrent_imports)?;

        log::info!("Asset dependency tracker created for importer '{}'", importer_type);

        Ok(Self {
            state: Some(TrackerState {
                database,
                pipeline,
                importer_type,
                entries: SlotArena::with_capacity(config.initial_capacity),
                index: HashMap::with_capacity(config.initial_capacity),
                changed: Vec::new(),
                results: Vec::new(),
                watchers: 0,
                next_sequence: 0,
                refresh_requested: false,
            }),
        })
    }

    fn state(&self) -> Result<&TrackerState<K>> {
        self.state.as_ref().ok_or(Error::Disposed)
    }

    fn state_mut(&mut self) -> Result<&mut TrackerState<K>> {
        self.state.as_mut().ok_or(Error::Disposed)
    }

    /// Register interest in `asset` under `key`.
    ///
    /// The first registration of an asset schedules its import. Later
    /// registrations share that import; if the asset is already resolved the
    /// new key is reported on the next poll.
    pub fn add(&mut self, asset: AssetId, key: K, watch_for_changes: bool) -> Result<()> {
        let state = self.state_mut()?;
        if asset.is_nil() {
            return Err(Error::InvalidArgument("cannot add the nil asset id".into()));
        }

        if let Some(&slot) = state.index.get(&asset) {
            if let Some(entry) = state.entries.get_mut(slot) {
                if entry.subscribers.contains_key(&key) {
                    return Err(Error::InvalidArgument(format!(
                        "asset {} is already registered for this key",
                        asset
                    )));
                }

                entry.subscribers.insert(key, Subscriber { watch: watch_for_changes, reported: None });
                if watch_for_changes {
                    entry.watchers += 1;
                    state.watchers += 1;
                }
                if entry.resolved {
                    state.mark_changed(slot);
                }
                return Ok(());
            }
        }

        let mut entry = AssetEntry::new(asset);
        entry.subscribers.insert(key, Subscriber { watch: watch_for_changes, reported: None });
        entry.watchers = usize::from(watch_for_changes);

        let slot = state.entries.insert(entry);
        state.index.insert(asset, slot);

        if let Err(e) = state.schedule_import(slot) {
            state.entries.remove(slot);
            state.index.remove(&asset);
            return Err(e);
        }
        state.watchers += usize::from(watch_for_changes);
        Ok(())
    }

    /// Unregister `key` from `asset`.
    ///
    /// Removing the last key releases the asset; an import still in flight
    /// for it is discarded when it finishes.
    pub fn remove(&mut self, asset: AssetId, key: &K) -> Result<()> {
        let state = self.state_mut()?;
        if asset.is_nil() {
            return Err(Error::InvalidArgument("cannot remove the nil asset id".into()));
        }

        let not_registered =
            || Error::InvalidArgument(format!("asset {} is not registered for this key", asset));

        let slot = *state.index.get(&asset).ok_or_else(not_registered)?;
        let entry = state.entries.get_mut(slot).ok_or_else(not_registered)?;
        let subscriber = entry.subscribers.remove(key).ok_or_else(not_registered)?;

        if subscriber.watch {
            entry.watchers -= 1;
            state.watchers -= 1;
        }

        if entry.subscribers.is_empty() {
            if entry.in_flight.is_some() {
                log::debug!("Releasing {} with an import in flight", asset);
            }
            state.entries.remove(slot);
            state.index.remove(&asset);
        }
        Ok(())
    }

    /// Clear `out` and fill it with the completions since the previous call
    pub fn get_completed(&mut self, out: &mut Vec<Completed<K>>) -> Result<()> {
        out.clear();
        self.add_completed(out)
    }

    /// Append the completions since the previous call to `out`
    pub fn add_completed(&mut self, out: &mut Vec<Completed<K>>) -> Result<()> {
        let state = self.state_mut()?;
        state.pump()?;
        state.drain_completed(out);
        Ok(())
    }

    /// Refresh the database and recheck every asset, watched or not, on the
    /// next poll
    pub fn request_refresh(&mut self) -> Result<()> {
        self.state_mut()?.refresh_requested = true;
        Ok(())
    }

    /// Number of distinct registered assets
    pub fn total_assets(&self) -> Result<usize> {
        Ok(self.state()?.index.len())
    }

    /// Number of registered assets without a first resolution
    pub fn in_progress_assets(&self) -> Result<usize> {
        Ok(self.state()?.entries.iter().filter(|(_, e)| !e.resolved).count())
    }

    pub fn is_registered(&self, asset: AssetId, key: &K) -> Result<bool> {
        let state = self.state()?;
        Ok(state
            .index
            .get(&asset)
            .and_then(|slot| state.entries.get(*slot))
            .is_some_and(|entry| entry.subscribers.contains_key(key)))
    }

    /// Current artifact of a registered asset, `None` until resolved
    pub fn artifact_of(&self, asset: AssetId) -> Result<Option<ArtifactId>> {
        let state = self.state()?;
        Ok(state
            .index
            .get(&asset)
            .and_then(|slot| state.entries.get(*slot))
            .filter(|entry| entry.resolved)
            .map(|entry| entry.artifact))
    }

    /// Output files of an artifact
    pub fn artifact_paths(&self, artifact: ArtifactId) -> Result<Vec<PathBuf>> {
        Ok(self.state()?.pipeline.store().lookup(artifact))
    }

    /// Database this tracker reads sources from
    pub fn database(&self) -> Result<&Arc<AssetDatabase>> {
        Ok(&self.state()?.database)
    }
}

impl<K> AssetDependencyTracker<K> {
    /// Release every registration and stop the import pipeline
    pub fn close(&mut self) {
        if let Some(mut state) = self.state.take() {
            let released = state.index.len();
            state.pipeline.shutdown();
            state.entries.clear();
            state.index.clear();
            state.changed.clear();
            log::info!("Asset dependency tracker closed ({} assets released)", released);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }
}

impl<K> Drop for AssetDependencyTracker<K> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ImportOutput, SourceImporter};
    use crate::core::Hash128;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(10);
    const POLL: Duration = Duration::from_millis(5);

    type Tracker = AssetDependencyTracker<&'static str>;

    struct Fixture {
        dir: TempDir,
        db: Arc<AssetDatabase>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("Assets")).unwrap();
            let db = Arc::new(AssetDatabase::new(dir.path().join("Assets")));
            Self { dir, db }
        }

        fn tracker(&self) -> Tracker {
            self.tracker_with(Arc::new(SourceImporter))
        }

        fn tracker_with(&self, importer: Arc<dyn Importer>) -> Tracker {
            let config = TrackerConfig::with_artifact_dir(self.dir.path().join("Library/Artifacts"));
            AssetDependencyTracker::new(Arc::clone(&self.db), importer, &config).unwrap()
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.dir.path().join("Assets").join(name), content).unwrap();
        }

        fn delete(&self, name: &str) {
            std::fs::remove_file(self.dir.path().join("Assets").join(name)).unwrap();
        }

        fn asset(&self, name: &str, content: &str) -> AssetId {
            self.write(name, content);
            self.db.import_asset(name)
        }
    }

    /// Poll until `count` completions arrived or the timeout expires
    fn wait_for(tracker: &mut Tracker, count: usize) -> Vec<Completed<&'static str>> {
        let deadline = Instant::now() + TIMEOUT;
        let mut out = Vec::new();
        while out.len() < count && Instant::now() < deadline {
            tracker.add_completed(&mut out).unwrap();
            if out.len() < count {
                std::thread::sleep(POLL);
            }
        }
        out
    }

    /// Poll for a short while and return everything reported
    fn settle(tracker: &mut Tracker) -> Vec<Completed<&'static str>> {
        let deadline = Instant::now() + Duration::from_millis(200);
        let mut out = Vec::new();
        while Instant::now() < deadline {
            tracker.add_completed(&mut out).unwrap();
            std::thread::sleep(POLL);
        }
        out
    }

    struct RejectingImporter;

    impl Importer for RejectingImporter {
        fn importer_type(&self) -> &str {
            "rejecting"
        }

        fn import(&self, asset: AssetId, _source: &[u8]) -> Result<Vec<ImportOutput>> {
            Err(Error::Import(format!("{} is not importable", asset)))
        }
    }

    /// Copies the source like `SourceImporter`, slowly enough that tests can
    /// act while the import is in flight
    struct SlowImporter;

    impl Importer for SlowImporter {
        fn importer_type(&self) -> &str {
            "source"
        }

        fn import(&self, asset: AssetId, source: &[u8]) -> Result<Vec<ImportOutput>> {
            std::thread::sleep(Duration::from_millis(250));
            SourceImporter.import(asset, source)
        }
    }

    fn read_artifact(tracker: &Tracker, artifact: ArtifactId) -> Vec<u8> {
        let paths = tracker.artifact_paths(artifact).unwrap();
        assert_eq!(paths.len(), 1);
        ArtifactStore::read_output(&paths[0]).unwrap()
    }

    #[test]
    fn test_single_asset_resolves() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", false).unwrap();
        assert_eq!(tracker.total_assets().unwrap(), 1);
        assert_eq!(tracker.in_progress_assets().unwrap(), 1);

        let completed = wait_for(&mut tracker, 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].asset, asset);
        assert_eq!(completed[0].key, "k");
        assert!(!completed[0].artifact.is_zero());

        assert_eq!(tracker.in_progress_assets().unwrap(), 0);
        assert_eq!(tracker.artifact_of(asset).unwrap(), Some(completed[0].artifact));

        let paths = tracker.artifact_paths(completed[0].artifact).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(ArtifactStore::read_output(&paths[0]).unwrap(), b"alpha");

        // Nothing changed since
        assert!(settle(&mut tracker).is_empty());
    }

    #[test]
    fn test_multiple_keys_share_artifact() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        for key in ["k1", "k2", "k3"] {
            tracker.add(asset, key, false).unwrap();
        }
        assert_eq!(tracker.total_assets().unwrap(), 1);
        assert_eq!(tracker.in_progress_assets().unwrap(), 1);

        let mut completed = wait_for(&mut tracker, 3);
        completed.sort_by_key(|c| c.key);

        let keys: Vec<_> = completed.iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        assert!(completed.iter().all(|c| c.artifact == completed[0].artifact));
        assert!(settle(&mut tracker).is_empty());
    }

    #[test]
    fn test_remove_before_resolution() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k1", false).unwrap();
        tracker.add(asset, "k2", false).unwrap();
        tracker.remove(asset, &"k1").unwrap();

        let completed = wait_for(&mut tracker, 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].key, "k2");
        assert!(settle(&mut tracker).is_empty());
    }

    #[test]
    fn test_remove_last_key_drops_in_flight_import() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", false).unwrap();
        tracker.remove(asset, &"k").unwrap();

        assert_eq!(tracker.total_assets().unwrap(), 0);
        assert_eq!(tracker.in_progress_assets().unwrap(), 0);
        assert!(settle(&mut tracker).is_empty());
    }

    #[test]
    fn test_readd_after_remove_reports_again() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", false).unwrap();
        let first = wait_for(&mut tracker, 1);
        tracker.remove(asset, &"k").unwrap();

        tracker.add(asset, "k", false).unwrap();
        let second = wait_for(&mut tracker, 1);

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].artifact, first[0].artifact);
    }

    #[test]
    fn test_readd_during_import_reports_once() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", &"x".repeat(1 << 20));
        let mut tracker = fx.tracker_with(Arc::new(SlowImporter));

        tracker.add(asset, "k", false).unwrap();
        tracker.remove(asset, &"k").unwrap();
        tracker.add(asset, "k", false).unwrap();

        let mut completed = wait_for(&mut tracker, 1);
        completed.extend(settle(&mut tracker));

        // The first import finishes for a released generation and is dropped
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].key, "k");
        assert!(!completed[0].artifact.is_zero());
        assert_eq!(read_artifact(&tracker, completed[0].artifact).len(), 1 << 20);
    }

    #[test]
    fn test_readd_race_never_reports_zero() {
        let fx = Fixture::new();
        let mut tracker = fx.tracker();

        for i in 0..20 {
            let asset = fx.asset(&format!("big{}.bin", i), &"y".repeat(1 << 20));
            tracker.add(asset, "k", false).unwrap();
            tracker.remove(asset, &"k").unwrap();
            tracker.add(asset, "k", false).unwrap();

            let completed = wait_for(&mut tracker, 1);
            assert_eq!(completed.len(), 1);
            assert!(!completed[0].artifact.is_zero(), "zero artifact for existing file {}", i);
        }
    }

    #[test]
    fn test_change_during_import_supersedes_it() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "first");
        let mut tracker = fx.tracker_with(Arc::new(SlowImporter));

        tracker.add(asset, "k", true).unwrap();
        fx.write("a.txt", "second");

        let mut out = Vec::new();
        tracker.add_completed(&mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(tracker.in_progress_assets().unwrap(), 1);

        let mut completed = wait_for(&mut tracker, 1);
        completed.extend(settle(&mut tracker));

        // Only the import of the latest content is reported
        assert_eq!(completed.len(), 1);
        assert_eq!(read_artifact(&tracker, completed[0].artifact), b"second");
        assert_eq!(tracker.artifact_of(asset).unwrap(), Some(completed[0].artifact));
    }

    #[test]
    fn test_failed_result_does_not_strand_the_rest() {
        let fx = Fixture::new();
        let a = fx.asset("a.txt", "alpha");
        let b = fx.asset("b.txt", "beta");
        let mut tracker = fx.tracker();

        tracker.add(a, "a", false).unwrap();
        tracker.add(b, "b", false).unwrap();
        wait_for(&mut tracker, 2);

        let state = tracker.state.as_mut().unwrap();
        let slot_a = state.index[&a];
        let slot_b = state.index[&b];

        // `a` needs a reimport that cannot be submitted once the pipeline is down
        let entry_a = state.entries.get_mut(slot_a).unwrap();
        entry_a.in_flight = Some(100);
        entry_a.reimport_pending = true;
        state.entries.get_mut(slot_b).unwrap().in_flight = Some(101);
        state.pipeline.shutdown();

        let imported = ImportOutcome::Imported { artifact: Hash128(7), paths: Vec::new() };
        state.results.push(ImportResult {
            tag: Ticket { slot: slot_a, sequence: 100 },
            asset: a,
            outcome: imported.clone(),
        });
        state.results.push(ImportResult {
            tag: Ticket { slot: slot_b, sequence: 101 },
            asset: b,
            outcome: imported,
        });

        assert!(matches!(state.pump(), Err(Error::Disposed)));

        let entry_b = state.entries.get(slot_b).unwrap();
        assert_eq!(entry_b.in_flight, None);
        assert_eq!(entry_b.artifact, Hash128(7));
        assert!(state.results.is_empty());
    }

    #[test]
    fn test_add_to_resolved_asset_reports_new_key_only() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "old", false).unwrap();
        let first = wait_for(&mut tracker, 1);

        tracker.add(asset, "new", false).unwrap();
        let mut out = Vec::new();
        tracker.get_completed(&mut out).unwrap();

        assert_eq!(out, vec![Completed { asset, key: "new", artifact: first[0].artifact }]);
        assert_eq!(tracker.in_progress_assets().unwrap(), 0);
    }

    #[test]
    fn test_contract_violations() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let other = fx.asset("b.txt", "beta");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", true).unwrap();

        assert!(matches!(tracker.add(asset, "k", true), Err(Error::InvalidArgument(_))));
        assert!(matches!(tracker.add(asset, "k", false), Err(Error::InvalidArgument(_))));
        assert!(matches!(tracker.add(AssetId::nil(), "k", false), Err(Error::InvalidArgument(_))));
        assert!(matches!(tracker.remove(other, &"k"), Err(Error::InvalidArgument(_))));
        assert!(matches!(tracker.remove(asset, &"missing"), Err(Error::InvalidArgument(_))));
        assert!(matches!(tracker.remove(AssetId::nil(), &"k"), Err(Error::InvalidArgument(_))));

        // Failed calls leave the state alone
        assert_eq!(tracker.total_assets().unwrap(), 1);
        assert!(tracker.is_registered(asset, &"k").unwrap());

        tracker.remove(asset, &"k").unwrap();
        assert!(matches!(tracker.remove(asset, &"k"), Err(Error::InvalidArgument(_))));
        assert_eq!(tracker.total_assets().unwrap(), 0);
    }

    #[test]
    fn test_watched_asset_reports_content_change() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", true).unwrap();
        let before = wait_for(&mut tracker, 1);

        fx.write("a.txt", "alpha, edited");
        let after = wait_for(&mut tracker, 1);

        assert_eq!(after.len(), 1);
        assert_eq!(after[0].key, "k");
        assert!(!after[0].artifact.is_zero());
        assert_ne!(after[0].artifact, before[0].artifact);
        assert!(settle(&mut tracker).is_empty());
    }

    #[test]
    fn test_unwatched_asset_ignores_change_until_refresh() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", false).unwrap();
        let before = wait_for(&mut tracker, 1);

        fx.write("a.txt", "beta");
        assert!(settle(&mut tracker).is_empty());

        tracker.request_refresh().unwrap();
        let after = wait_for(&mut tracker, 1);
        assert_eq!(after.len(), 1);
        assert_ne!(after[0].artifact, before[0].artifact);
    }

    #[test]
    fn test_watched_change_reaches_every_key() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "watcher", true).unwrap();
        tracker.add(asset, "passive", false).unwrap();
        wait_for(&mut tracker, 2);

        fx.write("a.txt", "gamma");
        let mut after = wait_for(&mut tracker, 2);
        after.sort_by_key(|c| c.key);

        assert_eq!(after.len(), 2);
        assert_eq!(after[0].artifact, after[1].artifact);
    }

    #[test]
    fn test_deleted_source_reports_zero_artifact() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", true).unwrap();
        let before = wait_for(&mut tracker, 1);
        assert!(!before[0].artifact.is_zero());

        fx.delete("a.txt");
        let after = wait_for(&mut tracker, 1);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].artifact, ArtifactId::ZERO);
        assert_eq!(tracker.artifact_of(asset).unwrap(), Some(ArtifactId::ZERO));
    }

    #[test]
    fn test_missing_and_unknown_assets_report_zero() {
        let fx = Fixture::new();
        let missing = fx.db.import_asset("never_written.txt");
        let unknown = AssetId::from_u128(0x1234);
        let mut tracker = fx.tracker();

        tracker.add(missing, "missing", false).unwrap();
        tracker.add(unknown, "unknown", false).unwrap();

        let completed = wait_for(&mut tracker, 2);
        assert_eq!(completed.len(), 2);
        assert!(completed.iter().all(|c| c.artifact == ArtifactId::ZERO));
        assert_eq!(tracker.in_progress_assets().unwrap(), 0);
    }

    #[test]
    fn test_import_failure_reports_zero() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker_with(Arc::new(RejectingImporter));

        tracker.add(asset, "k", false).unwrap();
        let completed = wait_for(&mut tracker, 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].artifact, ArtifactId::ZERO);
    }

    #[test]
    fn test_get_completed_clears_add_completed_appends() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();

        tracker.add(asset, "k", false).unwrap();
        let first = wait_for(&mut tracker, 1);

        let mut out = vec![first[0].clone()];
        tracker.add_completed(&mut out).unwrap();
        assert_eq!(out.len(), 1);

        tracker.get_completed(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_close_releases_and_fails_fast() {
        let fx = Fixture::new();
        let asset = fx.asset("a.txt", "alpha");
        let mut tracker = fx.tracker();
        tracker.add(asset, "k", true).unwrap();

        tracker.close();
        assert!(tracker.is_closed());

        let mut out = Vec::new();
        assert!(matches!(tracker.add(asset, "k2", false), Err(Error::Disposed)));
        assert!(matches!(tracker.remove(asset, &"k"), Err(Error::Disposed)));
        assert!(matches!(tracker.get_completed(&mut out), Err(Error::Disposed)));
        assert!(matches!(tracker.total_assets(), Err(Error::Disposed)));

        // Closing twice is harmless
        tracker.close();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fx = Fixture::new();
        let config = TrackerConfig { max_concurrent_imports: 0, ..Default::default() };
        let result = Tracker::new(Arc::clone(&fx.db), Arc::new(SourceImporter), &config);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
