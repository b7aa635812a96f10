//! Aggregate manager: owns per-item aggregate cache files.

use crate::event::{self, DecodeError};
use crate::lock::{ItemGuard, LockError};
use crate::model::ItemId;
use crate::state::{self, Aggregate, FoldError, AGGREGATE_SCHEMA_VERSION};
use crate::store::{EventStore, StoreError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Why an aggregate changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    UserEdit,
    ExternalWrite,
    GitPull,
}

impl ChangeCause {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserEdit => "user_edit",
            Self::ExternalWrite => "external_write",
            Self::GitPull => "git_pull",
        }
    }
}

/// Subscriber notified on every aggregate update.
pub trait ChangeSink: Send + Sync {
    fn notify(&self, item_ids: &[ItemId], cause: ChangeCause);
}

/// Error from an aggregate-manager operation.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing aggregate: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Result of [`Manager::validate_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub invalid_items: Vec<ItemId>,
}

/// Owns the `.aggregates/` cache directory next to an event store.
pub struct Manager {
    store: EventStore,
    aggregates_dir: PathBuf,
    lock_dir: PathBuf,
    sinks: Mutex<Vec<Arc<dyn ChangeSink>>>,
    /// Filenames this process itself wrote, used to tell a first-party
    /// write apart from one that simply shows up on disk.
    authored: RwLock<HashSet<String>>,
    rebuilding: std::sync::atomic::AtomicBool,
}

impl Manager {
    #[must_use]
    pub fn new(store: EventStore, aggregates_dir: impl Into<PathBuf>) -> Self {
        let aggregates_dir = aggregates_dir.into();
        let lock_dir = aggregates_dir.join(".locks");
        Self {
            store,
            aggregates_dir,
            lock_dir,
            sinks: Mutex::new(Vec::new()),
            authored: RwLock::new(HashSet::new()),
            rebuilding: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    #[must_use]
    pub fn aggregates_dir(&self) -> &Path {
        &self.aggregates_dir
    }

    /// Whether a full rebuild is currently running.
    #[must_use]
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn on_change(&self, sink: Arc<dyn ChangeSink>) {
        self.sinks.lock().expect("sinks lock poisoned").push(sink);
    }

    fn notify(&self, item_ids: &[ItemId], cause: ChangeCause) {
        if item_ids.is_empty() {
            return;
        }
        for sink in self.sinks.lock().expect("sinks lock poisoned").iter() {
            sink.notify(item_ids, cause);
        }
    }

    fn cache_path(&self, item_id: &ItemId) -> PathBuf {
        self.aggregates_dir.join(format!("{item_id}.json"))
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> ManagerError {
        ManagerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_cache(&self, aggregate: &Aggregate) -> Result<(), ManagerError> {
        std::fs::create_dir_all(&self.aggregates_dir).map_err(|e| self.io_err(&self.aggregates_dir, e))?;
        let path = self.cache_path(&aggregate.item_id);
        let tmp = self
            .aggregates_dir
            .join(format!(".{}.tmp-{}", aggregate.item_id, std::process::id()));
        let json = serde_json::to_vec_pretty(aggregate)?;
        std::fs::write(&tmp, &json).map_err(|e| self.io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| self.io_err(&path, e))?;
        Ok(())
    }

    fn read_cache(&self, item_id: &ItemId) -> Option<Aggregate> {
        let path = self.cache_path(item_id);
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn recompute(&self, item_id: &ItemId) -> Result<Aggregate, ManagerError> {
        let events = self.store.sorted_event_files_for_item(item_id)?;
        let aggregate = state::fold(item_id, &events)?;
        Ok(aggregate)
    }

    /// `get(itemId)`: read the cached aggregate, rebuilding it from events
    /// on first read or after cache loss.
    pub fn get(&self, item_id: &ItemId) -> Result<Aggregate, ManagerError> {
        let _guard = ItemGuard::acquire_default(&self.lock_dir, item_id.as_str())?;
        if let Some(cached) = self.read_cache(item_id) {
            if cached.schema_version == AGGREGATE_SCHEMA_VERSION {
                return Ok(cached);
            }
        }
        let aggregate = self.recompute(item_id)?;
        self.write_cache(&aggregate)?;
        Ok(aggregate)
    }

    /// Force recomputation of `item_id` regardless of whether a cache
    /// entry exists, writing the result back and notifying subscribers.
    fn refresh(&self, item_id: &ItemId, cause: ChangeCause) -> Result<(), ManagerError> {
        let _guard = ItemGuard::acquire_default(&self.lock_dir, item_id.as_str())?;
        let aggregate = self.recompute(item_id)?;
        self.write_cache(&aggregate)?;
        drop(_guard);
        self.notify(std::slice::from_ref(item_id), cause);
        Ok(())
    }

    /// `updateForEvent`/record-write: called immediately after the API
    /// write path persists a new event file. Since a first-party write is
    /// always the newest event for its item, a full refold is safe and —
    /// at this crate's data scale — simpler than a true minimal patch
    /// while remaining provably correct; dependency events update both
    /// endpoints.
    pub fn record_write(&self, filename: &str) -> Result<Vec<ItemId>, ManagerError> {
        self.authored
            .write()
            .expect("authored lock poisoned")
            .insert(filename.to_string());
        let parsed = event::filename::parse(filename)?;
        let ids = parsed.item_ids();
        for id in &ids {
            self.refresh(id, ChangeCause::UserEdit)?;
        }
        Ok(ids)
    }

    /// `invalidateByFiles`: given filenames changed by an inbound merge,
    /// force recomputation of every affected item. Parses the full
    /// grammar so a dependency file always invalidates both endpoints
    ///.
    pub fn invalidate_by_files(&self, filenames: &[String]) -> Result<Vec<ItemId>, ManagerError> {
        let mut affected = HashSet::new();
        for filename in filenames {
            let parsed = event::filename::parse(filename)?;
            affected.extend(parsed.item_ids());
        }
        let mut changed = Vec::new();
        for id in &affected {
            self.refresh(id, ChangeCause::GitPull)?;
            changed.push(id.clone());
        }
        Ok(changed)
    }

    /// Scan the data directory for filenames this process never authored
    /// and never invalidated via an inbound merge, and invalidate their
    /// affected items as `external_write`.
    pub fn reconcile_untracked(&self) -> Result<Vec<ItemId>, ManagerError> {
        let all = self.store.list_all_filenames()?;
        let authored = self.authored.read().expect("authored lock poisoned");
        let untracked: Vec<String> = all.into_iter().filter(|f| !authored.contains(f)).collect();
        drop(authored);

        let mut affected = HashSet::new();
        for filename in &untracked {
            if let Ok(parsed) = event::filename::parse(filename) {
                affected.extend(parsed.item_ids());
            }
        }
        let mut authored_mut = self.authored.write().expect("authored lock poisoned");
        authored_mut.extend(untracked);
        drop(authored_mut);

        let mut changed = Vec::new();
        for id in &affected {
            self.refresh(id, ChangeCause::ExternalWrite)?;
            changed.push(id.clone());
        }
        Ok(changed)
    }

    /// `validateAll`: cheap consistency check over every known item's
    /// cache file.
    pub fn validate_all(&self) -> Result<ValidationReport, ManagerError> {
        let ids = self.store.read_all_item_ids()?;
        let mut invalid_items = Vec::new();
        for id in ids {
            match self.read_cache(&id) {
                Some(cached) if cached.schema_version == AGGREGATE_SCHEMA_VERSION => {}
                _ => invalid_items.push(id),
            }
        }
        Ok(ValidationReport {
            valid: invalid_items.is_empty(),
            invalid_items,
        })
    }

    /// `rebuildAll`: recompute every item's aggregate from scratch.
    /// `progress` is invoked as `(current, total)` after each item.
    pub fn rebuild_all(&self, mut progress: impl FnMut(usize, usize)) -> Result<(), ManagerError> {
        self.rebuilding.store(true, std::sync::atomic::Ordering::SeqCst);
        let result = (|| {
            let ids: Vec<ItemId> = {
                let mut v: Vec<ItemId> = self.store.read_all_item_ids()?.into_iter().collect();
                v.sort();
                v
            };
            let total = ids.len();
            for (i, id) in ids.iter().enumerate() {
                self.refresh(id, ChangeCause::GitPull)?;
                progress(i + 1, total);
            }
            Ok(())
        })();
        self.rebuilding.store(false, std::sync::atomic::Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    fn tmp(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-agg-test-{label}-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn person() -> Person {
        Person {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            timestamp: "20260101000000000".into(),
        }
    }

    struct RecordingSink(StdMutex<Vec<(Vec<ItemId>, ChangeCause)>>);

    impl ChangeSink for RecordingSink {
        fn notify(&self, item_ids: &[ItemId], cause: ChangeCause) {
            self.0.lock().unwrap().push((item_ids.to_vec(), cause));
        }
    }

    fn manager(label: &str) -> (Manager, PathBuf) {
        let dir = tmp(label);
        let store = EventStore::new(dir.join("data"));
        let agg_dir = dir.join("data/.aggregates");
        (Manager::new(store, agg_dir), dir)
    }

    #[test]
    fn get_rebuilds_from_events_on_first_read() {
        let (mgr, _dir) = manager("get");
        let id = ItemId::parse("12345678").unwrap();
        mgr.store()
            .write_create(&id, "Fix login bug", "incomplete", &person(), "ts")
            .unwrap();
        let agg = mgr.get(&id).unwrap();
        assert_eq!(agg.tagline, "Fix login bug");
        assert!(mgr.cache_path(&id).exists());
    }

    #[test]
    fn record_write_notifies_with_user_edit() {
        let (mgr, _dir) = manager("record");
        let sink = Arc::new(RecordingSink(StdMutex::new(Vec::new())));
        mgr.on_change(sink.clone());
        let id = ItemId::parse("12345678").unwrap();
        let filename = mgr
            .store()
            .write_create(&id, "A", "incomplete", &person(), "ts")
            .unwrap();
        mgr.record_write(&filename).unwrap();
        let calls = sink.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, ChangeCause::UserEdit);
    }

    #[test]
    fn dependency_write_invalidates_both_endpoints() {
        let (mgr, _dir) = manager("dep");
        let needing = ItemId::parse("11111111").unwrap();
        let needed = ItemId::parse("22222222").unwrap();
        mgr.store().write_create(&needing, "A", "incomplete", &person(), "ts").unwrap();
        mgr.store().write_create(&needed, "B", "incomplete", &person(), "ts").unwrap();
        let filename = mgr
            .store()
            .write_dependency(&needing, event::LinkAction::Linked, &needed, &person())
            .unwrap();
        let ids = mgr.record_write(&filename).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(mgr.get(&needing).unwrap().dependencies, vec![needed.clone()]);
        assert_eq!(mgr.get(&needed).unwrap().dependents, vec![needing]);
    }

    #[test]
    fn validate_all_flags_missing_cache() {
        let (mgr, _dir) = manager("validate");
        let id = ItemId::parse("12345678").unwrap();
        mgr.store().write_create(&id, "A", "incomplete", &person(), "ts").unwrap();
        let report = mgr.validate_all().unwrap();
        assert!(!report.valid);
        assert_eq!(report.invalid_items, vec![id]);
    }

    #[test]
    fn rebuild_all_reports_progress_and_notifies() {
        let (mgr, _dir) = manager("rebuild");
        let sink = Arc::new(RecordingSink(StdMutex::new(Vec::new())));
        mgr.on_change(sink.clone());
        let a = ItemId::parse("11111111").unwrap();
        let b = ItemId::parse("22222222").unwrap();
        mgr.store().write_create(&a, "A", "incomplete", &person(), "ts").unwrap();
        mgr.store().write_create(&b, "B", "incomplete", &person(), "ts").unwrap();

        let mut steps = Vec::new();
        mgr.rebuild_all(|cur, total| steps.push((cur, total))).unwrap();
        assert_eq!(steps, vec![(1, 2), (2, 2)]);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
        assert!(!mgr.is_rebuilding());
    }

    #[test]
    fn reconcile_untracked_picks_up_foreign_files() {
        let (mgr, dir) = manager("external");
        let id = ItemId::parse("12345678").unwrap();
        // Write directly, bypassing record_write, to simulate a file that
        // appeared without going through this process's write path.
        mgr.store().write_create(&id, "A", "incomplete", &person(), "ts").unwrap();
        let _ = &dir;
        let changed = mgr.reconcile_untracked().unwrap();
        assert_eq!(changed, vec![id]);
    }
}
