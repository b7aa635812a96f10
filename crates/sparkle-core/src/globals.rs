//! The two global aggregates: `statuses.json` (allowed status
//! names) and `takers.json` (every person who has ever taken any item).
//!
//! Both live in `.aggregates/` alongside the per-item caches and share the
//! same "one write at a time" invariant, so
//! each gets its own lock file under the manager's lock directory.

use crate::lock::{ItemGuard, LockError};
use crate::model::Person;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const BUILTIN_INCOMPLETE: &str = "incomplete";
pub const BUILTIN_COMPLETED: &str = "completed";

/// Error from a global-aggregate operation.
#[derive(Debug, thiserror::Error)]
pub enum GlobalsError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("status list must contain '{BUILTIN_INCOMPLETE}' and '{BUILTIN_COMPLETED}'")]
    MissingBuiltins,

    #[error("status list contains a duplicate entry: {0}")]
    Duplicate(String),

    #[error("cannot remove built-in status '{0}'")]
    RemovingBuiltin(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statuses {
    pub statuses: Vec<String>,
}

impl Default for Statuses {
    fn default() -> Self {
        Self {
            statuses: vec![BUILTIN_INCOMPLETE.to_string(), BUILTIN_COMPLETED.to_string()],
        }
    }
}

/// Validate a proposed status list for `updateStatuses(list)`: must
/// contain both built-ins, no duplicates.
pub fn validate_statuses(list: &[String]) -> Result<(), GlobalsError> {
    if !list.iter().any(|s| s == BUILTIN_INCOMPLETE) || !list.iter().any(|s| s == BUILTIN_COMPLETED) {
        return Err(GlobalsError::MissingBuiltins);
    }
    let mut seen = BTreeSet::new();
    for s in list {
        if !seen.insert(s.clone()) {
            return Err(GlobalsError::Duplicate(s.clone()));
        }
    }
    Ok(())
}

/// Owns `statuses.json` and `takers.json` under one aggregates directory.
pub struct GlobalsStore {
    aggregates_dir: PathBuf,
    lock_dir: PathBuf,
}

impl GlobalsStore {
    #[must_use]
    pub fn new(aggregates_dir: impl Into<PathBuf>) -> Self {
        let aggregates_dir = aggregates_dir.into();
        let lock_dir = aggregates_dir.join(".locks");
        Self {
            aggregates_dir,
            lock_dir,
        }
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> GlobalsError {
        GlobalsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), GlobalsError> {
        std::fs::create_dir_all(&self.aggregates_dir).map_err(|e| self.io_err(&self.aggregates_dir, e))?;
        let path = self.aggregates_dir.join(name);
        let tmp = self.aggregates_dir.join(format!(".{name}.tmp-{}", std::process::id()));
        let json = serde_json::to_vec_pretty(value).map_err(|source| GlobalsError::Serialize {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&tmp, &json).map_err(|e| self.io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| self.io_err(&path, e))?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de> + Default>(&self, name: &str) -> T {
        let path = self.aggregates_dir.join(name);
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Read the current allowed-status list, defaulting to the two
    /// built-ins if the file has never been written.
    #[must_use]
    pub fn statuses(&self) -> Statuses {
        self.read_json("statuses.json")
    }

    /// `updateStatuses(list)`: validate and persist.
    pub fn update_statuses(&self, list: Vec<String>) -> Result<Statuses, GlobalsError> {
        validate_statuses(&list)?;
        let _guard = ItemGuard::acquire_default(&self.lock_dir, "statuses")?;
        let statuses = Statuses { statuses: list };
        self.write_json("statuses.json", &statuses)?;
        Ok(statuses)
    }

    /// Read the set of every person who has ever taken an item.
    #[must_use]
    pub fn takers(&self) -> Vec<Person> {
        let wrapper: TakersFile = self.read_json("takers.json");
        wrapper.takers
    }

    /// Record `person` as a taker if not already present (keyed by
    /// [`Person::hash`]), the way `takeItem` is expected to call this
    /// after every successful take.
    pub fn record_taker(&self, person: &Person) -> Result<bool, GlobalsError> {
        let _guard = ItemGuard::acquire_default(&self.lock_dir, "takers")?;
        let mut wrapper: TakersFile = self.read_json("takers.json");
        if wrapper.takers.iter().any(|p| p.hash() == person.hash()) {
            return Ok(false);
        }
        wrapper.takers.push(person.clone());
        self.write_json("takers.json", &wrapper)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TakersFile {
    #[serde(default)]
    takers: Vec<Person>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-globals-test-{label}-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn person(name: &str) -> Person {
        Person {
            name: name.into(),
            email: format!("{name}@example.com"),
            timestamp: "ts".into(),
        }
    }

    #[test]
    fn statuses_default_to_builtins() {
        let store = GlobalsStore::new(tmp("default"));
        assert_eq!(store.statuses().statuses, vec!["incomplete", "completed"]);
    }

    #[test]
    fn update_statuses_rejects_missing_builtin() {
        let store = GlobalsStore::new(tmp("missing-builtin"));
        let err = store.update_statuses(vec!["incomplete".into(), "extra".into()]);
        assert!(matches!(err, Err(GlobalsError::MissingBuiltins)));
    }

    #[test]
    fn update_statuses_rejects_duplicates() {
        let store = GlobalsStore::new(tmp("dup"));
        let err = store.update_statuses(vec![
            "incomplete".into(),
            "completed".into(),
            "review".into(),
            "review".into(),
        ]);
        assert!(matches!(err, Err(GlobalsError::Duplicate(_))));
    }

    #[test]
    fn update_statuses_roundtrips() {
        let store = GlobalsStore::new(tmp("roundtrip"));
        let list = vec!["incomplete".into(), "review".into(), "completed".into()];
        store.update_statuses(list.clone()).unwrap();
        assert_eq!(store.statuses().statuses, list);
    }

    #[test]
    fn record_taker_dedupes_by_hash() {
        let store = GlobalsStore::new(tmp("takers"));
        assert!(store.record_taker(&person("Ada")).unwrap());
        assert!(!store.record_taker(&person("Ada")).unwrap());
        assert!(store.record_taker(&person("Bob")).unwrap());
        assert_eq!(store.takers().len(), 2);
    }
}
