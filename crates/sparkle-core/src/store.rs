//! Event store: read/write individual event files in the data directory
//!.
//!
//! Pure filesystem component. Every write is temp-file-plus-rename so a
//! concurrent reader (another process, or this one mid fetch/merge) never
//! observes a partially written file.

use crate::clock;
use crate::event::{self, DecodedEvent};
use crate::model::{ItemId, Person};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Error from an event-store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing event payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not allocate a free filename after {attempts} attempts")]
    DuplicateEvent { attempts: u32 },

    #[error("decoding {filename}: {source}")]
    Decode {
        filename: String,
        #[source]
        source: event::DecodeError,
    },
}

const MAX_RAND_RETRIES: u32 = 8;

/// Filesystem-backed event store rooted at one data directory.
#[derive(Debug, Clone)]
pub struct EventStore {
    data_dir: PathBuf,
}

impl EventStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_atomic(&self, filename: &str, contents: &[u8]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| self.io_err(&self.data_dir, e))?;
        let path = self.data_dir.join(filename);
        let tmp_path = self
            .data_dir
            .join(format!(".{filename}.tmp-{}", std::process::id()));
        std::fs::write(&tmp_path, contents).map_err(|e| self.io_err(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| self.io_err(&path, e))?;
        Ok(())
    }

    /// Write a file whose name includes a timestamp and random suffix,
    /// retrying with a fresh suffix on filesystem collision.
    fn write_with_retry(
        &self,
        mut make_name: impl FnMut(&str, &str) -> String,
        contents: &[u8],
    ) -> Result<String, StoreError> {
        let ts = clock::next_timestamp();
        for _ in 0..MAX_RAND_RETRIES {
            let rand = clock::random_suffix();
            let name = make_name(&ts, &rand);
            if self.data_dir.join(&name).exists() {
                continue;
            }
            self.write_atomic(&name, contents)?;
            return Ok(name);
        }
        Err(StoreError::DuplicateEvent {
            attempts: MAX_RAND_RETRIES,
        })
    }

    /// `writeEvent` for item creation. The filename carries no timestamp,
    /// so this is a direct write rather than a retry loop; callers are
    /// expected to have already allocated a collision-free id via
    /// [`ItemId::generate`].
    pub fn write_create(
        &self,
        item_id: &ItemId,
        tagline: &str,
        status: &str,
        person: &Person,
        created: &str,
    ) -> Result<String, StoreError> {
        let payload = event::data::CreatePayload {
            item_id: item_id.as_str().to_string(),
            tagline: tagline.to_string(),
            status: status.to_string(),
            person: person.clone(),
            created: created.to_string(),
        };
        let contents = serde_json::to_vec(&payload)?;
        let name = event::filename::build_create(item_id);
        self.write_atomic(&name, &contents)?;
        Ok(name)
    }

    pub fn write_tagline(&self, item_id: &ItemId, tagline: &str, person: &Person) -> Result<String, StoreError> {
        let payload = event::data::TaglinePayload {
            tagline: tagline.to_string(),
            person: person.clone(),
        };
        let contents = serde_json::to_vec(&payload)?;
        self.write_with_retry(
            |ts, rand| event::filename::build_tagline(item_id, ts, rand),
            &contents,
        )
    }

    pub fn write_entry(&self, item_id: &ItemId, text: &str, person: &Person) -> Result<String, StoreError> {
        let payload = event::data::EntryPayload {
            text: text.to_string(),
            person: person.clone(),
        };
        let contents = serde_json::to_vec(&payload)?;
        self.write_with_retry(
            |ts, rand| event::filename::build_entry(item_id, ts, rand),
            &contents,
        )
    }

    pub fn write_status(
        &self,
        item_id: &ItemId,
        status: &str,
        text: Option<&str>,
        person: &Person,
    ) -> Result<String, StoreError> {
        let payload = event::data::StatusPayload {
            status: status.to_string(),
            text: text.map(str::to_string),
            person: person.clone(),
        };
        let contents = serde_json::to_vec(&payload)?;
        self.write_with_retry(
            |ts, rand| event::filename::build_status(item_id, ts, rand),
            &contents,
        )
    }

    pub fn write_dependency(
        &self,
        needing: &ItemId,
        action: event::LinkAction,
        needed: &ItemId,
        person: &Person,
    ) -> Result<String, StoreError> {
        let contents = serde_json::to_vec(&event::data::PersonPayload {
            person: person.clone(),
        })?;
        self.write_with_retry(
            |ts, rand| event::filename::build_dependency(needing, action, needed, ts, rand),
            &contents,
        )
    }

    pub fn write_monitor(
        &self,
        item_id: &ItemId,
        action: event::MonitorAction,
        person: &Person,
    ) -> Result<String, StoreError> {
        let contents = serde_json::to_vec(&event::data::PersonPayload {
            person: person.clone(),
        })?;
        let hash = person.hash();
        self.write_with_retry(
            |ts, rand| event::filename::build_monitor(item_id, action, &hash, ts, rand),
            &contents,
        )
    }

    pub fn write_taken(
        &self,
        item_id: &ItemId,
        action: event::TakenAction,
        person: &Person,
    ) -> Result<String, StoreError> {
        let contents = serde_json::to_vec(&event::data::PersonPayload {
            person: person.clone(),
        })?;
        let hash = person.hash();
        self.write_with_retry(
            |ts, rand| event::filename::build_taken(item_id, action, &hash, ts, rand),
            &contents,
        )
    }

    pub fn write_ignored(
        &self,
        item_id: &ItemId,
        action: event::IgnoredAction,
        person: &Person,
    ) -> Result<String, StoreError> {
        let contents = serde_json::to_vec(&event::data::PersonPayload {
            person: person.clone(),
        })?;
        self.write_with_retry(
            |ts, rand| event::filename::build_ignored(item_id, action, ts, rand),
            &contents,
        )
    }

    /// Every filename in the data directory, unsorted. Skips dotfiles
    /// (temp-write artefacts, `.gitignore`, the `.aggregates/` subtree).
    pub fn list_all_filenames(&self) -> Result<Vec<String>, StoreError> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir).map_err(|e| self.io_err(&self.data_dir, e))? {
            let entry = entry.map_err(|e| self.io_err(&self.data_dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    fn read_and_decode(&self, filename: &str) -> Result<DecodedEvent, StoreError> {
        let path = self.data_dir.join(filename);
        let raw = std::fs::read_to_string(&path).map_err(|e| self.io_err(&path, e))?;
        event::decode(filename, &raw).map_err(|source| StoreError::Decode {
            filename: filename.to_string(),
            source,
        })
    }

    /// `listEventFilesForItem`: every file whose parse names `item_id` in
    /// either the primary or the "needed" position.
    pub fn list_event_files_for_item(&self, item_id: &ItemId) -> Result<Vec<DecodedEvent>, StoreError> {
        let mut out = Vec::new();
        for name in self.list_all_filenames()? {
            let Ok(parsed) = event::filename::parse(&name) else {
                continue;
            };
            if parsed.item_ids().contains(item_id) {
                out.push(self.read_and_decode(&name)?);
            }
        }
        Ok(out)
    }

    /// `readAllItemIds`: every id appearing in the primary position of any
    /// file.
    pub fn read_all_item_ids(&self) -> Result<HashSet<ItemId>, StoreError> {
        let mut ids = HashSet::new();
        for name in self.list_all_filenames()? {
            if let Ok(parsed) = event::filename::parse(&name) {
                ids.insert(parsed.primary_id);
            }
        }
        Ok(ids)
    }

    /// Decode every event file that concerns `item_id`, sorted by
    /// timestamp ascending (creation file first, since it carries no
    /// timestamp and therefore sorts before anything with one).
    pub fn sorted_event_files_for_item(&self, item_id: &ItemId) -> Result<Vec<DecodedEvent>, StoreError> {
        let mut events = self.list_event_files_for_item(item_id)?;
        events.sort_by(|a, b| {
            a.parsed
                .timestamp
                .as_deref()
                .unwrap_or("")
                .cmp(b.parsed.timestamp.as_deref().unwrap_or(""))
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-store-test-{label}-{n}"));
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

    #[test]
    fn write_and_list_create_event() {
        let dir = tmp("create");
        let store = EventStore::new(&dir);
        let id = ItemId::parse("12345678").unwrap();
        store
            .write_create(&id, "Fix login bug", "incomplete", &person(), "20260101000000000")
            .unwrap();
        let files = store.list_event_files_for_item(&id).unwrap();
        assert_eq!(files.len(), 1);
        assert!(matches!(files[0].body, EventBody::Create(_)));
    }

    #[test]
    fn dependency_event_appears_for_both_endpoints() {
        let dir = tmp("dependency");
        let store = EventStore::new(&dir);
        let needing = ItemId::parse("11111111").unwrap();
        let needed = ItemId::parse("22222222").unwrap();
        store
            .write_dependency(&needing, event::LinkAction::Linked, &needed, &person())
            .unwrap();
        assert_eq!(store.list_event_files_for_item(&needing).unwrap().len(), 1);
        assert_eq!(store.list_event_files_for_item(&needed).unwrap().len(), 1);
    }

    #[test]
    fn read_all_item_ids_only_counts_primary_position() {
        let dir = tmp("ids");
        let store = EventStore::new(&dir);
        let a = ItemId::parse("11111111").unwrap();
        let b = ItemId::parse("22222222").unwrap();
        store.write_create(&a, "A", "incomplete", &person(), "ts").unwrap();
        store
            .write_dependency(&a, event::LinkAction::Linked, &b, &person())
            .unwrap();
        let ids = store.read_all_item_ids().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&a));
    }

    #[test]
    fn sorted_events_are_timestamp_ascending() {
        let dir = tmp("sorted");
        let store = EventStore::new(&dir);
        let id = ItemId::parse("12345678").unwrap();
        store.write_create(&id, "A", "incomplete", &person(), "ts").unwrap();
        store.write_entry(&id, "first", &person()).unwrap();
        store.write_entry(&id, "second", &person()).unwrap();
        let events = store.sorted_event_files_for_item(&id).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0].body, EventBody::Create(_)));
    }
}
