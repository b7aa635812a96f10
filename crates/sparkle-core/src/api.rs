//! The Sparkle API.
//!
//! Ties together the event store, aggregate manager, dependency graph and
//! global aggregates behind one write contract: validate, check
//! invariants, stamp a person, write one event file,
//! incrementally update the affected aggregate(s), arm the commit
//! scheduler, return without waiting for the push. Arming the scheduler is
//! modelled as a [`WriteNotifier`] callback so this crate never depends on
//! `sparkle-git` directly — the daemon wires the git commit scheduler in as
//! the notifier.

use crate::aggregate::{ChangeSink, Manager, ManagerError};
use crate::event::{self, EventBody, EventKind};
use crate::globals::{GlobalsError, GlobalsStore, Statuses};
use crate::graph::{self, DagEmission, Potential};
use crate::model::{ItemId, Person};
use crate::state::{Aggregate, FoldError};
use crate::store::StoreError;
use crate::SparkleError;
use std::sync::Arc;

/// Notified with the filename of every event this API writes, so the git
/// layer's commit scheduler can arm its debounce timer.
pub trait WriteNotifier: Send + Sync {
    fn notify_file_created(&self, filename: &str);
}

/// A no-op notifier for contexts (tests, one-shot CLI reads) that do not
/// need git scheduling.
pub struct NullNotifier;

impl WriteNotifier for NullNotifier {
    fn notify_file_created(&self, _filename: &str) {}
}

/// The aggregate enriched with the current viewer's relationship to it
///.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetails {
    pub aggregate: Aggregate,
    pub viewer_is_monitor: bool,
    pub viewer_is_taker: bool,
}

/// One entry in an item's audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: String,
    pub person: Person,
    pub description: String,
}

/// The Sparkle API: item/entry/status/dependency/monitor/taken/ignored
/// operations, dispatching to the event store and aggregate manager and
/// notifying the git commit scheduler of every write.
pub struct SparkleApi {
    manager: Arc<Manager>,
    globals: GlobalsStore,
    notifier: Arc<dyn WriteNotifier>,
}

impl SparkleApi {
    #[must_use]
    pub fn new(manager: impl Into<Arc<Manager>>, globals: GlobalsStore, notifier: Arc<dyn WriteNotifier>) -> Self {
        Self {
            manager: manager.into(),
            globals,
            notifier,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    #[must_use]
    pub fn globals(&self) -> &GlobalsStore {
        &self.globals
    }

    pub fn on_change(&self, sink: Arc<dyn ChangeSink>) {
        self.manager.on_change(sink);
    }

    fn map_manager_error(&self, id: &ItemId, err: ManagerError) -> SparkleError {
        match err {
            ManagerError::Fold(FoldError::MissingCreate(_)) => SparkleError::not_found(id.as_str()),
            other => SparkleError::Fatal {
                message: other.to_string(),
            },
        }
    }

    fn map_store_error(&self, err: StoreError) -> SparkleError {
        SparkleError::Fatal {
            message: err.to_string(),
        }
    }

    fn map_globals_error(&self, err: GlobalsError) -> SparkleError {
        match err {
            GlobalsError::MissingBuiltins | GlobalsError::Duplicate(_) | GlobalsError::RemovingBuiltin(_) => {
                SparkleError::validation(err.to_string())
            }
            other => SparkleError::Fatal {
                message: other.to_string(),
            },
        }
    }

    fn get_aggregate(&self, id: &ItemId) -> Result<Aggregate, SparkleError> {
        self.manager.get(id).map_err(|e| self.map_manager_error(id, e))
    }

    /// Record a just-written event filename: update the affected
    /// aggregate(s) and arm the git commit scheduler.
    fn record(&self, filename: &str) -> Result<Vec<ItemId>, SparkleError> {
        let ids = self
            .manager
            .record_write(filename)
            .map_err(|e| SparkleError::Fatal {
                message: e.to_string(),
            })?;
        self.notifier.notify_file_created(filename);
        Ok(ids)
    }

    fn all_item_ids_sorted(&self) -> Result<Vec<ItemId>, SparkleError> {
        let mut ids: Vec<ItemId> = self
            .manager
            .store()
            .read_all_item_ids()
            .map_err(|e| self.map_store_error(e))?
            .into_iter()
            .collect();
        ids.sort();
        Ok(ids)
    }

    // ---- write path ----------------------------------------

    /// `createItem(tagline, status, initialEntry?)`. `status` defaults to
    /// `incomplete`; an explicit status must be in the allowed list.
    pub fn create_item(
        &self,
        tagline: &str,
        status: Option<&str>,
        initial_entry: Option<&str>,
        person: &Person,
    ) -> Result<ItemId, SparkleError> {
        if tagline.trim().is_empty() {
            return Err(SparkleError::validation("tagline must not be empty"));
        }
        let status = status.unwrap_or("incomplete");
        let allowed = self.globals.statuses();
        if !allowed.statuses.iter().any(|s| s == status) {
            return Err(SparkleError::validation(format!("unknown status '{status}'")));
        }

        let existing = self
            .manager
            .store()
            .read_all_item_ids()
            .map_err(|e| self.map_store_error(e))?;
        let item_id = ItemId::generate(|candidate| existing.iter().any(|e| e.as_str() == candidate));

        let filename = self
            .manager
            .store()
            .write_create(&item_id, tagline, status, person, &person.timestamp)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;

        if let Some(text) = initial_entry {
            if !text.trim().is_empty() {
                let entry_filename = self
                    .manager
                    .store()
                    .write_entry(&item_id, text, person)
                    .map_err(|e| self.map_store_error(e))?;
                self.record(&entry_filename)?;
            }
        }
        Ok(item_id)
    }

    pub fn add_entry(&self, item_id: &ItemId, text: &str, person: &Person) -> Result<(), SparkleError> {
        if text.trim().is_empty() {
            return Err(SparkleError::validation("entry text must not be empty"));
        }
        self.get_aggregate(item_id)?;
        let filename = self
            .manager
            .store()
            .write_entry(item_id, text, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    pub fn alter_tagline(&self, item_id: &ItemId, tagline: &str, person: &Person) -> Result<(), SparkleError> {
        if tagline.trim().is_empty() {
            return Err(SparkleError::validation("tagline must not be empty"));
        }
        self.get_aggregate(item_id)?;
        let filename = self
            .manager
            .store()
            .write_tagline(item_id, tagline, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    pub fn update_status(
        &self,
        item_id: &ItemId,
        status: &str,
        text: Option<&str>,
        person: &Person,
    ) -> Result<(), SparkleError> {
        self.get_aggregate(item_id)?;
        let allowed = self.globals.statuses();
        if !allowed.statuses.iter().any(|s| s == status) {
            return Err(SparkleError::validation(format!("unknown status '{status}'")));
        }
        let filename = self
            .manager
            .store()
            .write_status(item_id, status, text, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    /// `addDependency(needing, needed)`: idempotent, refuses self-loops and
    /// cycles.
    pub fn add_dependency(&self, needing: &ItemId, needed: &ItemId, person: &Person) -> Result<(), SparkleError> {
        if needing == needed {
            return Err(SparkleError::validation("an item cannot depend on itself"));
        }
        let needing_agg = self.get_aggregate(needing)?;
        self.get_aggregate(needed)?;

        if needing_agg.dependencies.contains(needed) {
            return Ok(());
        }
        if graph::would_create_cycle(&self.manager, needing, needed)
            .map_err(|e| self.map_manager_error(needing, e))?
        {
            return Err(SparkleError::Cycle {
                needing: needing.as_str().to_string(),
                needed: needed.as_str().to_string(),
            });
        }
        let filename = self
            .manager
            .store()
            .write_dependency(needing, event::LinkAction::Linked, needed, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    /// `removeDependency`: idempotent no-op if not currently linked.
    pub fn remove_dependency(&self, needing: &ItemId, needed: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let needing_agg = self.get_aggregate(needing)?;
        self.get_aggregate(needed)?;
        if !needing_agg.dependencies.contains(needed) {
            return Ok(());
        }
        let filename = self
            .manager
            .store()
            .write_dependency(needing, event::LinkAction::Unlinked, needed, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    pub fn add_monitor(&self, item_id: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let agg = self.get_aggregate(item_id)?;
        if agg.monitors.iter().any(|p| p.hash() == person.hash()) {
            return Ok(());
        }
        let filename = self
            .manager
            .store()
            .write_monitor(item_id, event::MonitorAction::Added, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    pub fn remove_monitor(&self, item_id: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let agg = self.get_aggregate(item_id)?;
        if !agg.monitors.iter().any(|p| p.hash() == person.hash()) {
            return Ok(());
        }
        let filename = self
            .manager
            .store()
            .write_monitor(item_id, event::MonitorAction::Removed, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    /// `takeItem`: if a different person currently holds the item, emits
    /// an implicit `surrendered` for them before the `taken` for the
    /// caller.
    /// Idempotent if the caller already holds it.
    pub fn take_item(&self, item_id: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let agg = self.get_aggregate(item_id)?;
        if let Some(holder) = &agg.taken_by {
            if holder.hash() == person.hash() {
                return Ok(());
            }
            let surrender_filename = self
                .manager
                .store()
                .write_taken(item_id, event::TakenAction::Surrendered, holder)
                .map_err(|e| self.map_store_error(e))?;
            self.record(&surrender_filename)?;
        }
        let filename = self
            .manager
            .store()
            .write_taken(item_id, event::TakenAction::Taken, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        self.globals
            .record_taker(person)
            .map_err(|e| self.map_globals_error(e))?;
        Ok(())
    }

    /// `surrenderItem`: idempotent no-op if the caller doesn't hold it.
    pub fn surrender_item(&self, item_id: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let agg = self.get_aggregate(item_id)?;
        match &agg.taken_by {
            Some(holder) if holder.hash() == person.hash() => {}
            _ => return Ok(()),
        }
        let filename = self
            .manager
            .store()
            .write_taken(item_id, event::TakenAction::Surrendered, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    pub fn ignore_item(&self, item_id: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let agg = self.get_aggregate(item_id)?;
        if agg.ignored {
            return Ok(());
        }
        let filename = self
            .manager
            .store()
            .write_ignored(item_id, event::IgnoredAction::Set, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    pub fn unignore_item(&self, item_id: &ItemId, person: &Person) -> Result<(), SparkleError> {
        let agg = self.get_aggregate(item_id)?;
        if !agg.ignored {
            return Ok(());
        }
        let filename = self
            .manager
            .store()
            .write_ignored(item_id, event::IgnoredAction::Cleared, person)
            .map_err(|e| self.map_store_error(e))?;
        self.record(&filename)?;
        Ok(())
    }

    /// `updateStatuses(list)`.
    pub fn update_statuses(&self, list: Vec<String>) -> Result<Statuses, SparkleError> {
        self.globals.update_statuses(list).map_err(|e| self.map_globals_error(e))
    }

    // ---- read path -----------------------------------------

    pub fn get_item_details(&self, item_id: &ItemId, viewer: Option<&Person>) -> Result<ItemDetails, SparkleError> {
        let aggregate = self.get_aggregate(item_id)?;
        let (viewer_is_monitor, viewer_is_taker) = match viewer {
            Some(v) => {
                let hash = v.hash();
                (
                    aggregate.monitors.iter().any(|p| p.hash() == hash),
                    aggregate.taken_by.as_ref().is_some_and(|p| p.hash() == hash),
                )
            }
            None => (false, false),
        };
        Ok(ItemDetails {
            aggregate,
            viewer_is_monitor,
            viewer_is_taker,
        })
    }

    /// `getAllItems(searchSubstring?)`: case-insensitive over `itemId + tagline`.
    pub fn get_all_items(&self, search: Option<&str>) -> Result<Vec<Aggregate>, SparkleError> {
        let ids = self.all_item_ids_sorted()?;
        let needle = search.map(str::to_lowercase);
        let mut out = Vec::new();
        for id in ids {
            let agg = self.get_aggregate(&id)?;
            if let Some(needle) = &needle {
                let haystack = format!("{}{}", agg.item_id, agg.tagline).to_lowercase();
                if !haystack.contains(needle.as_str()) {
                    continue;
                }
            }
            out.push(agg);
        }
        Ok(out)
    }

    pub fn pending_work(&self) -> Result<Vec<ItemId>, SparkleError> {
        let ids = self.all_item_ids_sorted()?;
        graph::pending_work(&self.manager, &ids).map_err(|e| SparkleError::Fatal {
            message: e.to_string(),
        })
    }

    pub fn roots(&self) -> Result<Vec<ItemId>, SparkleError> {
        let ids = self.all_item_ids_sorted()?;
        graph::roots(&self.manager, &ids).map_err(|e| SparkleError::Fatal {
            message: e.to_string(),
        })
    }

    pub fn potential_dependencies(&self, item_id: &ItemId) -> Result<Potential, SparkleError> {
        self.get_aggregate(item_id)?;
        let ids = self.all_item_ids_sorted()?;
        graph::potential_dependencies(&self.manager, item_id, &ids).map_err(|e| self.map_manager_error(item_id, e))
    }

    pub fn potential_dependents(&self, item_id: &ItemId) -> Result<Potential, SparkleError> {
        self.get_aggregate(item_id)?;
        let ids = self.all_item_ids_sorted()?;
        graph::potential_dependents(&self.manager, item_id, &ids).map_err(|e| self.map_manager_error(item_id, e))
    }

    /// `getAllItemsAsDag(referenceId)`.
    pub fn dag(&self, reference_id: &ItemId) -> Result<Vec<DagEmission>, SparkleError> {
        self.get_aggregate(reference_id)?;
        graph::dag(&self.manager, reference_id).map_err(|e| self.map_manager_error(reference_id, e))
    }

    /// `getItemAuditTrail(itemId)`: chronological, each event resolved to
    /// a human-readable description, counterparty taglines included for
    /// dependency edges (a `MISSING` marker if the counterparty is gone).
    pub fn get_item_audit_trail(&self, item_id: &ItemId) -> Result<Vec<AuditEntry>, SparkleError> {
        self.get_aggregate(item_id)?;
        let events = self
            .manager
            .store()
            .sorted_event_files_for_item(item_id)
            .map_err(|e| self.map_store_error(e))?;

        let mut out = Vec::with_capacity(events.len());
        for decoded in events {
            let timestamp = decoded
                .parsed
                .timestamp
                .clone()
                .unwrap_or_else(|| match &decoded.body {
                    EventBody::Create(c) => c.created.clone(),
                    _ => String::new(),
                });
            let person = decoded.body.person().clone();
            let description = self.describe_event(item_id, &decoded);
            out.push(AuditEntry {
                timestamp,
                person,
                description,
            });
        }
        Ok(out)
    }

    fn counterparty_tagline(&self, id: &ItemId) -> String {
        match self.get_aggregate(id) {
            Ok(agg) => agg.tagline,
            Err(_) => "MISSING".to_string(),
        }
    }

    fn describe_event(&self, item_id: &ItemId, decoded: &event::DecodedEvent) -> String {
        match (&decoded.parsed.kind, &decoded.body) {
            (EventKind::Create, EventBody::Create(c)) => {
                format!("created with tagline \"{}\" (status {})", c.tagline, c.status)
            }
            (EventKind::Tagline, EventBody::Tagline(t)) => {
                format!("changed tagline to \"{}\"", t.tagline)
            }
            (EventKind::Entry, EventBody::Entry(e)) => format!("added a note: {}", e.text),
            (EventKind::Status, EventBody::Status(s)) => match &s.text {
                Some(text) => format!("changed status to {} ({text})", s.status),
                None => format!("changed status to {}", s.status),
            },
            (EventKind::Dependency { action, needed }, EventBody::Dependency(_)) => {
                let counterparty_is_needed = &decoded.parsed.primary_id == item_id;
                let counterparty = if counterparty_is_needed {
                    needed.clone()
                } else {
                    decoded.parsed.primary_id.clone()
                };
                let tagline = self.counterparty_tagline(&counterparty);
                match (action, counterparty_is_needed) {
                    (event::LinkAction::Linked, true) => format!("now needs \"{tagline}\" ({counterparty})"),
                    (event::LinkAction::Linked, false) => {
                        format!("is now needed by \"{tagline}\" ({counterparty})")
                    }
                    (event::LinkAction::Unlinked, true) => format!("no longer needs \"{tagline}\" ({counterparty})"),
                    (event::LinkAction::Unlinked, false) => {
                        format!("is no longer needed by \"{tagline}\" ({counterparty})")
                    }
                }
            }
            (EventKind::Monitor { action, .. }, EventBody::Monitor(p)) => match action {
                event::MonitorAction::Added => format!("{} started monitoring", p.person.name),
                event::MonitorAction::Removed => format!("{} stopped monitoring", p.person.name),
            },
            (EventKind::Taken { action, .. }, EventBody::Taken(p)) => match action {
                event::TakenAction::Taken => format!("{} took this item", p.person.name),
                event::TakenAction::Surrendered => format!("{} surrendered this item", p.person.name),
            },
            (EventKind::Ignored { action }, EventBody::Ignored(_)) => match action {
                event::IgnoredAction::Set => "marked as ignored".to_string(),
                event::IgnoredAction::Cleared => "cleared the ignored flag".to_string(),
            },
            _ => "unrecognised event".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EventStore;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-api-test-{label}-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn person(name: &str) -> Person {
        Person {
            name: name.into(),
            email: format!("{name}@example.com"),
            timestamp: crate::clock::next_timestamp(),
        }
    }

    fn api(label: &str) -> SparkleApi {
        let dir = tmp(label);
        let store = EventStore::new(dir.join("data"));
        let agg_dir = dir.join("data/.aggregates");
        let manager = Manager::new(store, agg_dir.clone());
        let globals = GlobalsStore::new(agg_dir);
        SparkleApi::new(manager, globals, Arc::new(NullNotifier))
    }

    #[test]
    fn create_and_read_item() {
        let api = api("create");
        let id = api
            .create_item("Fix login bug", None, None, &person("Ada"))
            .unwrap();
        let details = api.get_item_details(&id, None).unwrap();
        assert_eq!(details.aggregate.tagline, "Fix login bug");
        assert_eq!(details.aggregate.status, "incomplete");
        assert!(details.aggregate.dependencies.is_empty());
        assert!(details.aggregate.entries.is_empty());
    }

    #[test]
    fn create_item_with_initial_entry() {
        let api = api("initial-entry");
        let id = api
            .create_item("Task", None, Some("first note"), &person("Ada"))
            .unwrap();
        let details = api.get_item_details(&id, None).unwrap();
        assert_eq!(details.aggregate.entries.len(), 1);
        assert_eq!(details.aggregate.entries[0].text, "first note");
    }

    #[test]
    fn cycle_refused() {
        let api = api("cycle");
        let a = api.create_item("A", None, None, &person("Ada")).unwrap();
        let b = api.create_item("B", None, None, &person("Ada")).unwrap();
        let c = api.create_item("C", None, None, &person("Ada")).unwrap();
        api.add_dependency(&a, &b, &person("Ada")).unwrap();
        api.add_dependency(&b, &c, &person("Ada")).unwrap();
        let err = api.add_dependency(&c, &a, &person("Ada"));
        assert!(matches!(err, Err(SparkleError::Cycle { .. })));
        assert!(api.get_item_details(&c, None).unwrap().aggregate.dependencies.is_empty());
    }

    #[test]
    fn pending_transitions_when_dependency_completes() {
        let api = api("pending");
        let a = api.create_item("A", None, None, &person("Ada")).unwrap();
        let b = api.create_item("B", None, None, &person("Ada")).unwrap();
        api.add_dependency(&a, &b, &person("Ada")).unwrap();
        assert_eq!(api.pending_work().unwrap(), vec![b.clone()]);
        api.update_status(&b, "completed", None, &person("Ada")).unwrap();
        assert_eq!(api.pending_work().unwrap(), vec![a]);
    }

    #[test]
    fn take_item_surrenders_previous_holder() {
        let api = api("take");
        let id = api.create_item("A", None, None, &person("Ada")).unwrap();
        api.take_item(&id, &person("Ada")).unwrap();
        api.take_item(&id, &person("Bob")).unwrap();
        let details = api.get_item_details(&id, None).unwrap();
        assert_eq!(details.aggregate.taken_by.unwrap().name, "Bob");
    }

    #[test]
    fn take_item_idempotent_for_same_person() {
        let api = api("take-idempotent");
        let id = api.create_item("A", None, None, &person("Ada")).unwrap();
        api.take_item(&id, &person("Ada")).unwrap();
        api.take_item(&id, &person("Ada")).unwrap();
        let details = api.get_item_details(&id, None).unwrap();
        assert_eq!(details.aggregate.taken_by.unwrap().name, "Ada");
    }

    #[test]
    fn surrender_by_non_holder_is_noop() {
        let api = api("surrender-noop");
        let id = api.create_item("A", None, None, &person("Ada")).unwrap();
        api.take_item(&id, &person("Ada")).unwrap();
        api.surrender_item(&id, &person("Bob")).unwrap();
        let details = api.get_item_details(&id, None).unwrap();
        assert_eq!(details.aggregate.taken_by.unwrap().name, "Ada");
    }

    #[test]
    fn audit_trail_resolves_missing_counterparty() {
        let api = api("audit");
        let a = api.create_item("A", None, None, &person("Ada")).unwrap();
        let b = api.create_item("B", None, None, &person("Ada")).unwrap();
        api.add_dependency(&a, &b, &person("Ada")).unwrap();
        let trail = api.get_item_audit_trail(&a).unwrap();
        assert!(trail.iter().any(|e| e.description.contains("\"B\"")));
    }

    #[test]
    fn viewer_flags_reflect_monitor_and_taker_state() {
        let api = api("viewer");
        let id = api.create_item("A", None, None, &person("Ada")).unwrap();
        api.add_monitor(&id, &person("Bob")).unwrap();
        api.take_item(&id, &person("Bob")).unwrap();
        let details = api.get_item_details(&id, Some(&person("Bob"))).unwrap();
        assert!(details.viewer_is_monitor);
        assert!(details.viewer_is_taker);
        let other = api.get_item_details(&id, Some(&person("Ada"))).unwrap();
        assert!(!other.viewer_is_monitor);
        assert!(!other.viewer_is_taker);
    }
}
