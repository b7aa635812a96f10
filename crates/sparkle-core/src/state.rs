//! State builder: fold one item's event files into its
//! aggregate.
//!
//! Pure and deterministic. Given the same set of event files in any order,
//! [`fold`] always produces the same [`Aggregate`] — fold determinism.

use crate::event::data::DecodedEvent;
use crate::event::{EventBody, EventKind, IgnoredAction, LinkAction, MonitorAction, TakenAction};
use crate::model::{ItemId, Person};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema version stamped onto every written aggregate cache file, bumped
/// whenever this struct's shape changes. [`crate::aggregate::Manager::validate_all`]
/// treats a mismatch as a corrupted cache.
pub const AGGREGATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub text: String,
    pub person: Person,
}

/// Per-item derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub item_id: ItemId,
    pub tagline: String,
    pub status: String,
    pub created: String,
    pub person: Person,
    /// Items needed by this item.
    pub dependencies: Vec<ItemId>,
    /// Items that need this item.
    pub dependents: Vec<ItemId>,
    pub monitors: Vec<Person>,
    pub taken_by: Option<Person>,
    pub entries: Vec<EntryRecord>,
    pub ignored: bool,
}

const fn default_schema_version() -> u32 {
    AGGREGATE_SCHEMA_VERSION
}

/// Error folding an item's events into an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FoldError {
    #[error("no creation event found for item {0}")]
    MissingCreate(String),
}

/// Fold `events` (the full set for one item, per
/// [`crate::store::EventStore::list_event_files_for_item`]) into its
/// current aggregate.
pub fn fold(item_id: &ItemId, events: &[DecodedEvent]) -> Result<Aggregate, FoldError> {
    let create = events
        .iter()
        .find_map(|e| match &e.body {
            EventBody::Create(c) if &e.parsed.primary_id == item_id => Some(c),
            _ => None,
        })
        .ok_or_else(|| FoldError::MissingCreate(item_id.as_str().to_string()))?;

    let mut tagline = create.tagline.clone();
    let mut tagline_ts = String::new();
    let mut status = create.status.clone();
    let mut status_ts = String::new();
    let mut entries = Vec::new();
    let mut dep_latest: HashMap<(ItemId, ItemId), (String, LinkAction)> = HashMap::new();
    let mut monitor_latest: HashMap<String, (String, MonitorAction, Person)> = HashMap::new();
    let mut taken_latest: Option<(String, TakenAction, Person)> = None;
    let mut ignored_latest: Option<(String, IgnoredAction)> = None;

    for e in events {
        let ts = e.parsed.timestamp.clone().unwrap_or_default();
        match (&e.parsed.kind, &e.body) {
            (EventKind::Tagline, EventBody::Tagline(t)) => {
                if ts >= tagline_ts {
                    tagline = t.tagline.clone();
                    tagline_ts = ts;
                }
            }
            (EventKind::Status, EventBody::Status(s)) => {
                if ts >= status_ts {
                    status = s.status.clone();
                    status_ts = ts;
                }
            }
            (EventKind::Entry, EventBody::Entry(entry)) => {
                entries.push((ts, EntryRecord {
                    text: entry.text.clone(),
                    person: entry.person.clone(),
                }));
            }
            (EventKind::Dependency { action, needed }, EventBody::Dependency(_)) => {
                let needing = e.parsed.primary_id.clone();
                let key = (needing, needed.clone());
                let newer = dep_latest.get(&key).map_or(true, |(cur_ts, _)| &ts >= cur_ts);
                if newer {
                    dep_latest.insert(key, (ts, *action));
                }
            }
            (EventKind::Monitor { action, person_hash }, EventBody::Monitor(p)) => {
                let newer = monitor_latest
                    .get(person_hash)
                    .map_or(true, |(cur_ts, _, _)| &ts >= cur_ts);
                if newer {
                    monitor_latest.insert(person_hash.clone(), (ts, *action, p.person.clone()));
                }
            }
            (EventKind::Taken { action, .. }, EventBody::Taken(p)) => {
                let newer = taken_latest.as_ref().map_or(true, |(cur_ts, _, _)| &ts >= cur_ts);
                if newer {
                    taken_latest = Some((ts, *action, p.person.clone()));
                }
            }
            (EventKind::Ignored { action }, EventBody::Ignored(_)) => {
                let newer = ignored_latest.as_ref().map_or(true, |(cur_ts, _)| &ts >= cur_ts);
                if newer {
                    ignored_latest = Some((ts, *action));
                }
            }
            (EventKind::Create, EventBody::Create(_)) => {}
            _ => {}
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let entries = entries.into_iter().map(|(_, e)| e).collect();

    let mut dependencies = Vec::new();
    let mut dependents = Vec::new();
    for ((needing, needed), (_, action)) in dep_latest {
        if action != LinkAction::Linked {
            continue;
        }
        if &needing == item_id {
            dependencies.push(needed);
        } else if &needed == item_id {
            dependents.push(needing);
        }
    }
    dependencies.sort();
    dependents.sort();

    let mut monitors: Vec<Person> = monitor_latest
        .into_values()
        .filter(|(_, action, _)| *action == MonitorAction::Added)
        .map(|(_, _, person)| person)
        .collect();
    monitors.sort_by_key(Person::hash);

    let taken_by = taken_latest.and_then(|(_, action, person)| {
        (action == TakenAction::Taken).then_some(person)
    });

    let ignored = matches!(ignored_latest, Some((_, IgnoredAction::Set)));

    Ok(Aggregate {
        schema_version: AGGREGATE_SCHEMA_VERSION,
        item_id: item_id.clone(),
        tagline,
        status,
        created: create.created.clone(),
        person: create.person.clone(),
        dependencies,
        dependents,
        monitors,
        taken_by,
        entries,
        ignored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;

    fn person(name: &str) -> Person {
        Person {
            name: name.into(),
            email: format!("{name}@example.com"),
            timestamp: "20260101000000000".into(),
        }
    }

    fn decode(filename: &str, body: &impl serde::Serialize) -> DecodedEvent {
        let raw = serde_json::to_string(body).unwrap();
        event::decode(filename, &raw).unwrap()
    }

    #[test]
    fn folds_create_only() {
        let id = ItemId::parse("12345678").unwrap();
        let create = event::data::CreatePayload {
            item_id: id.as_str().into(),
            tagline: "Fix login bug".into(),
            status: "incomplete".into(),
            person: person("Ada"),
            created: "20260101000000000".into(),
        };
        let events = vec![decode("12345678.json", &create)];
        let agg = fold(&id, &events).unwrap();
        assert_eq!(agg.tagline, "Fix login bug");
        assert_eq!(agg.status, "incomplete");
        assert!(agg.dependencies.is_empty());
        assert!(agg.entries.is_empty());
        assert!(!agg.ignored);
        assert!(agg.taken_by.is_none());
    }

    #[test]
    fn later_tagline_wins() {
        let id = ItemId::parse("12345678").unwrap();
        let create = event::data::CreatePayload {
            item_id: id.as_str().into(),
            tagline: "v1".into(),
            status: "incomplete".into(),
            person: person("Ada"),
            created: "20260101000000000".into(),
        };
        let t1 = event::filename::build_tagline(&id, "20260101000000001", "aaaaaa");
        let t2 = event::filename::build_tagline(&id, "20260101000000002", "bbbbbb");
        let events = vec![
            decode("12345678.json", &create),
            decode(
                &t1,
                &event::data::TaglinePayload {
                    tagline: "v2".into(),
                    person: person("Ada"),
                },
            ),
            decode(
                &t2,
                &event::data::TaglinePayload {
                    tagline: "v3".into(),
                    person: person("Ada"),
                },
            ),
        ];
        let agg = fold(&id, &events).unwrap();
        assert_eq!(agg.tagline, "v3");
    }

    #[test]
    fn dependency_linked_then_unlinked_clears() {
        let needing = ItemId::parse("11111111").unwrap();
        let needed = ItemId::parse("22222222").unwrap();
        let create = event::data::CreatePayload {
            item_id: needing.as_str().into(),
            tagline: "A".into(),
            status: "incomplete".into(),
            person: person("Ada"),
            created: "ts0".into(),
        };
        let link_name = event::filename::build_dependency(&needing, event::LinkAction::Linked, &needed, "ts1", "rand1");
        let unlink_name =
            event::filename::build_dependency(&needing, event::LinkAction::Unlinked, &needed, "ts2", "rand2");
        let payload = event::data::PersonPayload { person: person("Ada") };
        let events = vec![
            decode("11111111.json", &create),
            decode(&link_name, &payload),
            decode(&unlink_name, &payload),
        ];
        let agg = fold(&needing, &events).unwrap();
        assert!(agg.dependencies.is_empty());
    }

    #[test]
    fn monitor_add_remove_collapses_by_person_hash() {
        let id = ItemId::parse("12345678").unwrap();
        let create = event::data::CreatePayload {
            item_id: id.as_str().into(),
            tagline: "A".into(),
            status: "incomplete".into(),
            person: person("Ada"),
            created: "ts0".into(),
        };
        let ada = person("Ada");
        let hash = ada.hash();
        let add_name = event::filename::build_monitor(&id, event::MonitorAction::Added, &hash, "ts1", "r1");
        let events = vec![
            decode("12345678.json", &create),
            decode(&add_name, &event::data::PersonPayload { person: ada.clone() }),
        ];
        let agg = fold(&id, &events).unwrap();
        assert_eq!(agg.monitors, vec![ada]);
    }

    #[test]
    fn taken_then_surrendered_clears() {
        let id = ItemId::parse("12345678").unwrap();
        let create = event::data::CreatePayload {
            item_id: id.as_str().into(),
            tagline: "A".into(),
            status: "incomplete".into(),
            person: person("Ada"),
            created: "ts0".into(),
        };
        let ada = person("Ada");
        let hash = ada.hash();
        let take_name = event::filename::build_taken(&id, event::TakenAction::Taken, &hash, "ts1", "r1");
        let surrender_name =
            event::filename::build_taken(&id, event::TakenAction::Surrendered, &hash, "ts2", "r2");
        let payload = event::data::PersonPayload { person: ada };
        let events = vec![
            decode("12345678.json", &create),
            decode(&take_name, &payload),
            decode(&surrender_name, &payload),
        ];
        let agg = fold(&id, &events).unwrap();
        assert!(agg.taken_by.is_none());
    }

    #[test]
    fn fold_is_order_independent() {
        let id = ItemId::parse("12345678").unwrap();
        let create = event::data::CreatePayload {
            item_id: id.as_str().into(),
            tagline: "A".into(),
            status: "incomplete".into(),
            person: person("Ada"),
            created: "ts0".into(),
        };
        let e1 = decode(
            &event::filename::build_entry(&id, "ts1", "r1"),
            &event::data::EntryPayload {
                text: "first".into(),
                person: person("Ada"),
            },
        );
        let e2 = decode(
            &event::filename::build_entry(&id, "ts2", "r2"),
            &event::data::EntryPayload {
                text: "second".into(),
                person: person("Bob"),
            },
        );
        let c = decode("12345678.json", &create);

        let forward = fold(&id, &[c.clone(), e1.clone(), e2.clone()]).unwrap();
        let backward = fold(&id, &[e2, e1, c]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn missing_create_errors() {
        let id = ItemId::parse("12345678").unwrap();
        assert!(matches!(fold(&id, &[]), Err(FoldError::MissingCreate(_))));
    }
}
