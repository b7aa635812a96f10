//! Event filename grammar.
//!
//! Every event is a single JSON file whose *name* encodes everything the
//! rebuild engine needs to know without opening the file: which item(s) it
//! names, what kind of mutation it records, and — for kinds that can repeat
//! — a sortable timestamp plus a random disambiguator.
//!
//! Filenames are split on `.`; none of the grammar's components (item ids,
//! action words, timestamps, random suffixes, person hashes) can themselves
//! contain a literal `.`, so a plain `split('.')` is exact and total. This
//! matters for dependency files in particular: a partial parse of the four
//! dot-positions can silently drop the second endpoint on invalidation, so
//! [`parse`] always extracts both.

use crate::model::ItemId;
use std::fmt;

/// The action recorded by a dependency event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Linked,
    Unlinked,
}

impl LinkAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Linked => "linked",
            Self::Unlinked => "unlinked",
        }
    }
}

/// The action recorded by a monitor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    Added,
    Removed,
}

impl MonitorAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// The action recorded by a taken event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakenAction {
    Taken,
    Surrendered,
}

impl TakenAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Taken => "taken",
            Self::Surrendered => "surrendered",
        }
    }
}

/// The action recorded by an ignored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredAction {
    Set,
    Cleared,
}

impl IgnoredAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Cleared => "cleared",
        }
    }
}

/// The event kind decoded from a filename, with its kind-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Tagline,
    Entry,
    Status,
    Dependency { action: LinkAction, needed: ItemId },
    Monitor { action: MonitorAction, person_hash: String },
    Taken { action: TakenAction, person_hash: String },
    Ignored { action: IgnoredAction },
}

impl EventKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Tagline => "tagline",
            Self::Entry => "entry",
            Self::Status => "status",
            Self::Dependency { .. } => "dependency",
            Self::Monitor { .. } => "monitor",
            Self::Taken { .. } => "taken",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// A filename decoded into its structural parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    /// The id in the filename's primary (first) position. For dependency
    /// files this is the *needing* side; see [`ParsedFilename::item_ids`]
    /// for both endpoints.
    pub primary_id: ItemId,
    pub kind: EventKind,
    /// Sortable timestamp; absent only for [`EventKind::Create`].
    pub timestamp: Option<String>,
    /// Random disambiguator; absent only for [`EventKind::Create`].
    pub rand: Option<String>,
}

impl ParsedFilename {
    /// Every item id named by this filename — one for most kinds, two for
    /// dependency events.
    #[must_use]
    pub fn item_ids(&self) -> Vec<ItemId> {
        match &self.kind {
            EventKind::Dependency { needed, .. } => {
                vec![self.primary_id.clone(), needed.clone()]
            }
            _ => vec![self.primary_id.clone()],
        }
    }
}

/// Error returned when a filename does not match the event filename grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct FilenameParseError(pub String);

impl fmt::Display for FilenameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised event filename: {}", self.0)
    }
}

/// Parse a filename per the dot-separated event grammar. Total over any name this
/// module itself ever constructs (see [`build`] family below); returns an
/// error rather than a partial/best-effort result otherwise.
pub fn parse(filename: &str) -> Result<ParsedFilename, FilenameParseError> {
    let stem = filename
        .strip_suffix(".json")
        .ok_or_else(|| FilenameParseError(filename.to_string()))?;
    let tokens: Vec<&str> = stem.split('.').collect();
    let err = || FilenameParseError(filename.to_string());

    let parse_item = |s: &str| ItemId::parse(s).map_err(|_| err());

    match tokens.as_slice() {
        [item] => Ok(ParsedFilename {
            primary_id: parse_item(item)?,
            kind: EventKind::Create,
            timestamp: None,
            rand: None,
        }),
        [item, "tagline", ts, rand] => Ok(ParsedFilename {
            primary_id: parse_item(item)?,
            kind: EventKind::Tagline,
            timestamp: Some((*ts).to_string()),
            rand: Some((*rand).to_string()),
        }),
        [item, "entry", ts, rand] => Ok(ParsedFilename {
            primary_id: parse_item(item)?,
            kind: EventKind::Entry,
            timestamp: Some((*ts).to_string()),
            rand: Some((*rand).to_string()),
        }),
        [item, "status", ts, rand] => Ok(ParsedFilename {
            primary_id: parse_item(item)?,
            kind: EventKind::Status,
            timestamp: Some((*ts).to_string()),
            rand: Some((*rand).to_string()),
        }),
        [needing, "dependency", action, needed, ts, rand] => {
            let action = match *action {
                "linked" => LinkAction::Linked,
                "unlinked" => LinkAction::Unlinked,
                _ => return Err(err()),
            };
            Ok(ParsedFilename {
                primary_id: parse_item(needing)?,
                kind: EventKind::Dependency {
                    action,
                    needed: parse_item(needed)?,
                },
                timestamp: Some((*ts).to_string()),
                rand: Some((*rand).to_string()),
            })
        }
        [item, "monitor", action, person_hash, ts, rand] => {
            let action = match *action {
                "added" => MonitorAction::Added,
                "removed" => MonitorAction::Removed,
                _ => return Err(err()),
            };
            Ok(ParsedFilename {
                primary_id: parse_item(item)?,
                kind: EventKind::Monitor {
                    action,
                    person_hash: (*person_hash).to_string(),
                },
                timestamp: Some((*ts).to_string()),
                rand: Some((*rand).to_string()),
            })
        }
        [item, "taken", action, person_hash, ts, rand] => {
            let action = match *action {
                "taken" => TakenAction::Taken,
                "surrendered" => TakenAction::Surrendered,
                _ => return Err(err()),
            };
            Ok(ParsedFilename {
                primary_id: parse_item(item)?,
                kind: EventKind::Taken {
                    action,
                    person_hash: (*person_hash).to_string(),
                },
                timestamp: Some((*ts).to_string()),
                rand: Some((*rand).to_string()),
            })
        }
        [item, "ignored", action, ts, rand] => {
            let action = match *action {
                "set" => IgnoredAction::Set,
                "cleared" => IgnoredAction::Cleared,
                _ => return Err(err()),
            };
            Ok(ParsedFilename {
                primary_id: parse_item(item)?,
                kind: EventKind::Ignored { action },
                timestamp: Some((*ts).to_string()),
                rand: Some((*rand).to_string()),
            })
        }
        _ => Err(err()),
    }
}

/// Build the filename for an item-creation event.
#[must_use]
pub fn build_create(item: &ItemId) -> String {
    format!("{item}.json")
}

/// Build the filename for a tagline-change event.
#[must_use]
pub fn build_tagline(item: &ItemId, ts: &str, rand: &str) -> String {
    format!("{item}.tagline.{ts}.{rand}.json")
}

/// Build the filename for an entry event.
#[must_use]
pub fn build_entry(item: &ItemId, ts: &str, rand: &str) -> String {
    format!("{item}.entry.{ts}.{rand}.json")
}

/// Build the filename for a status-change event.
#[must_use]
pub fn build_status(item: &ItemId, ts: &str, rand: &str) -> String {
    format!("{item}.status.{ts}.{rand}.json")
}

/// Build the filename for a dependency event.
#[must_use]
pub fn build_dependency(
    needing: &ItemId,
    action: LinkAction,
    needed: &ItemId,
    ts: &str,
    rand: &str,
) -> String {
    format!(
        "{needing}.dependency.{}.{needed}.{ts}.{rand}.json",
        action.as_str()
    )
}

/// Build the filename for a monitor event.
#[must_use]
pub fn build_monitor(item: &ItemId, action: MonitorAction, person_hash: &str, ts: &str, rand: &str) -> String {
    format!(
        "{item}.monitor.{}.{person_hash}.{ts}.{rand}.json",
        action.as_str()
    )
}

/// Build the filename for a taken event.
#[must_use]
pub fn build_taken(item: &ItemId, action: TakenAction, person_hash: &str, ts: &str, rand: &str) -> String {
    format!(
        "{item}.taken.{}.{person_hash}.{ts}.{rand}.json",
        action.as_str()
    )
}

/// Build the filename for an ignored event.
#[must_use]
pub fn build_ignored(item: &ItemId, action: IgnoredAction, ts: &str, rand: &str) -> String {
    format!("{item}.ignored.{}.{ts}.{rand}.json", action.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    #[test]
    fn parses_create() {
        let p = parse("12345678.json").unwrap();
        assert_eq!(p.primary_id, id("12345678"));
        assert_eq!(p.kind, EventKind::Create);
        assert!(p.timestamp.is_none());
    }

    #[test]
    fn parses_tagline() {
        let name = build_tagline(&id("12345678"), "20260101000000000", "ab12cd");
        let p = parse(&name).unwrap();
        assert_eq!(p.kind, EventKind::Tagline);
        assert_eq!(p.timestamp.as_deref(), Some("20260101000000000"));
        assert_eq!(p.rand.as_deref(), Some("ab12cd"));
    }

    #[test]
    fn parses_dependency_both_endpoints() {
        let name = build_dependency(
            &id("11111111"),
            LinkAction::Linked,
            &id("22222222"),
            "20260101000000000",
            "abcdef",
        );
        let p = parse(&name).unwrap();
        let ids = p.item_ids();
        assert_eq!(ids, vec![id("11111111"), id("22222222")]);
        assert!(matches!(
            p.kind,
            EventKind::Dependency {
                action: LinkAction::Linked,
                ..
            }
        ));
    }

    #[test]
    fn parses_monitor_and_taken() {
        let m = build_monitor(&id("12345678"), MonitorAction::Added, "abcd1234abcd1234", "ts", "r1");
        let pm = parse(&m).unwrap();
        assert!(matches!(
            pm.kind,
            EventKind::Monitor {
                action: MonitorAction::Added,
                ..
            }
        ));

        let t = build_taken(&id("12345678"), TakenAction::Taken, "abcd1234abcd1234", "ts", "r1");
        let pt = parse(&t).unwrap();
        assert!(matches!(
            pt.kind,
            EventKind::Taken {
                action: TakenAction::Taken,
                ..
            }
        ));
    }

    #[test]
    fn parses_ignored() {
        let name = build_ignored(&id("12345678"), IgnoredAction::Set, "ts", "r1");
        let p = parse(&name).unwrap();
        assert_eq!(p.kind, EventKind::Ignored { action: IgnoredAction::Set });
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not-an-event").is_err());
        assert!(parse("12345678.bogus.ts.r.json").is_err());
        assert!(parse("1234.json").is_err());
    }

    #[test]
    fn rejects_unknown_action_word() {
        assert!(parse("12345678.monitor.sideways.abcd.ts.r.json").is_err());
    }
}
