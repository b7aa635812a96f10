//! Event body payloads and the decoder
//! that ties a parsed filename to its typed body.

use super::filename::{self, EventKind, FilenameParseError, ParsedFilename};
use crate::model::Person;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePayload {
    pub item_id: String,
    pub tagline: String,
    pub status: String,
    pub person: Person,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaglinePayload {
    pub tagline: String,
    pub person: Person,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub text: String,
    pub person: Person,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub person: Person,
}

/// Body shared by dependency, monitor, taken and ignored events — all of
/// them record nothing beyond who performed the action; the action itself
/// lives in the filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonPayload {
    pub person: Person,
}

/// A typed event body, decoded according to the [`EventKind`] named by its
/// filename.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Create(CreatePayload),
    Tagline(TaglinePayload),
    Entry(EntryPayload),
    Status(StatusPayload),
    Dependency(PersonPayload),
    Monitor(PersonPayload),
    Taken(PersonPayload),
    Ignored(PersonPayload),
}

impl EventBody {
    #[must_use]
    pub const fn person(&self) -> &Person {
        match self {
            Self::Create(p) => &p.person,
            Self::Tagline(p) => &p.person,
            Self::Entry(p) => &p.person,
            Self::Status(p) => &p.person,
            Self::Dependency(p) | Self::Monitor(p) | Self::Taken(p) | Self::Ignored(p) => {
                &p.person
            }
        }
    }
}

/// A filename plus its decoded body: everything a fold needs from one
/// event file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub filename: String,
    pub parsed: ParsedFilename,
    pub body: EventBody,
}

/// Error decoding one event file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Filename(#[from] FilenameParseError),

    #[error("malformed body in {filename}: {source}")]
    Body {
        filename: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one event file given its name and raw JSON body.
pub fn decode(filename: &str, raw: &str) -> Result<DecodedEvent, DecodeError> {
    let parsed = filename::parse(filename)?;
    let body_err = |source| DecodeError::Body {
        filename: filename.to_string(),
        source,
    };
    let body = match &parsed.kind {
        EventKind::Create => EventBody::Create(serde_json::from_str(raw).map_err(body_err)?),
        EventKind::Tagline => EventBody::Tagline(serde_json::from_str(raw).map_err(body_err)?),
        EventKind::Entry => EventBody::Entry(serde_json::from_str(raw).map_err(body_err)?),
        EventKind::Status => EventBody::Status(serde_json::from_str(raw).map_err(body_err)?),
        EventKind::Dependency { .. } => {
            EventBody::Dependency(serde_json::from_str(raw).map_err(body_err)?)
        }
        EventKind::Monitor { .. } => {
            EventBody::Monitor(serde_json::from_str(raw).map_err(body_err)?)
        }
        EventKind::Taken { .. } => EventBody::Taken(serde_json::from_str(raw).map_err(body_err)?),
        EventKind::Ignored { .. } => {
            EventBody::Ignored(serde_json::from_str(raw).map_err(body_err)?)
        }
    };
    Ok(DecodedEvent {
        filename: filename.to_string(),
        parsed,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;

    fn person() -> Person {
        Person {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            timestamp: "20260101000000000".into(),
        }
    }

    #[test]
    fn decodes_create() {
        let payload = CreatePayload {
            item_id: "12345678".into(),
            tagline: "Fix login bug".into(),
            status: "incomplete".into(),
            person: person(),
            created: "20260101000000000".into(),
        };
        let raw = serde_json::to_string(&payload).unwrap();
        let decoded = decode("12345678.json", &raw).unwrap();
        assert_eq!(decoded.parsed.primary_id, ItemId::parse("12345678").unwrap());
        assert!(matches!(decoded.body, EventBody::Create(_)));
    }

    #[test]
    fn decodes_dependency_with_person_body() {
        let name = filename::build_dependency(
            &ItemId::parse("11111111").unwrap(),
            filename::LinkAction::Linked,
            &ItemId::parse("22222222").unwrap(),
            "20260101000000000",
            "abcdef",
        );
        let raw = serde_json::to_string(&PersonPayload { person: person() }).unwrap();
        let decoded = decode(&name, &raw).unwrap();
        assert!(matches!(decoded.body, EventBody::Dependency(_)));
        assert_eq!(decoded.parsed.item_ids().len(), 2);
    }

    #[test]
    fn rejects_mismatched_body() {
        let err = decode("12345678.json", "{\"not\":\"a create payload\"}");
        assert!(matches!(err, Err(DecodeError::Body { .. })));
    }
}
