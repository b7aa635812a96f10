//! Core value types: item identifiers and the person record attached to
//! every event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal digits in an [`ItemId`].
pub const ITEM_ID_DIGITS: usize = 8;

/// An opaque 8-digit decimal item identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

/// Error returned when a string does not have the `^\d{8}$` shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid item id `{0}`: expected 8 decimal digits")]
pub struct InvalidItemId(pub String);

impl ItemId {
    /// Validate and wrap a string as an [`ItemId`].
    pub fn parse(raw: &str) -> Result<Self, InvalidItemId> {
        if raw.len() == ITEM_ID_DIGITS && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidItemId(raw.to_string()))
        }
    }

    /// Construct without validation; used by generators that already know
    /// the value is well-formed.
    #[must_use]
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a fresh random id, retrying against `exists` on collision.
    pub fn generate(mut exists: impl FnMut(&str) -> bool) -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        loop {
            let n: u32 = rng.gen_range(0..100_000_000);
            let candidate = format!("{n:08}");
            if !exists(&candidate) {
                return Self(candidate);
            }
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = InvalidItemId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A person record attached to every event: who made it, and when.
///
/// `name`/`email` come from the local git identity; `timestamp` is the
/// 17-character lexicographically sortable event-time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
    pub timestamp: String,
}

impl Person {
    /// Stable per-person hash used in monitor/taken filenames.
    ///
    /// Derived from `(name, email)` only — the timestamp varies per event
    /// and must not affect the hash, since add/remove pairs for the same
    /// person need to collapse onto the same filename slot.
    #[must_use]
    pub fn hash(&self) -> String {
        let input = format!("{}\x1f{}", self.name, self.email);
        let digest = blake3::hash(input.as_bytes());
        digest.to_hex()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_accepts_eight_digits() {
        assert!(ItemId::parse("12345678").is_ok());
    }

    #[test]
    fn item_id_rejects_wrong_length() {
        assert!(ItemId::parse("1234567").is_err());
        assert!(ItemId::parse("123456789").is_err());
    }

    #[test]
    fn item_id_rejects_non_digits() {
        assert!(ItemId::parse("1234567a").is_err());
    }

    #[test]
    fn item_id_generate_retries_on_collision() {
        let mut seen = 0;
        let id = ItemId::generate(|_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
        assert_eq!(id.as_str().len(), ITEM_ID_DIGITS);
    }

    #[test]
    fn person_hash_ignores_timestamp() {
        let a = Person {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            timestamp: "20260101000000000".into(),
        };
        let b = Person {
            timestamp: "20260102000000000".into(),
            ..a.clone()
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn person_hash_differs_for_different_people() {
        let a = Person {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            timestamp: "t".into(),
        };
        let b = Person {
            name: "Bob".into(),
            email: "bob@example.com".into(),
            timestamp: "t".into(),
        };
        assert_ne!(a.hash(), b.hash());
    }
}
