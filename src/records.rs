//! Record types for archived board messages.
//!
//! Raw shapes mirror the source feed as-is: every field is optional because
//! the feed is duck-typed JSON and batches routinely carry partial records.
//! Normalized shapes (`Message`, `Reference`) are produced by `normalize` and
//! are the only types the rest of the crate works with.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Timestamp format used by the source feed, e.g. `2025/01/31 23:59:59 +0000`.
pub const FEED_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S %z";

/// Canonical record identifier.
///
/// The feed transmits ids as numbers or strings interchangeably; both forms
/// canonicalize to one comparable key. Floating-point input is rejected
/// outright; large ids do not survive an f64 round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Lenient conversion from an arbitrary JSON value. Empty strings, nulls,
    /// floats, and garbage all map to `None` rather than an error.
    pub fn from_value(value: serde_json::Value) -> Option<RecordId> {
        match value {
            serde_json::Value::Number(n) => n.as_u64().map(RecordId),
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok().map(RecordId),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl de::Visitor<'_> for IdVisitor {
            type Value = RecordId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer id as a number or string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RecordId, E> {
                Ok(RecordId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RecordId, E> {
                u64::try_from(v)
                    .map(RecordId)
                    .map_err(|_| E::custom("negative id"))
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<RecordId, E> {
                Err(E::custom("floating-point ids lose precision"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RecordId, E> {
                v.trim().parse::<u64>().map(RecordId).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Deserialize an optional id field, treating null, empty strings, floats,
/// and unparseable values as absent.
pub(crate) fn opt_record_id<'de, D>(deserializer: D) -> Result<Option<RecordId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(RecordId::from_value))
}

/// Parse a feed timestamp to an unambiguous instant.
pub fn parse_feed_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), FEED_TIME_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Message body in the feed's mutually exclusive representations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich: Option<String>,
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Body {
    pub fn is_empty(&self) -> bool {
        non_blank(&self.plain).is_none()
            && non_blank(&self.parsed).is_none()
            && non_blank(&self.rich).is_none()
    }
}

/// A message record straight off the feed. Presence checks happen in
/// `normalize`; nothing downstream should touch this type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "opt_record_id")]
    pub id: Option<RecordId>,
    #[serde(default, deserialize_with = "opt_record_id")]
    pub sender_id: Option<RecordId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "opt_record_id")]
    pub replied_to_id: Option<RecordId>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default)]
    pub content_excerpt: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    /// Scope-linkage marker carried by "created association" bookkeeping
    /// records from the source feed.
    #[serde(default, deserialize_with = "opt_record_id")]
    pub associated_group_id: Option<RecordId>,
}

/// A normalized message. `children` is populated only during hierarchy
/// construction and never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replied_to_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Body::is_empty")]
    pub body: Body,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_excerpt: Option<String>,
    #[serde(skip)]
    pub children: Vec<Message>,
}

impl Message {
    /// Bare message with only an id, as produced for reference stubs.
    pub fn stub(id: RecordId) -> Message {
        Message {
            id,
            sender_id: None,
            created_at: None,
            replied_to_id: None,
            body: Body::default(),
            content_excerpt: None,
            children: Vec::new(),
        }
    }

    /// A message with any non-empty body representation (the excerpt counts)
    /// is full; one carrying only an id is a stub.
    pub fn is_stub(&self) -> bool {
        self.body.is_empty() && non_blank(&self.content_excerpt).is_none()
    }

    /// Length of the preferred body representation, used by the
    /// more-complete-wins merge rule.
    pub fn content_len(&self) -> usize {
        non_blank(&self.body.plain)
            .or_else(|| non_blank(&self.body.parsed))
            .or_else(|| non_blank(&self.body.rich))
            .or_else(|| non_blank(&self.content_excerpt))
            .map_or(0, str::len)
    }

    /// Sort instant. Unparseable or absent timestamps sort as epoch start
    /// rather than failing.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
            .as_deref()
            .and_then(parse_feed_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Declared type of a reference entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    User,
    Message,
    #[default]
    #[serde(other)]
    Unlabeled,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::User => "user",
            ReferenceKind::Message => "message",
            ReferenceKind::Unlabeled => "unlabeled",
        }
    }
}

/// A reference entry straight off the feed. Message-kind references carry
/// enough fields to become message stubs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReference {
    #[serde(rename = "type", default)]
    pub kind: ReferenceKind,
    #[serde(default, deserialize_with = "opt_record_id")]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "opt_record_id")]
    pub sender_id: Option<RecordId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "opt_record_id")]
    pub replied_to_id: Option<RecordId>,
    #[serde(default)]
    pub content_excerpt: Option<String>,
}

/// A normalized reference entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_from_number_and_string() {
        let m: RawMessage = serde_json::from_str(r#"{"id": 123}"#).unwrap();
        assert_eq!(m.id, Some(RecordId(123)));

        let m: RawMessage = serde_json::from_str(r#"{"id": "456"}"#).unwrap();
        assert_eq!(m.id, Some(RecordId(456)));
    }

    #[test]
    fn test_record_id_survives_large_values() {
        // Above 2^53, where f64 parsing would round.
        let m: RawMessage = serde_json::from_str(r#"{"id": "9007199254740995"}"#).unwrap();
        assert_eq!(m.id, Some(RecordId(9007199254740995)));

        let m: RawMessage = serde_json::from_str(r#"{"id": 9007199254740995}"#).unwrap();
        assert_eq!(m.id, Some(RecordId(9007199254740995)));
    }

    #[test]
    fn test_record_id_rejects_floats_and_blanks() {
        let m: RawMessage = serde_json::from_str(r#"{"id": 1.5}"#).unwrap();
        assert_eq!(m.id, None);

        let m: RawMessage = serde_json::from_str(r#"{"replied_to_id": ""}"#).unwrap();
        assert_eq!(m.replied_to_id, None);

        let m: RawMessage = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(m.id, None);
    }

    #[test]
    fn test_feed_timestamp_parsing() {
        let ts = parse_feed_timestamp("2025/01/31 23:59:59 +0000").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-31T23:59:59+00:00");

        // Offsets normalize to UTC.
        let ts = parse_feed_timestamp("2025/01/31 23:59:59 +0200").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-31T21:59:59+00:00");

        assert!(parse_feed_timestamp("January 31st").is_none());
    }

    #[test]
    fn test_unparseable_timestamp_sorts_as_epoch() {
        let mut m = Message::stub(RecordId(1));
        m.created_at = Some("not a date".into());
        assert_eq!(m.timestamp(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_stub_classification() {
        let mut m = Message::stub(RecordId(1));
        assert!(m.is_stub());

        m.body.plain = Some("   ".into());
        assert!(m.is_stub());

        m.body.plain = Some("hi".into());
        assert!(!m.is_stub());

        let mut m = Message::stub(RecordId(2));
        m.content_excerpt = Some("preview".into());
        assert!(!m.is_stub());
    }

    #[test]
    fn test_reference_kind_labels() {
        let r: RawReference = serde_json::from_str(r#"{"type": "user", "id": 7}"#).unwrap();
        assert_eq!(r.kind, ReferenceKind::User);

        let r: RawReference = serde_json::from_str(r#"{"type": "topic", "id": 7}"#).unwrap();
        assert_eq!(r.kind, ReferenceKind::Unlabeled);

        let r: RawReference = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(r.kind, ReferenceKind::Unlabeled);
    }
}
