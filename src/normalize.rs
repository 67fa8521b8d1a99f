//! Record normalization.
//!
//! Decides whether a raw record is usable at all, and turns it into the
//! normalized shape the reconciliation engine consumes. Rejection here is a
//! skip, never an error: the feed interleaves bookkeeping artifacts with real
//! content and both arrive on the same stream.

use crate::records::{Message, RawMessage, RawReference, Reference, ReferenceKind};

/// Outcome of normalizing a reference entry.
#[derive(Debug)]
pub enum NormalizedReference {
    /// A user entry for the identity table.
    User(Reference),
    /// A message-kind entry; becomes a stub message and joins reconciliation.
    Stub(Message),
    /// Unusable entry (no id, or an unlabeled type with nothing to offer).
    Discarded,
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Marker value the feed stamps on "created association" records.
const SYSTEM_MESSAGE_TYPE: &str = "system";

/// Normalize a raw message record. `None` means skip.
///
/// Skipped records: anything without an id, and bookkeeping artifacts whose
/// only payload is a scope-linkage marker (no sender, no content, no reply
/// target). Id-only records with a sender or date survive as stubs; they
/// exist to be referenced.
pub fn normalize_message(raw: RawMessage) -> Option<Message> {
    let id = raw.id?;

    let body = raw.body.unwrap_or_default();
    let has_content = !body.is_empty() || has_text(&raw.content_excerpt);
    let linkage_marker = raw.associated_group_id.is_some()
        || raw.message_type.as_deref() == Some(SYSTEM_MESSAGE_TYPE);
    if linkage_marker && raw.sender_id.is_none() && !has_content && raw.replied_to_id.is_none() {
        return None;
    }

    Some(Message {
        id,
        sender_id: raw.sender_id,
        created_at: raw.created_at,
        replied_to_id: raw.replied_to_id,
        body,
        content_excerpt: raw.content_excerpt,
        children: Vec::new(),
    })
}

/// Normalize a raw reference entry.
pub fn normalize_reference(raw: RawReference) -> NormalizedReference {
    let Some(id) = raw.id else {
        return NormalizedReference::Discarded;
    };

    match raw.kind {
        ReferenceKind::User => NormalizedReference::User(Reference {
            kind: ReferenceKind::User,
            id,
            full_name: raw.full_name.filter(|n| !n.trim().is_empty()),
        }),
        ReferenceKind::Message => {
            let mut stub = Message::stub(id);
            stub.sender_id = raw.sender_id;
            stub.created_at = raw.created_at;
            stub.replied_to_id = raw.replied_to_id;
            stub.content_excerpt = raw.content_excerpt.filter(|e| !e.trim().is_empty());
            NormalizedReference::Stub(stub)
        }
        ReferenceKind::Unlabeled => NormalizedReference::Discarded,
    }
}
