//! Batch reconciliation.
//!
//! Merges any number of record batches for one scope into a single canonical
//! set: exactly one surviving record per id, conflicts resolved by a
//! most-complete-wins rule. The set is built fresh on every merge and swapped
//! in whole, so a failed run never leaves a half-updated store behind.

use crate::normalize::{normalize_message, normalize_reference, NormalizedReference};
use crate::records::{Message, RawMessage, RawReference, RecordId, Reference, ReferenceKind};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::mem;

/// What happened to an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Inserted,
    /// Existing stub replaced by a full record.
    UpgradedStub,
    /// Existing full record replaced by a strictly more complete one.
    Replaced,
    /// Incoming record dropped as a duplicate.
    DuplicateDropped,
}

/// Deduplicated id-to-message mapping for one scope.
#[derive(Debug, Clone, Default)]
pub struct CanonicalSet {
    by_id: HashMap<RecordId, Message>,
}

impl CanonicalSet {
    pub fn new() -> CanonicalSet {
        CanonicalSet::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Message> {
        self.by_id.get(&id)
    }

    /// Insert one record, resolving an id conflict in rule order:
    /// full data beats a stub, then strictly longer content beats shorter,
    /// otherwise the existing entry stays. A replacement inherits whatever
    /// `children` the old entry had already accumulated.
    pub fn insert(&mut self, mut incoming: Message) -> MergeAction {
        match self.by_id.entry(incoming.id) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                MergeAction::Inserted
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                let action = if existing.is_stub() && !incoming.is_stub() {
                    MergeAction::UpgradedStub
                } else if !existing.is_stub()
                    && !incoming.is_stub()
                    && incoming.content_len() > existing.content_len()
                {
                    MergeAction::Replaced
                } else {
                    return MergeAction::DuplicateDropped;
                };
                incoming.children = mem::take(&mut existing.children);
                *existing = incoming;
                action
            }
        }
    }

    /// Messages ordered by id descending, the persistence order of the
    /// canonical store. Deterministic regardless of merge order.
    pub fn messages_by_id_desc(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.by_id.values().collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages
    }

    pub fn into_map(self) -> HashMap<RecordId, Message> {
        self.by_id
    }
}

/// Per-merge counters, in the vein of an import summary.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub inserted: usize,
    pub stubs_upgraded: usize,
    pub replaced: usize,
    pub duplicates_dropped: usize,
    pub records_skipped: usize,
}

impl MergeStats {
    fn record(&mut self, action: MergeAction) {
        match action {
            MergeAction::Inserted => self.inserted += 1,
            MergeAction::UpgradedStub => self.stubs_upgraded += 1,
            MergeAction::Replaced => self.replaced += 1,
            MergeAction::DuplicateDropped => self.duplicates_dropped += 1,
        }
    }
}

/// Result of reconciling one scope.
#[derive(Debug)]
pub struct MergeOutcome {
    pub messages: CanonicalSet,
    /// User and other reference entries, deduplicated, ordered by
    /// (type, id) descending for persistence.
    pub references: Vec<Reference>,
    pub stats: MergeStats,
    /// Delta checkpoint handed back untouched; advancing it is the
    /// acquisition layer's job.
    pub checkpoint: serde_json::Value,
}

/// Merge batches of raw records, in arrival order, into one canonical set.
///
/// Message batches and reference batches are paired by index: references
/// travel alongside the message batch they were fetched with, and
/// message-kind references join reconciliation as stubs.
pub fn reconcile(
    message_batches: Vec<Vec<RawMessage>>,
    reference_batches: Vec<Vec<RawReference>>,
    checkpoint: serde_json::Value,
) -> MergeOutcome {
    let mut messages = CanonicalSet::new();
    let mut references: BTreeMap<(ReferenceKind, RecordId), Reference> = BTreeMap::new();
    let mut stats = MergeStats::default();

    let mut msg_batches = message_batches.into_iter();
    let mut ref_batches = reference_batches.into_iter();
    loop {
        let (msgs, refs) = (msg_batches.next(), ref_batches.next());
        if msgs.is_none() && refs.is_none() {
            break;
        }

        for raw in msgs.unwrap_or_default() {
            match normalize_message(raw) {
                Some(message) => stats.record(messages.insert(message)),
                None => stats.records_skipped += 1,
            }
        }

        for raw in refs.unwrap_or_default() {
            match normalize_reference(raw) {
                NormalizedReference::User(user) => {
                    let slot = references.entry((user.kind, user.id)).or_insert_with(|| {
                        Reference {
                            kind: user.kind,
                            id: user.id,
                            full_name: None,
                        }
                    });
                    if slot.full_name.is_none() {
                        slot.full_name = user.full_name;
                    }
                }
                NormalizedReference::Stub(stub) => stats.record(messages.insert(stub)),
                NormalizedReference::Discarded => stats.records_skipped += 1,
            }
        }
    }

    let references = references.into_values().rev().collect();
    MergeOutcome {
        messages,
        references,
        stats,
        checkpoint,
    }
}
