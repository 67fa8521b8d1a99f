//! Persistence adapter for the archive directory.
//!
//! Layout, one directory per scope:
//!
//! ```text
//! <archive-dir>/
//!   groups.json            scope configuration (ordered list)
//!   <groupName>/
//!     messages.json        canonical store  {"body":{"value":[...]}}
//!     references.json      canonical store, same envelope
//!     messages-<n>.json    numbered partial batches from the acquisition
//!     references-<n>.json  workflow, consumed by a successful merge
//! ```
//!
//! Merge sequencing: read everything, reconcile in memory, write the new
//! canonical stores (to a temp file, then rename), and only then delete the
//! consumed numbered files. A failure at any earlier step leaves the partials
//! on disk for retry.

use crate::error::ArchiveError;
use crate::hierarchy::build_forest;
use crate::reconcile::{reconcile, MergeStats};
use crate::records::{Message, RawMessage, RawReference};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SCOPE_CONFIG_FILE: &str = "groups.json";
const MESSAGES_FILE: &str = "messages.json";
const REFERENCES_FILE: &str = "references.json";
const MESSAGES_STEM: &str = "messages";
const REFERENCES_STEM: &str = "references";

/// One entry of the scope configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
    pub group_name: String,
    pub group_id: String,
    /// Delta checkpoint advanced by the acquisition workflow after a
    /// successful run. Opaque passthrough state; never interpreted here.
    #[serde(default)]
    pub last_message_id: serde_json::Value,
}

/// Durable envelope wrapping every canonical store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub body: EnvelopeBody<T>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct EnvelopeBody<T> {
    #[serde(default)]
    pub value: Vec<T>,
}

impl<T> Envelope<T> {
    pub fn wrap(value: Vec<T>) -> Envelope<T> {
        Envelope {
            body: EnvelopeBody { value },
        }
    }
}

/// Per-thread export input: one thread's records in a single file.
#[derive(Debug, Default, Deserialize)]
pub struct ThreadExport {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub references: Vec<RawReference>,
}

/// Summary of one scope merge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub scope: String,
    pub batches_read: usize,
    pub files_consumed: usize,
    pub messages_total: usize,
    pub references_total: usize,
    pub missing_parents: usize,
    pub stats: MergeStats,
    pub checkpoint: serde_json::Value,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let content = fs::read_to_string(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ArchiveError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ArchiveError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| ArchiveError::Write {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| ArchiveError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Numbered partial files for one stem, in sequence order.
fn list_partials(dir: &Path, stem: &str) -> Result<Vec<PathBuf>, ArchiveError> {
    let entries = fs::read_dir(dir).map_err(|e| ArchiveError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let prefix = format!("{stem}-");
    let mut found: Vec<(u32, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            // Parse sequence from filename: <stem>-<n>.json
            if let Some(seq) = name.strip_prefix(&prefix).and_then(|s| s.strip_suffix(".json")) {
                if let Ok(seq) = seq.parse::<u32>() {
                    found.push((seq, path));
                }
            }
        }
    }
    found.sort_by_key(|(seq, _)| *seq);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Read the scope configuration list.
pub fn read_scope_config(archive_dir: &Path) -> Result<Vec<ScopeConfig>, ArchiveError> {
    read_json(&archive_dir.join(SCOPE_CONFIG_FILE))
}

/// Write the scope configuration list back, order preserved.
pub fn write_scope_config(archive_dir: &Path, scopes: &[ScopeConfig]) -> Result<(), ArchiveError> {
    write_json_atomic(&archive_dir.join(SCOPE_CONFIG_FILE), &scopes)
}

/// Read a per-thread export file.
pub fn read_thread_file(path: &Path) -> Result<ThreadExport, ArchiveError> {
    read_json(path)
}

/// Read a scope's canonical stores. The message store is required; a scope
/// with no reference store just has no identities yet.
pub fn load_scope(
    archive_dir: &Path,
    scope_name: &str,
) -> Result<(Vec<RawMessage>, Vec<RawReference>), ArchiveError> {
    let inner = || -> Result<(Vec<RawMessage>, Vec<RawReference>), ArchiveError> {
        let scope_dir = archive_dir.join(scope_name);
        if !scope_dir.is_dir() {
            return Err(ArchiveError::ScopeNotFound(scope_dir));
        }
        let messages: Envelope<RawMessage> = read_json(&scope_dir.join(MESSAGES_FILE))?;
        let references_path = scope_dir.join(REFERENCES_FILE);
        let references = if references_path.is_file() {
            read_json::<Envelope<RawReference>>(&references_path)?.body.value
        } else {
            Vec::new()
        };
        Ok((messages.body.value, references))
    };
    inner().map_err(|e| e.for_scope(scope_name))
}

/// Number of partial batch files waiting to be merged for a scope.
/// A scope directory that does not exist yet has nothing pending.
pub fn pending_partial_count(archive_dir: &Path, scope_name: &str) -> Result<usize, ArchiveError> {
    let scope_dir = archive_dir.join(scope_name);
    if !scope_dir.is_dir() {
        return Ok(0);
    }
    let inner = || -> Result<usize, ArchiveError> {
        Ok(list_partials(&scope_dir, MESSAGES_STEM)?.len()
            + list_partials(&scope_dir, REFERENCES_STEM)?.len())
    };
    inner().map_err(|e| e.for_scope(scope_name))
}

/// Merge all pending partial batches for one scope into its canonical
/// stores, then consume the partials. Safe to re-run: with no partials
/// pending it rewrites the same canonical content.
pub fn merge_scope(archive_dir: &Path, scope: &ScopeConfig) -> Result<MergeReport, ArchiveError> {
    merge_scope_inner(archive_dir, scope).map_err(|e| e.for_scope(&scope.group_name))
}

fn merge_scope_inner(
    archive_dir: &Path,
    scope: &ScopeConfig,
) -> Result<MergeReport, ArchiveError> {
    let scope_dir = archive_dir.join(&scope.group_name);
    if !scope_dir.is_dir() {
        return Err(ArchiveError::ScopeNotFound(scope_dir));
    }

    let mut message_batches: Vec<Vec<RawMessage>> = Vec::new();
    let mut reference_batches: Vec<Vec<RawReference>> = Vec::new();

    // The canonical stores are batch zero: records from prior merges keep
    // arrival precedence over anything in the pending partials.
    let messages_path = scope_dir.join(MESSAGES_FILE);
    if messages_path.is_file() {
        message_batches.push(read_json::<Envelope<RawMessage>>(&messages_path)?.body.value);
    }
    let references_path = scope_dir.join(REFERENCES_FILE);
    if references_path.is_file() {
        reference_batches.push(read_json::<Envelope<RawReference>>(&references_path)?.body.value);
    }

    let message_partials = list_partials(&scope_dir, MESSAGES_STEM)?;
    let reference_partials = list_partials(&scope_dir, REFERENCES_STEM)?;
    for path in &message_partials {
        message_batches.push(read_json::<Envelope<RawMessage>>(path)?.body.value);
    }
    for path in &reference_partials {
        reference_batches.push(read_json::<Envelope<RawReference>>(path)?.body.value);
    }

    let batches_read = message_batches.len() + reference_batches.len();
    let outcome = reconcile(
        message_batches,
        reference_batches,
        scope.last_message_id.clone(),
    );
    let messages_total = outcome.messages.len();
    let references_total = outcome.references.len();

    // Trial hierarchy build so the report can surface unresolved parents;
    // the canonical store itself never carries children.
    let missing_parents = build_forest(outcome.messages.clone()).missing_parents;

    let sorted: Vec<&Message> = outcome.messages.messages_by_id_desc();
    write_json_atomic(&messages_path, &Envelope::wrap(sorted))?;
    write_json_atomic(&references_path, &Envelope::wrap(outcome.references))?;

    // Both canonical writes landed; the partials are consumed.
    let mut files_consumed = 0;
    for path in message_partials.iter().chain(reference_partials.iter()) {
        fs::remove_file(path).map_err(|e| ArchiveError::Write {
            path: path.clone(),
            source: e,
        })?;
        files_consumed += 1;
    }

    Ok(MergeReport {
        scope: scope.group_name.clone(),
        batches_read,
        files_consumed,
        messages_total,
        references_total,
        missing_parents,
        stats: outcome.stats,
        checkpoint: outcome.checkpoint,
    })
}
