//! Segment diff engine
//!
//! Pure comparison of two segment sets for one document. Identity is the
//! `segment_key`; a shared key is `modified` only when its content hash
//! differs.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::document::Segment;

/// Kind of change for one segment key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a change list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub segment_key: String,
    pub change_type: ChangeType,
    pub old_snapshot: Option<Segment>,
    pub new_snapshot: Option<Segment>,
}

impl ChangeEntry {
    /// Whether this entry retires an existing fact
    pub fn invalidates(&self) -> bool {
        matches!(self.change_type, ChangeType::Modified | ChangeType::Removed)
    }

    /// Whether this entry needs a new fact extracted
    pub fn creates(&self) -> bool {
        matches!(self.change_type, ChangeType::Added | ChangeType::Modified)
    }
}

/// Count of entries per change type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

/// Ordered change list for one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub fn new(entries: Vec<ChangeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for entry in &self.entries {
            match entry.change_type {
                ChangeType::Added => counts.added += 1,
                ChangeType::Modified => counts.modified += 1,
                ChangeType::Removed => counts.removed += 1,
            }
        }
        counts
    }

    /// Compact JSON form for audit log payloads (hashes, not content)
    pub fn summary(&self) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|entry| {
                json!({
                    "segment_key": entry.segment_key,
                    "change_type": entry.change_type,
                    "old_content_hash": entry.old_snapshot.as_ref().map(|s| &s.content_hash),
                    "new_content_hash": entry.new_snapshot.as_ref().map(|s| &s.content_hash),
                })
            })
            .collect();
        json!({ "counts": self.counts(), "changes": entries })
    }

    /// Apply the change list on top of a baseline snapshot
    ///
    /// The result is ordered by position, then key.
    pub fn apply_to(&self, baseline: &[Segment]) -> Vec<Segment> {
        let mut by_key: HashMap<&str, Segment> = baseline
            .iter()
            .map(|segment| (segment.segment_key.as_str(), segment.clone()))
            .collect();

        for entry in &self.entries {
            match (&entry.change_type, &entry.new_snapshot) {
                (ChangeType::Removed, _) => {
                    by_key.remove(entry.segment_key.as_str());
                }
                (_, Some(segment)) => {
                    by_key.insert(entry.segment_key.as_str(), segment.clone());
                }
                (_, None) => {}
            }
        }

        let mut segments: Vec<Segment> = by_key.into_values().collect();
        sort_segments(&mut segments);
        segments
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeEntry;
    type IntoIter = std::slice::Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Compare two segment sets and produce the change list
///
/// Entries are ordered by `new` position, with removals placed by their
/// `old` position. Ties on position are broken by key, so the output does
/// not depend on input ordering.
pub fn diff(old: &[Segment], new: &[Segment]) -> ChangeSet {
    let old_by_key: HashMap<&str, &Segment> =
        old.iter().map(|s| (s.segment_key.as_str(), s)).collect();
    let new_by_key: HashMap<&str, &Segment> =
        new.iter().map(|s| (s.segment_key.as_str(), s)).collect();

    let mut entries: Vec<(u32, ChangeEntry)> = Vec::new();

    for segment in new_by_key.values() {
        let change_type = match old_by_key.get(segment.segment_key.as_str()) {
            None => ChangeType::Added,
            Some(previous) if previous.content_hash != segment.content_hash => ChangeType::Modified,
            Some(_) => continue,
        };
        entries.push((
            segment.position,
            ChangeEntry {
                segment_key: segment.segment_key.clone(),
                change_type,
                old_snapshot: old_by_key.get(segment.segment_key.as_str()).map(|s| (*s).clone()),
                new_snapshot: Some((*segment).clone()),
            },
        ));
    }

    for segment in old_by_key.values() {
        if new_by_key.contains_key(segment.segment_key.as_str()) {
            continue;
        }
        entries.push((
            segment.position,
            ChangeEntry {
                segment_key: segment.segment_key.clone(),
                change_type: ChangeType::Removed,
                old_snapshot: Some((*segment).clone()),
                new_snapshot: None,
            },
        ));
    }

    entries.sort_by(|(pa, a), (pb, b)| (pa, &a.segment_key).cmp(&(pb, &b.segment_key)));
    ChangeSet::new(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// Whether two snapshots carry the same content per key (positions ignored)
pub fn same_content(a: &[Segment], b: &[Segment]) -> bool {
    fingerprint(a) == fingerprint(b)
}

fn fingerprint(segments: &[Segment]) -> BTreeMap<&str, &str> {
    segments
        .iter()
        .map(|s| (s.segment_key.as_str(), s.content_hash.as_str()))
        .collect()
}

fn sort_segments(segments: &mut [Segment]) {
    segments.sort_by(|a, b| (a.position, &a.segment_key).cmp(&(b.position, &b.segment_key)));
}
