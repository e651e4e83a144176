//! Document commands
//!
//! A minimal primary-commit pipeline: split text into segments, commit the
//! new version, then hand the change to the ingestion hook. Graph sync
//! failures never fail these commands.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::document::{Document, DocumentStore, Segment, compute_content_hash};
use crate::domain::sync::{ChangeSet, HookOutcome, SegmentCommit, SyncOutcome};
use crate::error::{Error, Result};

use super::SyncContext;

/// Key used for text that precedes the first heading
const PREAMBLE_KEY: &str = "preamble";

/// A document version to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub document_id: String,
    pub title: String,
    pub content: String,
    /// Domain timestamp of this version
    pub modified_at: DateTime<Utc>,
}

/// What ingestion did with a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestStatus {
    /// Content hash matched the stored version; nothing was written
    Unchanged,
    /// The version was committed and a graph sync scheduled
    Committed {
        added: usize,
        modified: usize,
        removed: usize,
    },
}

/// Result of an ingest command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub content_hash: String,
    pub segments: usize,
    #[serde(flatten)]
    pub status: IngestStatus,
}

/// Ingest one document version
///
/// Returns once the primary commit has landed. The graph sync runs on the
/// context's task tracker; call `SyncContext::wait_idle` to wait for it.
pub async fn ingest(ctx: &SyncContext, request: IngestRequest) -> Result<IngestReport> {
    let document_id = request.document_id.trim();
    if document_id.is_empty() {
        return Err(Error::InvalidInput("Document ID cannot be empty".to_string()));
    }

    let store = ctx.store();
    let content_hash = compute_content_hash(&request.content);
    let segments = split_segments(document_id, &request.content);

    let previous = store.get_document(document_id).await?;
    if let Some(previous) = &previous
        && previous.content_hash == content_hash
    {
        debug!(document_id = %document_id, "Content unchanged, skipping commit");
        return Ok(IngestReport {
            document_id: document_id.to_string(),
            content_hash,
            segments: segments.len(),
            status: IngestStatus::Unchanged,
        });
    }

    let old_segments = match &previous {
        Some(_) => store.get_segments(document_id).await?,
        None => Vec::new(),
    };

    let mut document = Document::new(
        document_id,
        request.title.trim(),
        &content_hash,
        request.modified_at,
    );
    if let Some(previous) = &previous {
        document.created_at = previous.created_at;
    }

    store.commit_document(&document, &segments).await?;

    info!(
        document_id = %document_id,
        segments = segments.len(),
        content_hash = %content_hash,
        "Document committed"
    );

    let outcome = ctx
        .hook()
        .on_segments_committed(SegmentCommit {
            document_id: document_id.to_string(),
            previous_content_hash: previous.map(|d| d.content_hash),
            content_hash: content_hash.clone(),
            old_segments,
            new_segments: segments.clone(),
            modified_at: request.modified_at,
        })
        .await;

    let status = match outcome {
        HookOutcome::Unchanged => IngestStatus::Unchanged,
        HookOutcome::Scheduled(changes) => {
            let counts = changes.counts();
            IngestStatus::Committed {
                added: counts.added,
                modified: counts.modified,
                removed: counts.removed,
            }
        }
    };

    Ok(IngestReport {
        document_id: document_id.to_string(),
        content_hash,
        segments: segments.len(),
        status,
    })
}

/// Ingest a text file
///
/// The document ID defaults to the file stem, the title to the first
/// heading, and the domain timestamp to the file's modification time.
pub async fn ingest_file(
    ctx: &SyncContext,
    path: &Path,
    document_id: Option<&str>,
    modified_at: Option<DateTime<Utc>>,
) -> Result<IngestReport> {
    let content = tokio::fs::read_to_string(path).await?;

    let document_id = match document_id {
        Some(id) => id.to_string(),
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Cannot derive a document ID from {}", path.display()))
            })?,
    };

    let modified_at = match modified_at {
        Some(at) => at,
        None => tokio::fs::metadata(path)
            .await?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now()),
    };

    let title = first_heading(&content).unwrap_or_else(|| document_id.clone());

    ingest(
        ctx,
        IngestRequest {
            document_id,
            title,
            content,
            modified_at,
        },
    )
    .await
}

/// Delete a document and retire its live episodes
///
/// The retirement runs through the worker, which sees the document gone
/// and aborts with an orphan sweep.
pub async fn delete(ctx: &SyncContext, document_id: &str) -> Result<Option<SyncOutcome>> {
    if !ctx.store().delete_document(document_id).await? {
        return Ok(None);
    }

    let outcome = ctx
        .worker()
        .sync(document_id, &ChangeSet::default(), Utc::now())
        .await?;
    Ok(Some(outcome))
}

/// List all documents with their sync status
pub async fn list_documents(ctx: &SyncContext) -> Result<Vec<Document>> {
    ctx.store().list_documents().await
}

/// Split text into segments keyed by Markdown headings
///
/// Each heading starts a segment keyed by its slug; repeated slugs get a
/// numeric suffix. Text before the first heading is the preamble. Text with
/// no headings is split into blank-line separated sections.
pub fn split_segments(document_id: &str, content: &str) -> Vec<Segment> {
    let has_headings = content.lines().any(|line| heading_text(line).is_some());

    let mut blocks: Vec<(Option<String>, String)> = Vec::new();
    if has_headings {
        let mut current: (Option<String>, String) = (Some(PREAMBLE_KEY.to_string()), String::new());
        for line in content.lines() {
            if let Some(heading) = heading_text(line) {
                blocks.push(std::mem::take(&mut current));
                current = (Some(slugify(heading)), String::new());
            }
            current.1.push_str(line);
            current.1.push('\n');
        }
        blocks.push(current);
    } else {
        let mut current = String::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                if !current.trim().is_empty() {
                    blocks.push((None, std::mem::take(&mut current)));
                }
                current.clear();
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        blocks.push((None, current));
    }

    let mut used = std::collections::HashSet::new();
    let mut segments = Vec::new();
    for (key, text) in blocks {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let position = segments.len() as u32;
        let base = key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| format!("section-{}", position + 1));
        let mut key = base.clone();
        let mut n = 2;
        while !used.insert(key.clone()) {
            key = format!("{}-{}", base, n);
            n += 1;
        }

        segments.push(Segment::new(document_id, key, position, text));
    }
    segments
}

/// Text of a Markdown ATX heading line
fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then_some(text)
}

fn first_heading(content: &str) -> Option<String> {
    content.lines().find_map(heading_text).map(str::to_string)
}

/// Lowercase slug of a heading
fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_headings() {
        let content = "Intro text.\n\n# Pricing\nUnit price is $4.\n\n## Payment Terms\nNet 30.\n";
        let segments = split_segments("doc-1", content);

        let keys: Vec<_> = segments.iter().map(|s| s.segment_key.as_str()).collect();
        assert_eq!(keys, vec!["preamble", "pricing", "payment-terms"]);
        assert_eq!(segments[1].content, "# Pricing\nUnit price is $4.");
        assert_eq!(segments[2].position, 2);
        assert!(segments.iter().all(|s| s.document_id == "doc-1"));
    }

    #[test]
    fn test_split_duplicate_headings_get_suffix() {
        let content = "# Notes\none\n# Notes\ntwo\n# Notes\nthree";
        let keys: Vec<_> = split_segments("d", content)
            .into_iter()
            .map(|s| s.segment_key)
            .collect();
        assert_eq!(keys, vec!["notes", "notes-2", "notes-3"]);
    }

    #[test]
    fn test_split_without_headings_uses_paragraphs() {
        let content = "First paragraph.\nStill first.\n\n\nSecond paragraph.\n";
        let segments = split_segments("d", content);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment_key, "section-1");
        assert_eq!(segments[0].content, "First paragraph.\nStill first.");
        assert_eq!(segments[1].segment_key, "section-2");
    }

    #[test]
    fn test_split_empty_content() {
        assert!(split_segments("d", "").is_empty());
        assert!(split_segments("d", "   \n\n").is_empty());
    }

    #[test]
    fn test_unchanged_sections_keep_their_hash() {
        let v1 = split_segments("d", "# A\nalpha\n# B\nbeta");
        let v2 = split_segments("d", "# A\nalpha\n# B\nbeta, amended");
        assert_eq!(v1[0].content_hash, v2[0].content_hash);
        assert_ne!(v1[1].content_hash, v2[1].content_hash);
    }

    #[test]
    fn test_heading_text() {
        assert_eq!(heading_text("## Payment Terms ##"), Some("Payment Terms"));
        assert_eq!(heading_text("#hashtag"), None);
        assert_eq!(heading_text("####### too deep"), None);
        assert_eq!(heading_text("# "), None);
        assert_eq!(first_heading("text\n# Title\n# Other"), Some("Title".to_string()));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Payment Terms (2024)"), "payment-terms-2024");
        assert_eq!(slugify("  Über Café "), "über-café");
    }
}
