//! Nearest-neighbour identity decision over the full gallery.
//!
//! Every query is a linear scan: O(gallery size × 512). No index is built;
//! swapping in an approximate index changes recognition accuracy and needs
//! re-validation against the threshold.

use crate::gallery::{GalleryStore, StoreError};
use crate::types::{Decision, Embedding, GalleryRecord, MatchResult};

/// Default cosine similarity a match must strictly exceed.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Strategy for comparing a query embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare<'a, I>(&self, query: &Embedding, gallery: I, threshold: f32) -> MatchResult
    where
        I: IntoIterator<Item = &'a GalleryRecord>;
}

/// Cosine similarity matcher.
///
/// Visits every record once. On equal scores the record seen first wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare<'a, I>(&self, query: &Embedding, gallery: I, threshold: f32) -> MatchResult
    where
        I: IntoIterator<Item = &'a GalleryRecord>,
    {
        let mut best: Option<(&GalleryRecord, f32)> = None;

        for record in gallery {
            let sim = query.similarity(&record.embedding);
            if sim.is_nan() {
                tracing::warn!(id = %record.id, "non-finite similarity; record ignored");
                continue;
            }
            // Strict `>` keeps the earliest record on ties.
            if best.map_or(true, |(_, best_sim)| sim > best_sim) {
                best = Some((record, sim));
            }
        }

        match best {
            Some((record, sim)) => MatchResult {
                identity: Some(record.identity.clone()),
                record_id: Some(record.id.clone()),
                similarity: sim,
                decision: if sim > threshold {
                    Decision::Matched
                } else {
                    Decision::Unknown
                },
            },
            None => MatchResult {
                identity: None,
                record_id: None,
                similarity: 0.0,
                decision: Decision::Unknown,
            },
        }
    }
}

/// Scan `store` and match `query` against the snapshot.
pub fn match_gallery<M: Matcher>(
    store: &dyn GalleryStore,
    matcher: &M,
    query: &Embedding,
    threshold: f32,
) -> Result<MatchResult, StoreError> {
    let snapshot = store.scan()?;
    let result = matcher.compare(query, &snapshot, threshold);

    tracing::info!(
        gallery = snapshot.len(),
        identity = ?result.identity,
        similarity = result.similarity,
        threshold,
        decision = ?result.decision,
        "match decision"
    );

    Ok(result)
}
