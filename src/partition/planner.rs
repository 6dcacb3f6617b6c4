//! Partition planning
//!
//! Only key-ordered `_all_docs` scans are split. Boundary keys are probed
//! at evenly spaced row offsets, so each partition holds roughly the same
//! number of documents regardless of how the ids are distributed.

use super::types::{PartitionPlan, PartitionScope};
use crate::error::Result;
use crate::query::{AccessMode, TranslatedQuery};
use crate::store::{CouchClient, KeyRange};
use futures::future::try_join_all;
use tracing::{debug, info};

/// Plans partitions for one read against one database
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner<'a> {
    client: &'a CouchClient,
    database: &'a str,
}

impl<'a> PartitionPlanner<'a> {
    /// Create a planner
    pub fn new(client: &'a CouchClient, database: &'a str) -> Self {
        Self { client, database }
    }

    /// Plan a read with at most `requested` partitions
    pub async fn plan(&self, query: &TranslatedQuery, requested: usize) -> Result<PartitionPlan> {
        let plan = match &query.mode {
            AccessMode::Changes => {
                if requested > 1 {
                    debug!("Changes feed is read sequentially; ignoring {requested} partitions");
                }
                PartitionPlan::single(PartitionScope::Sequence { since: None })
            }
            AccessMode::Selector | AccessMode::View { .. } | AccessMode::Search { .. } => {
                PartitionPlan::single(PartitionScope::Whole)
            }
            AccessMode::AllDocs => self.plan_all_docs(&query.key_range, requested).await?,
        };

        info!(
            "Planned {} partition(s) for {} read of {}",
            plan.len(),
            query.mode.name(),
            self.database
        );
        Ok(plan)
    }

    async fn plan_all_docs(&self, range: &KeyRange, requested: usize) -> Result<PartitionPlan> {
        let single = || PartitionPlan::single(PartitionScope::KeyRange(range.clone()));
        if requested <= 1 || range.is_empty() {
            return Ok(single());
        }

        let Some(doc_count) = self.client.db_info(self.database).await?.doc_count else {
            debug!("Document count unknown; using one partition");
            return Ok(single());
        };

        let offsets = boundary_offsets(doc_count, requested);
        if offsets.is_empty() {
            return Ok(single());
        }

        let probes = offsets
            .iter()
            .map(|&offset| self.client.all_docs_key_at(self.database, range, offset));
        let keys: Vec<String> = try_join_all(probes).await?.into_iter().flatten().collect();
        debug!("Probed {} boundary key(s) at offsets {offsets:?}", keys.len());

        let boundaries = normalize_boundaries(range, keys);
        Ok(PartitionPlan::from_scopes(
            split_range(range, &boundaries)
                .into_iter()
                .map(PartitionScope::KeyRange),
        ))
    }
}

/// Row offsets of the first key of partitions `1..p`
///
/// Fewer documents than partitions yields one partition per document.
pub fn boundary_offsets(doc_count: u64, partitions: usize) -> Vec<u64> {
    let p = (partitions as u64).min(doc_count);
    if p <= 1 {
        return Vec::new();
    }
    let mut offsets: Vec<u64> = (1..p).map(|i| i * doc_count / p).collect();
    offsets.dedup();
    offsets
}

/// Keep boundaries strictly inside the range, sorted and unique
fn normalize_boundaries(range: &KeyRange, mut keys: Vec<String>) -> Vec<String> {
    keys.retain(|k| range.contains(k) && range.start.as_deref().map_or(true, |s| k.as_str() > s));
    keys.sort();
    keys.dedup();
    keys
}

/// Split a range at sorted boundary keys
///
/// Partition `i` owns `[boundary_{i-1}, boundary_i)`; the first keeps the
/// range start and the last keeps the range end and its inclusiveness.
pub fn split_range(range: &KeyRange, boundaries: &[String]) -> Vec<KeyRange> {
    let starts = std::iter::once(range.start.clone()).chain(boundaries.iter().cloned().map(Some));
    let ends = boundaries.iter().cloned().map(Some);

    let mut ranges: Vec<KeyRange> = starts
        .zip(ends)
        .map(|(start, end)| KeyRange::half_open(start, end))
        .collect();

    ranges.push(KeyRange {
        start: boundaries.last().cloned().or_else(|| range.start.clone()),
        end: range.end.clone(),
        inclusive_end: range.inclusive_end,
    });
    ranges
}
